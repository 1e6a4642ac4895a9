//! The `include` and `sinclude` directives.
//!
//! Both splice another file into the current script. `include` reports a
//! missing or unreadable file as an error; `sinclude` (soft include) only
//! warns and lets the script continue. Errors inside the included file are
//! errors either way.

use argscript::{Handler, Line, Stream};

use crate::arguments;

pub fn add_commands<T: 'static>(stream: &mut Stream<T>) {
    stream.add_parser("include", Handler::command(include_command(false)));
    stream.add_parser("sinclude", Handler::command(include_command(true)));
}

fn include_command<T>(soft: bool) -> impl Fn(&mut Stream<T>, &Line) {
    move |stream, line| {
        let args = match arguments(stream, line, 1) {
            Some(args) => args,
            None => return,
        };
        let path = stream.resolve_path(args.get(0));
        if !stream.file_exists(&path) {
            let diagnostic = line.create_error("The specified file does not exist.");
            if soft {
                stream.add_warning(diagnostic);
            } else {
                stream.add_error(diagnostic);
            }
            return;
        }
        match stream.include_file(&path) {
            Ok(errors) => {
                if let Some(first) = errors.first() {
                    stream.add_error(
                        line.create_error(format!("Cannot include file: {}", first.message)),
                    );
                }
            }
            Err(io_error) => {
                let diagnostic = line.create_error(format!("Error reading file: {io_error}"));
                if soft {
                    stream.add_warning(diagnostic);
                } else {
                    stream.add_error(diagnostic);
                }
            }
        }
    }
}
