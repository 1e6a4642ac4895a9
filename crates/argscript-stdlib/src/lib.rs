//! # The ArgScript standard library
//!
//! The directives every ArgScript dialect shares: variables and scopes,
//! conditional compilation, macro definitions, file inclusion, and version
//! checks, plus the built-in expression functions (`eq`, `hash`,
//! `varExists`, ...). Registering them is a single call:
//!
//! ```
//! let mut stream = argscript::Stream::new(());
//! argscript_stdlib::register_all(&mut stream);
//! ```
//!
//! Individual modules expose their own registration functions for dialects
//! that only want a subset.

use argscript::{Arguments, Line, Stream};

pub mod conditional;
pub mod control;
pub mod def;
pub mod functions;
pub mod io;
pub mod variables;
pub mod version;

/// Registers every standard directive and expression function.
pub fn register_all<T: 'static>(stream: &mut Stream<T>) {
    conditional::add_commands(stream);
    control::add_commands(stream);
    def::add_commands(stream);
    io::add_commands(stream);
    variables::add_commands(stream);
    version::add_commands(stream);
    functions::add_functions(stream);
}

/// Fetches exactly `count` arguments, reporting the error on the stream.
/// Mirrors the shape `if (line.getArguments(args, n))` that every directive
/// body starts with.
pub(crate) fn arguments<'a, T>(
    stream: &mut Stream<T>,
    line: &'a Line,
    count: usize,
) -> Option<Arguments<'a>> {
    match line.get_arguments(count) {
        Ok(args) => Some(args),
        Err(error) => {
            stream.add_error(error);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use argscript::Stream;
    use argscript_testing::{recording_stream, run_success};

    fn stream() -> Stream<Vec<String>> {
        let mut stream = recording_stream();
        crate::register_all(&mut stream);
        stream
    }

    #[test]
    fn directives_compose() {
        let mut stream = stream();
        run_success(
            &mut stream,
            "set greeting hello\n\
             define shout(word)\n\
             log &word!\n\
             enddef\n\
             if varExists(greeting)\n\
             create shout($greeting)\n\
             endif\n",
        );
        assert_eq!(stream.data(), &["hello!"]);
    }

    #[test]
    fn variables_persist_across_runs() {
        let mut stream = stream();
        run_success(&mut stream, "set x 12\n");
        run_success(&mut stream, "log $x\n");
        assert_eq!(stream.data(), &["12"]);
    }
}
