//! Variable directives: `set` and its typed variants, `sete`, `namespace`
//! and `purge`.
//!
//! Variables hold plain text. The typed setters (`setb`, `seti`, `setf`,
//! `setc`, `setv2`..`setv4`) evaluate their argument first and store the
//! canonical text form, so `seti count (2 + 3)` stores `5`.

use argscript::diagnostics::SYNTAX_ENUM;
use argscript::trace::PositionMap;
use argscript::{Block, Handler, Line, Stream};

use crate::arguments;

pub fn add_commands<T: 'static>(stream: &mut Stream<T>) {
    stream.add_parser(
        "set",
        Handler::command(|stream: &mut Stream<T>, line: &Line| {
            if let Some(args) = arguments(stream, line, 2) {
                stream.set_variable(args.get(0), args.get(1));
            }
        }),
    );

    stream.add_parser(
        "setb",
        Handler::command(|stream: &mut Stream<T>, line: &Line| {
            if let Some(args) = arguments(stream, line, 2) {
                if let Some(value) = stream.parse_bool(&args, 1) {
                    stream.set_variable(args.get(0), if value { "true" } else { "false" });
                }
            }
        }),
    );

    stream.add_parser(
        "seti",
        Handler::command(|stream: &mut Stream<T>, line: &Line| {
            if let Some(args) = arguments(stream, line, 2) {
                if let Some(value) = stream.parse_int(&args, 1) {
                    stream.set_variable(args.get(0), &value.to_string());
                }
            }
        }),
    );

    stream.add_parser(
        "setf",
        Handler::command(|stream: &mut Stream<T>, line: &Line| {
            if let Some(args) = arguments(stream, line, 2) {
                if let Some(value) = stream.parse_float(&args, 1) {
                    stream.set_variable(args.get(0), &value.to_string());
                }
            }
        }),
    );

    stream.add_parser(
        "setc",
        Handler::command(|stream: &mut Stream<T>, line: &Line| {
            if let Some(args) = arguments(stream, line, 2) {
                if let Some(color) = stream.parse_color_rgba(&args, 1) {
                    stream.set_variable(args.get(0), &color.to_string());
                }
            }
        }),
    );

    stream.add_parser("setv2", Handler::command(set_vector2));
    stream.add_parser("setv3", Handler::command(set_vector3));
    stream.add_parser("setv4", Handler::command(set_vector4));

    // sete name value "list of accepted values"
    stream.add_parser(
        "sete",
        Handler::command(|stream: &mut Stream<T>, line: &Line| {
            let args = match arguments(stream, line, 3) {
                Some(args) => args,
                None => return,
            };
            let value = args.get(1);
            match Line::parse(args.get(2), PositionMap::new()) {
                Ok(values) if values.splits().iter().any(|split| split.as_str() == value) => {
                    let (start, end) = args.span(1);
                    stream.set_variable(args.get(0), value);
                    stream.add_syntax(start, end - start, SYNTAX_ENUM);
                }
                Ok(_) => {
                    stream.add_error(line.create_error_for_argument("Unknown enum value.", 1))
                }
                Err(error) => stream.add_error(args.rebase(2, error)),
            }
        }),
    );

    stream.add_parser("namespace", Handler::block(Namespace));

    stream.add_parser(
        "purge",
        Handler::command(|stream: &mut Stream<T>, line: &Line| {
            if let Some(args) = arguments(stream, line, 1) {
                stream.purge_scope(args.get(0));
            }
        }),
    );
}

fn set_vector2<T>(stream: &mut Stream<T>, line: &Line) {
    if let Some(args) = arguments(stream, line, 2) {
        if let Some([x, y]) = stream.parse_vector2(&args, 1) {
            stream.set_variable(args.get(0), &format!("({x}, {y})"));
        }
    }
}

fn set_vector3<T>(stream: &mut Stream<T>, line: &Line) {
    if let Some(args) = arguments(stream, line, 2) {
        if let Some([x, y, z]) = stream.parse_vector3(&args, 1) {
            stream.set_variable(args.get(0), &format!("({x}, {y}, {z})"));
        }
    }
}

fn set_vector4<T>(stream: &mut Stream<T>, line: &Line) {
    if let Some(args) = arguments(stream, line, 2) {
        if let Some([x, y, z, w]) = stream.parse_vector4(&args, 1) {
            stream.set_variable(args.get(0), &format!("({x}, {y}, {z}, {w})"));
        }
    }
}

/// `namespace name` opens a scope closed by `end`. The scope is pushed even
/// when the name is missing so the matching `end` stays balanced.
struct Namespace;

impl<T> Block<T> for Namespace {
    fn parse(&mut self, stream: &mut Stream<T>, line: &Line) {
        match arguments(stream, line, 1) {
            Some(args) => stream.start_scope(args.get(0)),
            None => stream.start_scope(""),
        }
    }

    fn on_block_end(&mut self, stream: &mut Stream<T>) {
        stream.end_scope();
    }
}
