//! Macro definitions: `define` / `enddef`, `undefine`, and the
//! instantiation directives `create`, `screate` and `arrayCreate`.
//!
//! A `define` body is captured verbatim by a special block and only parsed
//! when the macro is instantiated, with `&param` references substituted by
//! the call arguments. `create` errors on an unknown definition; `screate`
//! only warns, for scripts that instantiate optional content. `arrayCreate`
//! instantiates a definition N times, passing the index and the count as the
//! two arguments.

use argscript::definition::Definition;
use argscript::lexer::{FunctionMap, Lexer};
use argscript::words::WordSplitter;
use argscript::{Diagnostic, Handler, Line, SpecialAction, SpecialBlock, Stream};

use crate::arguments;

pub fn add_commands<T: 'static>(stream: &mut Stream<T>) {
    stream.add_parser("define", Handler::command(parse_define));
    stream.add_parser("create", Handler::command(instantiate_command(false)));
    stream.add_parser("screate", Handler::command(instantiate_command(true)));
    stream.add_parser("arraycreate", Handler::command(array_create));

    stream.add_parser(
        "undefine",
        Handler::command(|stream: &mut Stream<T>, line: &Line| {
            if let Some(args) = arguments(stream, line, 1) {
                if !stream.remove_definition(args.get(0)) {
                    stream.add_error(line.create_error_for_argument(
                        format!("Definition '{}' does not exist.", args.get(0)),
                        0,
                    ));
                }
            }
        }),
    );
}

/// Captures the body of a `define` until the matching `enddef`.
struct DefineBlock {
    /// `None` when the header failed to parse; the body is still swallowed
    /// so its lines do not execute.
    definition: Option<Definition>,
    /// Nesting depth of inner `define` blocks.
    depth: usize,
}

impl<T> SpecialBlock<T> for DefineBlock {
    fn process_line(&mut self, _stream: &mut Stream<T>, text: &str, first_word: &str) -> SpecialAction {
        if first_word == "enddef" {
            if self.depth == 0 {
                return SpecialAction::End;
            }
            self.depth -= 1;
        } else if first_word == "define" {
            self.depth += 1;
        }
        if let Some(definition) = &mut self.definition {
            definition.add_line(text);
        }
        SpecialAction::Consumed
    }

    fn on_block_end(&mut self, stream: &mut Stream<T>) {
        if let Some(definition) = self.definition.take() {
            stream.add_definition(definition);
        }
    }
}

fn parse_define<T>(stream: &mut Stream<T>, line: &Line) {
    let mut block = DefineBlock {
        definition: None,
        depth: 0,
    };
    if let Some(args) = arguments(stream, line, 1) {
        match parse_define_header(stream, args.get(0)) {
            Ok(definition) => block.definition = Some(definition),
            Err(error) => stream.add_error(args.rebase(0, error)),
        }
    }
    stream.start_special_block(block);
}

/// Parses `name(param1, param2, ...)`. Error positions are relative to the
/// header text.
fn parse_define_header<T>(stream: &Stream<T>, text: &str) -> Result<Definition, Diagnostic> {
    let chars: Vec<char> = text.chars().collect();
    let functions = FunctionMap::new();
    let mut lexer = Lexer::new(&chars, &functions, &());

    let name = lexer.parse_keyword();
    if stream.has_definition(&name) {
        return Err(Diagnostic::semantic(
            format!("'{name}' already defined."),
            0,
            lexer.pos(),
        ));
    }
    // Body lines start on the line after the `define`.
    let mut definition = Definition::new(&name, stream.current_line_number() + 1);

    lexer.expect('(')?;
    loop {
        lexer.skip_whitespace();
        if !lexer.available() {
            return Err(Diagnostic::syntax(
                "Expected parameter names or ')'.",
                lexer.pos().saturating_sub(1),
                lexer.pos(),
            ));
        }
        if chars[lexer.pos()] == ')' {
            lexer.set_pos(lexer.pos() + 1);
            break;
        }
        let parameter = lexer.parse_keyword();
        if parameter.is_empty() {
            return Err(Diagnostic::syntax(
                "Empty parameter name.",
                lexer.pos().saturating_sub(1),
                lexer.pos() + 1,
            ));
        }
        definition.add_parameter(parameter);
        lexer.skip_whitespace();
        if !lexer.available() {
            return Err(Diagnostic::syntax(
                "Expected parameter names or ')'.",
                lexer.pos().saturating_sub(1),
                lexer.pos(),
            ));
        }
        let next = chars[lexer.pos()];
        lexer.set_pos(lexer.pos() + 1);
        if next == ')' {
            break;
        }
        if next != ',' {
            return Err(Diagnostic::syntax(
                "Expected ',' after parameter name.",
                lexer.pos().saturating_sub(1),
                lexer.pos(),
            ));
        }
    }
    Ok(definition)
}

fn instantiate_command<T>(soft: bool) -> impl Fn(&mut Stream<T>, &Line) {
    move |stream, line| {
        let args = match arguments(stream, line, 1) {
            Some(args) => args,
            None => return,
        };
        let chars: Vec<char> = args.get(0).chars().collect();
        let (name, call_arguments) = match parse_invocation(&chars) {
            Ok(invocation) => invocation,
            Err(error) => {
                stream.add_error(args.rebase(0, error));
                return;
            }
        };
        let definition = match stream.get_definition(&name) {
            Some(definition) => definition,
            None => {
                let diagnostic = line.create_error(format!("Unknown definition '{name}'."));
                if soft {
                    stream.add_warning(diagnostic);
                } else {
                    stream.add_error(diagnostic);
                }
                return;
            }
        };
        if let Err(error) = definition.create_instance(stream, &call_arguments) {
            stream.add_error(line.create_error(error.message));
        }
    }
}

/// Parses `name(arg1 arg2, arg3)`. Arguments are words; a separating comma
/// is accepted but not required.
fn parse_invocation(chars: &[char]) -> Result<(String, Vec<String>), Diagnostic> {
    let functions = FunctionMap::new();
    let mut lexer = Lexer::new(chars, &functions, &());
    let name = lexer.parse_keyword();
    lexer.expect('(')?;

    let mut call_arguments = Vec::new();
    loop {
        lexer.skip_whitespace();
        if !lexer.available() {
            return Err(Diagnostic::syntax(
                "Missing closing ')' after definition arguments.",
                lexer.pos().saturating_sub(1),
                lexer.pos(),
            ));
        }
        if chars[lexer.pos()] == ')' {
            lexer.set_pos(lexer.pos() + 1);
            break;
        }
        let mut splitter = WordSplitter::new(chars, lexer.pos());
        let word = splitter.next_parameter()?;
        lexer.set_pos(splitter.pos);
        match word {
            Some(word) if !word.is_empty() => {
                call_arguments.push(word);
                lexer.skip_whitespace();
                if lexer.available() && chars[lexer.pos()] == ',' {
                    lexer.set_pos(lexer.pos() + 1);
                }
            }
            _ => {
                return Err(Diagnostic::syntax(
                    "Missing closing ')' after definition arguments.",
                    lexer.pos().saturating_sub(1),
                    lexer.pos(),
                ));
            }
        }
    }
    Ok((name, call_arguments))
}

fn array_create<T>(stream: &mut Stream<T>, line: &Line) {
    let args = match arguments(stream, line, 2) {
        Some(args) => args,
        None => return,
    };
    let quantity = match stream.parse_int(&args, 1) {
        Some(quantity) => quantity,
        None => return,
    };
    let definition = match stream.get_definition(args.get(0)) {
        Some(definition) => definition,
        None => {
            stream.add_warning(
                line.create_error(format!("Unknown definition '{}'.", args.get(0))),
            );
            return;
        }
    };
    for index in 0..quantity {
        let call_arguments = [index.to_string(), quantity.to_string()];
        if let Err(error) = definition.create_instance(stream, &call_arguments) {
            stream.add_error(line.create_error(error.message));
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use argscript::Stream;
    use argscript_testing::{
        recording_stream, run_expecting_errors, run_expecting_warnings, run_success,
    };

    fn stream() -> Stream<Vec<String>> {
        let mut stream = recording_stream();
        crate::register_all(&mut stream);
        stream
    }

    #[test]
    fn define_and_create() {
        let mut stream = stream();
        run_success(
            &mut stream,
            "define pair(a, b)\n\
             log &a and &b\n\
             enddef\n\
             create pair(5 blue)\n",
        );
        assert_eq!(stream.data(), &["5 and blue"]);
    }

    #[test]
    fn the_body_is_not_executed_at_definition_time() {
        let mut stream = stream();
        run_success(&mut stream, "define quiet(x)\nlog &x\nenddef\n");
        assert!(stream.data().is_empty());
    }

    #[test]
    fn create_accepts_comma_separated_arguments() {
        let mut stream = stream();
        run_success(
            &mut stream,
            "define pair(a, b)\nlog &a and &b\nenddef\ncreate pair(1, 2)\n",
        );
        assert_eq!(stream.data(), &["1 and 2"]);
    }

    #[test]
    fn zero_parameter_definitions() {
        let mut stream = stream();
        run_success(&mut stream, "define hello()\nlog hi\nenddef\ncreate hello()\n");
        assert_eq!(stream.data(), &["hi"]);
    }

    #[test]
    fn unknown_definition_is_an_error_for_create() {
        let mut stream = stream();
        run_expecting_errors(&mut stream, "create nope()\n", &["Unknown definition 'nope'."]);
    }

    #[test]
    fn unknown_definition_is_a_warning_for_screate() {
        let mut stream = stream();
        run_expecting_warnings(&mut stream, "screate nope()\n", &["Unknown definition 'nope'."]);
    }

    #[test]
    fn wrong_argument_count() {
        let mut stream = stream();
        run_expecting_errors(
            &mut stream,
            "define pair(a, b)\nlog &a &b\nenddef\ncreate pair(1)\n",
            &["Definition 'pair' requires 2 arguments, 1 have been given."],
        );
    }

    #[test]
    fn duplicate_definition() {
        let mut stream = stream();
        run_expecting_errors(
            &mut stream,
            "define d(a)\nenddef\ndefine d(a)\nenddef\n",
            &["'d' already defined."],
        );
    }

    #[test]
    fn undefine_allows_redefinition() {
        let mut stream = stream();
        run_success(
            &mut stream,
            "define d(a)\nlog old &a\nenddef\n\
             undefine d\n\
             define d(a)\nlog new &a\nenddef\n\
             create d(1)\n",
        );
        assert_eq!(stream.data(), &["new 1"]);
    }

    #[test]
    fn undefine_unknown_definition() {
        let mut stream = stream();
        run_expecting_errors(&mut stream, "undefine nope\n", &["Definition 'nope' does not exist."]);
    }

    #[test]
    fn nested_defines_are_captured_whole() {
        let mut stream = stream();
        run_success(
            &mut stream,
            "define outer(x)\n\
             define inner()\n\
             log inner ran\n\
             enddef\n\
             log outer &x\n\
             enddef\n\
             create outer(1)\n\
             create inner()\n",
        );
        // Instantiating `outer` defines `inner` and logs.
        assert_eq!(stream.data(), &["outer 1", "inner ran"]);
    }

    #[test]
    fn array_create_passes_index_and_count() {
        let mut stream = stream();
        run_success(
            &mut stream,
            "define item(i, n)\nlog &i of &n\nenddef\narrayCreate item 3\n",
        );
        assert_eq!(stream.data(), &["0 of 3", "1 of 3", "2 of 3"]);
    }

    #[test]
    fn missing_close_parenthesis() {
        let mut stream = stream();
        run_expecting_errors(
            &mut stream,
            "define d(a)\nenddef\ncreate \"d(1\"\n",
            &["Missing closing ')' after definition arguments."],
        );
    }
}
