//! The `end` and `eval` directives.

use argscript::{Handler, Line, Stream};

use crate::arguments;

pub fn add_commands<T: 'static>(stream: &mut Stream<T>) {
    stream.add_parser(
        "end",
        Handler::command(|stream: &mut Stream<T>, line: &Line| {
            if let Err(error) = line.get_arguments(0) {
                stream.add_error(error);
            }
            if !stream.inside_block() {
                stream.add_error(line.create_error("Not inside a block."));
            } else {
                stream.end_block();
            }
        }),
    );

    // Processes its single argument as a line of its own. Quoting keeps the
    // argument together: eval "command arg1 arg2".
    stream.add_parser(
        "eval",
        Handler::command(|stream: &mut Stream<T>, line: &Line| {
            if let Some(args) = arguments(stream, line, 1) {
                stream.process_line(args.get(0));
            }
        }),
    );
}

#[cfg(test)]
mod tests {
    use argscript::Stream;
    use argscript_testing::{recording_stream, run_expecting_errors, run_success};

    fn stream() -> Stream<Vec<String>> {
        let mut stream = recording_stream();
        crate::register_all(&mut stream);
        stream
    }

    #[test]
    fn end_outside_a_block() {
        let mut stream = stream();
        run_expecting_errors(&mut stream, "end\n", &["Not inside a block."]);
    }

    #[test]
    fn eval_processes_its_argument() {
        let mut stream = stream();
        run_success(&mut stream, "eval \"log hi there\"\n");
        assert_eq!(stream.data(), &["hi there"]);
    }

    #[test]
    fn eval_runs_after_substitution() {
        let mut stream = stream();
        run_success(&mut stream, "set target world\neval \"log hello $target\"\n");
        assert_eq!(stream.data(), &["hello world"]);
    }
}
