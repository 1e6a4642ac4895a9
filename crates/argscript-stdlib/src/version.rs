//! The `version` directive.
//!
//! Scripts declare the dialect version they were written for; the host sets
//! the supported window with [`Stream::set_version_range`]. Out-of-window
//! declarations are errors, but the declared version is stored regardless so
//! later commands can still branch on it.

use argscript::{Handler, Line, Stream};

use crate::arguments;

pub fn add_commands<T: 'static>(stream: &mut Stream<T>) {
    stream.add_parser(
        "version",
        Handler::command(|stream: &mut Stream<T>, line: &Line| {
            let args = match arguments(stream, line, 1) {
                Some(args) => args,
                None => return,
            };
            if let Some(version) = stream.parse_int(&args, 0) {
                if version < stream.min_version() {
                    stream.add_error(line.create_error(format!(
                        "Script version no longer supported: have {version}, need at least {}.",
                        stream.min_version()
                    )));
                }
                if version > stream.max_version() {
                    stream.add_error(line.create_error(format!(
                        "Script version more recent than code: have {version}, can only handle up to {}.",
                        stream.max_version()
                    )));
                }
                stream.set_version(version);
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
        stream.set_version_range(1, 3);
        stream
    }

    #[test]
    fn version_inside_the_window() {
        let mut stream = stream();
        run_success(&mut stream, "version 2\n");
        assert_eq!(stream.version(), 2);
    }

    #[test]
    fn version_too_old() {
        let mut stream = stream();
        run_expecting_errors(
            &mut stream,
            "version 0\n",
            &["Script version no longer supported: have 0, need at least 1."],
        );
        assert_eq!(stream.version(), 0);
    }

    #[test]
    fn version_too_recent() {
        let mut stream = stream();
        run_expecting_errors(
            &mut stream,
            "version 4\n",
            &["Script version more recent than code: have 4, can only handle up to 3."],
        );
        assert_eq!(stream.version(), 4);
    }
}
