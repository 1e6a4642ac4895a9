//! # Testing utilities for ArgScript-based crates
//!
//! Tests for command handlers usually want three things: a stream whose
//! target records what ran, assertions over the diagnostics a script
//! produced, and a filesystem that does not touch the disk. This crate
//! provides all three.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use argscript::stream::FileSystem;
use argscript::{Handler, Line, Stream};

/// Builds a stream whose target is a log of executed commands.
///
/// The stream has a single `log` command registered that appends the rest
/// of its line (splits joined with single spaces) to the target. Scripts
/// under test use `log` to record which lines actually executed and with
/// what values.
pub fn recording_stream() -> Stream<Vec<String>> {
    let mut stream = Stream::new(Vec::new());
    add_recorder(&mut stream);
    stream
}

/// Registers the `log` command on an existing stream.
pub fn add_recorder(stream: &mut Stream<Vec<String>>) {
    stream.add_parser(
        "log",
        Handler::command(|stream: &mut Stream<Vec<String>>, line: &Line| {
            let entry = line.splits()[1..].join(" ");
            stream.data_mut().push(entry);
        }),
    );
}

/// Processes `text` and panics if any error was reported.
pub fn run_success<T>(stream: &mut Stream<T>, text: &str) {
    stream.process(text);
    assert!(
        stream.errors().is_empty(),
        "script failed: {:?}",
        stream.errors()
    );
}

/// Processes `text` and asserts the reported error messages, in order.
pub fn run_expecting_errors<T>(stream: &mut Stream<T>, text: &str, expected: &[&str]) {
    stream.process(text);
    let messages: Vec<&str> = stream
        .errors()
        .iter()
        .map(|error| error.message.as_str())
        .collect();
    assert_eq!(messages, expected);
}

/// Processes `text` and asserts the reported warning messages, in order.
/// Errors still fail the test.
pub fn run_expecting_warnings<T>(stream: &mut Stream<T>, text: &str, expected: &[&str]) {
    run_success(stream, text);
    let messages: Vec<&str> = stream
        .warnings()
        .iter()
        .map(|warning| warning.message.as_str())
        .collect();
    assert_eq!(messages, expected);
}

/// An in-memory filesystem for `include` tests.
#[derive(Default)]
pub struct MemoryFileSystem {
    files: HashMap<PathBuf, String>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.files.insert(path.into(), text.into());
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        match self.files.get(path) {
            Some(text) => Ok(text.clone()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_logs_line_remainders() {
        let mut stream = recording_stream();
        run_success(&mut stream, "log first\nlog two words\n");
        assert_eq!(stream.data(), &["first", "two words"]);
    }

    #[test]
    fn memory_file_system() {
        let mut fs = MemoryFileSystem::new();
        fs.add("a.txt", "contents");
        assert!(fs.exists(Path::new("a.txt")));
        assert!(!fs.exists(Path::new("b.txt")));
        assert_eq!(fs.read_to_string(Path::new("a.txt")).unwrap(), "contents");
        assert!(fs.read_to_string(Path::new("b.txt")).is_err());
    }
}
