//! Tokenized command lines
//!
//! After comment removal and variable substitution, a line is tokenized into
//! a keyword, its arguments, and dashed options with their own arguments:
//!
//! ```text
//! doStuff 1 2 -opt 5
//! ^keyword^args^^^option
//! ```
//!
//! A `-` introduces an option only when followed by a letter, so negative
//! numbers stay arguments. Command handlers pull arguments out with
//! [`Line::get_arguments`] and friends, which validate counts and build
//! errors spanning the offending part of the line. Options are marked used
//! as handlers consume them; leftovers become "Unused option." warnings.

use std::cell::Cell;

use crate::error::Diagnostic;
use crate::trace::PositionMap;
use crate::words::WordSplitter;

#[derive(Debug, Default)]
struct LineOption {
    /// Index of the option's own split; its arguments follow it.
    split_index: usize,
    num_arguments: usize,
    used: Cell<bool>,
    name: String,
}

/// A single tokenized line.
///
/// All stored offsets are into the transformed text the line was parsed
/// from; the position accessors resolve them back to the original source
/// through the line's [`PositionMap`].
#[derive(Debug, Default)]
pub struct Line {
    text: String,
    splits: Vec<String>,
    /// Transformed (start, end) offsets of each split.
    split_spans: Vec<(usize, usize)>,
    options: Vec<LineOption>,
    /// Number of splits after the keyword and before the first option.
    num_arguments: usize,
    has_keyword: bool,
    map: PositionMap,
}

impl Line {
    /// Tokenizes `text`, with `map` resolving its offsets back to the
    /// original source text.
    ///
    /// The error of a malformed line already carries resolved positions.
    pub fn parse(text: &str, map: PositionMap) -> Result<Line, Diagnostic> {
        let chars: Vec<char> = text.chars().collect();
        let mut splitter = WordSplitter::new(&chars, 0);

        let mut line = Line {
            text: text.to_string(),
            has_keyword: true,
            map,
            ..Default::default()
        };
        // The option whose arguments are currently being collected.
        let mut pending: Option<LineOption> = None;

        while splitter.pos < chars.len() {
            splitter.skip_whitespace();
            if splitter.pos == chars.len() {
                break;
            }
            let start = splitter.pos;

            if chars[start] == '-' {
                let next = chars.get(start + 1).copied();
                if next.map_or(true, char::is_whitespace) {
                    return Err(Diagnostic::syntax(
                        "Expected a number or a name after - sign.",
                        start,
                        start + 1,
                    )
                    .resolved(&line.map));
                }
                if next.is_some_and(char::is_alphabetic) {
                    match pending.take() {
                        None => {
                            // First option; everything before it was the
                            // keyword and its arguments.
                            line.has_keyword = !line.splits.is_empty();
                            line.num_arguments = line.splits.len().saturating_sub(1);
                        }
                        Some(mut option) => {
                            option.num_arguments = line.splits.len() - option.split_index - 1;
                            line.options.push(option);
                        }
                    }

                    splitter.pos += 1;
                    let mut name = String::new();
                    while splitter.pos < chars.len() {
                        let c = chars[splitter.pos];
                        if c == '_' || c.is_alphanumeric() {
                            name.push(c);
                            splitter.pos += 1;
                        } else {
                            break;
                        }
                    }

                    pending = Some(LineOption {
                        split_index: line.splits.len(),
                        name: name.clone(),
                        ..Default::default()
                    });
                    line.splits.push(format!("-{name}"));
                    line.split_spans.push((start, splitter.pos));
                    continue;
                }
                // A '-' followed by anything else (a digit, another '-') is
                // an ordinary word, so negative numbers stay arguments.
            }

            match splitter.next_word().map_err(|e| e.resolved(&line.map))? {
                Some(word) => line.splits.push(word),
                None => break,
            }
            line.split_spans.push((start, splitter.pos));
        }

        match pending {
            Some(mut option) => {
                option.num_arguments = line.splits.len() - option.split_index - 1;
                line.options.push(option);
            }
            None => line.num_arguments = line.splits.len().saturating_sub(1),
        }
        Ok(line)
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    /// The first split of the line, unless the line starts directly with an
    /// option.
    pub fn keyword(&self) -> Option<&str> {
        if self.has_keyword {
            self.splits.first().map(String::as_str)
        } else {
            None
        }
    }

    pub fn has_keyword(&self) -> bool {
        self.has_keyword
    }

    /// The number of arguments between the keyword and the first option.
    pub fn argument_count(&self) -> usize {
        self.num_arguments
    }

    pub fn splits(&self) -> &[String] {
        &self.splits
    }

    /// The resolved source span of split `index`.
    pub fn split_span(&self, index: usize) -> (usize, usize) {
        let (start, end) = self.split_spans[index];
        (self.map.resolve(start), self.map.resolve(end))
    }

    pub(crate) fn position_map(&self) -> &PositionMap {
        &self.map
    }

    /// Requires exactly `count` arguments after the keyword.
    pub fn get_arguments(&self, count: usize) -> Result<Arguments<'_>, Diagnostic> {
        self.get_arguments_range(count, count)
    }

    /// Requires between `min` and `max` arguments after the keyword.
    pub fn get_arguments_range(&self, min: usize, max: usize) -> Result<Arguments<'_>, Diagnostic> {
        let keyword = self.splits.first().map(String::as_str).unwrap_or_default();
        if self.num_arguments < min {
            return Err(self.create_error_until_options(format!(
                "Expecting at least {min} arguments for command {keyword}"
            )));
        }
        if self.num_arguments > max {
            return Err(self.create_error_until_options(format!(
                "Expecting at most {max} arguments for command {keyword}"
            )));
        }
        Ok(Arguments {
            line: self,
            start: 1,
            count: self.num_arguments,
        })
    }

    /// All splits of the line, keyword included, as an argument list.
    pub fn splits_as_arguments(&self) -> Arguments<'_> {
        Arguments {
            line: self,
            start: 0,
            count: self.splits.len(),
        }
    }

    pub fn has_option(&self, name: &str) -> bool {
        self.options.iter().any(|option| option.name == name)
    }

    /// Consumes an argument-less option, returning whether it was present.
    pub fn has_flag(&self, name: &str) -> Result<bool, Diagnostic> {
        for option in &self.options {
            if !option.used.get() && option.name == name {
                if option.num_arguments != 0 {
                    let (start, end) = self.split_span(option.split_index);
                    return Err(Diagnostic::semantic(
                        format!("Not expecting any arguments for flag option {name}"),
                        start,
                        end,
                    ));
                }
                option.used.set(true);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Consumes an option, requiring exactly `count` arguments for it.
    ///
    /// Returns `Ok(None)` when the option is not present at all.
    pub fn get_option_arguments(
        &self,
        name: &str,
        count: usize,
    ) -> Result<Option<Arguments<'_>>, Diagnostic> {
        self.get_option_arguments_range(name, count, count)
    }

    /// Consumes an option, requiring between `min` and `max` arguments.
    pub fn get_option_arguments_range(
        &self,
        name: &str,
        min: usize,
        max: usize,
    ) -> Result<Option<Arguments<'_>>, Diagnostic> {
        for option in &self.options {
            if !option.used.get() && option.name == name {
                option.used.set(true);

                let (start, end) = self.split_span(option.split_index);
                if option.num_arguments < min {
                    return Err(Diagnostic::semantic(
                        format!("Expecting at least {min} arguments for option {name}"),
                        start,
                        end,
                    ));
                }
                if option.num_arguments > max {
                    return Err(Diagnostic::semantic(
                        format!("Expecting at most {max} arguments for option {name}"),
                        start,
                        end,
                    ));
                }
                return Ok(Some(Arguments {
                    line: self,
                    start: option.split_index + 1,
                    count: option.num_arguments,
                }));
            }
        }
        Ok(None)
    }

    /// Warnings for options no handler consumed.
    pub fn unused_option_warnings(&self) -> Vec<Diagnostic> {
        self.options
            .iter()
            .filter(|option| !option.used.get())
            .map(|option| {
                let (start, end) = self.split_span(option.split_index);
                Diagnostic::semantic("Unused option.", start, end)
            })
            .collect()
    }

    /// The resolved spans of all option names, for syntax highlighting.
    pub fn option_spans(&self) -> Vec<(usize, usize)> {
        self.options
            .iter()
            .map(|option| self.split_span(option.split_index))
            .collect()
    }

    /// An error spanning the whole line content.
    pub fn create_error<S: Into<String>>(&self, message: S) -> Diagnostic {
        if self.split_spans.is_empty() {
            Diagnostic::semantic(message, 0, self.text.chars().count())
        } else {
            let start = self.split_span(0).0;
            let end = self.split_span(self.split_spans.len() - 1).1;
            Diagnostic::semantic(message, start, end)
        }
    }

    /// An error spanning the keyword only.
    pub fn create_error_for_keyword<S: Into<String>>(&self, message: S) -> Diagnostic {
        let (start, end) = self.split_span(0);
        Diagnostic::semantic(message, start, end)
    }

    /// An error spanning argument `index` (0 is the first argument after the
    /// keyword).
    pub fn create_error_for_argument<S: Into<String>>(
        &self,
        message: S,
        index: usize,
    ) -> Diagnostic {
        let (start, end) = self.split_span(index + 1);
        Diagnostic::semantic(message, start, end)
    }

    /// An error spanning the keyword and its arguments, but not the options.
    pub fn create_error_until_options<S: Into<String>>(&self, message: S) -> Diagnostic {
        if self.options.is_empty() {
            self.create_error(message)
        } else {
            let start = self.split_span(0).0;
            // One position back for the whitespace before the option.
            let end = self.split_span(self.num_arguments + 1).0.saturating_sub(1);
            Diagnostic::semantic(message, start, end)
        }
    }

    /// An error spanning an option and its arguments.
    pub fn create_error_for_option<S: Into<String>>(
        &self,
        name: &str,
        message: S,
    ) -> Option<Diagnostic> {
        let option = self.options.iter().find(|option| option.name == name)?;
        let start = self.split_span(option.split_index).0;
        let end = self.split_span(option.split_index + option.num_arguments).1;
        Some(Diagnostic::semantic(message, start, end))
    }
}

/// A view over a contiguous run of a line's splits.
#[derive(Clone, Copy, Debug)]
pub struct Arguments<'a> {
    line: &'a Line,
    start: usize,
    count: usize,
}

impl<'a> Arguments<'a> {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, index: usize) -> &'a str {
        &self.line.splits[self.start + index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.line.splits[self.start..self.start + self.count]
            .iter()
            .map(String::as_str)
    }

    /// The resolved source span of argument `index`.
    pub fn span(&self, index: usize) -> (usize, usize) {
        self.line.split_span(self.start + index)
    }

    /// An error spanning argument `index`.
    pub fn error<S: Into<String>>(&self, message: S, index: usize) -> Diagnostic {
        let (start, end) = self.span(index);
        Diagnostic::semantic(message, start, end)
    }

    /// Rebases a diagnostic whose span is local to argument `index` onto the
    /// original source text.
    pub fn rebase(&self, index: usize, diagnostic: Diagnostic) -> Diagnostic {
        let (text_start, _) = self.line.split_spans[self.start + index];
        diagnostic
            .offset(text_start)
            .resolved(self.line.position_map())
    }
}

impl std::ops::Index<usize> for Arguments<'_> {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        self.get(index)
    }
}
