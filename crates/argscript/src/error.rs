//! Diagnostics for ArgScript documents
//!
//! The engine never aborts on bad input: every problem becomes a
//! [`Diagnostic`] collected by the stream. Whether a diagnostic is fatal is
//! decided by which list it ends up in (errors make the document
//! non-compilable, warnings do not), so the type itself only carries the
//! message, the source span, and a coarse category.

use colored::Colorize;

/// The broad class of problem a diagnostic describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Category {
    /// A malformed token: an unterminated quote, a bad number literal.
    Lexical,
    /// A line that does not have the required shape: a dangling `-`,
    /// a missing expression after an operator.
    Syntax,
    /// Well-formed input with an invalid meaning: an unknown variable,
    /// a wrong argument count, a value out of range.
    Semantic,
    /// A block nesting problem: `end` outside a block, an unterminated
    /// block comment.
    Structural,
}

/// A single error or warning, anchored at a character range of one line.
///
/// Positions are char offsets into the original line text, before comment
/// removal and variable substitution; the stream resolves transformed
/// offsets back through its [`crate::trace::PositionMap`] before building
/// diagnostics, so the spans always point at what the user actually typed.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostic {
    pub message: String,
    pub category: Category,
    /// Start of the span, in chars from the start of the line.
    pub start: usize,
    /// End of the span (exclusive).
    pub end: usize,
    /// Line number, stamped by the stream when the diagnostic is added.
    pub line: Option<usize>,
}

impl Diagnostic {
    pub fn new<S: Into<String>>(category: Category, message: S, start: usize, end: usize) -> Self {
        Self {
            message: message.into(),
            category,
            start,
            end,
            line: None,
        }
    }

    pub fn lexical<S: Into<String>>(message: S, start: usize, end: usize) -> Self {
        Self::new(Category::Lexical, message, start, end)
    }

    pub fn syntax<S: Into<String>>(message: S, start: usize, end: usize) -> Self {
        Self::new(Category::Syntax, message, start, end)
    }

    pub fn semantic<S: Into<String>>(message: S, start: usize, end: usize) -> Self {
        Self::new(Category::Semantic, message, start, end)
    }

    pub fn structural<S: Into<String>>(message: S, start: usize, end: usize) -> Self {
        Self::new(Category::Structural, message, start, end)
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Shifts the span by `delta` chars.
    ///
    /// Expression errors are produced with offsets local to the argument
    /// text; callers shift them by the argument's position within the line
    /// before resolving against the position map.
    pub fn offset(mut self, delta: usize) -> Self {
        self.start += delta;
        self.end += delta;
        self
    }

    /// Maps the span through a transformed-to-original position map.
    pub fn resolved(mut self, map: &crate::trace::PositionMap) -> Self {
        self.start = map.resolve(self.start);
        self.end = map.resolve(self.end);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(
                f,
                "line {}, cols {}-{}: {}",
                line + 1,
                self.start,
                self.end,
                self.message
            ),
            None => write!(f, "cols {}-{}: {}", self.start, self.end, self.message),
        }
    }
}

/// Writes a colored report of the errors and warnings of a processed
/// document to the formatter, one diagnostic per line.
pub fn write_report(
    f: &mut dyn std::fmt::Write,
    errors: &[Diagnostic],
    warnings: &[Diagnostic],
) -> std::fmt::Result {
    for error in errors {
        writeln!(f, "{}: {}", "Error".bright_red().bold(), error)?;
    }
    for warning in warnings {
        writeln!(f, "{}: {}", "Warning".bright_yellow().bold(), warning)?;
    }
    Ok(())
}
