//! Macro definitions
//!
//! A `define name(a, b)` block captures its body lines verbatim. Creating an
//! instance later substitutes `&a` or `&{a}` references in each captured
//! line with the given arguments and feeds the result back through the
//! stream, so a definition behaves like a textual macro: the substituted
//! text is re-lexed, not evaluated at definition time.

use crate::error::Diagnostic;
use crate::stream::Stream;

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Definition {
    name: String,
    /// Line number of the first body line within the document, for stamping
    /// errors raised inside the definition.
    starting_line: usize,
    parameters: Vec<String>,
    lines: Vec<String>,
}

impl Definition {
    pub fn new<S: Into<String>>(name: S, starting_line: usize) -> Self {
        Self {
            name: name.into(),
            starting_line,
            parameters: Vec::new(),
            lines: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn add_parameter<S: Into<String>>(&mut self, parameter: S) {
        self.parameters.push(parameter.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn add_line<S: Into<String>>(&mut self, line: S) {
        self.lines.push(line.into());
    }

    /// Substitutes `&name` and `&{name}` references in one body line.
    pub fn replace_parameters(
        &self,
        arguments: &[String],
        text: &str,
    ) -> Result<String, Diagnostic> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::new();
        let mut i = 0;

        while i < chars.len() {
            if chars[i] != '&' {
                out.push(chars[i]);
                i += 1;
                continue;
            }
            i += 1;
            if i == chars.len() {
                return Err(Diagnostic::syntax(
                    "Missing parameter name after '&'.",
                    i - 1,
                    i,
                ));
            }

            let inside_braces = chars[i] == '{';
            if inside_braces {
                i += 1;
                if i == chars.len() {
                    return Err(Diagnostic::syntax(
                        "Missing parameter name after '{'; the format should be '&{parameterName}'.",
                        i - 2,
                        i,
                    ));
                }
            }

            let name_start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[name_start..i].iter().collect();

            if name.is_empty() {
                return Err(Diagnostic::syntax(
                    "Missing parameter name after '&'.",
                    name_start.saturating_sub(1),
                    name_start,
                ));
            }
            if name.starts_with(|c: char| c.is_ascii_digit()) {
                return Err(Diagnostic::syntax(
                    format!(
                        "Invalid variable name '{name}': parameter names cannot start with a numeric digit."
                    ),
                    name_start,
                    i,
                ));
            }

            if inside_braces {
                if chars.get(i) != Some(&'}') {
                    return Err(Diagnostic::syntax(
                        format!("Missing closing '}}' after parameter '{name}'."),
                        name_start,
                        i,
                    ));
                }
                i += 1;
            }

            match self.parameters.iter().position(|p| *p == name) {
                Some(index) => out.push_str(&arguments[index]),
                None => {
                    return Err(Diagnostic::semantic(
                        format!("Unknown parameter '{name}'."),
                        name_start,
                        i,
                    ))
                }
            }
        }
        Ok(out)
    }

    /// Expands the definition with the given arguments, processing each
    /// substituted body line through the stream.
    ///
    /// Errors inside the body are reported at the body's own lines; the
    /// returned error summarizes the first of them for the caller to anchor
    /// at the instantiating line.
    pub fn create_instance<T>(
        &self,
        stream: &mut Stream<T>,
        arguments: &[String],
    ) -> Result<(), Diagnostic> {
        if self.parameters.len() != arguments.len() {
            return Err(Diagnostic::semantic(
                format!(
                    "Definition '{}' requires {} arguments, {} have been given.",
                    self.name,
                    self.parameters.len(),
                    arguments.len()
                ),
                0,
                0,
            ));
        }

        let errors = stream.protected_parsing(|stream| {
            for (i, line) in self.lines.iter().enumerate() {
                match self.replace_parameters(arguments, line) {
                    Ok(text) => {
                        stream.process_line(&text);
                    }
                    Err(error) => stream.add_error(error.with_line(self.starting_line + i)),
                }
            }
        });

        if let Some(first) = errors.first() {
            return Err(Diagnostic::semantic(
                format!("Error on definition: {}", first.message),
                0,
                0,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> Definition {
        let mut definition = Definition::new("makeThing", 3);
        definition.add_parameter("a");
        definition.add_parameter("b");
        definition
    }

    fn replace(text: &str) -> Result<String, Diagnostic> {
        definition().replace_parameters(&["5".to_string(), "blue".to_string()], text)
    }

    #[test]
    fn parameter_substitution() {
        assert_eq!(replace("color &b").unwrap(), "color blue");
        assert_eq!(replace("size &{a}0").unwrap(), "size 50");
        assert_eq!(replace("pair &a&b").unwrap(), "pair 5blue");
        assert_eq!(replace("no parameters").unwrap(), "no parameters");
    }

    #[test]
    fn unknown_parameter() {
        let err = replace("size &c").unwrap_err();
        assert_eq!(err.message, "Unknown parameter 'c'.");
        assert_eq!((err.start, err.end), (6, 7));
    }

    #[test]
    fn malformed_references() {
        assert_eq!(
            replace("size &").unwrap_err().message,
            "Missing parameter name after '&'."
        );
        assert_eq!(
            replace("size &{a").unwrap_err().message,
            "Missing closing '}' after parameter 'a'."
        );
        assert_eq!(
            replace("size &9x").unwrap_err().message,
            "Invalid variable name '9x': parameter names cannot start with a numeric digit."
        );
    }
}
