//! Splitting line text into words
//!
//! ArgScript words are separated by whitespace, but two constructs keep a
//! word together: double quotes (the quotes are stripped) and balanced
//! parentheses. A parenthesized group that starts a word loses its outer
//! parentheses, while a group attached to a function-like word that starts
//! with a letter keeps them, so `vary(1, 2)` stays one word verbatim.

use crate::error::Diagnostic;

/// A cursor over a char slice that extracts one word at a time.
///
/// The cursor position is public so that callers interleaving word
/// splitting with other lexing (the expression evaluator does this for
/// function parameters) can synchronize positions.
pub struct WordSplitter<'a> {
    chars: &'a [char],
    pub pos: usize,
}

impl<'a> WordSplitter<'a> {
    pub fn new(chars: &'a [char], pos: usize) -> Self {
        Self { chars, pos }
    }

    pub fn skip_whitespace(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// Returns the next word, or `None` at the end of the input.
    pub fn next_word(&mut self) -> Result<Option<String>, Diagnostic> {
        self.next(false)
    }

    /// Like [`WordSplitter::next_word`], but additionally stops (without
    /// consuming) at a top-level `,` or `)`.
    ///
    /// This is the shape of a function parameter; it can legitimately be an
    /// empty string when the cursor sits directly on a stop character.
    pub fn next_parameter(&mut self) -> Result<Option<String>, Diagnostic> {
        self.next(true)
    }

    fn next(&mut self, is_parameter: bool) -> Result<Option<String>, Diagnostic> {
        self.skip_whitespace();
        let first = match self.peek() {
            None => return Ok(None),
            Some(c) => c,
        };

        let mut word = String::new();
        // Parentheses are kept for function-like words, which start with a
        // letter.
        let keep_parenthesis = first.is_alphabetic();

        while self.pos < self.chars.len() && !self.chars[self.pos].is_whitespace() {
            if !self.parse_basic(&mut word, keep_parenthesis, 0, is_parameter)? {
                break;
            }
        }
        Ok(Some(word))
    }

    /// Returns the next run of name-like chars (alphanumeric, `_`, `-`, `~`),
    /// which may be empty.
    pub fn next_readable_word(&mut self) -> String {
        self.skip_whitespace();
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphabetic() || c.is_ascii_digit() || c == '_' || c == '-' || c == '~' {
                word.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        word
    }

    fn parse_basic(
        &mut self,
        out: &mut String,
        keep_parenthesis: bool,
        parenthesis_level: u32,
        is_parameter: bool,
    ) -> Result<bool, Diagnostic> {
        let c = self.chars[self.pos];
        if c == '"' {
            self.pos += 1;
            self.parse_quotes(out)?;
        } else if c == '(' {
            self.pos += 1;
            if keep_parenthesis {
                out.push('(');
            }
            self.parse_parenthesis(out, parenthesis_level + 1)?;
            if keep_parenthesis {
                out.push(')');
            }
            // A top-level parenthesized group ends the word.
            if parenthesis_level == 0 {
                return Ok(false);
            }
        } else if is_parameter && (c == ')' || c == ',') {
            // Stop characters are left for the caller.
            return Ok(false);
        } else {
            out.push(c);
            self.pos += 1;
        }
        Ok(true)
    }

    fn parse_parenthesis(&mut self, out: &mut String, level: u32) -> Result<(), Diagnostic> {
        let start = self.pos;
        let mut closed = false;
        while self.pos < self.chars.len() {
            if self.chars[self.pos] == ')' {
                closed = true;
                self.pos += 1;
                break;
            }
            self.parse_basic(out, true, level, false)?;
        }
        if !closed {
            return Err(Diagnostic::lexical(
                "Missing end ) parenthesis.",
                start,
                self.pos,
            ));
        }
        Ok(())
    }

    fn parse_quotes(&mut self, out: &mut String) -> Result<(), Diagnostic> {
        let start = self.pos;
        let mut closed = false;
        while self.pos < self.chars.len() {
            if self.chars[self.pos] == '"' {
                closed = true;
                self.pos += 1;
                break;
            }
            out.push(self.chars[self.pos]);
            self.pos += 1;
        }
        if !closed {
            return Err(Diagnostic::lexical(
                "Missing end \" quote.",
                start,
                self.pos,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut splitter = WordSplitter::new(&chars, 0);
        let mut result = vec![];
        while let Some(word) = splitter.next_word().unwrap() {
            result.push(word);
        }
        result
    }

    #[test]
    fn plain_words() {
        assert_eq!(words("doStuff 1  2"), ["doStuff", "1", "2"]);
        assert_eq!(words("  "), Vec::<String>::new());
    }

    #[test]
    fn quotes_keep_spaces_and_drop_quotes() {
        assert_eq!(words(r#"set name "two words""#), ["set", "name", "two words"]);
        assert_eq!(words(r#"a"b c"d"#), ["ab cd"]);
    }

    #[test]
    fn function_words_keep_parentheses() {
        assert_eq!(words("vary(1, 2) next"), ["vary(1, 2)", "next"]);
    }

    #[test]
    fn leading_parenthesized_group_drops_parentheses() {
        assert_eq!(words("(1, 2, 3) next"), ["1, 2, 3", "next"]);
    }

    #[test]
    fn nested_parentheses() {
        assert_eq!(words("f(g(1), 2)"), ["f(g(1), 2)"]);
    }

    #[test]
    fn parameter_stops_at_comma_and_close_paren() {
        let chars: Vec<char> = "abc, def) tail".chars().collect();
        let mut splitter = WordSplitter::new(&chars, 0);
        assert_eq!(splitter.next_parameter().unwrap().unwrap(), "abc");
        assert_eq!(chars[splitter.pos], ',');
        splitter.pos += 1;
        assert_eq!(splitter.next_parameter().unwrap().unwrap(), "def");
        assert_eq!(chars[splitter.pos], ')');
    }

    #[test]
    fn unterminated_quote() {
        let chars: Vec<char> = r#""never ends"#.chars().collect();
        let mut splitter = WordSplitter::new(&chars, 0);
        let err = splitter.next_word().unwrap_err();
        assert_eq!(err.message, "Missing end \" quote.");
    }

    #[test]
    fn unterminated_parenthesis() {
        let chars: Vec<char> = "(1, 2".chars().collect();
        let mut splitter = WordSplitter::new(&chars, 0);
        let err = splitter.next_word().unwrap_err();
        assert_eq!(err.message, "Missing end ) parenthesis.");
    }

    #[test]
    fn readable_word_stops_at_punctuation() {
        let chars: Vec<char> = "  foo_bar-9~x(rest".chars().collect();
        let mut splitter = WordSplitter::new(&chars, 0);
        assert_eq!(splitter.next_readable_word(), "foo_bar-9~x");
        assert_eq!(chars[splitter.pos], '(');
    }
}
