//! The standard expression functions.
//!
//! These are registered on the stream's function map and called by the
//! expression lexer when it meets `name(...)` in an `if` condition or a
//! numeric argument. Arguments are words, read with the same splitter the
//! line tokenizer uses, so quoting works inside function calls too.

use std::rc::Rc;

use argscript::lexer::{EvalContext, Function, Lexer};
use argscript::words::WordSplitter;
use argscript::{Diagnostic, Stream};

pub fn add_functions<T>(stream: &mut Stream<T>) {
    stream.add_function(
        "varExists",
        Rc::new(ExistsFunction {
            name: "varExists",
            check: |context, word| context.variable(word).is_some(),
        }),
    );
    stream.add_function(
        "defExists",
        Rc::new(ExistsFunction {
            name: "defExists",
            check: |context, word| context.has_definition(word),
        }),
    );
    stream.add_function(
        "commandExists",
        Rc::new(ExistsFunction {
            name: "commandExists",
            check: |context, word| context.has_command(word),
        }),
    );
    stream.add_function(
        "eq",
        Rc::new(CompareFunction {
            name: "eq",
            compare: |first, second| first == second,
        }),
    );
    stream.add_function(
        "match",
        Rc::new(CompareFunction {
            name: "match",
            compare: glob_match,
        }),
    );
    stream.add_function(
        "minVersion",
        Rc::new(VersionFunction {
            name: "minVersion",
            maximum: false,
        }),
    );
    stream.add_function(
        "maxVersion",
        Rc::new(VersionFunction {
            name: "maxVersion",
            maximum: true,
        }),
    );
    stream.add_function("hash", Rc::new(HashFunction));
}

/// Reads `(word)`.
fn single_word_argument(lexer: &mut Lexer) -> Result<String, Diagnostic> {
    lexer.expect('(')?;
    let mut splitter = WordSplitter::new(lexer.chars(), lexer.pos());
    let word = splitter.next_parameter()?.unwrap_or_default();
    lexer.set_pos(splitter.pos);
    lexer.skip_whitespace();
    lexer.expect(')')?;
    Ok(word)
}

/// Reads `(word, word)`.
fn two_word_arguments(name: &str, lexer: &mut Lexer) -> Result<(String, String), Diagnostic> {
    lexer.expect('(')?;
    let mut splitter = WordSplitter::new(lexer.chars(), lexer.pos());
    let first = splitter.next_parameter()?.unwrap_or_default();
    lexer.set_pos(splitter.pos);
    lexer.skip_whitespace();
    lexer.expect_msg(
        ',',
        &format!("The function '{name}' requires two parameters."),
    )?;
    let mut splitter = WordSplitter::new(lexer.chars(), lexer.pos());
    let second = splitter.next_parameter()?.unwrap_or_default();
    lexer.set_pos(splitter.pos);
    lexer.skip_whitespace();
    lexer.expect(')')?;
    Ok((first, second))
}

fn not_numeric(name: &str, lexer: &Lexer) -> Diagnostic {
    Diagnostic::semantic(
        format!("'{name}' is a boolean function"),
        lexer.keyword_start(),
        lexer.pos(),
    )
}

/// `varExists`, `defExists` and `commandExists`: one word, checked against
/// the evaluation context.
struct ExistsFunction {
    name: &'static str,
    check: fn(&dyn EvalContext, &str) -> bool,
}

impl Function for ExistsFunction {
    fn int(&self, lexer: &mut Lexer) -> Result<i64, Diagnostic> {
        Ok(i64::from(self.boolean(lexer)?))
    }

    fn float(&self, lexer: &mut Lexer) -> Result<f64, Diagnostic> {
        Err(not_numeric(self.name, lexer))
    }

    fn boolean(&self, lexer: &mut Lexer) -> Result<bool, Diagnostic> {
        let word = single_word_argument(lexer)?;
        Ok((self.check)(lexer.context(), &word))
    }
}

/// `eq` and `match`: two words compared as text.
struct CompareFunction {
    name: &'static str,
    compare: fn(&str, &str) -> bool,
}

impl Function for CompareFunction {
    fn int(&self, lexer: &mut Lexer) -> Result<i64, Diagnostic> {
        Ok(i64::from(self.boolean(lexer)?))
    }

    fn float(&self, lexer: &mut Lexer) -> Result<f64, Diagnostic> {
        Err(not_numeric(self.name, lexer))
    }

    fn boolean(&self, lexer: &mut Lexer) -> Result<bool, Diagnostic> {
        let (first, second) = two_word_arguments(self.name, lexer)?;
        Ok((self.compare)(&first, &second))
    }
}

/// Matches `text` against a glob pattern where `*` matches any run of
/// characters and `?` any single character.
fn glob_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let mut t = 0;
    let mut p = 0;
    let mut star: Option<usize> = None;
    let mut mark = 0;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            mark = t;
            p += 1;
        } else if let Some(star_pos) = star {
            // Backtrack: let the last '*' absorb one more character.
            p = star_pos + 1;
            mark += 1;
            t = mark;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

/// `minVersion()` and `maxVersion()`: the supported version window.
struct VersionFunction {
    name: &'static str,
    maximum: bool,
}

impl Function for VersionFunction {
    fn int(&self, lexer: &mut Lexer) -> Result<i64, Diagnostic> {
        lexer.expect('(')?;
        lexer.skip_whitespace();
        lexer.expect(')')?;
        let version = if self.maximum {
            lexer.context().max_version()
        } else {
            lexer.context().min_version()
        };
        Ok(i64::from(version))
    }

    fn boolean(&self, lexer: &mut Lexer) -> Result<bool, Diagnostic> {
        Err(Diagnostic::semantic(
            format!("'{}' is an integer/float function", self.name),
            lexer.keyword_start(),
            lexer.pos(),
        ))
    }
}

/// `hash(name)`: the 32-bit name hash, through the context so dialects can
/// override the hashing scheme.
struct HashFunction;

impl Function for HashFunction {
    fn int(&self, lexer: &mut Lexer) -> Result<i64, Diagnostic> {
        lexer.expect('(')?;
        let mut splitter = WordSplitter::new(lexer.chars(), lexer.pos());
        let word = splitter.next_readable_word();
        lexer.set_pos(splitter.pos);
        lexer.skip_whitespace();
        lexer.expect(')')?;
        match lexer.context().hash(&word) {
            Ok(hash) => Ok(i64::from(hash)),
            Err(message) => Err(Diagnostic::semantic(
                message,
                lexer.keyword_start(),
                lexer.pos(),
            )),
        }
    }

    fn boolean(&self, lexer: &mut Lexer) -> Result<bool, Diagnostic> {
        Err(Diagnostic::semantic(
            "'hash' is an integer/float function",
            lexer.keyword_start(),
            lexer.pos(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use argscript::Stream;
    use argscript_testing::{recording_stream, run_success};

    use super::glob_match;

    fn stream() -> Stream<Vec<String>> {
        let mut stream = recording_stream();
        crate::register_all(&mut stream);
        stream
    }

    #[test]
    fn var_exists() {
        let mut stream = stream();
        run_success(
            &mut stream,
            "set x 5\n\
             if varExists(x)\nlog has-x\nendif\n\
             if (not varExists(y))\nlog no-y\nendif\n",
        );
        assert_eq!(stream.data(), &["has-x", "no-y"]);
    }

    #[test]
    fn def_and_command_exist() {
        let mut stream = stream();
        run_success(
            &mut stream,
            "define d(a)\nenddef\n\
             if (defExists(d) and commandExists(set))\nlog ok\nendif\n\
             if commandExists(nothing)\nlog never\nendif\n",
        );
        assert_eq!(stream.data(), &["ok"]);
    }

    #[test]
    fn eq_compares_words() {
        let mut stream = stream();
        run_success(
            &mut stream,
            "if (eq(a, a) and not eq(a, b))\nlog eq\nendif\n",
        );
        assert_eq!(stream.data(), &["eq"]);
    }

    #[test]
    fn match_uses_glob_patterns() {
        let mut stream = stream();
        run_success(
            &mut stream,
            "if match(creature_editor, creature*)\nlog m\nendif\n",
        );
        assert_eq!(stream.data(), &["m"]);
    }

    #[test]
    fn globs() {
        assert!(glob_match("abc", "abc"));
        assert!(glob_match("abc", "a*"));
        assert!(glob_match("abc", "*c"));
        assert!(glob_match("abc", "a?c"));
        assert!(glob_match("abc", "*"));
        assert!(glob_match("", "*"));
        assert!(!glob_match("abc", "a?"));
        assert!(!glob_match("abc", "b*"));
        assert!(glob_match("a.b.c", "a*c"));
    }

    #[test]
    fn version_window() {
        let mut stream = stream();
        stream.set_version_range(2, 5);
        run_success(
            &mut stream,
            "if (minVersion() == 2 and maxVersion() == 5)\nlog v\nendif\n",
        );
        assert_eq!(stream.data(), &["v"]);
    }

    #[test]
    fn hash_is_case_insensitive() {
        let mut stream = stream();
        run_success(
            &mut stream,
            "if (hash(Test) == hash(TEST))\nlog same\nendif\n\
             if (hash(test) == 0xbc2c0be9)\nlog known\nendif\n",
        );
        assert_eq!(stream.data(), &["same", "known"]);
    }
}
