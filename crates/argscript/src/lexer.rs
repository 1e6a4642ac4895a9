//! Arithmetic and boolean expression evaluation
//!
//! Many ArgScript arguments are expressions rather than plain literals:
//! `set x (2 + 3*4)`, `if $level >= 2 and not varExists(debug)`. The
//! [`Lexer`] evaluates them with a recursive descent over three grammars
//! that share primaries:
//!
//! * integer: `+ -` over `* / %` over right-associative `^` over signed
//!   primaries (decimal, `0x` hexadecimal and trailing-`b` binary literals,
//!   parentheses, functions, `true`/`on`/`false`/`off`),
//! * real: the same operators over real literals like `1.34e-9` and the
//!   constants `pi`, `e` and `NaN`,
//! * boolean: `or` over `and` over `not` over comparisons over keywords,
//!   falling back to integer expressions where a keyword does not fit.
//!
//! Functions are looked up in a caller-supplied table, so hosts can extend
//! the expression language; the built-ins (`eq`, `varExists`, `hash`, ...)
//! are registered by the standard library. A function receives the lexer
//! mid-expression and parses its own parameter list.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::Diagnostic;

/// A function callable from expressions, like `sqrt(...)` or `eq(a, b)`.
///
/// Only [`Function::int`] is required. The default [`Function::float`] casts
/// the integer result and the default [`Function::boolean`] compares it with
/// zero; boolean-only functions override `boolean` and make `float` an
/// error instead.
pub trait Function {
    fn int(&self, lexer: &mut Lexer) -> Result<i64, Diagnostic>;

    fn float(&self, lexer: &mut Lexer) -> Result<f64, Diagnostic> {
        Ok(self.int(lexer)? as f64)
    }

    fn boolean(&self, lexer: &mut Lexer) -> Result<bool, Diagnostic> {
        Ok(self.int(lexer)? != 0)
    }
}

/// The function table expressions are evaluated against.
pub type FunctionMap = HashMap<String, Rc<dyn Function>>;

/// The stream state visible to expression functions.
///
/// All methods have neutral defaults so that expressions can be evaluated
/// without a stream, as the command line evaluator does.
pub trait EvalContext {
    fn variable(&self, _name: &str) -> Option<String> {
        None
    }

    fn has_definition(&self, _name: &str) -> bool {
        false
    }

    fn has_command(&self, _name: &str) -> bool {
        false
    }

    fn min_version(&self) -> i32 {
        0
    }

    fn max_version(&self) -> i32 {
        0
    }

    /// Hashes a name the way the host does, or rejects it with a message.
    fn hash(&self, _name: &str) -> Result<u32, String> {
        Ok(0)
    }
}

/// The empty context, for evaluating expressions outside a document.
impl EvalContext for () {}

pub struct Lexer<'a> {
    chars: &'a [char],
    pos: usize,
    keyword_start: usize,
    is_hexadecimal: bool,
    functions: &'a FunctionMap,
    context: &'a dyn EvalContext,
}

impl<'a> Lexer<'a> {
    pub fn new(chars: &'a [char], functions: &'a FunctionMap, context: &'a dyn EvalContext) -> Self {
        Self {
            chars,
            pos: 0,
            keyword_start: 0,
            is_hexadecimal: false,
            functions,
            context,
        }
    }

    pub fn chars(&self) -> &'a [char] {
        self.chars
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// The start of the last keyword or literal the lexer scanned. Functions
    /// use it to anchor their own errors.
    pub fn keyword_start(&self) -> usize {
        self.keyword_start
    }

    pub fn context(&self) -> &'a dyn EvalContext {
        self.context
    }

    /// Whether the last evaluated expression was written as a hexadecimal
    /// literal or a `hash(...)` call. Formatters print such values back in
    /// hexadecimal.
    pub fn last_number_was_hexadecimal(&self) -> bool {
        self.is_hexadecimal
    }

    pub fn skip_whitespace(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    /// Whether there are still characters left to read.
    pub fn available(&self) -> bool {
        self.pos < self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// Requires the next non-whitespace char to be `c` and consumes it.
    pub fn expect(&mut self, c: char) -> Result<(), Diagnostic> {
        self.expect_msg(c, &format!("Expected '{c}'."))
    }

    /// Like [`Lexer::expect`] but with a custom error message.
    pub fn expect_msg(&mut self, c: char, message: &str) -> Result<(), Diagnostic> {
        self.skip_whitespace();
        if self.peek() != Some(c) {
            return Err(Diagnostic::syntax(message, self.pos, self.pos + 1));
        }
        self.pos += 1;
        Ok(())
    }

    /// Like [`Lexer::expect`], except that running out of input is not an
    /// error. Returns whether the char was there.
    pub fn optional_expect(&mut self, c: char) -> Result<bool, Diagnostic> {
        self.skip_whitespace();
        match self.peek() {
            None => Ok(false),
            Some(next) if next != c => Err(Diagnostic::syntax(
                format!("Expected '{c}'."),
                self.pos,
                self.pos + 1,
            )),
            Some(_) => {
                self.pos += 1;
                Ok(true)
            }
        }
    }

    /// Scans a keyword of alphanumeric chars and `_`, which may be empty.
    pub fn parse_keyword(&mut self) -> String {
        self.skip_whitespace();
        self.scan(|c| c.is_alphanumeric() || c == '_')
    }

    fn scan(&mut self, accept: impl Fn(char) -> bool) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if accept(c) {
                word.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        word
    }

    /* -- INTEGERS -- */

    /// Evaluates an integer expression starting at the current position.
    ///
    /// The lexer stops at the first char that cannot continue the
    /// expression; the caller decides whether trailing text is an error.
    pub fn parse_integer(&mut self) -> Result<i64, Diagnostic> {
        self.is_hexadecimal = false;
        self.skip_whitespace();

        let mut number = self.parse_int_multiplication()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('+') => {
                    self.pos += 1;
                    number = number.wrapping_add(self.parse_int_multiplication()?);
                }
                Some('-') => {
                    self.pos += 1;
                    number = number.wrapping_sub(self.parse_int_multiplication()?);
                }
                _ => break,
            }
        }
        Ok(number)
    }

    fn parse_int_multiplication(&mut self) -> Result<i64, Diagnostic> {
        self.skip_whitespace();

        let mut number = self.parse_int_power()?;
        loop {
            self.skip_whitespace();
            let operator = match self.peek() {
                Some(c @ ('*' | '/' | '%')) => c,
                _ => break,
            };
            self.pos += 1;
            let operand = self.parse_int_power()?;
            if operand == 0 && operator != '*' {
                return Err(Diagnostic::semantic(
                    "Division by zero.",
                    self.pos.saturating_sub(1),
                    self.pos,
                ));
            }
            number = match operator {
                '*' => number.wrapping_mul(operand),
                '/' => number.wrapping_div(operand),
                _ => number.wrapping_rem(operand),
            };
        }
        Ok(number)
    }

    fn parse_int_power(&mut self) -> Result<i64, Diagnostic> {
        self.skip_whitespace();
        let number = self.parse_int_sign()?;
        if self.peek() == Some('^') {
            self.pos += 1;
            return Ok((number as f64).powf(self.parse_int_power()? as f64) as i64);
        }
        Ok(number)
    }

    fn parse_int_sign(&mut self) -> Result<i64, Diagnostic> {
        loop {
            self.skip_whitespace();
            if self.peek() != Some('+') {
                break;
            }
            self.pos += 1;
        }
        if self.peek() == Some('-') {
            self.pos += 1;
            Ok(self.parse_int_sign()?.wrapping_neg())
        } else {
            self.parse_int_number()
        }
    }

    fn parse_int_number(&mut self) -> Result<i64, Diagnostic> {
        self.skip_whitespace();

        let c = match self.peek() {
            None => {
                return Err(Diagnostic::syntax(
                    "Missing number after operation.",
                    self.pos.saturating_sub(1),
                    self.pos,
                ))
            }
            Some(c) => c,
        };

        if c.is_ascii_digit() {
            self.keyword_start = self.pos;

            if c == '0' && self.chars.get(self.pos + 1) == Some(&'x') {
                if self.pos + 2 == self.chars.len() {
                    return Err(Diagnostic::lexical(
                        "Bad number format: expecting a hexadecimal number after '0x'.",
                        self.pos,
                        self.pos + 2,
                    ));
                }
                self.is_hexadecimal = true;
                self.pos += 2;
                let digits = self.scan(|c| c.is_ascii_hexdigit());
                return u64::from_str_radix(&digits, 16)
                    .map(|value| value as i64)
                    .map_err(|_| self.invalid_number_format());
            }

            let digits = self.scan(|c| c.is_ascii_digit());

            // A trailing 'b' marks a binary literal, but only when the
            // scanned digits can actually be binary.
            if self.peek() == Some('b') && digits.bytes().all(|b| b == b'0' || b == b'1') {
                self.pos += 1;
                return u32::from_str_radix(&digits, 2)
                    .map(i64::from)
                    .map_err(|_| self.invalid_number_format());
            }

            return digits
                .parse::<u32>()
                .map(i64::from)
                .map_err(|_| self.invalid_number_format());
        }

        if c == '(' {
            return self.parse_int_parenthesis();
        }
        if !c.is_alphabetic() {
            return Err(Diagnostic::syntax(
                "Bad integer number: expecting an integer number, an expression in parenthesis, or a function.",
                self.pos,
                self.pos + 1,
            ));
        }

        self.keyword_start = self.pos;
        let name = self.scan(|c| c.is_alphanumeric() || c == '_');
        match name.as_str() {
            "abs" => Ok(self.parse_int_parenthesis()?.wrapping_abs()),
            "floor" => Ok(self.parse_float_parenthesis()?.floor() as i64),
            "ceil" => Ok(self.parse_float_parenthesis()?.ceil() as i64),
            "round" => Ok((self.parse_float_parenthesis()? + 0.5).floor() as i64),
            "sqr" => {
                let number = self.parse_int_parenthesis()?;
                Ok(number.wrapping_mul(number))
            }
            "true" | "on" => Ok(1),
            "false" | "off" => Ok(0),
            _ => {
                let function = match self.functions.get(&name) {
                    Some(function) => Rc::clone(function),
                    None => {
                        return Err(Diagnostic::semantic(
                            format!("Unknown integer function '{name}'."),
                            self.keyword_start,
                            self.pos,
                        ))
                    }
                };
                if name == "hash" {
                    self.is_hexadecimal = true;
                }
                function.int(self)
            }
        }
    }

    fn parse_int_parenthesis(&mut self) -> Result<i64, Diagnostic> {
        self.skip_whitespace();
        if self.peek() != Some('(') {
            return Err(Diagnostic::syntax(
                "Expected '(' in integer expression.",
                self.pos,
                self.pos + 1,
            ));
        }
        self.pos += 1;
        let result = self.parse_integer()?;
        self.skip_whitespace();
        if self.peek() != Some(')') {
            return Err(Diagnostic::syntax(
                "Expected ')' in integer expression.",
                self.pos,
                self.pos + 1,
            ));
        }
        self.pos += 1;
        Ok(result)
    }

    fn invalid_number_format(&self) -> Diagnostic {
        Diagnostic::lexical("Invalid number format.", self.keyword_start, self.pos)
    }

    /* -- REALS -- */

    /// Evaluates a real expression starting at the current position.
    pub fn parse_float(&mut self) -> Result<f64, Diagnostic> {
        self.is_hexadecimal = false;
        self.skip_whitespace();

        let mut number = self.parse_float_multiplication()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('+') => {
                    self.pos += 1;
                    number += self.parse_float_multiplication()?;
                }
                Some('-') => {
                    self.pos += 1;
                    number -= self.parse_float_multiplication()?;
                }
                _ => break,
            }
        }
        Ok(number)
    }

    fn parse_float_multiplication(&mut self) -> Result<f64, Diagnostic> {
        self.skip_whitespace();

        let mut number = self.parse_float_power()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('*') => {
                    self.pos += 1;
                    number *= self.parse_float_power()?;
                }
                Some('/') => {
                    self.pos += 1;
                    number /= self.parse_float_power()?;
                }
                Some('%') => {
                    self.pos += 1;
                    number %= self.parse_float_power()?;
                }
                _ => break,
            }
        }
        Ok(number)
    }

    fn parse_float_power(&mut self) -> Result<f64, Diagnostic> {
        self.skip_whitespace();
        let number = self.parse_float_sign()?;
        if self.peek() == Some('^') {
            self.pos += 1;
            return Ok(number.powf(self.parse_float_power()?));
        }
        Ok(number)
    }

    fn parse_float_sign(&mut self) -> Result<f64, Diagnostic> {
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => {
                    return Err(Diagnostic::syntax(
                        "Expected a number.",
                        self.pos.saturating_sub(1),
                        self.pos,
                    ))
                }
                Some('+') => self.pos += 1,
                Some(_) => break,
            }
        }
        if self.peek() == Some('-') {
            self.pos += 1;
            Ok(-self.parse_float_sign()?)
        } else {
            self.parse_float_number()
        }
    }

    fn parse_float_number(&mut self) -> Result<f64, Diagnostic> {
        self.skip_whitespace();

        let c = match self.peek() {
            None => {
                return Err(Diagnostic::syntax(
                    "Missing number after operation.",
                    self.pos.saturating_sub(1),
                    self.pos,
                ))
            }
            Some(c) => c,
        };

        if c.is_ascii_digit() || c == '.' {
            self.keyword_start = self.pos;
            let mut literal = String::new();
            while let Some(c) = self.peek() {
                let is_exponent_sign = (c == '-' || c == '+')
                    && matches!(literal.bytes().last(), Some(b'e' | b'E'));
                if c.is_ascii_digit() || c == 'e' || c == 'E' || c == '.' || is_exponent_sign {
                    literal.push(c);
                    self.pos += 1;
                } else {
                    break;
                }
            }
            // Real literals carry single precision, like the game's own
            // property files.
            return literal
                .parse::<f32>()
                .map(f64::from)
                .map_err(|_| self.invalid_number_format());
        }

        if c == '(' {
            return self.parse_float_parenthesis();
        }
        if !c.is_alphabetic() {
            return Err(Diagnostic::syntax(
                "Bad real number: expecting a real number, an expression in parenthesis, or a function.",
                self.pos,
                self.pos + 1,
            ));
        }

        self.keyword_start = self.pos;
        let name = self.scan(|c| c.is_alphanumeric() || c == '_');
        match name.as_str() {
            "pi" => Ok(std::f64::consts::PI),
            "e" => Ok(std::f64::consts::E),
            "NaN" => Ok(f64::NAN),
            "sqrt" => Ok(self.parse_float_parenthesis()?.sqrt()),
            "exp" => Ok(self.parse_float_parenthesis()?.exp()),
            "log" => Ok(self.parse_float_parenthesis()?.ln()),
            "abs" => Ok(self.parse_float_parenthesis()?.abs()),
            "sin" => Ok(self.parse_float_parenthesis()?.sin()),
            "cos" => Ok(self.parse_float_parenthesis()?.cos()),
            "tan" => Ok(self.parse_float_parenthesis()?.tan()),
            "asin" => Ok(self.parse_float_parenthesis()?.asin()),
            "acos" => Ok(self.parse_float_parenthesis()?.acos()),
            "atan" => Ok(self.parse_float_parenthesis()?.atan()),
            "sind" => Ok(self.parse_float_parenthesis()?.to_radians().sin()),
            "cosd" => Ok(self.parse_float_parenthesis()?.to_radians().cos()),
            "tand" => Ok(self.parse_float_parenthesis()?.to_radians().tan()),
            "dasin" => Ok(self.parse_float_parenthesis()?.asin().to_degrees()),
            "dacos" => Ok(self.parse_float_parenthesis()?.acos().to_degrees()),
            "datan" => Ok(self.parse_float_parenthesis()?.atan().to_degrees()),
            "floor" => Ok(self.parse_float_parenthesis()?.floor()),
            "round" => Ok((self.parse_float_parenthesis()? + 0.5).floor()),
            "ceil" => Ok(self.parse_float_parenthesis()?.ceil()),
            "sqr" => {
                let number = self.parse_float_parenthesis()?;
                Ok(number * number)
            }
            "pow" => {
                let (base, exponent) = self.parse_float_binomial("pow")?;
                Ok(base.powf(exponent))
            }
            "atan2" => {
                let (y, x) = self.parse_float_binomial("atan2")?;
                Ok(y.atan2(x))
            }
            "datan2" => {
                let (y, x) = self.parse_float_binomial("datan2")?;
                Ok(y.atan2(x).to_degrees())
            }
            _ => {
                let function = match self.functions.get(&name) {
                    Some(function) => Rc::clone(function),
                    None => {
                        return Err(Diagnostic::semantic(
                            format!("Unknown float function '{name}'."),
                            self.keyword_start,
                            self.pos,
                        ))
                    }
                };
                function.float(self)
            }
        }
    }

    fn parse_float_parenthesis(&mut self) -> Result<f64, Diagnostic> {
        self.skip_whitespace();
        if self.peek() != Some('(') {
            return Err(Diagnostic::syntax(
                "Expected '(' in real expression.",
                self.pos,
                self.pos + 1,
            ));
        }
        self.pos += 1;
        let result = self.parse_float()?;
        self.skip_whitespace();
        if self.peek() != Some(')') {
            return Err(Diagnostic::syntax(
                "Expected ')' in real expression.",
                self.pos,
                self.pos + 1,
            ));
        }
        self.pos += 1;
        Ok(result)
    }

    fn parse_float_binomial(&mut self, function_name: &str) -> Result<(f64, f64), Diagnostic> {
        self.skip_whitespace();
        if self.peek() != Some('(') {
            return Err(Diagnostic::syntax(
                format!("Expected '(' in parameters of function '{function_name}'."),
                self.pos,
                self.pos + 1,
            ));
        }
        self.pos += 1;
        let first = self.parse_float()?;
        self.skip_whitespace();
        if self.peek() != Some(',') {
            return Err(Diagnostic::syntax(
                format!(
                    "Expected ',' in parameters of function '{function_name}' (2 parameters are required)."
                ),
                self.pos,
                self.pos + 1,
            ));
        }
        self.pos += 1;
        let second = self.parse_float()?;
        self.skip_whitespace();
        if self.peek() != Some(')') {
            return Err(Diagnostic::syntax(
                format!("Expected ')' in parameters of function '{function_name}'."),
                self.pos,
                self.pos + 1,
            ));
        }
        self.pos += 1;
        Ok((first, second))
    }

    /* -- BOOLEANS -- */

    /// Evaluates a boolean expression starting at the current position.
    pub fn parse_boolean(&mut self) -> Result<bool, Diagnostic> {
        Ok(self.parse_boolean_internal()? != 0)
    }

    fn parse_boolean_internal(&mut self) -> Result<i64, Diagnostic> {
        self.is_hexadecimal = false;
        self.skip_whitespace();

        let mut left = self.parse_bool_and()?;
        loop {
            self.skip_whitespace();
            self.keyword_start = self.pos;
            let keyword = self.scan(char::is_alphabetic);
            if keyword == "or" {
                // Evaluate the right side first so the cursor always moves
                // past it, even when the left side is already true.
                let right = self.parse_bool_and()?;
                left = i64::from(right != 0 || left != 0);
            } else {
                self.pos = self.keyword_start;
                return Ok(left);
            }
        }
    }

    fn parse_bool_and(&mut self) -> Result<i64, Diagnostic> {
        let mut left = self.parse_bool_extended_comparison()?;
        loop {
            self.skip_whitespace();
            self.keyword_start = self.pos;
            let keyword = self.scan(char::is_alphabetic);
            if keyword == "and" {
                let right = self.parse_bool_extended_comparison()?;
                left = i64::from(right != 0 && left != 0);
            } else {
                self.pos = self.keyword_start;
                return Ok(left);
            }
        }
    }

    /// Like [`Lexer::parse_bool_comparison`], with support for the prefix
    /// keyword `not`.
    fn parse_bool_extended_comparison(&mut self) -> Result<i64, Diagnostic> {
        self.skip_whitespace();
        self.keyword_start = self.pos;
        let keyword = self.scan(char::is_alphabetic);
        if keyword == "not" {
            Ok(i64::from(self.parse_bool_extended_comparison()? == 0))
        } else {
            self.pos = self.keyword_start;
            self.parse_bool_comparison()
        }
    }

    fn parse_bool_comparison(&mut self) -> Result<i64, Diagnostic> {
        let mut left = self.parse_bool_keyword()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('>') => {
                    self.pos += 1;
                    return Ok(i64::from(left > self.parse_bool_comparison()?));
                }
                Some('<') => {
                    self.pos += 1;
                    return Ok(i64::from(left < self.parse_bool_comparison()?));
                }
                Some('=') => {
                    self.pos += 1;
                    if self.peek() == Some('=') {
                        self.pos += 1;
                    }
                    left = i64::from(left == self.parse_bool_comparison()?);
                }
                Some('!') => {
                    self.pos += 1;
                    if self.peek() != Some('=') {
                        let next: String = self.peek().into_iter().collect();
                        return Err(Diagnostic::syntax(
                            format!("Invalid operator !{next}'. Did you mean != or 'not'?"),
                            self.pos.saturating_sub(1),
                            self.pos + 1,
                        ));
                    }
                    self.pos += 1;
                    left = i64::from(left != self.parse_bool_comparison()?);
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_bool_keyword(&mut self) -> Result<i64, Diagnostic> {
        self.skip_whitespace();
        match self.peek() {
            Some('(') => return self.parse_bool_parenthesis(),
            Some(c) if !c.is_alphabetic() => return self.parse_integer(),
            None => return self.parse_integer(),
            Some(_) => {}
        }

        self.keyword_start = self.pos;
        let keyword = self.scan(|c| c.is_alphanumeric() || c == '_');
        match keyword.as_str() {
            "true" | "on" => Ok(1),
            "false" | "off" => Ok(0),
            _ => match self.functions.get(&keyword) {
                Some(function) => Rc::clone(function).int(self),
                None => {
                    // Not a boolean keyword; retry as an integer expression.
                    self.pos = self.keyword_start;
                    self.parse_integer()
                }
            },
        }
    }

    fn parse_bool_parenthesis(&mut self) -> Result<i64, Diagnostic> {
        self.skip_whitespace();
        if self.peek() != Some('(') {
            return Err(Diagnostic::syntax(
                "Expected '(' in boolean expression.",
                self.pos,
                self.pos + 1,
            ));
        }
        self.pos += 1;
        let result = self.parse_boolean_internal()?;
        self.skip_whitespace();
        if self.peek() != Some(')') {
            return Err(Diagnostic::syntax(
                "Expected ')' in boolean expression.",
                self.pos,
                self.pos + 1,
            ));
        }
        self.pos += 1;
        Ok(result)
    }
}
