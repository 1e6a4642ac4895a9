//! Typed argument parsing
//!
//! Command handlers rarely want raw argument strings; they want an int, a
//! vector, a color. These helpers evaluate one argument as an expression,
//! check its range, and report failures on the stream with spans pointing at
//! the argument the user wrote. They all return `Option` so a handler can
//! bail out with `?`-style early returns while the error is already
//! recorded.

use crate::diagnostics::HYPERLINK_COLOR;
use crate::error::Diagnostic;
use crate::lexer::Lexer;
use crate::line::Arguments;
use crate::stream::Stream;

/// An RGB color with components in `0.0..=1.0`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.r, self.g, self.b)
    }
}

/// An RGBA color with components in `0.0..=1.0`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }
}

impl std::fmt::Display for Rgba {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

fn arguments_span(args: &Arguments) -> (usize, usize) {
    if args.is_empty() {
        (0, 0)
    } else {
        (args.span(0).0, args.span(args.len() - 1).1)
    }
}

impl<T> Stream<T> {
    /// Evaluates one argument as an expression, requiring the whole text to
    /// be consumed. Failures are added to the stream, rebased to the
    /// argument's span.
    fn eval_in_argument<R>(
        &mut self,
        args: &Arguments,
        index: usize,
        expected: &str,
        eval: impl FnOnce(&mut Lexer) -> Result<R, Diagnostic>,
    ) -> Option<R> {
        if index >= args.len() {
            let (start, end) = arguments_span(args);
            self.add_error(Diagnostic::semantic(
                format!("Expected {expected} at argument position {index}."),
                start,
                end,
            ));
            return None;
        }
        let text = args.get(index);
        if text.trim().is_empty() {
            self.add_error(args.error("Empty expression.", index));
            return None;
        }
        let chars: Vec<char> = text.chars().collect();
        let result = {
            let context = self.eval_context();
            let mut lexer = Lexer::new(&chars, self.functions(), &context);
            eval(&mut lexer).and_then(|value| {
                let end_index = lexer.pos();
                lexer.skip_whitespace();
                if lexer.available() {
                    Err(Diagnostic::syntax(
                        "Garbage at end of expression",
                        end_index,
                        chars.len(),
                    ))
                } else {
                    Ok(value)
                }
            })
        };
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.add_error(args.rebase(index, error));
                None
            }
        }
    }

    pub fn parse_bool(&mut self, args: &Arguments, index: usize) -> Option<bool> {
        self.eval_in_argument(args, index, "a boolean", |lexer| lexer.parse_boolean())
    }

    /// Evaluates a free-standing boolean expression, as `if` and `elseif`
    /// conditions are. Error spans are relative to `text`.
    pub fn parse_bool_expression(&mut self, text: &str) -> Option<bool> {
        if text.trim().is_empty() {
            self.add_error(Diagnostic::semantic("Empty expression.", 0, 1));
            return None;
        }
        let chars: Vec<char> = text.chars().collect();
        let result = {
            let context = self.eval_context();
            let mut lexer = Lexer::new(&chars, self.functions(), &context);
            lexer.parse_boolean().and_then(|value| {
                let end_index = lexer.pos();
                lexer.skip_whitespace();
                if lexer.available() {
                    Err(Diagnostic::syntax(
                        "Garbage at end of expression",
                        end_index,
                        chars.len(),
                    ))
                } else {
                    Ok(value)
                }
            })
        };
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.add_error(error);
                None
            }
        }
    }

    /// Parses a signed 32-bit integer.
    ///
    /// Values in `(i32::MAX, u32::MAX]` wrap through two's complement, so
    /// `0xFFFFFFFF` reads as -1 the way hex flag literals expect; anything
    /// beyond 32 bits in either direction is a range error.
    pub fn parse_int(&mut self, args: &Arguments, index: usize) -> Option<i32> {
        let value = self.eval_in_argument(args, index, "an int", |lexer| lexer.parse_integer())?;
        if (value & 0xFFFF_FFFF) != value {
            if value > i64::from(i32::MAX) {
                self.add_error(args.error("Maximum integer value is 2147483647.", index));
                return None;
            }
            if value < i64::from(i32::MIN) {
                self.add_error(args.error("Minimum integer value is -2147483648.", index));
                return None;
            }
        }
        Some(value as i32)
    }

    pub fn parse_int_ranged(
        &mut self,
        args: &Arguments,
        index: usize,
        min: i32,
        max: i32,
    ) -> Option<i32> {
        let value = self.eval_in_argument(args, index, "an int", |lexer| lexer.parse_integer())?;
        if value < i64::from(min) || value > i64::from(max) {
            self.add_error(args.error(format!("Integer out of the range ({min}, {max})."), index));
            return None;
        }
        Some(value as i32)
    }

    pub fn parse_uint(&mut self, args: &Arguments, index: usize) -> Option<u32> {
        let value = self.eval_in_argument(args, index, "a uint", |lexer| lexer.parse_integer())?;
        if value > i64::from(u32::MAX) {
            self.add_error(args.error("Maximum unsigned integer value is 4294967295.", index));
            return None;
        }
        if value < 0 {
            self.add_error(args.error("Minimum integer value is 0.", index));
            return None;
        }
        Some(value as u32)
    }

    pub fn parse_uint_ranged(
        &mut self,
        args: &Arguments,
        index: usize,
        min: u32,
        max: u32,
    ) -> Option<u32> {
        let value = self.eval_in_argument(args, index, "a uint", |lexer| lexer.parse_integer())?;
        if value < i64::from(min) || value > i64::from(max) {
            self.add_error(args.error(
                format!("Unsigned integer out of the range ({min}, {max})."),
                index,
            ));
            return None;
        }
        Some(value as u32)
    }

    pub fn parse_byte(&mut self, args: &Arguments, index: usize) -> Option<i8> {
        self.parse_int_ranged(args, index, -128, 127).map(|v| v as i8)
    }

    pub fn parse_ubyte(&mut self, args: &Arguments, index: usize) -> Option<u8> {
        self.parse_uint_ranged(args, index, 0, 255).map(|v| v as u8)
    }

    pub fn parse_short(&mut self, args: &Arguments, index: usize) -> Option<i16> {
        self.parse_int_ranged(args, index, -32768, 32767)
            .map(|v| v as i16)
    }

    pub fn parse_ushort(&mut self, args: &Arguments, index: usize) -> Option<u16> {
        self.parse_uint_ranged(args, index, 0, 65535)
            .map(|v| v as u16)
    }

    /// Parses a full 64-bit integer. Expressions are not supported here;
    /// the argument is read as a plain literal.
    pub fn parse_long(&mut self, args: &Arguments, index: usize) -> Option<i64> {
        if index >= args.len() {
            let (start, end) = arguments_span(args);
            self.add_error(Diagnostic::semantic(
                format!("Expected a 64-bit int at argument position {index}."),
                start,
                end,
            ));
            return None;
        }
        match args.get(index).trim().parse::<i64>() {
            Ok(value) => Some(value),
            Err(_) => {
                self.add_error(args.error("Invalid number format.", index));
                None
            }
        }
    }

    pub fn parse_float(&mut self, args: &Arguments, index: usize) -> Option<f32> {
        self.eval_in_argument(args, index, "a float", |lexer| {
            Ok(lexer.parse_float()? as f32)
        })
    }

    pub fn parse_float_ranged(
        &mut self,
        args: &Arguments,
        index: usize,
        min: f32,
        max: f32,
    ) -> Option<f32> {
        let value = self.parse_float(args, index)?;
        if value < min || value > max {
            self.add_error(args.error(
                format!("Real number out of the range ({min}, {max})."),
                index,
            ));
            return None;
        }
        Some(value)
    }

    pub fn parse_double(&mut self, args: &Arguments, index: usize) -> Option<f64> {
        self.eval_in_argument(args, index, "a double", |lexer| lexer.parse_float())
    }

    /// Parses `x, y`; a single value broadcasts to both components.
    pub fn parse_vector2(&mut self, args: &Arguments, index: usize) -> Option<[f32; 2]> {
        self.eval_in_argument(args, index, "a Vector2", |lexer| {
            let x = lexer.parse_float()? as f32;
            if !lexer.optional_expect(',')? {
                return Ok([x, x]);
            }
            let y = lexer.parse_float()? as f32;
            Ok([x, y])
        })
    }

    /// Parses `x, y, z`; a single value broadcasts to all components.
    pub fn parse_vector3(&mut self, args: &Arguments, index: usize) -> Option<[f32; 3]> {
        self.eval_in_argument(args, index, "a Vector3", |lexer| {
            let x = lexer.parse_float()? as f32;
            if !lexer.optional_expect(',')? {
                return Ok([x, x, x]);
            }
            let y = lexer.parse_float()? as f32;
            lexer.expect_msg(',', "Expected ',' (three values are required).")?;
            let z = lexer.parse_float()? as f32;
            Ok([x, y, z])
        })
    }

    /// Parses `x, y, z, w`; a single value broadcasts to all components.
    pub fn parse_vector4(&mut self, args: &Arguments, index: usize) -> Option<[f32; 4]> {
        self.eval_in_argument(args, index, "a Vector4", |lexer| {
            let x = lexer.parse_float()? as f32;
            if !lexer.optional_expect(',')? {
                return Ok([x, x, x, x]);
            }
            let y = lexer.parse_float()? as f32;
            lexer.expect_msg(',', "Expected ',' (four values are required).")?;
            let z = lexer.parse_float()? as f32;
            lexer.expect_msg(',', "Expected ',' (four values are required).")?;
            let w = lexer.parse_float()? as f32;
            Ok([x, y, z, w])
        })
    }

    /// Parses `r, g, b` in `0.0..=1.0`; a single value broadcasts. Adds a
    /// color hyperlink over the argument.
    pub fn parse_color_rgb(&mut self, args: &Arguments, index: usize) -> Option<Rgb> {
        let color = self.eval_in_argument(args, index, "a ColorRGB", |lexer| {
            let r = lexer.parse_float()? as f32;
            if !lexer.optional_expect(',')? {
                return Ok(Rgb::new(r, r, r));
            }
            let g = lexer.parse_float()? as f32;
            lexer.expect_msg(',', "Expected ',' (three values are required).")?;
            let b = lexer.parse_float()? as f32;
            Ok(Rgb::new(r, g, b))
        })?;
        let (start, end) = args.span(index);
        self.add_hyperlink(HYPERLINK_COLOR, color.to_string(), start, end);
        Some(color)
    }

    /// Like [`Stream::parse_color_rgb`] with components written in
    /// `0..=255`.
    pub fn parse_color_rgb255(&mut self, args: &Arguments, index: usize) -> Option<Rgb> {
        let color = self.parse_color_rgb(args, index)?;
        Some(Rgb::new(color.r / 255.0, color.g / 255.0, color.b / 255.0))
    }

    /// Parses `r, g, b` or `r, g, b, a` in `0.0..=1.0`; a missing alpha
    /// defaults to 1. Adds a color hyperlink over the argument.
    pub fn parse_color_rgba(&mut self, args: &Arguments, index: usize) -> Option<Rgba> {
        let color = self.eval_in_argument(args, index, "a ColorRGBA", |lexer| {
            let r = lexer.parse_float()? as f32;
            lexer.expect_msg(',', "Expected ',' (three or four values are required).")?;
            let g = lexer.parse_float()? as f32;
            lexer.expect_msg(',', "Expected ',' (three or four values are required).")?;
            let b = lexer.parse_float()? as f32;
            let a = if lexer.optional_expect(',')? {
                lexer.parse_float()? as f32
            } else {
                1.0
            };
            Ok(Rgba::new(r, g, b, a))
        })?;
        let (start, end) = args.span(index);
        self.add_hyperlink(HYPERLINK_COLOR, color.to_string(), start, end);
        Some(color)
    }

    /// Like [`Stream::parse_color_rgba`] with components written in
    /// `0..=255`; a missing alpha defaults to 255.
    pub fn parse_color_rgba255(&mut self, args: &Arguments, index: usize) -> Option<Rgba> {
        let color = self.eval_in_argument(args, index, "a ColorRGBA", |lexer| {
            let r = lexer.parse_float()? as f32;
            lexer.expect_msg(',', "Expected ',' (three or four values are required).")?;
            let g = lexer.parse_float()? as f32;
            lexer.expect_msg(',', "Expected ',' (three or four values are required).")?;
            let b = lexer.parse_float()? as f32;
            let a = if lexer.optional_expect(',')? {
                lexer.parse_float()? as f32
            } else {
                255.0
            };
            Ok(Rgba::new(r / 255.0, g / 255.0, b / 255.0, a / 255.0))
        })?;
        let (start, end) = args.span(index);
        self.add_hyperlink(HYPERLINK_COLOR, color.to_string(), start, end);
        Some(color)
    }

    /// Parses every argument as an int.
    pub fn parse_ints(&mut self, args: &Arguments) -> Option<Vec<i32>> {
        (0..args.len()).map(|i| self.parse_int(args, i)).collect()
    }

    /// Parses every argument as a float.
    pub fn parse_floats(&mut self, args: &Arguments) -> Option<Vec<f32>> {
        (0..args.len()).map(|i| self.parse_float(args, i)).collect()
    }

    /// Parses every argument as a float written in `0..=255`.
    pub fn parse_float255s(&mut self, args: &Arguments) -> Option<Vec<f32>> {
        (0..args.len())
            .map(|i| self.parse_float(args, i).map(|v| v / 255.0))
            .collect()
    }

    /// Parses every argument as an RGB color.
    pub fn parse_colors(&mut self, args: &Arguments) -> Option<Vec<Rgb>> {
        (0..args.len())
            .map(|i| self.parse_color_rgb(args, i))
            .collect()
    }

    /// Parses an argument as a file identifier: `0x` and `#` prefixes read
    /// as hexadecimal, anything else is hashed.
    pub fn parse_file_id(&mut self, args: &Arguments, index: usize) -> Option<u32> {
        if index >= args.len() {
            let (start, end) = arguments_span(args);
            self.add_error(Diagnostic::semantic(
                format!("Expected a file identifier at argument position {index}."),
                start,
                end,
            ));
            return None;
        }
        match self.file_hash(args.get(index).trim()) {
            Ok(hash) => Some(hash),
            Err(message) => {
                self.add_error(args.error(message, index));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::Line;
    use crate::trace::PositionMap;

    fn stream() -> Stream<()> {
        Stream::new(())
    }

    fn line(text: &str) -> Line {
        Line::parse(text, PositionMap::new()).unwrap()
    }

    #[test]
    fn int_wraps_through_32_bits() {
        let mut stream = stream();
        let line = line("cmd 0xFFFFFFFF");
        let args = line.get_arguments(1).unwrap();
        assert_eq!(stream.parse_int(&args, 0), Some(-1));
        assert!(stream.errors().is_empty());
    }

    #[test]
    fn int_range_errors() {
        let mut stream = stream();
        let over = line("cmd (0x80000000 * 4)");
        let args = over.get_arguments(1).unwrap();
        assert_eq!(stream.parse_int(&args, 0), None);
        assert_eq!(
            stream.errors()[0].message,
            "Maximum integer value is 2147483647."
        );

        let under = line("cmd (0 - 2147483649)");
        let args = under.get_arguments(1).unwrap();
        assert_eq!(stream.parse_int(&args, 0), None);
        assert_eq!(
            stream.errors()[1].message,
            "Minimum integer value is -2147483648."
        );
    }

    #[test]
    fn uint_rejects_negatives() {
        let mut stream = stream();
        let negative = line("cmd (0 - 1)");
        let args = negative.get_arguments(1).unwrap();
        assert_eq!(stream.parse_uint(&args, 0), None);
        assert_eq!(stream.errors()[0].message, "Minimum integer value is 0.");
    }

    #[test]
    fn ranged_parsers() {
        let mut stream = stream();
        let ok = line("cmd 100");
        let args = ok.get_arguments(1).unwrap();
        assert_eq!(stream.parse_byte(&args, 0), Some(100));
        assert_eq!(stream.parse_ubyte(&args, 0), Some(100));

        let big = line("cmd 200");
        let args = big.get_arguments(1).unwrap();
        assert_eq!(stream.parse_byte(&args, 0), None);
        assert_eq!(
            stream.errors()[0].message,
            "Integer out of the range (-128, 127)."
        );
        assert_eq!(stream.parse_ubyte(&args, 0), Some(200));
    }

    #[test]
    fn short_parsers() {
        let mut stream = stream();
        let ok = line("cmd 40000");
        let args = ok.get_arguments(1).unwrap();
        assert_eq!(stream.parse_short(&args, 0), None);
        assert_eq!(
            stream.errors()[0].message,
            "Integer out of the range (-32768, 32767)."
        );
        assert_eq!(stream.parse_ushort(&args, 0), Some(40000));

        let negative = line("cmd (0 - 40000)");
        let args = negative.get_arguments(1).unwrap();
        assert_eq!(stream.parse_ushort(&args, 0), None);
        assert_eq!(
            stream.errors()[1].message,
            "Unsigned integer out of the range (0, 65535)."
        );
    }

    #[test]
    fn missing_argument_position() {
        let mut stream = stream();
        let line = line("cmd 1");
        let args = line.get_arguments(1).unwrap();
        assert_eq!(stream.parse_int(&args, 1), None);
        assert_eq!(
            stream.errors()[0].message,
            "Expected an int at argument position 1."
        );
    }

    #[test]
    fn garbage_after_expression_is_rebased() {
        let mut stream = stream();
        let line = line("cmd 12garbage");
        let args = line.get_arguments(1).unwrap();
        assert_eq!(stream.parse_int(&args, 0), None);
        let error = &stream.errors()[0];
        assert_eq!(error.message, "Garbage at end of expression");
        // The argument starts at char 4; the garbage starts 2 chars in.
        assert_eq!((error.start, error.end), (6, 13));
    }

    #[test]
    fn empty_expression() {
        let mut stream = stream();
        let line = line("cmd \"\"");
        let args = line.get_arguments(1).unwrap();
        assert_eq!(stream.parse_int(&args, 0), None);
        assert_eq!(stream.errors()[0].message, "Empty expression.");
    }

    #[test]
    fn long_reads_plain_literals() {
        let mut stream = stream();
        let line = line("cmd 123456789012345");
        let args = line.get_arguments(1).unwrap();
        assert_eq!(stream.parse_long(&args, 0), Some(123456789012345));
    }

    #[test]
    fn vectors_broadcast_single_values() {
        let mut stream = stream();
        let single = line("cmd 2");
        let args = single.get_arguments(1).unwrap();
        assert_eq!(stream.parse_vector2(&args, 0), Some([2.0, 2.0]));
        assert_eq!(stream.parse_vector3(&args, 0), Some([2.0, 2.0, 2.0]));
        assert_eq!(stream.parse_vector4(&args, 0), Some([2.0; 4]));

        let full = line("cmd (1, 2, 3)");
        let args = full.get_arguments(1).unwrap();
        assert_eq!(stream.parse_vector3(&args, 0), Some([1.0, 2.0, 3.0]));
        assert!(stream.errors().is_empty());
    }

    #[test]
    fn vector3_requires_three_values() {
        let mut stream = stream();
        let line = line("cmd (1, 2)");
        let args = line.get_arguments(1).unwrap();
        assert_eq!(stream.parse_vector3(&args, 0), None);
        assert_eq!(
            stream.errors()[0].message,
            "Expected ',' (three values are required)."
        );
    }

    #[test]
    fn colors_and_hyperlinks() {
        let mut stream = stream();
        let line = line("cmd (0.1, 0.2, 0.3) 0.5");
        let args = line.get_arguments(2).unwrap();
        assert_eq!(
            stream.parse_color_rgb(&args, 0),
            Some(Rgb::new(0.1, 0.2, 0.3))
        );
        // Broadcast, and the hyperlink renders the expanded color.
        assert_eq!(
            stream.parse_color_rgb(&args, 1),
            Some(Rgb::new(0.5, 0.5, 0.5))
        );
        assert_eq!(stream.hyperlinks().len(), 2);
        assert_eq!(stream.hyperlinks()[1].value, "(0.5, 0.5, 0.5)");
        assert_eq!(stream.hyperlinks()[1].kind, HYPERLINK_COLOR);
    }

    #[test]
    fn rgba_alpha_defaults_to_one() {
        let mut stream = stream();
        let line = line("cmd (1, 0, 0)");
        let args = line.get_arguments(1).unwrap();
        assert_eq!(
            stream.parse_color_rgba(&args, 0),
            Some(Rgba::new(1.0, 0.0, 0.0, 1.0))
        );
    }

    #[test]
    fn rgba_requires_three_components() {
        let mut stream = stream();
        let line = line("cmd (1, 0)");
        let args = line.get_arguments(1).unwrap();
        assert_eq!(stream.parse_color_rgba(&args, 0), None);
        assert_eq!(
            stream.errors()[0].message,
            "Expected ',' (three or four values are required)."
        );
    }

    #[test]
    fn color255_scales_down() {
        let mut stream = stream();
        let line = line("cmd (255, 0, 0)");
        let args = line.get_arguments(1).unwrap();
        assert_eq!(
            stream.parse_color_rgb255(&args, 0),
            Some(Rgb::new(1.0, 0.0, 0.0))
        );
        assert_eq!(
            stream.parse_color_rgba255(&args, 0),
            Some(Rgba::new(1.0, 0.0, 0.0, 1.0))
        );
    }

    #[test]
    fn list_parsers_stop_at_the_first_failure() {
        let mut stream = stream();
        let line = line("cmd 1 2 3");
        let args = line.get_arguments(3).unwrap();
        assert_eq!(stream.parse_ints(&args), Some(vec![1, 2, 3]));
        assert_eq!(stream.parse_floats(&args), Some(vec![1.0, 2.0, 3.0]));

        let bad = Line::parse("cmd 1 x 3", PositionMap::new()).unwrap();
        let args = bad.get_arguments(3).unwrap();
        assert_eq!(stream.parse_ints(&args), None);
        assert_eq!(stream.errors().len(), 1);
    }

    #[test]
    fn file_ids() {
        let mut stream = stream();
        let line = line("cmd 0xABCD creature");
        let args = line.get_arguments(2).unwrap();
        assert_eq!(stream.parse_file_id(&args, 0), Some(0xABCD));
        let hashed = stream.file_hash("creature").unwrap();
        assert_eq!(stream.parse_file_id(&args, 1), Some(hashed));
    }

    #[test]
    fn bool_expressions() {
        let mut stream = stream();
        let line = line("cmd true (1 == 2)");
        let args = line.get_arguments(2).unwrap();
        assert_eq!(stream.parse_bool(&args, 0), Some(true));
        assert_eq!(stream.parse_bool(&args, 1), Some(false));
        assert_eq!(stream.parse_bool_expression("3 > 2 and not false"), Some(true));
    }
}
