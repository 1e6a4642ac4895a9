//! # The ArgScript engine
//!
//! ArgScript is a line-oriented configuration language: every line is a
//! command made of a keyword, whitespace-separated arguments, and dashed
//! options. This crate contains the language engine itself: comment
//! stripping, variable substitution, tokenization, expression evaluation,
//! block nesting, macro definitions, and the diagnostics that editors need
//! to report errors at their original source positions.
//!
//! The engine is generic over a target type `T`: command handlers mutate the
//! target while the [`stream::Stream`] drives the per-line pipeline. The
//! built-in directives (`set`, `if`, `define`, `include`, ...) live in the
//! separate `argscript-stdlib` crate.

extern crate colored;

pub mod command;
pub mod definition;
pub mod diagnostics;
pub mod error;
pub mod lexer;
pub mod line;
mod parse;
pub mod stream;
pub mod trace;
pub mod words;

pub use command::{Block, Command, Handler, SpecialAction, SpecialBlock};
pub use error::{Category, Diagnostic};
pub use line::{Arguments, Line};
pub use parse::{Rgb, Rgba};
pub use stream::Stream;
