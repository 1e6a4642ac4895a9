//! Conditional compilation: `if` / `elseif` / `else` / `endif`.
//!
//! `if` is a special block: lines in a branch that was not taken must be
//! swallowed before normal processing, or a skipped branch full of commands
//! for another dialect would drown the script in errors. Each `if` pushes
//! its own block instance, and the block counts nested `if`/`endif` pairs
//! inside skipped text so an inner `endif` cannot close the outer block.
//!
//! The `if` condition is a single argument, so compound conditions are
//! parenthesized: `if ($x == 2 and varExists(y))`. An `elseif` takes the
//! raw rest of its line instead and evaluates its own condition at the
//! moment it is reached, after variable substitution.

use argscript::diagnostics::{SYNTAX_BLOCK, SYNTAX_COMMAND};
use argscript::{Handler, Line, SpecialAction, SpecialBlock, Stream};

use crate::arguments;

pub fn add_commands<T: 'static>(stream: &mut Stream<T>) {
    stream.add_parser(
        "if",
        Handler::command(|stream: &mut Stream<T>, line: &Line| {
            let mut meets_condition = false;
            if let Some(args) = arguments(stream, line, 1) {
                if stream.parse_bool(&args, 0) == Some(true) {
                    meets_condition = true;
                }
            }
            stream.start_special_block(IfBlock {
                meets_condition,
                ignore_the_rest: false,
                depth: 0,
            });
        }),
    );
}

struct IfBlock {
    /// Whether the current branch is the taken one.
    meets_condition: bool,
    /// Set once a taken branch ends; every later branch is skipped.
    ignore_the_rest: bool,
    /// Nesting depth of `if` blocks inside skipped text.
    depth: usize,
}

impl IfBlock {
    fn active(&self) -> bool {
        self.meets_condition && !self.ignore_the_rest
    }
}

impl<T> SpecialBlock<T> for IfBlock {
    fn process_line(&mut self, stream: &mut Stream<T>, text: &str, first_word: &str) -> SpecialAction {
        match first_word {
            "endif" => {
                if self.depth == 0 {
                    return SpecialAction::End;
                }
                self.depth -= 1;
                SpecialAction::Consumed
            }
            // An `if` in the taken branch passes through and pushes its own
            // block; one in skipped text is only counted.
            "if" if !self.active() => {
                self.depth += 1;
                SpecialAction::Consumed
            }
            "elseif" if self.depth == 0 => {
                style_branch_keyword(stream, text, first_word);
                if self.meets_condition {
                    self.meets_condition = false;
                    self.ignore_the_rest = true;
                } else if !self.ignore_the_rest {
                    let condition = text_after_keyword(text, first_word);
                    if let Some(substituted) = stream.replace_variables(&condition) {
                        if stream.parse_bool_expression(&substituted) == Some(true) {
                            self.meets_condition = true;
                        }
                    }
                }
                SpecialAction::Consumed
            }
            "else" if self.depth == 0 => {
                style_branch_keyword(stream, text, first_word);
                if self.meets_condition {
                    self.meets_condition = false;
                    self.ignore_the_rest = true;
                } else if !self.ignore_the_rest {
                    self.meets_condition = true;
                }
                SpecialAction::Consumed
            }
            _ if self.active() => SpecialAction::PassThrough,
            _ => SpecialAction::Consumed,
        }
    }
}

fn style_branch_keyword<T>(stream: &mut Stream<T>, text: &str, word: &str) {
    let start = text.chars().take_while(|c| c.is_whitespace()).count();
    let style = if word == "else" { SYNTAX_BLOCK } else { SYNTAX_COMMAND };
    stream.add_syntax(start, word.chars().count(), style);
}

fn text_after_keyword(text: &str, word: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i = (i + word.chars().count()).min(chars.len());
    chars[i..].iter().collect()
}
