//! Command handlers
//!
//! Every line keyword dispatches to a handler registered on the stream.
//! There are three kinds:
//!
//! * [`Command`]: a plain one-line command.
//! * [`Block`]: a command that opens a block closed by `end`; the stream
//!   pushes it onto the block stack and notifies it when the block closes.
//! * [`SpecialBlock`]: a block that sees every raw line of its body before
//!   normal processing and decides what happens to it. Conditional
//!   compilation and macro definitions are special blocks: a skipped `if`
//!   branch and a `define` body must not be parsed as commands.
//!
//! Special blocks are not registered directly. Their keyword is a plain
//! [`Command`] that evaluates the opening line and pushes a fresh instance
//! with [`Stream::start_special_block`], so nesting the same keyword never
//! shares state between the inner and outer block.
//!
//! Commands are plain `Rc` values and parse through `&self`. A command may
//! re-enter the stream (`eval` and macro instantiation do), and a handler
//! borrowed mutably during its own re-entrant dispatch would abort.

use std::cell::RefCell;
use std::rc::Rc;

use crate::line::Line;
use crate::stream::Stream;

/// A handler for a one-line command.
///
/// Implemented for closures, so simple commands can be registered without a
/// named type. State belongs on the stream's target data, not the handler.
pub trait Command<T> {
    fn parse(&self, stream: &mut Stream<T>, line: &Line);
}

impl<T, F> Command<T> for F
where
    F: Fn(&mut Stream<T>, &Line),
{
    fn parse(&self, stream: &mut Stream<T>, line: &Line) {
        self(stream, line)
    }
}

/// A handler for a command that opens a block.
///
/// `parse` receives the line that opens the block; the stream then pushes
/// the handler onto the block stack until the matching `end`.
pub trait Block<T> {
    fn parse(&mut self, stream: &mut Stream<T>, line: &Line);

    /// A handler for a keyword that only exists inside this block. While the
    /// block is open these take priority over the stream's own table.
    fn scope_handler(&self, _keyword: &str) -> Option<Handler<T>> {
        None
    }

    /// Called when the matching `end` closes the block.
    fn on_block_end(&mut self, _stream: &mut Stream<T>) {}
}

/// What a special block decided to do with a raw line of its body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecialAction {
    /// The block swallowed the line; the stream moves on.
    Consumed,
    /// The line goes through normal processing.
    PassThrough,
    /// The line closed the block; the stream pops it and calls
    /// [`SpecialBlock::on_block_end`].
    End,
}

/// A block that intercepts the raw lines of its body.
///
/// While a special block tops the special stack the stream hands it each
/// comment-stripped line before substitution or tokenization. The block owns
/// the detection of its own end keyword, so nested occurrences inside
/// skipped text can be counted instead of closing the wrong block.
pub trait SpecialBlock<T> {
    /// `first_word` is the first whitespace-delimited word of `text`, empty
    /// for blank lines.
    fn process_line(&mut self, stream: &mut Stream<T>, text: &str, first_word: &str)
        -> SpecialAction;

    /// Called when the line that returned [`SpecialAction::End`] pops the
    /// block.
    fn on_block_end(&mut self, _stream: &mut Stream<T>) {}
}

/// A registered handler. Cloning shares the underlying instance.
pub enum Handler<T> {
    Command(Rc<dyn Command<T>>),
    Block(Rc<RefCell<dyn Block<T>>>),
}

impl<T> Handler<T> {
    pub fn command(command: impl Command<T> + 'static) -> Self {
        Handler::Command(Rc::new(command))
    }

    pub fn block(block: impl Block<T> + 'static) -> Self {
        Handler::Block(Rc::new(RefCell::new(block)))
    }

    /// Whether dispatching this handler pushes the block stack.
    pub fn is_block(&self) -> bool {
        matches!(self, Handler::Block(_))
    }
}

// Derived Clone would require T: Clone.
impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        match self {
            Handler::Command(command) => Handler::Command(Rc::clone(command)),
            Handler::Block(block) => Handler::Block(Rc::clone(block)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloned_handlers_share_the_instance() {
        let handler: Handler<()> = Handler::command(|_: &mut Stream<()>, _: &Line| {});
        let clone = handler.clone();
        match (&handler, &clone) {
            (Handler::Command(a), Handler::Command(b)) => assert!(Rc::ptr_eq(a, b)),
            _ => unreachable!(),
        }
        assert!(!handler.is_block());
    }
}
