//! The lexer: a stack machine producing a linear stream of events.
//!
//! A [`Lexer`] holds a stack of active lexicons (bottom = root) and a
//! position into the text. Each step matches the top lexicon's compiled
//! alternation and yields an [`Event`]: the lexemes of the matched rule
//! plus the stack change its targets request. The event stream is a
//! lossless, linear representation of the lex; the tree builder folds it
//! into a token tree.

mod event;
mod lexer;

pub use event::{Event, Lexeme, TargetDelta};
pub use lexer::Lexer;
