//! Incremental lexing engine.
//!
//! `relex` tokenizes text against user-defined, context-sensitive grammars
//! and maintains a tree of tokens across small interactive edits, without
//! re-tokenizing the whole buffer.
//!
//! The main entry points:
//!
//! - define a [`Language`] with one or more lexicons (sets of regex rules),
//! - build a token tree with a [`TreeBuilder`],
//! - keep it updated from a background thread with a [`Worker`].
//!
//! ```
//! use relex::{actions, GrammarRule, Language, TreeBuilder};
//!
//! # fn main() -> Result<(), relex::GrammarError> {
//! let lang = Language::builder("Example")
//!     .lexicon("root", |_| {
//!         Ok(vec![
//!             GrammarRule::new(r"\d+", actions::NUMBER),
//!             GrammarRule::new(r"\w+", actions::TEXT),
//!         ])
//!     })
//!     .build();
//!
//! let mut builder = TreeBuilder::new(lang.lexicon("root")?);
//! let tree = builder.tree("some text with 3 numbers")?;
//! assert_eq!(tree.tokens().count(), 5);
//! # Ok(())
//! # }
//! ```

pub mod base;
pub mod grammar;
pub mod lex;
pub mod tree;
pub mod worker;

// Re-export commonly needed items
pub use base::Change;
pub use grammar::{
    actions, rule, validate_language, Action, ActionSpec, GrammarError, GrammarRule, Language,
    LanguageBuilder, Lexicon, LexiconOpts, ReFlags, TargetItem,
};
pub use lex::{Event, Lexeme, Lexer, TargetDelta};
pub use tree::builder::{BuildEvent, EventKind, TreeBuilder};
pub use tree::{Context, ContextId, Node, Token};
pub use worker::transform::{TransformItem, TransformRunner, Transformer};
pub use worker::Worker;
