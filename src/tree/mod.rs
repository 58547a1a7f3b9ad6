//! The token tree: tokens, contexts, and the builder that keeps them
//! up to date across edits.

pub mod builder;

mod node;

pub use node::{Context, ContextId, Node, Token, Tokens};
