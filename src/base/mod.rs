//! Foundation types for the lexing engine.
//!
//! This module provides the small text-range types shared by the lexer,
//! the tree builder, and the worker:
//! - [`Change`] - a replaced range in the text (byte offsets)
//! - [`PendingChanges`] - coalesced edits waiting for a rebuild
//!
//! This module has NO dependencies on other relex modules.

mod change;

pub use change::{Change, PendingChanges};
