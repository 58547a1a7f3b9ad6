//! Grammar model: languages, lexicons, rules, and dynamic rule items.
//!
//! A [`Language`] is a named namespace grouping lexicons. A [`Lexicon`] is
//! an ordered set of rules, lazily compiled into a single regex
//! alternation. A rule is a pattern, an action, and zero or more targets
//! that manipulate the lexicon stack while lexing.
//!
//! Rules can carry *dynamic items* ([`rule::TEXT`], [`rule::match_group`],
//! [`rule::ARG`], [`rule::call`], [`rule::select`]) that are evaluated
//! against the regex match when the rule fires.

pub mod actions;
pub mod rule;

mod action;
mod compiled;
mod error;
mod language;
mod lexicon;
mod validate;

pub use action::Action;
pub use error::GrammarError;
pub use language::{Language, LanguageBuilder};
pub use lexicon::{Lexicon, LexiconOpts, ReFlags, RuleCtx, RulesFn};
pub use rule::{ActionSpec, GrammarRule, Item, ItemFn, TargetItem, Value};
pub use validate::{validate_language, Finding, Severity};

pub(crate) use compiled::{CompiledLexicon, RuleMatch};
pub(crate) use error::LexError;
