//! Error types for grammar compilation and rule evaluation.

use thiserror::Error;

/// Structural problems in a grammar, detected at lexicon compilation or by
/// the validator.
///
/// These are the only errors surfaced to API users; a lexicon that fails to
/// compile stays invalid and returns the same error on every use.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GrammarError {
    /// A rule's regular expression failed to compile.
    #[error("invalid regex in {lexicon}: {pattern:?}: {message}")]
    InvalidRegex {
        lexicon: String,
        pattern: String,
        message: String,
    },

    /// A lexicon declared more than one default action.
    #[error("{lexicon}: conflicting default actions")]
    MultipleDefaultActions { lexicon: String },

    /// A lexicon declared more than one default target.
    #[error("{lexicon}: conflicting default targets")]
    MultipleDefaultTargets { lexicon: String },

    /// A lexicon declared both a default action and a default target.
    #[error("{lexicon}: can't have both a default action and a default target")]
    ConflictingDefaults { lexicon: String },

    /// A default action was declared per subgroup; defaults span arbitrary
    /// text and have no match groups.
    #[error("{lexicon}: default action can't be a per-group action")]
    GroupDefaultAction { lexicon: String },

    /// A lexicon name was not found in its language.
    #[error("language {language} has no lexicon {name:?}")]
    UnknownLexicon { language: String, name: String },

    /// A rules function failed.
    #[error("{lexicon}: rules function failed: {message}")]
    Rules { lexicon: String, message: String },
}

impl GrammarError {
    pub(crate) fn invalid_regex(
        lexicon: impl Into<String>,
        pattern: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        Self::InvalidRegex {
            lexicon: lexicon.into(),
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }
}

/// A dynamic rule item failed to evaluate at match time.
///
/// Never surfaced through the API: the lexer logs it, skips the offending
/// rule, and continues at the next position.
#[derive(Debug, Error, Clone)]
#[error("{0}")]
pub(crate) struct LexError(pub(crate) String);

impl LexError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
