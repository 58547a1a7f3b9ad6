//! Lexicons: named, lazily compiled rule sets bound to a language.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::compiled::CompiledLexicon;
use super::language::{self, LanguageData, LexiconDef};
use super::{GrammarError, GrammarRule};

/// Regex flags applied to a lexicon's compiled alternation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReFlags {
    pub case_insensitive: bool,
    pub multi_line: bool,
    pub dot_matches_new_line: bool,
    pub ignore_whitespace: bool,
    pub unicode: bool,
}

impl Default for ReFlags {
    fn default() -> Self {
        Self {
            case_insensitive: false,
            multi_line: false,
            dot_matches_new_line: false,
            ignore_whitespace: false,
            unicode: true,
        }
    }
}

impl ReFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    pub fn multi_line(mut self) -> Self {
        self.multi_line = true;
        self
    }

    pub fn dot_matches_new_line(mut self) -> Self {
        self.dot_matches_new_line = true;
        self
    }

    pub fn ignore_whitespace(mut self) -> Self {
        self.ignore_whitespace = true;
        self
    }
}

/// Options a lexicon is declared with.
#[derive(Debug, Clone, Default)]
pub struct LexiconOpts {
    pub(crate) re_flags: ReFlags,
    pub(crate) consume: bool,
}

impl LexiconOpts {
    pub fn new() -> Self {
        Self {
            re_flags: ReFlags::default(),
            consume: false,
        }
    }

    /// Tokens of the rule that pushes this lexicon are attributed to the
    /// child context instead of the pushing context.
    pub fn consume(mut self) -> Self {
        self.consume = true;
        self
    }

    pub fn re_flags(mut self, flags: ReFlags) -> Self {
        self.re_flags = flags;
        self
    }
}

/// The function producing a lexicon's rules.
///
/// Called once per lexicon instance (including each derived instance), when
/// the lexicon is first used. The [`RuleCtx`] gives access to the lexicon's
/// argument and to sibling lexicons for targets.
pub type RulesFn =
    Arc<dyn Fn(&RuleCtx<'_>) -> Result<Vec<GrammarRule>, GrammarError> + Send + Sync>;

/// Context passed to a rules function.
pub struct RuleCtx<'a> {
    pub(crate) lexicon: &'a Lexicon,
}

impl RuleCtx<'_> {
    /// The argument of the lexicon being built (set for derived lexicons).
    pub fn arg(&self) -> Option<&str> {
        self.lexicon.arg()
    }

    /// Resolve a sibling lexicon of the same language, without argument.
    pub fn lexicon(&self, name: &str) -> Result<Lexicon, GrammarError> {
        language::resolve(&self.lexicon.data.language, name, None)
    }
}

/// A cheap cloneable handle to a lexicon.
///
/// Identity is `(language, name, arg)`; resolving the same identity always
/// yields a handle to the same shared instance, so identity comparisons can
/// use pointer equality. Rules are built and compiled on first use and
/// cached (including a compile failure, which is returned again on every
/// subsequent use).
#[derive(Clone)]
pub struct Lexicon {
    pub(crate) data: Arc<LexiconData>,
}

pub(crate) struct LexiconData {
    pub(crate) language: Arc<LanguageData>,
    pub(crate) name: Arc<str>,
    pub(crate) arg: Option<Arc<str>>,
    pub(crate) def: LexiconDef,
    pub(crate) compiled: OnceCell<Result<CompiledLexicon, GrammarError>>,
}

impl Lexicon {
    /// The lexicon name within its language.
    pub fn name(&self) -> &str {
        &self.data.name
    }

    /// The `Language.lexicon` qualified name.
    pub fn full_name(&self) -> String {
        match self.arg() {
            Some(arg) => format!("{}.{}({:?})", self.data.language.name(), self.name(), arg),
            None => format!("{}.{}", self.data.language.name(), self.name()),
        }
    }

    /// The argument of a derived lexicon.
    pub fn arg(&self) -> Option<&str> {
        self.data.arg.as_deref()
    }

    pub fn consume(&self) -> bool {
        self.data.def.opts.consume
    }

    pub fn re_flags(&self) -> ReFlags {
        self.data.def.opts.re_flags
    }

    /// The lexicon with the same rules, instantiated with `arg`.
    ///
    /// Derived lexicons are cached: deriving the same argument twice yields
    /// the same instance. Deriving from an already derived lexicon rebases
    /// on the plain name.
    pub fn derive(&self, arg: &str) -> Lexicon {
        language::instantiate(&self.data.language, &self.data.name, Some(Arc::from(arg)))
    }

    /// Two handles to the same lexicon instance.
    pub fn same(&self, other: &Lexicon) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    pub(crate) fn compiled(&self) -> Result<&CompiledLexicon, GrammarError> {
        self.data
            .compiled
            .get_or_init(|| CompiledLexicon::compile(self))
            .as_ref()
            .map_err(Clone::clone)
    }
}

impl PartialEq for Lexicon {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data.language, &other.data.language)
            && self.data.name == other.data.name
            && self.data.arg == other.data.arg
    }
}

impl Eq for Lexicon {}

impl Hash for Lexicon {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data.language.name().hash(state);
        self.data.name.hash(state);
        self.data.arg.hash(state);
    }
}

impl fmt::Debug for Lexicon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

impl fmt::Display for Lexicon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}
