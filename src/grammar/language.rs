//! Languages: named namespaces grouping lexicons.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use indexmap::IndexMap;
use once_cell::sync::OnceCell;

use super::lexicon::{Lexicon, LexiconData, LexiconOpts, RuleCtx, RulesFn};
use super::{GrammarError, GrammarRule};

/// A definition of one lexicon inside a language.
#[derive(Clone)]
pub(crate) struct LexiconDef {
    pub(crate) rules: RulesFn,
    pub(crate) opts: LexiconOpts,
}

pub(crate) struct LanguageData {
    name: Arc<str>,
    defs: IndexMap<Arc<str>, LexiconDef>,
    /// Instance cache: `(name, arg)` -> lexicon. Weak so a language and its
    /// lexicons don't keep each other alive in a cycle.
    cache: Mutex<HashMap<(Arc<str>, Option<Arc<str>>), Weak<LexiconData>>>,
}

impl LanguageData {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

/// A named grammar: a set of lexicon definitions.
///
/// A language is only a scope; all lexing state lives in [`Lexicon`]
/// handles resolved from it. Build one with [`Language::builder`]; an
/// existing language can be extended with
/// [`LanguageBuilder::inherit`], overriding individual lexicons.
#[derive(Clone)]
pub struct Language {
    data: Arc<LanguageData>,
}

impl Language {
    pub fn builder(name: impl Into<Arc<str>>) -> LanguageBuilder {
        LanguageBuilder {
            name: name.into(),
            defs: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    /// Resolve a lexicon by name (without argument).
    pub fn lexicon(&self, name: &str) -> Result<Lexicon, GrammarError> {
        resolve(&self.data, name, None)
    }

    /// The declared lexicon names, in declaration order.
    pub fn lexicon_names(&self) -> impl Iterator<Item = &str> {
        self.data.defs.keys().map(|k| k.as_ref())
    }
}

impl std::fmt::Debug for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Language")
            .field("name", &self.name())
            .field("lexicons", &self.data.defs.len())
            .finish()
    }
}

/// Resolve `(name, arg)` against a language, erroring on unknown names.
pub(crate) fn resolve(
    data: &Arc<LanguageData>,
    name: &str,
    arg: Option<Arc<str>>,
) -> Result<Lexicon, GrammarError> {
    let Some((key, _)) = data.defs.get_key_value(name) else {
        return Err(GrammarError::UnknownLexicon {
            language: data.name.to_string(),
            name: name.to_string(),
        });
    };
    let key = key.clone();
    Ok(instantiate(data, &key, arg))
}

/// Get or create the shared instance for `(name, arg)`. The name must be
/// a declared lexicon.
pub(crate) fn instantiate(
    data: &Arc<LanguageData>,
    name: &Arc<str>,
    arg: Option<Arc<str>>,
) -> Lexicon {
    let mut cache = match data.cache.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let key = (name.clone(), arg.clone());
    if let Some(existing) = cache.get(&key).and_then(Weak::upgrade) {
        return Lexicon { data: existing };
    }
    let def = data.defs[name].clone();
    let lexicon = Arc::new(LexiconData {
        language: data.clone(),
        name: name.clone(),
        arg,
        def,
        compiled: OnceCell::new(),
    });
    cache.insert(key, Arc::downgrade(&lexicon));
    Lexicon { data: lexicon }
}

/// Builds a [`Language`] from lexicon definitions.
pub struct LanguageBuilder {
    name: Arc<str>,
    defs: IndexMap<Arc<str>, LexiconDef>,
}

impl LanguageBuilder {
    /// Copy all lexicon definitions from `base`; later definitions with
    /// the same name override the inherited ones.
    pub fn inherit(mut self, base: &Language) -> Self {
        for (name, def) in &base.data.defs {
            self.defs.insert(name.clone(), def.clone());
        }
        self
    }

    /// Define a lexicon with default options.
    pub fn lexicon<F>(self, name: impl Into<Arc<str>>, rules: F) -> Self
    where
        F: Fn(&RuleCtx<'_>) -> Result<Vec<GrammarRule>, GrammarError> + Send + Sync + 'static,
    {
        self.lexicon_with(name, LexiconOpts::new(), rules)
    }

    /// Define a lexicon with explicit options.
    pub fn lexicon_with<F>(
        mut self,
        name: impl Into<Arc<str>>,
        opts: LexiconOpts,
        rules: F,
    ) -> Self
    where
        F: Fn(&RuleCtx<'_>) -> Result<Vec<GrammarRule>, GrammarError> + Send + Sync + 'static,
    {
        self.defs.insert(
            name.into(),
            LexiconDef {
                rules: Arc::new(rules),
                opts,
            },
        );
        self
    }

    pub fn build(self) -> Language {
        Language {
            data: Arc::new(LanguageData {
                name: self.name,
                defs: self.defs,
                cache: Mutex::new(HashMap::new()),
            }),
        }
    }
}
