//! The regex layer: a lexicon's rules compiled into one alternation.
//!
//! Every rule pattern becomes one alternative, wrapped in a named group so
//! the matching rule can be identified from the captures. Capture indices
//! of the groups inside each pattern are tracked so per-group actions and
//! `match_group(n)` items can address them.

use regex::{Captures, Regex, RegexBuilder};

use super::lexicon::{Lexicon, ReFlags, RuleCtx};
use super::rule::{ActionSpec, RuleKind, TargetItem};
use super::GrammarError;

pub(crate) struct CompiledLexicon {
    /// The alternation; `None` when the lexicon has no pattern rules.
    regex: Option<Regex>,
    rules: Vec<CompiledRule>,
    pub(crate) default_action: Option<ActionSpec>,
    pub(crate) default_target: Option<Vec<TargetItem>>,
}

pub(crate) struct CompiledRule {
    pub(crate) action: ActionSpec,
    pub(crate) target: Vec<TargetItem>,
    /// Capture index of this rule's wrapper group in the alternation.
    group: usize,
    /// Number of capture groups inside the rule's own pattern.
    subgroups: usize,
}

/// One successful match of a lexicon's alternation.
pub(crate) struct RuleMatch<'t, 'c> {
    pub(crate) rule: &'c CompiledRule,
    caps: Captures<'t>,
}

impl<'t> RuleMatch<'t, '_> {
    pub(crate) fn start(&self) -> usize {
        // the wrapper group spans exactly the matched alternative
        self.caps
            .get(self.rule.group)
            .map_or(0, |m| m.start())
    }

    pub(crate) fn end(&self) -> usize {
        self.caps.get(self.rule.group).map_or(0, |m| m.end())
    }

    pub(crate) fn text(&self) -> &'t str {
        self.caps.get(self.rule.group).map_or("", |m| m.as_str())
    }

    /// Span of the rule's numbered group `n` (1-based), if it participated.
    pub(crate) fn group_span(&self, n: usize) -> Option<(usize, usize)> {
        if n == 0 || n > self.rule.subgroups {
            return None;
        }
        self.caps
            .get(self.rule.group + n)
            .map(|m| (m.start(), m.end()))
    }

    /// Texts of all the rule's numbered groups, for item evaluation.
    pub(crate) fn group_texts(&self) -> Vec<Option<&'t str>> {
        (1..=self.rule.subgroups)
            .map(|n| self.caps.get(self.rule.group + n).map(|m| m.as_str()))
            .collect()
    }
}

impl CompiledLexicon {
    /// Build the rules and compile the alternation. Called once per
    /// lexicon instance; the result (including an error) is cached.
    pub(crate) fn compile(lexicon: &Lexicon) -> Result<Self, GrammarError> {
        let ctx = RuleCtx { lexicon };
        let rule_list = (lexicon.data.def.rules)(&ctx)?;
        let flags = lexicon.re_flags();
        let name = lexicon.full_name();

        let mut patterns: Vec<String> = Vec::new();
        let mut rules: Vec<CompiledRule> = Vec::new();
        let mut default_action = None;
        let mut default_target = None;

        for rule in rule_list {
            match rule.kind {
                RuleKind::Match { pattern: None, .. } => {}
                RuleKind::Match {
                    pattern: Some(pattern),
                    action,
                    target,
                } => {
                    let single = build_regex(&pattern, flags).map_err(|e| {
                        GrammarError::invalid_regex(&name, &pattern, e)
                    })?;
                    rules.push(CompiledRule {
                        action,
                        target,
                        group: 0, // assigned below
                        subgroups: single.captures_len() - 1,
                    });
                    patterns.push(pattern);
                }
                RuleKind::DefaultAction(action) => {
                    if default_action.is_some() {
                        return Err(GrammarError::MultipleDefaultActions { lexicon: name });
                    }
                    if matches!(action, ActionSpec::ByGroup(_)) {
                        return Err(GrammarError::GroupDefaultAction { lexicon: name });
                    }
                    default_action = Some(action);
                }
                RuleKind::DefaultTarget(target) => {
                    if default_target.is_some() {
                        return Err(GrammarError::MultipleDefaultTargets { lexicon: name });
                    }
                    default_target = Some(target);
                }
            }
        }

        if default_action.is_some() && default_target.is_some() {
            return Err(GrammarError::ConflictingDefaults { lexicon: name });
        }

        let regex = if patterns.is_empty() {
            None
        } else {
            let mut index = 1;
            for rule in &mut rules {
                rule.group = index;
                index += 1 + rule.subgroups;
            }
            let alternation = patterns
                .iter()
                .enumerate()
                .map(|(i, p)| format!("(?P<g{i}>{p})"))
                .collect::<Vec<_>>()
                .join("|");
            Some(build_regex(&alternation, flags).map_err(|e| {
                GrammarError::invalid_regex(&name, &alternation, e)
            })?)
        };

        Ok(Self {
            regex,
            rules,
            default_action,
            default_target,
        })
    }

    /// Find the next match at or after `pos`, together with the rule it
    /// belongs to.
    pub(crate) fn find_from<'t, 'c>(
        &'c self,
        text: &'t str,
        pos: usize,
    ) -> Option<RuleMatch<'t, 'c>> {
        let regex = self.regex.as_ref()?;
        if pos > text.len() {
            return None;
        }
        let caps = regex.captures_at(text, pos)?;
        let rule = self.rules.iter().find(|r| caps.get(r.group).is_some())?;
        Some(RuleMatch { rule, caps })
    }
}

/// Whether `pattern` can match the empty string (validator check).
pub(crate) fn matches_empty(pattern: &str, flags: ReFlags) -> Result<bool, regex::Error> {
    Ok(build_regex(pattern, flags)?.is_match(""))
}

/// Number of capture groups inside `pattern` (validator check).
pub(crate) fn count_subgroups(pattern: &str, flags: ReFlags) -> Result<usize, regex::Error> {
    Ok(build_regex(pattern, flags)?.captures_len() - 1)
}

fn build_regex(pattern: &str, flags: ReFlags) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(flags.case_insensitive)
        .multi_line(flags.multi_line)
        .dot_matches_new_line(flags.dot_matches_new_line)
        .ignore_whitespace(flags.ignore_whitespace)
        .unicode(flags.unicode)
        .build()
}
