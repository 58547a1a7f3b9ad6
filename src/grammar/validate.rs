//! Offline grammar validation.
//!
//! [`validate_language`] walks every lexicon of a language and reports the
//! problems a grammar author most commonly runs into: invalid regular
//! expressions, patterns that can match the empty string, conflicting
//! defaults, and default-target chains that never consume text.

use std::collections::HashSet;
use std::fmt;

use super::lexicon::RuleCtx;
use super::rule::{ActionSpec, RuleKind, TargetItem};
use super::{Language, Lexicon};

/// How far a simulated default-target chain is followed before giving up.
const TARGET_CHAIN_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One validation finding.
#[derive(Debug, Clone)]
pub struct Finding {
    pub severity: Severity,
    /// Qualified name of the lexicon the finding belongs to.
    pub lexicon: String,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}: {}", tag, self.lexicon, self.message)
    }
}

/// Check every lexicon of a language. An empty result means the grammar
/// compiles and has no suspicious constructs.
pub fn validate_language(language: &Language) -> Vec<Finding> {
    let mut findings = Vec::new();
    for name in language.lexicon_names() {
        let lexicon = match language.lexicon(name) {
            Ok(lexicon) => lexicon,
            Err(e) => {
                findings.push(error(name, e));
                continue;
            }
        };
        validate_lexicon(&lexicon, &mut findings);
    }
    findings
}

fn error(lexicon: impl fmt::Display, message: impl fmt::Display) -> Finding {
    Finding {
        severity: Severity::Error,
        lexicon: lexicon.to_string(),
        message: message.to_string(),
    }
}

fn warning(lexicon: impl fmt::Display, message: impl fmt::Display) -> Finding {
    Finding {
        severity: Severity::Warning,
        lexicon: lexicon.to_string(),
        message: message.to_string(),
    }
}

fn validate_lexicon(lexicon: &Lexicon, findings: &mut Vec<Finding>) {
    let name = lexicon.full_name();

    // compiles the alternation, catching bad regexes and double defaults
    if let Err(e) = lexicon.compiled() {
        findings.push(error(&name, e));
    }

    // per-rule checks need the raw rules again
    let ctx = RuleCtx { lexicon };
    let rules = match (lexicon.data.def.rules)(&ctx) {
        Ok(rules) => rules,
        Err(e) => {
            findings.push(error(&name, e));
            return;
        }
    };

    let mut default_target = None;
    for rule in &rules {
        match &rule.kind {
            RuleKind::Match {
                pattern: Some(pattern),
                action,
                ..
            } => {
                match super::compiled::matches_empty(pattern, lexicon.re_flags()) {
                    Ok(true) => findings.push(warning(
                        &name,
                        format!("pattern {pattern:?} matches the empty string"),
                    )),
                    Ok(false) => {}
                    // reported by compiled() above
                    Err(_) => {}
                }
                if let ActionSpec::ByGroup(actions) = action {
                    if let Ok(count) =
                        super::compiled::count_subgroups(pattern, lexicon.re_flags())
                    {
                        if actions.len() != count {
                            findings.push(warning(
                                &name,
                                format!(
                                    "per-group action lists {} actions for {} groups",
                                    actions.len(),
                                    count
                                ),
                            ));
                        }
                    }
                }
            }
            RuleKind::DefaultTarget(target) => default_target = Some(target.clone()),
            _ => {}
        }
    }

    if let Some(target) = default_target {
        check_default_target(lexicon, &target, findings);
    }
}

/// Follow the default-target chain with a simulated stack; a chain that
/// never consumes text must either terminate or pop out.
fn check_default_target(lexicon: &Lexicon, target: &[TargetItem], findings: &mut Vec<Finding>) {
    let name = lexicon.full_name();
    let mut stack: Vec<Lexicon> = vec![lexicon.clone()];
    let mut target = target.to_vec();
    let mut visited: HashSet<Lexicon> = HashSet::new();

    for _ in 0..TARGET_CHAIN_LIMIT {
        let depth = stack.len();
        let prev_top = stack.last().cloned();
        for item in &target {
            match item {
                TargetItem::Jump(n) if *n < 0 => {
                    let n = (-*n) as usize;
                    if n >= stack.len() {
                        return; // pops out; the lexer clamps at the root
                    }
                    stack.truncate(stack.len() - n);
                }
                TargetItem::Jump(n) => {
                    let top = match stack.last() {
                        Some(top) => top.clone(),
                        None => return,
                    };
                    for _ in 0..*n {
                        stack.push(top.clone());
                    }
                }
                TargetItem::Push(l) => stack.push(l.clone()),
                // dynamic targets can't be followed statically
                TargetItem::Dynamic(_) => return,
            }
        }
        let top_unchanged = match (&prev_top, stack.last()) {
            (Some(a), Some(b)) => a.same(b),
            _ => true,
        };
        if stack.len() == depth && top_unchanged {
            findings.push(error(&name, "default target does not change the state"));
            return;
        }
        let Some(top) = stack.last().cloned() else {
            return;
        };
        if !visited.insert(top.clone()) {
            findings.push(error(
                &name,
                format!("circular default target via {top}"),
            ));
            return;
        }
        match next_default_target(&top) {
            Some(t) => target = t,
            None => return,
        }
    }
}

fn next_default_target(lexicon: &Lexicon) -> Option<Vec<TargetItem>> {
    let ctx = RuleCtx { lexicon };
    let rules = (lexicon.data.def.rules)(&ctx).ok()?;
    rules.into_iter().find_map(|rule| match rule.kind {
        RuleKind::DefaultTarget(target) => Some(target),
        _ => None,
    })
}
