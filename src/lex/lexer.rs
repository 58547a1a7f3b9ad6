//! The stack-based lexer.

use std::collections::HashSet;

use crate::grammar::rule::{ActionSpec, EvalCtx, ResolvedTarget, TargetItem};
use crate::grammar::{CompiledLexicon, GrammarError, Lexicon, RuleMatch};

use super::{Event, Lexeme, TargetDelta};

/// Lexes text against a stack of lexicons, yielding [`Event`]s.
///
/// The first lexicon is the root and is never popped. While iterating,
/// [`stack()`](Lexer::stack) reflects the state *after* the last yielded
/// event. A grammar compile failure ends the iteration with one `Err`.
pub struct Lexer<'t> {
    text: &'t str,
    pos: usize,
    stack: Vec<Lexicon>,
    /// States `(pos, depth, pushes)` seen without consuming text, for
    /// breaking circular default-target chains.
    circular: HashSet<(usize, usize, usize)>,
    queued: Option<Event>,
    failed: bool,
}

impl<'t> Lexer<'t> {
    pub fn new(root: Lexicon, text: &'t str) -> Self {
        Self::with_stack(vec![root], text, 0)
    }

    /// Start mid-text with an explicit lexicon stack, as the incremental
    /// builder does when replaying from a restart point.
    pub fn with_stack(stack: Vec<Lexicon>, text: &'t str, pos: usize) -> Self {
        debug_assert!(!stack.is_empty());
        Self {
            text,
            pos,
            stack,
            circular: HashSet::new(),
            queued: None,
            failed: false,
        }
    }

    /// The current lexicon stack (bottom = root).
    pub fn stack(&self) -> &[Lexicon] {
        &self.stack
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    fn advance_char(&mut self) {
        let step = self.text[self.pos..]
            .chars()
            .next()
            .map_or(1, |c| c.len_utf8());
        self.pos += step;
    }

    /// Fold resolved target items into a stack delta, clamping pops so the
    /// root survives. Positive jumps push the then-current top.
    fn fold_targets(&self, resolved: &[ResolvedTarget]) -> Option<TargetDelta> {
        let mut pop = 0usize;
        let mut push: Vec<Lexicon> = Vec::new();
        for item in resolved {
            match item {
                ResolvedTarget::Jump(n) if *n < 0 => {
                    for _ in 0..(-*n) as usize {
                        if push.pop().is_none() {
                            if self.stack.len() - pop > 1 {
                                pop += 1;
                            }
                            // else: at the root; pops are ignored
                        }
                    }
                }
                ResolvedTarget::Jump(n) if *n > 0 => {
                    let current = push
                        .last()
                        .cloned()
                        .unwrap_or_else(|| self.stack[self.stack.len() - 1 - pop].clone());
                    for _ in 0..*n {
                        push.push(current.clone());
                    }
                }
                ResolvedTarget::Jump(_) => {}
                ResolvedTarget::Push(lexicon) => push.push(lexicon.clone()),
            }
        }
        if pop == 0 && push.is_empty() {
            None
        } else {
            Some(TargetDelta { pop, push })
        }
    }

    fn resolve_targets(
        &self,
        items: &[TargetItem],
        ctx: &EvalCtx<'_>,
    ) -> Result<Option<TargetDelta>, crate::grammar::LexError> {
        if items.is_empty() {
            return Ok(None);
        }
        let mut resolved = Vec::new();
        for item in items {
            item.resolve(ctx, &mut resolved)?;
        }
        Ok(self.fold_targets(&resolved))
    }

    fn apply_delta(&mut self, delta: &TargetDelta) {
        let keep = self.stack.len().saturating_sub(delta.pop).max(1);
        self.stack.truncate(keep);
        self.stack.extend(delta.push.iter().cloned());
    }

    /// A token over `[from, to)` carrying the lexicon's default action.
    fn default_lexeme(&self, top: &Lexicon, spec: &ActionSpec, from: usize, to: usize) -> Option<Lexeme> {
        let gap = &self.text[from..to];
        let ctx = EvalCtx {
            text: gap,
            groups: None,
            arg: top.arg(),
        };
        match spec.eval_single(&ctx) {
            Ok(Some(action)) => Some(Lexeme {
                pos: from,
                text: gap.into(),
                action,
            }),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(lexicon = %top, error = %e, "default action failed, text skipped");
                None
            }
        }
    }

    /// Evaluate a matched rule: build its lexemes and stack delta, apply
    /// the delta, and advance. Returns `None` when nothing observable
    /// happened (skip without target, or a failed dynamic item).
    fn handle_match(&mut self, top: &Lexicon, m: &RuleMatch<'t, '_>) -> Option<Event> {
        let (start, end) = (m.start(), m.end());
        let mtext = m.text();
        let groups = m.group_texts();
        let ctx = EvalCtx {
            text: mtext,
            groups: Some(&groups),
            arg: top.arg(),
        };

        let outcome: Result<_, crate::grammar::LexError> = (|| {
            let delta = self.resolve_targets(&m.rule.target, &ctx)?;
            let lexemes = match &m.rule.action {
                ActionSpec::ByGroup(specs) => {
                    let mut lexemes = Vec::new();
                    for (i, spec) in specs.iter().enumerate() {
                        let Some((gs, ge)) = m.group_span(i + 1) else {
                            continue;
                        };
                        if ge == gs {
                            continue;
                        }
                        let group_text = &self.text[gs..ge];
                        let group_ctx = EvalCtx {
                            text: group_text,
                            groups: Some(&groups),
                            arg: top.arg(),
                        };
                        if let Some(action) = spec.eval_single(&group_ctx)? {
                            lexemes.push(Lexeme {
                                pos: gs,
                                text: group_text.into(),
                                action,
                            });
                        }
                    }
                    lexemes
                }
                spec => match spec.eval_single(&ctx)? {
                    Some(action) if !mtext.is_empty() => vec![Lexeme {
                        pos: start,
                        text: mtext.into(),
                        action,
                    }],
                    _ => Vec::new(),
                },
            };
            Ok((lexemes, delta))
        })();

        let (lexemes, delta) = match outcome {
            Ok(parts) => parts,
            Err(e) => {
                // rule is skipped; continue at the next position
                tracing::warn!(lexicon = %top, error = %e, "dynamic rule item failed, rule skipped");
                self.pos = end;
                if end == start {
                    self.advance_char();
                }
                return None;
            }
        };

        // a zero-width match that only pushes can loop; break the cycle by
        // advancing one character the second time the same state is seen
        if mtext.is_empty() {
            if let Some(d) = &delta {
                if !d.push.is_empty() {
                    let state = (start, self.stack.len(), d.push.len());
                    if !self.circular.insert(state) {
                        self.pos = end;
                        self.advance_char();
                        self.circular.clear();
                        return None;
                    }
                }
            }
        } else {
            self.circular.clear();
        }

        if let Some(d) = &delta {
            self.apply_delta(d);
        }
        self.pos = end;
        if end == start && delta.is_none() {
            // zero-width match with no state change cannot make progress
            self.advance_char();
        }

        if lexemes.is_empty() && delta.is_none() {
            None
        } else {
            Some(Event {
                target: delta,
                lexemes,
            })
        }
    }

    /// One step for a lexicon with a default target: matching is anchored
    /// at the current position; anything else applies the default target.
    fn step_default_target(
        &mut self,
        top: &Lexicon,
        compiled: &CompiledLexicon,
    ) -> Option<Event> {
        if let Some(m) = compiled.find_from(self.text, self.pos) {
            if m.start() == self.pos {
                return self.handle_match(top, &m);
            }
        }
        let targets = compiled
            .default_target
            .as_deref()
            .unwrap_or_default();
        let ctx = EvalCtx {
            text: "",
            groups: None,
            arg: top.arg(),
        };
        match self.resolve_targets(targets, &ctx) {
            Ok(Some(delta)) => {
                let state = (self.pos, self.stack.len(), delta.push.len());
                if !self.circular.insert(state) {
                    tracing::debug!(lexicon = %top, pos = self.pos, "circular default target, advancing");
                    self.advance_char();
                    self.circular.clear();
                    return None;
                }
                self.apply_delta(&delta);
                Some(Event {
                    target: Some(delta),
                    lexemes: Vec::new(),
                })
            }
            Ok(None) | Err(_) => {
                // an inert or failing default target falls back to the
                // no-match behavior of plain lexicons
                self.step_no_match(top, None)
            }
        }
    }

    /// No further match in this lexicon: spend the remaining text on the
    /// default action, else pop one level, else skip one character.
    fn step_no_match(&mut self, top: &Lexicon, default_action: Option<&ActionSpec>) -> Option<Event> {
        if let Some(spec) = default_action {
            let lexeme = self.default_lexeme(top, spec, self.pos, self.text.len());
            self.pos = self.text.len();
            return lexeme.map(|l| Event {
                target: None,
                lexemes: vec![l],
            });
        }
        if self.stack.len() > 1 {
            self.stack.pop();
            return Some(Event {
                target: Some(TargetDelta {
                    pop: 1,
                    push: Vec::new(),
                }),
                lexemes: Vec::new(),
            });
        }
        self.advance_char();
        None
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Event, GrammarError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some(event) = self.queued.take() {
            return Some(Ok(event));
        }
        loop {
            if self.pos >= self.text.len() {
                return None;
            }
            let top = self.stack.last()?.clone();
            let compiled = match top.compiled() {
                Ok(compiled) => compiled,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };

            if compiled.default_target.is_some() {
                if let Some(event) = self.step_default_target(&top, compiled) {
                    return Some(Ok(event));
                }
                continue;
            }

            let Some(m) = compiled.find_from(self.text, self.pos) else {
                if let Some(event) = self.step_no_match(&top, compiled.default_action.as_ref()) {
                    return Some(Ok(event));
                }
                continue;
            };

            // text between matches gets the default action, as its own event
            let gap = if m.start() > self.pos {
                compiled
                    .default_action
                    .as_ref()
                    .and_then(|spec| self.default_lexeme(&top, spec, self.pos, m.start()))
            } else {
                None
            };

            let event = self.handle_match(&top, &m);
            match (gap, event) {
                (Some(lexeme), event) => {
                    self.queued = event;
                    return Some(Ok(Event {
                        target: None,
                        lexemes: vec![lexeme],
                    }));
                }
                (None, Some(event)) => return Some(Ok(event)),
                (None, None) => {}
            }
        }
    }
}
