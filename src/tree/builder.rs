//! The tree builder: folds lexer events into a token tree, and rebuilds
//! only the affected part of the tree after an edit.
//!
//! An incremental rebuild runs in two phases. The *replay* phase picks a
//! restart point left of the edit, re-lexes the new text from there into
//! detached context shells, and watches the old tokens right of the edit
//! for a run of [`REUSE_RUN`] identical tokens with identical lexicon
//! ancestry. It never touches the existing tree and can be interrupted
//! between events. The *splice* phase then swaps the replaced range into
//! the tree with plain node moves, so readers only ever observe the tree
//! before or after, never in between.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::base::Change;
use crate::grammar::{GrammarError, Lexicon};
use crate::lex::{Event, Lexeme, Lexer};

use super::{Context, ContextId, Node, Token};

/// Number of consecutive matching tokens after which the remaining old
/// suffix is reused, and how many tokens the restart search walks left of
/// an edit. Correctness does not depend on the value; how little gets
/// re-lexed around an edit does.
pub const REUSE_RUN: usize = 10;

/// How many times the restart point retreats further left before the
/// builder falls back to a full rebuild.
const RESTART_ATTEMPTS: usize = 8;

/// Events emitted while the tree is updated, in the order
/// `Replace*, Invalidate*, Updated*, Finished`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// The tree is about to change; a snapshot taken now goes stale.
    Replace,
    /// The deepest context that lost or gained children, with its
    /// ancestor chain (parent first, root last). Those are stale too.
    Invalidate {
        context: ContextId,
        ancestors: Vec<ContextId>,
    },
    /// The range of the new text whose tokens changed.
    Updated { start: usize, end: usize },
    /// No more work pending for the current batch of edits.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Replace,
    Invalidate,
    Updated,
    Finished,
}

impl BuildEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BuildEvent::Replace => EventKind::Replace,
            BuildEvent::Invalidate { .. } => EventKind::Invalidate,
            BuildEvent::Updated { .. } => EventKind::Updated,
            BuildEvent::Finished => EventKind::Finished,
        }
    }
}

type EventCallback = Arc<dyn Fn(&BuildEvent) + Send + Sync>;

/// Listener registry shared by the builder and the worker.
#[derive(Default, Clone)]
pub(crate) struct Notifier {
    slots: Vec<(EventKind, EventCallback)>,
}

impl Notifier {
    pub(crate) fn connect(&mut self, kind: EventKind, callback: EventCallback) {
        self.slots.push((kind, callback));
    }

    pub(crate) fn emit(&self, event: &BuildEvent) {
        for (kind, callback) in &self.slots {
            if *kind == event.kind() {
                callback(event);
            }
        }
    }
}

/// Whether a cancellable rebuild ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuildStatus {
    Done,
    Interrupted,
}

/// Builds a token tree from text and keeps it up to date across edits.
///
/// After [`tree`](TreeBuilder::tree) or [`rebuild`](TreeBuilder::rebuild)
/// return, [`start`](TreeBuilder::start) and [`end`](TreeBuilder::end)
/// delimit the re-tokenized range and
/// [`open_lexicons`](TreeBuilder::open_lexicons) lists the lexicons left
/// unclosed at the end of the text (excluding the root) - the visible
/// trace of unterminated constructs.
pub struct TreeBuilder {
    root: Arc<Context>,
    start: usize,
    end: usize,
    open: Vec<Lexicon>,
    pub(crate) notifier: Notifier,
}

impl TreeBuilder {
    pub fn new(root_lexicon: Lexicon) -> Self {
        Self {
            root: Arc::new(Context::new(root_lexicon)),
            start: 0,
            end: 0,
            open: Vec::new(),
            notifier: Notifier::default(),
        }
    }

    /// The current tree. Between `replace` and `finished` events of a
    /// rebuild the tree is being modified; clone the `Arc` outside of
    /// those to hold a consistent snapshot.
    pub fn root(&self) -> &Arc<Context> {
        &self.root
    }

    /// Start of the range re-tokenized by the last (re)build.
    pub fn start(&self) -> usize {
        self.start
    }

    /// End of the range re-tokenized by the last (re)build.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Lexicons still open at the end of the text, outermost first, root
    /// excluded. Empty when lexing ended in the root context.
    pub fn open_lexicons(&self) -> &[Lexicon] {
        &self.open
    }

    /// Subscribe to build events.
    pub fn connect(&mut self, kind: EventKind, callback: impl Fn(&BuildEvent) + Send + Sync + 'static) {
        self.notifier.connect(kind, Arc::new(callback));
    }

    /// Replace the root lexicon, clearing the tree. The next build is a
    /// full one.
    pub fn set_root_lexicon(&mut self, lexicon: Lexicon) {
        let root = Arc::make_mut(&mut self.root);
        root.set_lexicon(lexicon);
        root.children_mut().clear();
        self.open.clear();
    }

    /// Tokenize the full text.
    pub fn tree(&mut self, text: &str) -> Result<&Context, GrammarError> {
        let change = Change::full(self.root.end(), text.len());
        self.rebuild(text, change)?;
        Ok(&self.root)
    }

    /// Re-tokenize after an edit, reusing unchanged tokens left and right
    /// of the changed range. Emits `replace`, `invalidate`, `updated`,
    /// and `finished` events.
    pub fn rebuild(&mut self, text: &str, change: Change) -> Result<(), GrammarError> {
        let cancel = CancellationToken::new();
        self.rebuild_cancellable(text, change, &cancel)?;
        self.notifier.emit(&BuildEvent::Finished);
        Ok(())
    }

    /// Like [`rebuild`](Self::rebuild), but without the final `finished`
    /// event and interruptible between lexer events. On interruption or
    /// error the tree is left untouched.
    pub(crate) fn rebuild_cancellable(
        &mut self,
        text: &str,
        change: Change,
        cancel: &CancellationToken,
    ) -> Result<BuildStatus, GrammarError> {
        let mut change = change;
        change.pos = change.pos.min(text.len());
        match self.replay(text, change, cancel)? {
            None => Ok(BuildStatus::Interrupted),
            Some(plan) => {
                self.splice(plan);
                Ok(BuildStatus::Done)
            }
        }
    }

    // ----- replay phase -------------------------------------------------

    /// Re-lex the changed region without touching the current tree.
    /// Returns `None` when interrupted.
    fn replay(
        &self,
        text: &str,
        change: Change,
        cancel: &CancellationToken,
    ) -> Result<Option<Plan>, GrammarError> {
        let old = &*self.root;
        let mut restart = initial_restart(old, text, change.pos);

        for _ in 0..RESTART_ATTEMPTS {
            match self.replay_from(old, restart.clone(), text, change, cancel)? {
                ReplayOutcome::Interrupted => return Ok(None),
                ReplayOutcome::Plan(plan) => return Ok(Some(plan)),
                ReplayOutcome::Retreat => {
                    restart = match restart {
                        Some(path) => retreat(old, path, REUSE_RUN),
                        None => None,
                    };
                }
            }
        }
        // out of retreats: rebuild from the very start
        match self.replay_from(old, None, text, change, cancel)? {
            ReplayOutcome::Interrupted => Ok(None),
            ReplayOutcome::Plan(plan) => Ok(Some(plan)),
            ReplayOutcome::Retreat => unreachable!("full replay cannot ask to retreat"),
        }
    }

    fn replay_from(
        &self,
        old: &Context,
        restart: Option<Vec<usize>>,
        text: &str,
        change: Change,
        cancel: &CancellationToken,
    ) -> Result<ReplayOutcome, GrammarError> {
        let (restart_info, lexicons, restart_pos, head_tokens) = match &restart {
            Some(path) => {
                let Some(token) = old.token_at_path(path) else {
                    // stale path; treat as no restart point
                    return self.replay_from(old, None, text, change, cancel);
                };
                let lexicons = old.lexicons_along(path);
                let head = collect_head_tokens(old, path, change.pos);
                (
                    Some(Restart { path: path.clone() }),
                    lexicons,
                    token.pos,
                    head,
                )
            }
            None => {
                // restarting from the very beginning still compares the
                // replay against the old tokens, to report a tight range
                let head = old
                    .find_token_path_after(0)
                    .map(|p| collect_head_tokens(old, &p, change.pos))
                    .unwrap_or_default();
                (None, vec![old.lexicon().clone()], 0, head)
            }
        };

        let mut state = ReplayState::new(&lexicons);
        let mut lexer = Lexer::with_stack(lexicons, text, restart_pos);
        let mut cursor = TailCursor::new(old, change);
        let mut run = 0usize;
        let mut head = HeadCheck::new(head_tokens, restart_pos);
        let mut seen_any_event = false;

        while let Some(event) = lexer.next() {
            let event = event?;
            if cancel.is_cancelled() {
                return Ok(ReplayOutcome::Interrupted);
            }

            if !event.lexemes.is_empty() {
                // give up on this restart point if not even the first
                // token comes out unchanged
                if !seen_any_event && restart_info.is_some() && !head.first_event_matches(&event) {
                    return Ok(ReplayOutcome::Retreat);
                }
                seen_any_event = true;
                head.check(&event);
                run = cursor.match_event(&event, state.chain(), run);
            }

            state.apply(&event);

            // enough identical tokens in a row: splice the remaining old
            // suffix instead of lexing on
            if run >= REUSE_RUN && cursor.splice_ready(state.chain()) {
                let end = cursor
                    .shifted_pos()
                    .unwrap_or(text.len());
                return Ok(ReplayOutcome::Plan(Plan {
                    restart: restart_info,
                    state,
                    reuse: Some(Reuse {
                        tail_path: cursor.into_path().unwrap_or_default(),
                        offset: change.offset(),
                    }),
                    start: head.start().min(change.pos),
                    end,
                    open: None,
                }));
            }
        }

        let open = state.open_lexicons();
        Ok(ReplayOutcome::Plan(Plan {
            restart: restart_info,
            state,
            reuse: None,
            start: head.start().min(change.pos),
            end: text.len(),
            open: Some(open),
        }))
    }

    // ----- splice phase -------------------------------------------------

    /// Swap the replaced range into the tree. Pure node moves; the tree
    /// is inconsistent only between the `replace` and `updated` events.
    fn splice(&mut self, plan: Plan) {
        self.notifier.emit(&BuildEvent::Replace);

        let invalidate = {
            let mut ids = match &plan.restart {
                Some(restart) => self.root.ids_along(&restart.path),
                None => Vec::new(),
            };
            let context = ids.pop().unwrap_or_else(|| self.root.id());
            ids.reverse();
            BuildEvent::Invalidate {
                context,
                ancestors: ids,
            }
        };

        let tree = Arc::make_mut(&mut self.root);

        // 1. move the reused suffix out of the way, shifted to its new
        //    positions
        let mut tails: Vec<Vec<Node>> = match &plan.reuse {
            Some(reuse) => {
                let mut levels = Vec::new();
                detach_levels(tree, &reuse.tail_path, 0, &mut levels);
                for level in &mut levels {
                    for node in level.iter_mut() {
                        shift_node(node, reuse.offset);
                    }
                }
                levels
            }
            None => Vec::new(),
        };

        // 2. drop everything from the restart token rightwards
        match &plan.restart {
            Some(restart) => truncate_at(tree, &restart.path, 0),
            None => tree.children_mut().clear(),
        }

        // 3. graft the replayed nodes (and the reused suffix) back in
        let ReplayState {
            mut spine,
            spine_depth,
            mut stack,
            ..
        } = plan.state;

        while let Some(mut ctx) = stack.pop() {
            let depth = spine_depth + 1 + stack.len();
            if let Some(tail) = tails.get_mut(depth) {
                ctx.children_mut().append(tail);
            }
            let parent = match stack.last_mut() {
                Some(parent) => parent,
                None => &mut spine[spine_depth],
            };
            if !ctx.is_empty() {
                parent.children_mut().push(Node::Context(ctx));
            }
        }

        merge_spine(tree, &mut spine, &mut tails, 0);

        self.start = plan.start;
        self.end = plan.end;
        if let Some(open) = plan.open {
            self.open = open;
        }

        self.notifier.emit(&invalidate);
        self.notifier.emit(&BuildEvent::Updated {
            start: self.start,
            end: self.end,
        });
    }
}

// ----- plan data --------------------------------------------------------

struct Plan {
    restart: Option<Restart>,
    state: ReplayState,
    reuse: Option<Reuse>,
    start: usize,
    end: usize,
    /// `None` keeps the previous open-lexicon list (the reused suffix
    /// still ends the document the same way).
    open: Option<Vec<Lexicon>>,
}

#[derive(Clone)]
struct Restart {
    path: Vec<usize>,
}

struct Reuse {
    /// Path (in the pre-splice tree) to the first suffix token to keep.
    tail_path: Vec<usize>,
    offset: isize,
}

enum ReplayOutcome {
    Plan(Plan),
    Retreat,
    Interrupted,
}

// ----- replay state -----------------------------------------------------

/// The tree fragment being built during replay: shells mirroring the
/// restart ancestry (merged into the live spine at splice time) plus the
/// contexts pushed since.
struct ReplayState {
    spine: Vec<Context>,
    /// Current open spine level; only ever decreases.
    spine_depth: usize,
    stack: Vec<Context>,
    /// Lexicons of the open chain, root first (kept in sync for ancestry
    /// comparisons).
    chain: Vec<Lexicon>,
}

impl ReplayState {
    fn new(lexicons: &[Lexicon]) -> Self {
        Self {
            spine: lexicons.iter().cloned().map(Context::new).collect(),
            spine_depth: lexicons.len() - 1,
            stack: Vec::new(),
            chain: lexicons.to_vec(),
        }
    }

    fn chain(&self) -> &[Lexicon] {
        &self.chain
    }

    fn top_children(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(ctx) => ctx.children_mut(),
            None => self.spine[self.spine_depth].children_mut(),
        }
    }

    fn pop(&mut self) {
        if let Some(ctx) = self.stack.pop() {
            self.chain.pop();
            // a context that ends without children is discarded
            if !ctx.is_empty() {
                self.top_children().push(Node::Context(ctx));
            }
        } else if self.spine_depth > 0 {
            self.spine_depth -= 1;
            self.chain.pop();
        }
    }

    fn push(&mut self, lexicon: Lexicon, pending_tokens: usize) {
        let mut ctx = Context::new(lexicon.clone());
        // `consume` moves the triggering rule's tokens into the new
        // context, provided they are still the trailing children here
        if lexicon.consume() && pending_tokens > 0 {
            let source = self.top_children();
            if source.len() >= pending_tokens {
                let moved: Vec<Node> = source.split_off(source.len() - pending_tokens);
                *ctx.children_mut() = moved;
            }
        }
        self.chain.push(lexicon);
        self.stack.push(ctx);
    }

    fn apply(&mut self, event: &Event) {
        let count = event.lexemes.len();
        let children = self.top_children();
        for (i, lexeme) in event.lexemes.iter().enumerate() {
            let mut token = Token::new(lexeme.pos, lexeme.text.clone(), lexeme.action);
            token.group = group_index(i, count);
            children.push(Node::Token(token));
        }
        if let Some(delta) = &event.target {
            for _ in 0..delta.pop {
                self.pop();
            }
            let moved = if delta.pop == 0 { count } else { 0 };
            let mut pending = moved;
            for lexicon in &delta.push {
                self.push(lexicon.clone(), pending);
                // tokens travel at most into the first consuming context
                // chain; once moved they stay with it
                if !lexicon.consume() {
                    pending = 0;
                }
            }
        }
    }

    /// Open lexicons beyond the root, outermost first.
    fn open_lexicons(&self) -> Vec<Lexicon> {
        self.chain[1..].to_vec()
    }
}

fn group_index(i: usize, count: usize) -> Option<i16> {
    if count < 2 {
        return None;
    }
    let i = i as i16;
    if i as usize == count - 1 {
        Some(-i)
    } else {
        Some(i)
    }
}

// ----- head stability ---------------------------------------------------

/// Compares the first re-lexed tokens against copies of the old ones, so
/// the reported `start` skips everything that came out identical.
struct HeadCheck {
    tokens: Vec<Token>,
    index: usize,
    start: usize,
    active: bool,
}

impl HeadCheck {
    fn new(tokens: Vec<Token>, restart_pos: usize) -> Self {
        Self {
            active: !tokens.is_empty(),
            tokens,
            index: 0,
            start: restart_pos,
        }
    }

    fn first_event_matches(&self, event: &Event) -> bool {
        if self.tokens.is_empty() {
            return true;
        }
        event
            .lexemes
            .first()
            .is_some_and(|l| lexeme_equals(l, &self.tokens[0]))
    }

    fn check(&mut self, event: &Event) {
        if !self.active {
            return;
        }
        let n = event.lexemes.len();
        let matched = self.index + n <= self.tokens.len()
            && event
                .lexemes
                .iter()
                .zip(&self.tokens[self.index..])
                .all(|(l, t)| lexeme_equals(l, t));
        if matched {
            self.index += n;
            if let Some(last) = event.lexemes.last() {
                self.start = last.end();
            }
            if self.index == self.tokens.len() {
                self.active = false;
            }
        } else {
            if let Some(first) = event.lexemes.first() {
                self.start = first.pos;
            }
            self.active = false;
        }
    }

    fn start(&self) -> usize {
        self.start
    }
}

fn lexeme_equals(lexeme: &Lexeme, token: &Token) -> bool {
    lexeme.pos == token.pos && lexeme.text == token.text && lexeme.action == token.action
}

/// Copies of the old tokens from the restart token up to the first one
/// reaching past the edit position.
fn collect_head_tokens(old: &Context, path: &[usize], edit_pos: usize) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut path = path.to_vec();
    loop {
        let Some(token) = old.token_at_path(&path) else {
            break;
        };
        tokens.push(token.clone());
        if token.end() > edit_pos {
            break;
        }
        match old.next_token_path(&path) {
            Some(next) => path = next,
            None => break,
        }
    }
    tokens
}

// ----- tail reuse -------------------------------------------------------

/// Walks the old tokens right of the edit, in document order, comparing
/// them against newly produced events.
struct TailCursor<'a> {
    old: &'a Context,
    path: Option<Vec<usize>>,
    offset: isize,
}

impl<'a> TailCursor<'a> {
    fn new(old: &'a Context, change: Change) -> Self {
        let mut path = old.find_token_path_after(change.removed_end());
        // never start mid-group; groups come from a single match
        while let Some(p) = &path {
            match old.token_at_path(p) {
                Some(t) if t.continues_group() => path = old.next_token_path(p),
                _ => break,
            }
        }
        Self {
            old,
            path,
            offset: change.offset(),
        }
    }

    fn current(&self) -> Option<&Token> {
        self.old.token_at_path(self.path.as_deref()?)
    }

    /// New-text position of the current old token.
    fn shifted_pos(&self) -> Option<usize> {
        let token = self.current()?;
        let pos = token.pos as isize + self.offset;
        (pos >= 0).then_some(pos as usize)
    }

    fn advance(&mut self) {
        self.path = self
            .path
            .take()
            .and_then(|p| self.old.next_token_path(&p));
    }

    /// Skip to the first token group starting at or after `pos` (in
    /// new-text coordinates).
    fn skip_to(&mut self, pos: usize) {
        while let Some(p) = self.shifted_pos() {
            let mid_group = self.current().is_some_and(Token::continues_group);
            if p >= pos && !mid_group {
                break;
            }
            self.advance();
        }
    }

    /// Try to match a whole event worth of lexemes against the next old
    /// tokens. Returns the new run length.
    fn match_event(&mut self, event: &Event, chain: &[Lexicon], run: usize) -> usize {
        let Some(first) = event.lexemes.first() else {
            return run;
        };
        self.skip_to(first.pos);
        let Some(start_path) = self.path.clone() else {
            return 0;
        };

        // ancestry of the old tokens must equal the new chain
        let old_chain = self.old.lexicons_along(&start_path);
        if old_chain.len() != chain.len()
            || !old_chain.iter().zip(chain).all(|(a, b)| a.same(b))
        {
            return 0;
        }

        let mut path = Some(start_path.clone());
        for lexeme in &event.lexemes {
            let matched = path
                .as_ref()
                .and_then(|p| self.old.token_at_path(p))
                .is_some_and(|t| {
                    let shifted = t.pos as isize + self.offset;
                    shifted >= 0
                        && lexeme.pos == shifted as usize
                        && lexeme.text == t.text
                        && lexeme.action == t.action
                });
            if !matched {
                // stay where we were; the next event will skip forward
                self.path = Some(start_path);
                return 0;
            }
            path = path.and_then(|p| self.old.next_token_path(&p));
        }
        self.path = path;
        run + event.lexemes.len()
    }

    /// Whether the suffix from the current token can be attached under
    /// the current chain.
    fn splice_ready(&self, chain: &[Lexicon]) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        if self.current().is_some_and(Token::continues_group) {
            return false;
        }
        let old_chain = self.old.lexicons_along(path);
        old_chain.len() == chain.len() && old_chain.iter().zip(chain).all(|(a, b)| a.same(b))
    }

    fn into_path(self) -> Option<Vec<usize>> {
        self.path
    }
}

// ----- splice helpers ---------------------------------------------------

/// Detach, per tree level, everything right of `path` (including the
/// token at the path itself). `out[d]` holds the nodes removed at depth
/// `d`.
fn detach_levels(ctx: &mut Context, path: &[usize], depth: usize, out: &mut Vec<Vec<Node>>) {
    let idx = path[depth].min(ctx.len());
    if depth == path.len() - 1 {
        out.push(ctx.children_mut().split_off(idx));
        return;
    }
    let keep = (idx + 1).min(ctx.len());
    out.push(ctx.children_mut().split_off(keep));
    if let Some(Node::Context(child)) = ctx.children_mut().get_mut(idx) {
        detach_levels(child, path, depth + 1, out);
    }
}

/// Remove the token at `path` and everything right of it, at every level.
fn truncate_at(ctx: &mut Context, path: &[usize], depth: usize) {
    let idx = path[depth].min(ctx.len());
    if depth == path.len() - 1 {
        ctx.children_mut().truncate(idx);
        return;
    }
    ctx.children_mut().truncate(idx + 1);
    if let Some(Node::Context(child)) = ctx.children_mut().get_mut(idx) {
        truncate_at(child, path, depth + 1);
    }
}

fn shift_node(node: &mut Node, offset: isize) {
    match node {
        Node::Token(token) => {
            token.pos = (token.pos as isize + offset).max(0) as usize;
        }
        Node::Context(ctx) => {
            for child in ctx.children_mut() {
                shift_node(child, offset);
            }
        }
    }
}

/// Append the replayed shell children (and reused suffix) into the live
/// spine, level by level, dropping spine contexts that ended up empty.
fn merge_spine(
    old: &mut Context,
    spine: &mut Vec<Context>,
    tails: &mut Vec<Vec<Node>>,
    depth: usize,
) {
    if depth + 1 < spine.len() {
        if let Some(idx) = old.len().checked_sub(1) {
            let child_empty = {
                if let Some(Node::Context(child)) = old.children_mut().get_mut(idx) {
                    merge_spine(child, spine, tails, depth + 1);
                    child.is_empty()
                } else {
                    false
                }
            };
            if child_empty {
                old.children_mut().remove(idx);
            }
        }
    }
    old.children_mut().append(spine[depth].children_mut());
    if let Some(tail) = tails.get_mut(depth) {
        old.children_mut().append(tail);
    }
}

// ----- restart search ---------------------------------------------------

/// Pick the token to restart lexing from, left of the edit: preferably
/// the last token before the last newline before the edit (so line-
/// anchored patterns replay over a full line), otherwise a bounded number
/// of tokens back from the edit.
fn initial_restart(old: &Context, text: &str, edit_pos: usize) -> Option<Vec<usize>> {
    let by_newline = text[..edit_pos.min(text.len())]
        .rfind('\n')
        .and_then(|i| old.find_token_path_before(i));
    let path = match by_newline {
        Some(path) => Some(path),
        None => {
            let path = old.find_token_path_before(edit_pos)?;
            step_back(old, path, REUSE_RUN)
        }
    };
    path.and_then(|p| safe_restart(old, p))
}

/// Walk `count` tokens left in document order; `None` when the walk runs
/// off the start of the tree.
fn step_back(old: &Context, path: Vec<usize>, count: usize) -> Option<Vec<usize>> {
    let mut path = path;
    for _ in 0..count {
        path = old.prev_token_path(&path)?;
    }
    Some(path)
}

/// Retreat the restart point further left for another attempt.
fn retreat(old: &Context, path: Vec<usize>, count: usize) -> Option<Vec<usize>> {
    step_back(old, path, count).and_then(|p| safe_restart(old, p))
}

/// Adjust a candidate restart token to a safe one: a group start that is
/// not the first token of a consuming context (replaying from there
/// would attribute it differently).
fn safe_restart(old: &Context, mut path: Vec<usize>) -> Option<Vec<usize>> {
    loop {
        let token = old.token_at_path(&path)?;
        if token.continues_group() {
            path = old.prev_token_path(&path)?;
            continue;
        }
        let first_of_consume = path.last() == Some(&0)
            && path.len() > 1
            && old
                .context_at_path(&path)
                .is_some_and(|ctx| ctx.lexicon().consume());
        if first_of_consume {
            path = old.prev_token_path(&path)?;
            continue;
        }
        return Some(path);
    }
}
