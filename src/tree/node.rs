//! Tokens, contexts, and positional queries over the tree.
//!
//! A context owns its children; there are no parent links. Queries that
//! need ancestry return an index *path* from the root (one child index per
//! level, ending at a token), which callers can walk and extend.

use std::fmt::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::grammar::{Action, Lexicon};

/// Stable identity of a context, preserved when a context survives an
/// incremental rebuild. Transform caches key on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// One token: a slice of text with a position and an action.
///
/// Tokens produced together from a single regex match form a *group*; each
/// member carries its index within the group, the last one negated. Group
/// members are always contiguous under one parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub pos: usize,
    pub text: Box<str>,
    pub action: Action,
    pub group: Option<i16>,
}

impl Token {
    pub fn new(pos: usize, text: impl Into<Box<str>>, action: Action) -> Self {
        Self {
            pos,
            text: text.into(),
            action,
            group: None,
        }
    }

    pub fn end(&self) -> usize {
        self.pos + self.text.len()
    }

    /// Whether this token continues a group started by an earlier sibling.
    pub fn continues_group(&self) -> bool {
        matches!(self.group, Some(g) if g != 0)
    }
}

impl PartialEq<&str> for Token {
    fn eq(&self, other: &&str) -> bool {
        &*self.text == *other
    }
}

/// An ordered sequence of tokens and subcontexts under one lexicon.
#[derive(Debug, Clone)]
pub struct Context {
    lexicon: Lexicon,
    id: ContextId,
    children: Vec<Node>,
}

/// A child of a context.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Token(Token),
    Context(Context),
}

impl Node {
    pub fn is_token(&self) -> bool {
        matches!(self, Node::Token(_))
    }

    pub fn as_token(&self) -> Option<&Token> {
        match self {
            Node::Token(t) => Some(t),
            Node::Context(_) => None,
        }
    }

    pub fn as_context(&self) -> Option<&Context> {
        match self {
            Node::Token(_) => None,
            Node::Context(c) => Some(c),
        }
    }

    /// Position of the first token at or below this node.
    pub fn pos(&self) -> usize {
        match self {
            Node::Token(t) => t.pos,
            Node::Context(c) => c.pos(),
        }
    }

    /// End of the last token at or below this node.
    pub fn end(&self) -> usize {
        match self {
            Node::Token(t) => t.end(),
            Node::Context(c) => c.end(),
        }
    }

    fn first_token(&self) -> Option<&Token> {
        match self {
            Node::Token(t) => Some(t),
            Node::Context(c) => c.first_token(),
        }
    }

    fn last_token(&self) -> Option<&Token> {
        match self {
            Node::Token(t) => Some(t),
            Node::Context(c) => c.last_token(),
        }
    }
}

impl Context {
    pub(crate) fn new(lexicon: Lexicon) -> Self {
        Self {
            lexicon,
            id: ContextId::next(),
            children: Vec::new(),
        }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub(crate) fn set_lexicon(&mut self, lexicon: Lexicon) {
        self.lexicon = lexicon;
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Position of the first token in this context (0 when empty, which
    /// only the root can be).
    pub fn pos(&self) -> usize {
        self.first_token().map_or(0, |t| t.pos)
    }

    /// End of the last token in this context.
    pub fn end(&self) -> usize {
        self.last_token().map_or(0, |t| t.end())
    }

    pub fn first_token(&self) -> Option<&Token> {
        self.children.iter().find_map(Node::first_token)
    }

    pub fn last_token(&self) -> Option<&Token> {
        self.children.iter().rev().find_map(Node::last_token)
    }

    /// All tokens below this context, in document order.
    pub fn tokens(&self) -> Tokens<'_> {
        Tokens {
            stack: vec![self.children.iter()],
        }
    }

    /// The token containing `pos` (`token.pos <= pos < token.end`).
    pub fn find_token(&self, pos: usize) -> Option<&Token> {
        let path = self.find_token_path_after_inclusive(pos)?;
        let token = self.token_at_path(&path)?;
        (token.pos <= pos && pos < token.end()).then_some(token)
    }

    /// Path to the last token that ends at or before `pos`.
    pub fn find_token_path_before(&self, pos: usize) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut node = self;
        loop {
            // last child whose first token ends at or before pos
            let mut lo = 0;
            let mut hi = node.children.len();
            while lo < hi {
                let mid = (lo + hi) / 2;
                let key = node.children[mid]
                    .first_token()
                    .map_or(usize::MAX, |t| t.end());
                if pos < key {
                    hi = mid;
                } else {
                    lo = mid + 1;
                }
            }
            if lo == 0 {
                return None;
            }
            path.push(lo - 1);
            match &node.children[lo - 1] {
                Node::Token(_) => return Some(path),
                Node::Context(c) => node = c,
            }
        }
    }

    /// Path to the first token that starts at or after `pos`.
    pub fn find_token_path_after(&self, pos: usize) -> Option<Vec<usize>> {
        self.find_after(pos, false)
    }

    /// Path to the first token that *ends* after `pos` (so a token
    /// spanning `pos` is included).
    fn find_token_path_after_inclusive(&self, pos: usize) -> Option<Vec<usize>> {
        self.find_after(pos, true)
    }

    fn find_after(&self, pos: usize, inclusive: bool) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut node = self;
        loop {
            // first child whose last token reaches pos
            let mut lo = 0;
            let mut hi = node.children.len();
            while lo < hi {
                let mid = (lo + hi) / 2;
                let last = node.children[mid].last_token();
                let reaches = match last {
                    None => false,
                    Some(t) => {
                        if inclusive {
                            t.end() > pos
                        } else {
                            t.pos >= pos
                        }
                    }
                };
                if reaches {
                    hi = mid;
                } else {
                    lo = mid + 1;
                }
            }
            if lo == node.children.len() {
                return None;
            }
            path.push(lo);
            match &node.children[lo] {
                Node::Token(_) => return Some(path),
                Node::Context(c) => node = c,
            }
        }
    }

    pub fn node_at_path(&self, path: &[usize]) -> Option<&Node> {
        let (&last, parents) = path.split_last()?;
        let mut node = self;
        for &i in parents {
            node = node.children.get(i)?.as_context()?;
        }
        node.children.get(last)
    }

    pub fn token_at_path(&self, path: &[usize]) -> Option<&Token> {
        self.node_at_path(path)?.as_token()
    }

    /// The context holding the node at `path` (its direct parent).
    pub fn context_at_path(&self, path: &[usize]) -> Option<&Context> {
        let mut node = self;
        for &i in path.split_last().map(|(_, p)| p).unwrap_or(&[]) {
            node = node.children.get(i)?.as_context()?;
        }
        Some(node)
    }

    /// Lexicons of the contexts along `path`, root first, up to and
    /// including the token's direct parent.
    pub fn lexicons_along(&self, path: &[usize]) -> Vec<Lexicon> {
        let mut out = vec![self.lexicon.clone()];
        let mut node = self;
        for &i in path.split_last().map(|(_, p)| p).unwrap_or(&[]) {
            match node.children.get(i).and_then(Node::as_context) {
                Some(c) => {
                    out.push(c.lexicon.clone());
                    node = c;
                }
                None => break,
            }
        }
        out
    }

    /// Context ids along `path`, root first, up to the token's parent.
    pub(crate) fn ids_along(&self, path: &[usize]) -> Vec<ContextId> {
        let mut out = vec![self.id];
        let mut node = self;
        for &i in path.split_last().map(|(_, p)| p).unwrap_or(&[]) {
            match node.children.get(i).and_then(Node::as_context) {
                Some(c) => {
                    out.push(c.id);
                    node = c;
                }
                None => break,
            }
        }
        out
    }

    /// Document-order successor of the token at `path`.
    pub fn next_token_path(&self, path: &[usize]) -> Option<Vec<usize>> {
        let mut path = path.to_vec();
        loop {
            let last = path.pop()?;
            let parent = self.context_at_path_of(&path)?;
            if last + 1 < parent.children.len() {
                path.push(last + 1);
                return self.descend_first_token(path);
            }
        }
    }

    /// Document-order predecessor of the token at `path`.
    pub fn prev_token_path(&self, path: &[usize]) -> Option<Vec<usize>> {
        let mut path = path.to_vec();
        loop {
            let last = path.pop()?;
            if last > 0 {
                path.push(last - 1);
                return self.descend_last_token(path);
            }
        }
    }

    /// The context whose children a *context path* (indices of contexts
    /// only, possibly empty) points at.
    fn context_at_path_of(&self, path: &[usize]) -> Option<&Context> {
        let mut node = self;
        for &i in path {
            node = node.children.get(i)?.as_context()?;
        }
        Some(node)
    }

    fn descend_first_token(&self, mut path: Vec<usize>) -> Option<Vec<usize>> {
        loop {
            match self.node_at_path(&path)? {
                Node::Token(_) => return Some(path),
                Node::Context(c) => {
                    if c.is_empty() {
                        return None;
                    }
                    path.push(0);
                }
            }
        }
    }

    fn descend_last_token(&self, mut path: Vec<usize>) -> Option<Vec<usize>> {
        loop {
            match self.node_at_path(&path)? {
                Node::Token(_) => return Some(path),
                Node::Context(c) => {
                    if c.is_empty() {
                        return None;
                    }
                    path.push(c.len() - 1);
                }
            }
        }
    }

    /// Indented debug rendering of the tree.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, 0);
        out
    }

    fn dump_into(&self, out: &mut String, depth: usize) {
        let _ = writeln!(
            out,
            "{:indent$}<Context {} at {}-{} ({} children)>",
            "",
            self.lexicon,
            self.pos(),
            self.end(),
            self.len(),
            indent = depth * 2
        );
        for child in &self.children {
            match child {
                Node::Token(t) => {
                    let _ = writeln!(
                        out,
                        "{:indent$}<Token {:?} at {}:{} ({})>",
                        "",
                        &*t.text,
                        t.pos,
                        t.end(),
                        t.action,
                        indent = (depth + 1) * 2
                    );
                }
                Node::Context(c) => c.dump_into(out, depth + 1),
            }
        }
    }
}

/// Trees compare by structure: lexicon identity, tokens, and nesting.
/// Context ids are intentionally ignored.
impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.lexicon == other.lexicon && self.children == other.children
    }
}

impl PartialEq<Lexicon> for Context {
    fn eq(&self, other: &Lexicon) -> bool {
        &self.lexicon == other
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Context {} at {}-{} ({} children)>",
            self.lexicon,
            self.pos(),
            self.end(),
            self.len()
        )
    }
}

/// Document-order token iterator.
pub struct Tokens<'a> {
    stack: Vec<std::slice::Iter<'a, Node>>,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a Token;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let iter = self.stack.last_mut()?;
            match iter.next() {
                Some(Node::Token(t)) => return Some(t),
                Some(Node::Context(c)) => self.stack.push(c.children.iter()),
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}
