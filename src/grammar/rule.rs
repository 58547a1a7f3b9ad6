//! Rules and dynamic rule items.
//!
//! A [`GrammarRule`] is a pattern, an action, and a sequence of targets.
//! Patterns are plain regex strings (or `None`, skipping the rule).
//! Actions and targets may be *dynamic*: a small [`Item`] expression
//! evaluated against the regex match when the rule fires, built from the
//! placeholders [`TEXT`], [`match_group`], [`ARG`] and the combinators
//! [`call`] and [`select`].

use std::fmt;
use std::sync::Arc;

use super::error::LexError;
use super::{Action, Lexicon};

/// A user predicate callable from a dynamic item.
#[derive(Clone)]
pub struct ItemFn(Arc<dyn Fn(&[Value]) -> Value + Send + Sync>);

impl ItemFn {
    pub fn new(f: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    fn invoke(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }
}

impl fmt::Debug for ItemFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ItemFn(..)")
    }
}

/// The result of evaluating a dynamic item.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
    Action(Action),
    Lexicon(Lexicon),
    List(Vec<Value>),
}

impl Value {
    /// Interpret the value as a selection index (booleans count as 0/1).
    fn as_index(&self) -> Result<usize, LexError> {
        match self {
            Value::Bool(b) => Ok(usize::from(*b)),
            Value::Int(i) if *i >= 0 => Ok(*i as usize),
            other => Err(LexError::new(format!("not a valid index: {other:?}"))),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

/// A dynamic rule item, evaluated against the match when a rule fires.
#[derive(Debug, Clone)]
pub enum Item {
    /// The full matched text.
    Text,
    /// The text of a numbered capture group of the rule's own pattern
    /// (1-based; 0 is the full match). Empty when the group did not
    /// participate in the match.
    Match(usize),
    /// The enclosing lexicon's argument, or `Value::None`.
    Arg,
    /// Call a predicate with evaluated arguments.
    Call(ItemFn, Vec<Item>),
    /// Evaluate the index item, then the selected item.
    Select(Box<Item>, Vec<Item>),
    /// A lexicon derived with a computed argument.
    Derive(Lexicon, Box<Item>),
    /// A literal value.
    Value(Value),
}

/// Everything an item evaluation can see of a match.
pub(crate) struct EvalCtx<'a> {
    /// Matched text (for default actions: the text the default covers).
    pub text: &'a str,
    /// Texts of the rule's numbered groups, if there was a real match.
    pub groups: Option<&'a [Option<&'a str>]>,
    /// The enclosing lexicon's argument.
    pub arg: Option<&'a str>,
}

impl Item {
    pub(crate) fn eval(&self, ctx: &EvalCtx<'_>) -> Result<Value, LexError> {
        match self {
            Item::Text => Ok(Value::from(ctx.text)),
            Item::Match(0) => Ok(Value::from(ctx.text)),
            Item::Match(n) => {
                let groups = ctx
                    .groups
                    .ok_or_else(|| LexError::new("no match groups in this position"))?;
                let text = groups
                    .get(n - 1)
                    .ok_or_else(|| LexError::new(format!("no match group {n}")))?;
                Ok(Value::from(text.unwrap_or("")))
            }
            Item::Arg => Ok(match ctx.arg {
                Some(a) => Value::from(a),
                None => Value::None,
            }),
            Item::Call(f, args) => {
                let args: Vec<Value> =
                    args.iter().map(|a| a.eval(ctx)).collect::<Result<_, _>>()?;
                Ok(f.invoke(&args))
            }
            Item::Select(index, items) => {
                let i = index.eval(ctx)?.as_index()?;
                let item = items
                    .get(i)
                    .ok_or_else(|| LexError::new(format!("select index {i} out of range")))?;
                item.eval(ctx)
            }
            Item::Derive(lexicon, arg) => match arg.eval(ctx)? {
                Value::Str(s) => Ok(Value::Lexicon(lexicon.derive(&s))),
                Value::None => Ok(Value::Lexicon(lexicon.clone())),
                other => Err(LexError::new(format!(
                    "derived lexicon argument must be text, got {other:?}"
                ))),
            },
            Item::Value(v) => Ok(v.clone()),
        }
    }
}

/// What a rule does with the text it matched.
#[derive(Debug, Clone)]
pub enum ActionSpec {
    /// Produce no token (the target is still followed).
    Skip,
    /// One token over the full match.
    Plain(Action),
    /// One token per non-empty numbered group, each with its own action.
    ByGroup(Vec<ActionSpec>),
    /// Evaluated at match time; must yield an `Action` (or `None` to skip).
    Dynamic(Item),
}

impl ActionSpec {
    /// Evaluate to a single action; `Ok(None)` means no token.
    /// Not applicable to `ByGroup`, which the lexer expands per group.
    pub(crate) fn eval_single(&self, ctx: &EvalCtx<'_>) -> Result<Option<Action>, LexError> {
        match self {
            ActionSpec::Skip => Ok(None),
            ActionSpec::Plain(action) => Ok(Some(*action)),
            ActionSpec::Dynamic(item) => match item.eval(ctx)? {
                Value::Action(action) => Ok(Some(action)),
                Value::None => Ok(None),
                other => Err(LexError::new(format!("not an action: {other:?}"))),
            },
            ActionSpec::ByGroup(_) => {
                Err(LexError::new("per-group action in a single-token position"))
            }
        }
    }
}

impl From<Action> for ActionSpec {
    fn from(action: Action) -> Self {
        ActionSpec::Plain(action)
    }
}

impl From<Item> for ActionSpec {
    fn from(item: Item) -> Self {
        ActionSpec::Dynamic(item)
    }
}

/// One entry of a rule's target list.
#[derive(Debug, Clone)]
pub enum TargetItem {
    /// Positive: push the current lexicon that many times; negative: pop;
    /// zero: no-op.
    Jump(i32),
    /// Push a specific lexicon.
    Push(Lexicon),
    /// Evaluated at match time; must yield an integer, a lexicon, or a
    /// list of those.
    Dynamic(Item),
}

/// A target item after dynamic evaluation.
#[derive(Debug, Clone)]
pub(crate) enum ResolvedTarget {
    Jump(i32),
    Push(Lexicon),
}

impl TargetItem {
    pub(crate) fn resolve(
        &self,
        ctx: &EvalCtx<'_>,
        out: &mut Vec<ResolvedTarget>,
    ) -> Result<(), LexError> {
        match self {
            TargetItem::Jump(n) => out.push(ResolvedTarget::Jump(*n)),
            TargetItem::Push(lexicon) => out.push(ResolvedTarget::Push(lexicon.clone())),
            TargetItem::Dynamic(item) => flatten_target(item.eval(ctx)?, out)?,
        }
        Ok(())
    }
}

fn flatten_target(value: Value, out: &mut Vec<ResolvedTarget>) -> Result<(), LexError> {
    match value {
        Value::Int(i) => {
            let jump = i32::try_from(i)
                .map_err(|_| LexError::new(format!("target jump out of range: {i}")))?;
            out.push(ResolvedTarget::Jump(jump));
        }
        Value::Lexicon(lexicon) => out.push(ResolvedTarget::Push(lexicon)),
        Value::List(values) => {
            for v in values {
                flatten_target(v, out)?;
            }
        }
        Value::None => {}
        other => return Err(LexError::new(format!("not a target: {other:?}"))),
    }
    Ok(())
}

/// One rule of a lexicon.
#[derive(Debug, Clone)]
pub struct GrammarRule {
    pub(crate) kind: RuleKind,
}

#[derive(Debug, Clone)]
pub(crate) enum RuleKind {
    Match {
        pattern: Option<String>,
        action: ActionSpec,
        target: Vec<TargetItem>,
    },
    DefaultAction(ActionSpec),
    DefaultTarget(Vec<TargetItem>),
}

impl GrammarRule {
    /// A rule matching `pattern` with the given action and no targets.
    pub fn new(pattern: impl Into<String>, action: impl Into<ActionSpec>) -> Self {
        Self {
            kind: RuleKind::Match {
                pattern: Some(pattern.into()),
                action: action.into(),
                target: Vec::new(),
            },
        }
    }

    /// A rule whose pattern was computed and may be absent; a `None`
    /// pattern skips the rule entirely.
    pub fn dynamic(pattern: Option<String>, action: impl Into<ActionSpec>) -> Self {
        Self {
            kind: RuleKind::Match {
                pattern,
                action: action.into(),
                target: Vec::new(),
            },
        }
    }

    /// The action for text between matches in this lexicon.
    pub fn default_action(action: impl Into<ActionSpec>) -> Self {
        Self {
            kind: RuleKind::DefaultAction(action.into()),
        }
    }

    /// The targets applied when no rule matches at the current position.
    pub fn default_target(targets: impl IntoIterator<Item = TargetItem>) -> Self {
        Self {
            kind: RuleKind::DefaultTarget(targets.into_iter().collect()),
        }
    }

    /// Append a push-lexicon target.
    pub fn push(self, lexicon: Lexicon) -> Self {
        self.target(TargetItem::Push(lexicon))
    }

    /// Append a pop target (`n` levels).
    pub fn pop(self, n: u32) -> Self {
        self.target(TargetItem::Jump(-(n as i32)))
    }

    /// Append a raw integer target.
    pub fn jump(self, n: i32) -> Self {
        self.target(TargetItem::Jump(n))
    }

    /// Append any target item.
    pub fn target(mut self, item: TargetItem) -> Self {
        match &mut self.kind {
            RuleKind::Match { target, .. } | RuleKind::DefaultTarget(target) => target.push(item),
            RuleKind::DefaultAction(_) => {}
        }
        self
    }
}

/// The full matched text.
pub const TEXT: Item = Item::Text;

/// The enclosing lexicon's argument.
pub const ARG: Item = Item::Arg;

/// The text of the rule's numbered capture group `n` (1-based).
pub fn match_group(n: usize) -> Item {
    Item::Match(n)
}

/// Call `f` with the evaluated arguments.
pub fn call(f: impl Fn(&[Value]) -> Value + Send + Sync + 'static, args: Vec<Item>) -> Item {
    Item::Call(ItemFn::new(f), args)
}

/// Evaluate `index`, then the item it points at.
pub fn select(index: Item, items: Vec<Item>) -> Item {
    Item::Select(Box::new(index), items)
}

/// One token per non-empty numbered group, with the given actions.
pub fn bygroup<A: Into<ActionSpec>>(actions: impl IntoIterator<Item = A>) -> ActionSpec {
    ActionSpec::ByGroup(actions.into_iter().map(Into::into).collect())
}

/// Target a lexicon derived with an argument computed from the match.
pub fn derive(lexicon: Lexicon, arg: Item) -> TargetItem {
    TargetItem::Dynamic(Item::Derive(lexicon, Box::new(arg)))
}

/// Select an item by the matched text through a lookup table; unknown
/// texts get `default`.
pub fn by_text<I: Into<Item>>(table: Vec<(&str, I)>, default: Item) -> Item {
    let mut keys: Vec<Arc<str>> = Vec::with_capacity(table.len());
    let mut items: Vec<Item> = vec![default];
    for (key, item) in table {
        keys.push(Arc::from(key));
        items.push(item.into());
    }
    let index = call(
        move |args| match args {
            [Value::Str(text)] => {
                match keys.iter().position(|k| k.as_ref() == text.as_ref()) {
                    Some(i) => Value::Int(i as i64 + 1),
                    None => Value::Int(0),
                }
            }
            _ => Value::Int(0),
        },
        vec![TEXT],
    );
    select(index, items)
}

impl From<Action> for Item {
    fn from(action: Action) -> Self {
        Item::Value(Value::Action(action))
    }
}

impl From<Lexicon> for Item {
    fn from(lexicon: Lexicon) -> Self {
        Item::Value(Value::Lexicon(lexicon))
    }
}

/// A pattern built from the lexicon's argument, escaped, with optional
/// `prefix`/`suffix` (use `\b` to match the argument as a word). `None`
/// without an argument, skipping the rule.
pub fn arg_pattern(ctx: &super::RuleCtx<'_>, prefix: &str, suffix: &str) -> Option<String> {
    ctx.arg()
        .map(|arg| format!("{prefix}{}{suffix}", regex::escape(arg)))
}

/// A pattern matching any of `words`, longest first, with optional
/// `prefix`/`suffix` (use `\b` to stop at word boundaries).
pub fn words(words: &[&str], prefix: &str, suffix: &str) -> String {
    let mut sorted: Vec<&str> = words.to_vec();
    sorted.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    let body = sorted
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    format!("{prefix}(?:{body}){suffix}")
}

/// A character class matching any single character of `set`.
pub fn chars(set: &str) -> String {
    let mut out = String::from("[");
    for c in set.chars() {
        if matches!(c, '\\' | ']' | '^' | '-' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push(']');
    out
}
