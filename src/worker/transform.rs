//! Incremental cached transformation of the token tree.
//!
//! A [`Transformer`] maps every context to a value of the transform
//! function, with subcontexts already replaced by their transformed
//! values. Results are cached by context identity, so after an
//! incremental rebuild only the contexts the builder invalidated (and
//! newly created ones) are recomputed; a position shift alone
//! invalidates nothing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::grammar::Lexicon;
use crate::tree::{Context, ContextId, Node, Token};

/// One child of a context as seen by a transform function: either a
/// plain token, or the transformed value of a subcontext.
pub enum TransformItem<'a, T> {
    Token(&'a Token),
    Value { lexicon: &'a Lexicon, value: &'a T },
}

/// What the worker needs from a transformer; implemented by
/// [`Transformer<T>`] for any `T`.
pub trait TransformRunner: Send {
    /// Called for every `invalidate` event during a rebuild: drop the
    /// cached results of the changed context and its ancestors.
    fn invalidate(&mut self, context: ContextId, ancestors: &[ContextId]);

    /// Recompute missing results bottom-up after `finished`. Returns
    /// `false` when interrupted; the cache keeps all completed entries.
    fn process(&mut self, root: &Context, cancel: &CancellationToken) -> bool;
}

type TransformFn<T> =
    Arc<dyn for<'a> Fn(&'a Lexicon, &'a [TransformItem<'a, T>]) -> Option<T> + Send + Sync>;

/// Caches the result of a transform function per context.
///
/// The function receives the context's lexicon and its children, with
/// subcontexts replaced by their already-transformed values (`None`
/// results simply leave the subcontext out). Share one instance with a
/// [`Worker`](crate::Worker) via `Arc<Mutex<...>>` and read results with
/// [`result`](Transformer::result).
pub struct Transformer<T> {
    func: TransformFn<T>,
    cache: HashMap<ContextId, Option<T>>,
}

impl<T: Send + 'static> Transformer<T> {
    pub fn new(
        func: impl for<'a> Fn(&'a Lexicon, &'a [TransformItem<'a, T>]) -> Option<T>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            func: Arc::new(func),
            cache: HashMap::new(),
        }
    }

    /// The transformed value of `context`, if computed.
    pub fn result(&self, context: &Context) -> Option<&T> {
        self.cache.get(&context.id()).and_then(Option::as_ref)
    }

    /// Transform a whole tree synchronously (no worker involved).
    pub fn transform_tree(&mut self, root: &Context) -> Option<&T> {
        let cancel = CancellationToken::new();
        self.compute(root, &cancel);
        self.result(root)
    }

    /// Fill the cache bottom-up; `false` when cancelled between
    /// contexts.
    fn compute(&mut self, context: &Context, cancel: &CancellationToken) -> bool {
        if self.cache.contains_key(&context.id()) {
            return true;
        }
        for child in context.children() {
            if let Node::Context(sub) = child {
                if cancel.is_cancelled() {
                    return false;
                }
                if !self.compute(sub, cancel) {
                    return false;
                }
            }
        }
        let items: Vec<TransformItem<'_, T>> = context
            .children()
            .iter()
            .filter_map(|child| match child {
                Node::Token(token) => Some(TransformItem::Token(token)),
                Node::Context(sub) => self
                    .cache
                    .get(&sub.id())
                    .and_then(Option::as_ref)
                    .map(|value| TransformItem::Value {
                        lexicon: sub.lexicon(),
                        value,
                    }),
            })
            .collect();
        let value = (self.func)(context.lexicon(), &items);
        drop(items);
        self.cache.insert(context.id(), value);
        true
    }

    /// Drop cache entries for contexts that no longer exist in `root`.
    fn prune(&mut self, root: &Context) {
        let mut live = HashSet::new();
        collect_ids(root, &mut live);
        self.cache.retain(|id, _| live.contains(id));
    }
}

fn collect_ids(context: &Context, out: &mut HashSet<ContextId>) {
    out.insert(context.id());
    for child in context.children() {
        if let Node::Context(sub) = child {
            collect_ids(sub, out);
        }
    }
}

impl<T: Send + 'static> TransformRunner for Transformer<T> {
    fn invalidate(&mut self, context: ContextId, ancestors: &[ContextId]) {
        self.cache.remove(&context);
        for id in ancestors {
            self.cache.remove(id);
        }
    }

    fn process(&mut self, root: &Context, cancel: &CancellationToken) -> bool {
        let done = self.compute(root, cancel);
        if done {
            self.prune(root);
        }
        done
    }
}
