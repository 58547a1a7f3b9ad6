//! The worker: runs the tree builder (and an optional transformer) in a
//! background thread, coalescing edits and publishing consistent
//! snapshots.
//!
//! Foreground callers submit edits with [`update`](Worker::update), which
//! returns immediately. A submission while a rebuild is in flight cancels
//! the replay at the next event boundary; the edits merge into one change
//! range and the rebuild restarts against the newest text. Readers take
//! snapshots with [`get_root`](Worker::get_root); a snapshot is never a
//! partially rebuilt tree.

pub mod transform;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use tokio_util::sync::CancellationToken;

use crate::base::{Change, PendingChanges};
use crate::grammar::{GrammarError, Lexicon};
use crate::tree::builder::{BuildEvent, BuildStatus, EventKind, TreeBuilder};
use crate::tree::Context;

use transform::TransformRunner;

type FinishedCallback = Box<dyn FnOnce(&Arc<Context>) + Send>;

struct State {
    builder: Option<TreeBuilder>,
    pending: PendingChanges,
    pending_root_lexicon: Option<Lexicon>,
    busy: bool,
    quit: bool,
    published: Arc<Context>,
    last_update: (usize, usize),
    open: Vec<Lexicon>,
    error: Option<GrammarError>,
    cancel: CancellationToken,
    callbacks: Vec<FinishedCallback>,
}

struct Shared {
    state: Mutex<State>,
    cond: Condvar,
    notifier: Mutex<crate::tree::builder::Notifier>,
    transform: Option<Arc<Mutex<dyn TransformRunner>>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, event: &BuildEvent) {
        let notifier = match self.notifier.lock() {
            Ok(n) => n.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        notifier.emit(event);
    }
}

/// Owns a [`TreeBuilder`] and updates its tree in a background thread.
///
/// One worker per document. Edits submitted from one thread are applied
/// in submission order; pending edits are merged before each rebuild, so
/// the builder always works against the current full text.
pub struct Worker {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(builder: TreeBuilder) -> Self {
        Self::start(builder, None)
    }

    /// A worker that also keeps a transformer up to date: invalidations
    /// reach it during the rebuild, and after each `finished` event the
    /// transformer recomputes missing results (cancellable by the next
    /// submission).
    pub fn with_transform(builder: TreeBuilder, runner: Arc<Mutex<dyn TransformRunner>>) -> Self {
        Self::start(builder, Some(runner))
    }

    fn start(mut builder: TreeBuilder, transform: Option<Arc<Mutex<dyn TransformRunner>>>) -> Self {
        let shared = Arc::new_cyclic(|weak: &std::sync::Weak<Shared>| {
            // forward builder events to worker subscribers (and the
            // transformer), from inside the background rebuild
            for kind in [EventKind::Replace, EventKind::Invalidate, EventKind::Updated] {
                let weak = weak.clone();
                builder.connect(kind, move |event| {
                    if let Some(shared) = weak.upgrade() {
                        if let BuildEvent::Invalidate { context, ancestors } = event {
                            if let Some(runner) = &shared.transform {
                                lock_runner(runner).invalidate(*context, ancestors);
                            }
                        }
                        shared.emit(event);
                    }
                });
            }
            Shared {
                state: Mutex::new(State {
                    published: builder.root().clone(),
                    builder: Some(builder),
                    pending: PendingChanges::new(),
                    pending_root_lexicon: None,
                    busy: false,
                    quit: false,
                    last_update: (0, 0),
                    open: Vec::new(),
                    error: None,
                    cancel: CancellationToken::new(),
                    callbacks: Vec::new(),
                }),
                cond: Condvar::new(),
                notifier: Mutex::new(Default::default()),
                transform,
            }
        });

        let thread = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("relex-worker".into())
                .spawn(move || worker_loop(&shared))
                .expect("failed to spawn worker thread")
        };

        Self {
            shared,
            thread: Some(thread),
        }
    }

    /// Submit an edit: `text` is the new full text, `change` the replaced
    /// range. Non-blocking; interrupts an in-flight rebuild.
    pub fn update(&self, text: &str, change: Change) {
        let mut state = self.shared.lock();
        state.pending.add(text, change);
        state.cancel.cancel();
        self.shared.cond.notify_all();
    }

    /// Replace the root lexicon (full rebuild of `text`).
    pub fn update_root_lexicon(&self, text: &str, lexicon: Lexicon) {
        let mut state = self.shared.lock();
        state.pending.add_root_lexicon(text);
        state.pending_root_lexicon = Some(lexicon);
        state.cancel.cancel();
        self.shared.cond.notify_all();
    }

    /// The current tree snapshot. With `block = false` returns `None`
    /// while a rebuild is pending; with `block = true` waits for the next
    /// `finished` state.
    pub fn get_root(&self, block: bool) -> Option<Arc<Context>> {
        let mut state = self.shared.lock();
        if !state.busy && !state.pending.has_changes() {
            return Some(state.published.clone());
        }
        if !block {
            return None;
        }
        while state.busy || state.pending.has_changes() {
            state = match self.shared.cond.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if state.quit {
                return None;
            }
        }
        Some(state.published.clone())
    }

    /// Run `callback` with the root once the current work is finished
    /// (immediately when idle).
    pub fn get_root_callback(&self, callback: impl FnOnce(&Arc<Context>) + Send + 'static) {
        let root = {
            let mut state = self.shared.lock();
            if state.busy || state.pending.has_changes() {
                state.callbacks.push(Box::new(callback));
                return;
            }
            state.published.clone()
        };
        callback(&root);
    }

    /// Subscribe to `replace`, `invalidate`, `updated` and `finished`
    /// events. Callbacks run on the worker thread.
    pub fn connect(&self, kind: EventKind, callback: impl Fn(&BuildEvent) + Send + Sync + 'static) {
        match self.shared.notifier.lock() {
            Ok(mut n) => n.connect(kind, Arc::new(callback)),
            Err(poisoned) => poisoned.into_inner().connect(kind, Arc::new(callback)),
        }
    }

    /// The `(start, end)` range of the last completed rebuild.
    pub fn last_update(&self) -> (usize, usize) {
        self.shared.lock().last_update
    }

    /// Open lexicons after the last completed rebuild.
    pub fn open_lexicons(&self) -> Vec<Lexicon> {
        self.shared.lock().open.clone()
    }

    /// The grammar error of the last rebuild, if it failed. The previous
    /// tree stays published in that case.
    pub fn last_error(&self) -> Option<GrammarError> {
        self.shared.lock().error.clone()
    }

    /// Stop the background thread, interrupting any in-flight rebuild at
    /// the next event boundary. Called automatically on drop.
    pub fn close(&mut self) {
        {
            let mut state = self.shared.lock();
            state.quit = true;
            state.cancel.cancel();
            self.shared.cond.notify_all();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock_runner(runner: &Arc<Mutex<dyn TransformRunner>>) -> MutexGuard<'_, dyn TransformRunner + 'static> {
    match runner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        // wait for submitted changes
        let (mut builder, changes, root_lexicon, cancel) = {
            let mut state = shared.lock();
            loop {
                if state.quit {
                    return;
                }
                if state.pending.has_changes() && state.builder.is_some() {
                    break;
                }
                state = match shared.cond.wait(state) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
            let changes = state.pending.take();
            let root_lexicon = state.pending_root_lexicon.take();
            let cancel = CancellationToken::new();
            state.cancel = cancel.clone();
            state.busy = true;
            let Some(builder) = state.builder.take() else {
                continue;
            };
            (builder, changes, root_lexicon, cancel)
        };

        if let Some(lexicon) = root_lexicon {
            builder.set_root_lexicon(lexicon);
        }
        let change = changes
            .span()
            .filter(|_| !changes.root_lexicon_changed())
            .unwrap_or_else(|| Change::full(builder.root().end(), changes.text().len()));

        let result = catch_unwind(AssertUnwindSafe(|| {
            builder.rebuild_cancellable(changes.text(), change, &cancel)
        }));

        let mut state = shared.lock();
        match result {
            Ok(Ok(BuildStatus::Done)) => {
                state.published = builder.root().clone();
                state.last_update = (builder.start(), builder.end());
                state.open = builder.open_lexicons().to_vec();
                state.error = None;
            }
            Ok(Ok(BuildStatus::Interrupted)) => {
                // new changes are pending; the next iteration rebuilds
                // against the merged range
            }
            Ok(Err(error)) => {
                tracing::error!(%error, "grammar failed to compile, keeping previous tree");
                state.error = Some(error);
            }
            Err(_) => {
                // the tree may be half-spliced; clear it so the next
                // rebuild starts from scratch, and keep the published
                // (pre-rebuild) snapshot
                tracing::error!("tree builder panicked, keeping previous tree");
                let lexicon = builder.root().lexicon().clone();
                builder.set_root_lexicon(lexicon);
            }
        }
        state.builder = Some(builder);

        if state.pending.has_changes() {
            continue; // more work in this batch
        }

        state.busy = false;
        let callbacks = std::mem::take(&mut state.callbacks);
        let published = state.published.clone();
        drop(state);

        shared.emit(&BuildEvent::Finished);
        for callback in callbacks {
            callback(&published);
        }
        shared.cond.notify_all();

        if let Some(runner) = &shared.transform {
            if !lock_runner(runner).process(&published, &cancel) {
                tracing::debug!("transform interrupted");
            }
        }
    }
}
