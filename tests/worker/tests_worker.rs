//! Background worker: coalescing, snapshots, events, transform hook.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use relex::{
    actions, BuildEvent, Change, EventKind, GrammarRule, Language, TransformItem, Transformer,
    TreeBuilder, Worker,
};

use crate::helpers::{apply_edit, assert_tree_invariants, nonsense, token_list};

fn worker() -> Worker {
    Worker::new(TreeBuilder::new(nonsense().lexicon("root").unwrap()))
}

#[test]
fn edits_are_applied_in_submission_order() {
    let worker = worker();
    let mut text = String::new();
    for (i, word) in ["alpha", "beta", "gamma", "delta"].iter().enumerate() {
        let pos = text.len();
        let insert = if i == 0 {
            word.to_string()
        } else {
            format!(" {word}")
        };
        let change = Change::new(pos, 0, insert.len());
        text = apply_edit(&text, change, &insert);
        worker.update(&text, change);
    }
    let root = worker.get_root(true).unwrap();
    assert_tree_invariants(&root, &text);
    let words: Vec<String> = root.tokens().map(|t| t.text.to_string()).collect();
    assert_eq!(words, vec!["alpha", "beta", "gamma", "delta"]);
}

#[test]
fn rebuilt_tree_matches_a_foreground_build() {
    let worker = worker();
    let text = "check \"this\" 42 % end\nhere";
    worker.update(text, Change::new(0, 0, text.len()));
    let root = worker.get_root(true).unwrap();

    let mut fresh = TreeBuilder::new(nonsense().lexicon("root").unwrap());
    assert_eq!(root.as_ref(), fresh.tree(text).unwrap());
}

#[test]
fn closing_a_string_through_the_worker() {
    let worker = worker();
    let text = "an \"unfinished string";
    worker.update(text, Change::new(0, 0, text.len()));
    worker.get_root(true).unwrap();
    assert_eq!(worker.open_lexicons().len(), 1);

    let updated: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let updated = Arc::clone(&updated);
        worker.connect(EventKind::Updated, move |event| {
            if let BuildEvent::Updated { start, end } = event {
                updated.lock().unwrap().push((*start, *end));
            }
        });
    }

    let change = Change::new(21, 0, 1);
    worker.update("an \"unfinished string\"", change);
    let root = worker.get_root(true).unwrap();

    assert!(worker.open_lexicons().is_empty());
    assert_eq!(worker.last_update(), (21, 22));
    assert_eq!(updated.lock().unwrap().as_slice(), &[(21, 22)]);
    assert_eq!(
        token_list(&root).last().unwrap(),
        &(21, "\"".to_string(), "String")
    );
}

#[test]
fn event_order_is_replace_invalidate_updated_finished() {
    let worker = worker();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    for (kind, name) in [
        (EventKind::Replace, "replace"),
        (EventKind::Invalidate, "invalidate"),
        (EventKind::Updated, "updated"),
        (EventKind::Finished, "finished"),
    ] {
        let order = Arc::clone(&order);
        worker.connect(kind, move |_| order.lock().unwrap().push(name));
    }
    worker.update("one two", Change::new(0, 0, 7));
    worker.get_root(true).unwrap();

    let seen = order.lock().unwrap();
    let finished_at = seen.iter().position(|n| *n == "finished").unwrap();
    assert_eq!(seen[..finished_at.min(3)], ["replace", "invalidate", "updated"][..finished_at.min(3)]);
    assert_eq!(seen.last(), Some(&"finished"));
}

#[test]
fn grammar_errors_keep_the_previous_tree() {
    let lang = Language::builder("Broken")
        .lexicon("root", |_| Ok(vec![GrammarRule::new(r"(", actions::TEXT)]))
        .build();
    let worker = Worker::new(TreeBuilder::new(lang.lexicon("root").unwrap()));
    worker.update("text", Change::new(0, 0, 4));
    let root = worker.get_root(true).unwrap();
    assert!(root.is_empty());
    assert!(worker.last_error().is_some());
}

#[test]
fn transformer_tracks_edits_through_the_worker() {
    let lang = Language::builder("Sum")
        .lexicon("root", |ctx| {
            Ok(vec![
                GrammarRule::new(r"\d+", actions::NUMBER),
                GrammarRule::new(r"\(", actions::DELIMITER).push(ctx.lexicon("group")?),
            ])
        })
        .lexicon("group", |ctx| {
            Ok(vec![
                GrammarRule::new(r"\)", actions::DELIMITER).pop(1),
                GrammarRule::new(r"\d+", actions::NUMBER),
                GrammarRule::new(r"\(", actions::DELIMITER).push(ctx.lexicon("group")?),
            ])
        })
        .build();

    let transformer: Arc<Mutex<Transformer<i64>>> =
        Arc::new(Mutex::new(Transformer::new(|_lexicon, items| {
            let mut total = 0;
            for item in items {
                match item {
                    TransformItem::Token(t) if t.action == actions::NUMBER => {
                        total += t.text.parse::<i64>().unwrap_or(0);
                    }
                    TransformItem::Value { value, .. } => total += **value,
                    _ => {}
                }
            }
            Some(total)
        })));

    let worker = Worker::with_transform(
        TreeBuilder::new(lang.lexicon("root").unwrap()),
        transformer.clone() as Arc<Mutex<dyn relex::TransformRunner>>,
    );

    let text = "1 (2 3) 4";
    worker.update(text, Change::new(0, 0, text.len()));
    let root = worker.get_root(true).unwrap();
    wait_for(|| transformer.lock().unwrap().result(&root) == Some(&10));

    let change = Change::new(8, 1, 2);
    let new_text = apply_edit(text, change, "40");
    worker.update(&new_text, change);
    let root = worker.get_root(true).unwrap();
    wait_for(|| transformer.lock().unwrap().result(&root) == Some(&46));
}

/// The transform runs on the worker thread after `finished`; poll
/// briefly instead of racing it.
fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    panic!("condition not reached in time");
}

#[test]
fn callbacks_run_once_after_the_batch() {
    let worker = worker();
    let count = Arc::new(AtomicUsize::new(0));
    worker.update("abc def", Change::new(0, 0, 7));
    {
        let count = Arc::clone(&count);
        worker.get_root_callback(move |root| {
            assert!(root.tokens().count() >= 1);
            count.fetch_add(1, Ordering::SeqCst);
        });
    }
    worker.get_root(true).unwrap();
    wait_for(|| count.load(Ordering::SeqCst) == 1);
}
