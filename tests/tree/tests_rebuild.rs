//! Incremental rebuilds: equivalence with full builds, reuse, and the
//! reported update ranges.

use relex::{Change, Context, ContextId, Node, TreeBuilder};
use rstest::rstest;

use crate::helpers::{apply_edit, assert_tree_invariants, nonsense, paren, token_list};

/// Rebuild after an edit and check the result equals a from-scratch
/// build of the new text.
fn check_rebuild(lang: &relex::Language, text: &str, change: Change, insert: &str) {
    let mut builder = TreeBuilder::new(lang.lexicon("root").unwrap());
    builder.tree(text).unwrap();
    let new_text = apply_edit(text, change, insert);
    builder.rebuild(&new_text, change).unwrap();
    assert_tree_invariants(builder.root(), &new_text);

    let mut fresh = TreeBuilder::new(lang.lexicon("root").unwrap());
    let expected = fresh.tree(&new_text).unwrap();
    assert_eq!(
        builder.root().as_ref(),
        expected,
        "rebuild diverged from full build for {change:?} on {text:?}\nrebuilt:\n{}\nfull:\n{}",
        builder.root().dump(),
        expected.dump(),
    );
    assert_eq!(builder.open_lexicons(), fresh.open_lexicons());
}

#[test]
fn appending_the_closing_quote() {
    let text = "an \"unfinished string";
    let mut builder = TreeBuilder::new(nonsense().lexicon("root").unwrap());
    builder.tree(text).unwrap();
    assert_eq!(builder.open_lexicons().len(), 1);
    let before = token_list(builder.root());

    let change = Change::new(21, 0, 1);
    builder.rebuild("an \"unfinished string\"", change).unwrap();

    // only the closing quote was added; everything left of it survived
    assert_eq!((builder.start(), builder.end()), (21, 22));
    assert!(builder.open_lexicons().is_empty());
    let after = token_list(builder.root());
    assert_eq!(&after[..before.len() - 1], &before[..before.len() - 1]);
    assert_eq!(after.last().unwrap(), &(21, "\"".to_string(), "String"));
}

#[test]
fn growing_a_string_inside_a_group() {
    // replace "unfinished" with "much longer example" inside parentheses
    let text = "a (\"unfinished\") b";
    let change = Change::new(4, 10, 19);
    let new_text = apply_edit(text, change, "much longer example");
    let mut builder = TreeBuilder::new(paren().lexicon("root").unwrap());
    builder.tree(text).unwrap();
    let group_end_before = group_context(builder.root()).end();

    builder.rebuild(&new_text, change).unwrap();
    assert_tree_invariants(builder.root(), &new_text);

    // the containing context's end moved by the growth
    let group = group_context(builder.root());
    assert_eq!(group.end(), group_end_before + 9);

    // tokens outside the edited range kept action and position shape
    let tokens = token_list(builder.root());
    assert_eq!(tokens.first().unwrap(), &(0, "a".to_string(), "Text"));
    assert_eq!(tokens.last().unwrap(), &(26, "b".to_string(), "Text"));

    // one update range covering the replacement
    assert!(builder.start() <= change.pos);
    assert!(builder.end() >= change.pos + change.added);
}

fn group_context(root: &Context) -> &Context {
    root.children()
        .iter()
        .find_map(Node::as_context)
        .expect("group context")
}

#[rstest]
#[case(Change::new(0, 0, 4), "new ")]
#[case(Change::new(0, 4, 0), "")]
#[case(Change::new(9, 1, 3), "big")]
#[case(Change::new(14, 0, 1), "\"")]
#[case(Change::new(14, 1, 0), "")]
#[case(Change::new(27, 0, 9), " trailing")]
#[case(Change::new(5, 9, 1), "x")]
fn rebuild_matches_full_build(#[case] change: Change, #[case] insert: &str) {
    check_rebuild(nonsense(), "one \"two\" 3 % note\nfour five", change, insert);
}

#[rstest]
#[case(Change::new(3, 0, 1), "(")]
#[case(Change::new(8, 1, 0), "")]
#[case(Change::new(12, 2, 2), "77")]
#[case(Change::new(0, 1, 1), "9")]
fn rebuild_matches_full_build_with_nesting(#[case] change: Change, #[case] insert: &str) {
    check_rebuild(paren(), "1 (2 (3) 4) (5 (6) 7) 8", change, insert);
}

#[test]
fn every_single_char_deletion_matches_full_build() {
    let text = "ab \"cd\" 12 %x\ny";
    for pos in 0..text.len() {
        if !text.is_char_boundary(pos) || !text.is_char_boundary(pos + 1) {
            continue;
        }
        check_rebuild(nonsense(), text, Change::new(pos, 1, 0), "");
    }
}

#[test]
fn far_suffix_is_reused_not_rebuilt() {
    let mut text = String::new();
    for i in 0..40 {
        text.push_str(&format!("word{i} \"str{i}\" {i} "));
    }
    let mut builder = TreeBuilder::new(nonsense().lexicon("root").unwrap());
    builder.tree(&text).unwrap();

    let suffix_ids: Vec<ContextId> = context_ids(builder.root())
        .into_iter()
        .skip(10)
        .collect();

    let change = Change::new(0, 4, 2);
    let new_text = apply_edit(&text, change, "WW");
    builder.rebuild(&new_text, change).unwrap();
    assert_tree_invariants(builder.root(), &new_text);

    let after_ids = context_ids(builder.root());
    for id in &suffix_ids {
        assert!(
            after_ids.contains(id),
            "suffix context {id:?} was rebuilt instead of reused"
        );
    }

    // and the reported range stays near the edit
    assert_eq!(builder.start(), 0);
    assert!(builder.end() < 40, "end {} reaches into the suffix", builder.end());
}

fn context_ids(root: &Context) -> Vec<ContextId> {
    root.children()
        .iter()
        .filter_map(|n| n.as_context().map(Context::id))
        .collect()
}

#[test]
fn edits_far_apart_in_sequence() {
    let text = "alpha \"beta\" 1 % c\ndelta epsilon 22 zeta";
    let mut builder = TreeBuilder::new(nonsense().lexicon("root").unwrap());
    builder.tree(text).unwrap();

    let mut current = text.to_string();
    for (change, insert) in [
        (Change::new(0, 5, 3), "ALP"),
        (Change::new(20, 0, 6), "gamma "),
        (Change::new(30, 2, 0), ""),
    ] {
        let next = apply_edit(&current, change, insert);
        builder.rebuild(&next, change).unwrap();
        assert_tree_invariants(builder.root(), &next);
        current = next;
    }

    let mut fresh = TreeBuilder::new(nonsense().lexicon("root").unwrap());
    assert_eq!(builder.root().as_ref(), fresh.tree(&current).unwrap());
}

#[test]
fn pathological_grammars_terminate() {
    // a rule that can match the empty string
    let lang = relex::Language::builder("Weird")
        .lexicon("root", |_| {
            Ok(vec![relex::GrammarRule::new(r"x*", relex::actions::TEXT)])
        })
        .build();
    let mut builder = TreeBuilder::new(lang.lexicon("root").unwrap());
    let tree = builder.tree("axxbxc").unwrap();
    assert!(tree.tokens().all(|t| !t.text.is_empty()));

    // a push/pop cycle that never consumes text
    let lang = relex::Language::builder("Cycle")
        .lexicon("a", |ctx| {
            Ok(vec![relex::GrammarRule::default_target([
                relex::TargetItem::Push(ctx.lexicon("b")?),
            ])])
        })
        .lexicon("b", |_| {
            Ok(vec![relex::GrammarRule::default_target([
                relex::TargetItem::Jump(-1),
            ])])
        })
        .build();
    let mut builder = TreeBuilder::new(lang.lexicon("a").unwrap());
    builder.tree("no match here").unwrap();
}
