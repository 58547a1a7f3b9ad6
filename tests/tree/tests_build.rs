//! Full builds: tree shape, invariants, determinism.

use relex::{actions, Node, TreeBuilder};
use rstest::rstest;

use crate::helpers::{assert_tree_invariants, heredoc, nonsense, paren, token_list};

#[test]
fn words_numbers_and_delimiters_stay_flat() {
    let mut builder = TreeBuilder::new(nonsense().lexicon("root").unwrap());
    let tree = builder.tree("Some text with 3 numbers").unwrap();
    assert_eq!(
        token_list(tree),
        vec![
            (0, "Some".into(), "Text"),
            (5, "text".into(), "Text"),
            (10, "with".into(), "Text"),
            (15, "3".into(), "Number"),
            (17, "numbers".into(), "Text"),
        ]
    );
    assert!(tree.children().iter().all(Node::is_token));
    assert!(builder.open_lexicons().is_empty());
}

#[test]
fn quoted_string_builds_a_child_context() {
    let mut builder = TreeBuilder::new(nonsense().lexicon("root").unwrap());
    let tree = builder.tree(r#""a string""#).unwrap();

    assert_eq!(tree.len(), 2);
    let quote = tree.children()[0].as_token().unwrap();
    assert_eq!((quote.pos, &*quote.text), (0, "\""));

    let string = tree.children()[1].as_context().unwrap();
    assert_eq!(*string, nonsense().lexicon("string").unwrap());
    assert_eq!(
        token_list(string),
        vec![(1, "a string".into(), "String"), (9, "\"".into(), "String")]
    );
    assert!(builder.open_lexicons().is_empty());
}

#[test]
fn unfinished_string_is_reported_open() {
    let mut builder = TreeBuilder::new(nonsense().lexicon("root").unwrap());
    builder.tree("an \"unfinished string").unwrap();
    let open = builder.open_lexicons();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].name(), "string");
}

#[test]
fn nested_groups_nest_contexts() {
    let mut builder = TreeBuilder::new(paren().lexicon("root").unwrap());
    let tree = builder.tree("1 (2 (33) 4) 5").unwrap();
    assert_tree_invariants(tree, "1 (2 (33) 4) 5");

    let outer = tree.children()[2].as_context().unwrap();
    assert_eq!((outer.pos(), outer.end()), (3, 12));
    let inner = outer
        .children()
        .iter()
        .find_map(Node::as_context)
        .unwrap();
    assert_eq!((inner.pos(), inner.end()), (6, 9));
    assert_eq!(inner.find_token(6).map(|t| &*t.text), Some("33"));
}

#[test]
fn heredoc_context_carries_its_argument() {
    let mut builder = TreeBuilder::new(heredoc().lexicon("root").unwrap());
    let text = "@mark@ body words mark after";
    let tree = builder.tree(text).unwrap();
    assert_tree_invariants(tree, text);

    let body = tree
        .children()
        .iter()
        .find_map(Node::as_context)
        .expect("heredoc context");
    assert_eq!(body.lexicon().name(), "heredoc");
    assert_eq!(body.lexicon().arg(), Some("mark"));
    // the end word from the opening delimiter pops the context
    assert_eq!(body.last_token().map(|t| &*t.text), Some("mark"));
    assert_eq!(
        token_list(tree).last().unwrap(),
        &(23, "after".to_string(), "Text")
    );
    assert!(builder.open_lexicons().is_empty());
}

#[test]
fn bygroup_tokens_form_one_group() {
    let lang = relex::Language::builder("Hex")
        .lexicon("root", |_| {
            Ok(vec![
                relex::GrammarRule::new(
                    r"(0x)([0-9a-f]+)",
                    relex::rule::bygroup([actions::NAME, actions::NUMBER]),
                ),
                relex::GrammarRule::new(r"\s+", relex::ActionSpec::Skip),
            ])
        })
        .build();
    let mut builder = TreeBuilder::new(lang.lexicon("root").unwrap());
    let tree = builder.tree("0xff 0x1").unwrap();
    assert_tree_invariants(tree, "0xff 0x1");

    let groups: Vec<Option<i16>> = tree.tokens().map(|t| t.group).collect();
    assert_eq!(groups, vec![Some(0), Some(-1), Some(0), Some(-1)]);
}

#[rstest]
#[case("Some text with 3 numbers")]
#[case("\"a string\" and %comment\nmore")]
#[case("")]
#[case("unmatched }{ punctuation")]
#[case("\"nested % inside string\" after")]
fn full_builds_are_deterministic(#[case] text: &str) {
    let mut a = TreeBuilder::new(nonsense().lexicon("root").unwrap());
    let mut b = TreeBuilder::new(nonsense().lexicon("root").unwrap());
    let tree_a = a.tree(text).unwrap();
    assert_tree_invariants(tree_a, text);
    assert_eq!(tree_a, b.tree(text).unwrap());
}
