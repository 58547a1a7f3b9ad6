//! Shared grammar fixtures and tree checks.

use relex::{actions, rule, ActionSpec, Change, Context, GrammarRule, Language, Node};

/// The running example grammar: words, numbers, quoted strings, and
/// line comments.
pub fn nonsense() -> &'static Language {
    static LANG: std::sync::OnceLock<Language> = std::sync::OnceLock::new();
    LANG.get_or_init(|| {
        Language::builder("Nonsense")
            .lexicon("root", |ctx| {
                Ok(vec![
                    GrammarRule::new(r"\d+", actions::NUMBER),
                    GrammarRule::new(r"\w+", actions::TEXT),
                    GrammarRule::new(r#"""#, actions::STRING).push(ctx.lexicon("string")?),
                    GrammarRule::new(r"%", actions::COMMENT).push(ctx.lexicon("comment")?),
                    GrammarRule::new(r"[.,:?!]", actions::DELIMITER),
                ])
            })
            .lexicon("string", |_| {
                Ok(vec![
                    GrammarRule::new(r#"""#, actions::STRING).pop(1),
                    GrammarRule::default_action(actions::STRING),
                ])
            })
            .lexicon_with(
                "comment",
                relex::LexiconOpts::new().re_flags(relex::ReFlags::new().multi_line()),
                |_| {
                    Ok(vec![
                        GrammarRule::new(r"$", actions::COMMENT).pop(1),
                        GrammarRule::default_action(actions::COMMENT),
                    ])
                },
            )
            .build()
    })
}

/// Numbers grouped by parentheses; used for context-shape checks.
pub fn paren() -> &'static Language {
    static LANG: std::sync::OnceLock<Language> = std::sync::OnceLock::new();
    LANG.get_or_init(|| {
        Language::builder("Paren")
            .lexicon("root", |ctx| {
                Ok(vec![
                    GrammarRule::new(r"\(", actions::DELIMITER).push(ctx.lexicon("group")?),
                    GrammarRule::new(r"\d+", actions::NUMBER),
                    GrammarRule::new(r"\w+", actions::TEXT),
                    GrammarRule::new(r#"""#, actions::STRING).push(ctx.lexicon("string")?),
                ])
            })
            .lexicon("group", |ctx| {
                Ok(vec![
                    GrammarRule::new(r"\)", actions::DELIMITER).pop(1),
                    GrammarRule::new(r"\(", actions::DELIMITER).push(ctx.lexicon("group")?),
                    GrammarRule::new(r"\d+", actions::NUMBER),
                    GrammarRule::new(r"\w+", actions::TEXT),
                    GrammarRule::new(r#"""#, actions::STRING).push(ctx.lexicon("string")?),
                ])
            })
            .lexicon("string", |_| {
                Ok(vec![
                    GrammarRule::new(r#"""#, actions::STRING).pop(1),
                    GrammarRule::default_action(actions::STRING),
                ])
            })
            .build()
    })
}

/// Here-doc style grammar: `@mark@ ... mark` with the end word taken
/// from the opening delimiter via a derived lexicon.
pub fn heredoc() -> &'static Language {
    static LANG: std::sync::OnceLock<Language> = std::sync::OnceLock::new();
    LANG.get_or_init(|| {
        Language::builder("Doc")
            .lexicon("root", |ctx| {
                Ok(vec![
                    GrammarRule::new(r"@(\w+)@", actions::DELIMITER)
                        .target(rule::derive(ctx.lexicon("heredoc")?, rule::match_group(1))),
                    GrammarRule::new(r"\w+", actions::TEXT),
                ])
            })
            .lexicon("heredoc", |ctx| {
                Ok(vec![
                    GrammarRule::dynamic(
                        rule::arg_pattern(ctx, r"\b", r"\b"),
                        actions::DELIMITER,
                    )
                    .pop(1),
                    GrammarRule::default_action(actions::TEXT),
                ])
            })
            .build()
    })
}

/// A grammar that skips whitespace explicitly, for skip/target checks.
pub fn keywords() -> &'static Language {
    static LANG: std::sync::OnceLock<Language> = std::sync::OnceLock::new();
    LANG.get_or_init(|| {
        Language::builder("Kw")
            .lexicon("root", |ctx| {
                Ok(vec![
                    GrammarRule::new(r"\s+", ActionSpec::Skip),
                    GrammarRule::new(r"numbers:", actions::KEYWORD).push(ctx.lexicon("numbers")?),
                    GrammarRule::new(r"\d+", actions::NUMBER),
                    GrammarRule::new(
                        rule::words(&["if", "else", "while"], r"\b", r"\b"),
                        actions::KEYWORD,
                    ),
                    GrammarRule::new(r"\w+", actions::NAME),
                ])
            })
            .lexicon("numbers", |_| {
                Ok(vec![
                    GrammarRule::new(r"\s+", ActionSpec::Skip),
                    GrammarRule::new(r"\d+", actions::NUMBER),
                    GrammarRule::default_target([relex::TargetItem::Jump(-1)]),
                ])
            })
            .build()
    })
}

/// Apply an edit the way an editor would, returning the new text.
pub fn apply_edit(text: &str, change: Change, insert: &str) -> String {
    assert_eq!(insert.len(), change.added);
    let mut out = String::with_capacity(text.len() + change.added - change.removed);
    out.push_str(&text[..change.pos]);
    out.push_str(insert);
    out.push_str(&text[change.pos + change.removed..]);
    out
}

/// Flat view of a tree for assertions: `(pos, text, action name)`.
pub fn token_list(root: &Context) -> Vec<(usize, String, &'static str)> {
    root.tokens()
        .map(|t| (t.pos, t.text.to_string(), t.action.name()))
        .collect()
}

/// Check the structural invariants every built tree must satisfy:
/// tokens appear in document order without overlap, each token's text is
/// the corresponding slice of the text, children stay inside their
/// parent's span, no non-root context is empty, and token groups are
/// contiguous with exactly one (trailing, negated) end marker.
pub fn assert_tree_invariants(root: &Context, text: &str) {
    let mut prev_end = 0;
    for token in root.tokens() {
        assert!(
            token.pos >= prev_end,
            "overlapping tokens at {} (previous ended at {})",
            token.pos,
            prev_end
        );
        assert_eq!(
            &text[token.pos..token.end()],
            &*token.text,
            "token text does not match the text at {}",
            token.pos
        );
        prev_end = token.end();
    }
    assert_context_invariants(root, true);
}

fn assert_context_invariants(context: &Context, is_root: bool) {
    assert!(
        is_root || !context.is_empty(),
        "empty context {} in the tree",
        context.lexicon()
    );
    let (pos, end) = (context.pos(), context.end());
    let mut group_run: Vec<i16> = Vec::new();
    for child in context.children() {
        assert!(pos <= child.pos() && child.end() <= end, "child outside parent span");
        match child {
            Node::Token(token) => {
                match token.group {
                    Some(0) => {
                        assert!(group_run.is_empty(), "group started inside a group");
                        group_run.push(0);
                    }
                    Some(g) if g < 0 => {
                        assert!(!group_run.is_empty(), "group end without start");
                        assert_eq!((-g) as usize, group_run.len(), "group index out of sequence");
                        group_run.clear();
                    }
                    Some(g) => {
                        assert_eq!(g as usize, group_run.len(), "group index out of sequence");
                        group_run.push(g);
                    }
                    None => assert!(group_run.is_empty(), "plain token inside a group"),
                }
            }
            Node::Context(sub) => {
                assert!(group_run.is_empty(), "context inside a token group");
                assert_context_invariants(sub, false);
            }
        }
    }
    assert!(group_run.is_empty(), "unterminated token group");
}
