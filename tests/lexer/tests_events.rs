//! Event-stream level checks of the lexer.

use relex::{Event, Lexer};

use crate::helpers::{heredoc, keywords, nonsense};

fn events(lexer: Lexer<'_>) -> Vec<Event> {
    lexer.collect::<Result<Vec<_>, _>>().unwrap()
}

fn lexemes(events: &[Event]) -> Vec<(usize, String, &'static str)> {
    events
        .iter()
        .flat_map(|e| &e.lexemes)
        .map(|l| (l.pos, l.text.to_string(), l.action.name()))
        .collect()
}

#[test]
fn event_stream_is_lossless_over_mixed_input() {
    let root = nonsense().lexicon("root").unwrap();
    let text = "say \"hi\" 2 me! %rest\nok";
    let evs = events(Lexer::new(root, text));
    assert_eq!(
        lexemes(&evs),
        vec![
            (0, "say".into(), "Text"),
            (4, "\"".into(), "String"),
            (5, "hi".into(), "String"),
            (7, "\"".into(), "String"),
            (9, "2".into(), "Number"),
            (11, "me".into(), "Text"),
            (13, "!".into(), "Delimiter"),
            (15, "%".into(), "Comment"),
            (16, "rest".into(), "Comment"),
            (21, "ok".into(), "Text"),
        ]
    );
}

#[test]
fn stack_reflects_state_after_each_event() {
    let root = nonsense().lexicon("root").unwrap();
    let mut lexer = Lexer::new(root, "a \"b");
    let mut depths = Vec::new();
    while let Some(event) = lexer.next() {
        event.unwrap();
        depths.push(lexer.stack().len());
    }
    // pushed into the string lexicon by the quote and never popped
    assert_eq!(depths.last(), Some(&2));
    assert_eq!(lexer.stack()[1].name(), "string");
}

#[test]
fn default_target_retries_at_same_position() {
    let root = keywords().lexicon("root").unwrap();
    let evs = events(Lexer::new(root, "numbers: 1 2 x"));
    let list = lexemes(&evs);
    // "x" is lexed by the root lexicon after the fall-through pop
    assert_eq!(list.last().unwrap(), &(13, "x".to_string(), "Name"));
    // the pop itself is a pure stack-change event
    assert!(evs
        .iter()
        .any(|e| e.lexemes.is_empty() && e.target.as_ref().is_some_and(|t| t.pop == 1)));
}

#[test]
fn derived_lexicon_is_entered_with_the_matched_argument() {
    let root = heredoc().lexicon("root").unwrap();
    let mut lexer = Lexer::new(root, "@mark@ body that never ends");
    let first = lexer.next().unwrap().unwrap();
    let target = first.target.expect("opening delimiter pushes");
    assert_eq!(target.push.len(), 1);
    assert_eq!(target.push[0].name(), "heredoc");
    assert_eq!(target.push[0].arg(), Some("mark"));
}

#[test]
fn derived_lexicons_with_equal_args_share_identity() {
    let root = heredoc().lexicon("root").unwrap();
    let a = events(Lexer::new(root.clone(), "@m@ x m"));
    let b = events(Lexer::new(root, "@m@ y m"));
    let push_of = |evs: &[Event]| {
        evs.iter()
            .find_map(|e| e.target.clone())
            .unwrap()
            .push
            .remove(0)
    };
    assert!(push_of(&a).same(&push_of(&b)));
}

#[test]
fn grammar_error_ends_the_stream() {
    let lang = relex::Language::builder("Bad")
        .lexicon("root", |_| {
            Ok(vec![relex::GrammarRule::new(r"(", relex::actions::TEXT)])
        })
        .build();
    let mut lexer = Lexer::new(lang.lexicon("root").unwrap(), "text");
    assert!(matches!(lexer.next(), Some(Err(_))));
    assert!(lexer.next().is_none());
}
