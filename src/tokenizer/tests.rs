use std::ops::Range;

use pretty_assertions::assert_eq;

use super::{tokenize, Token, TokenKind};
use crate::{Error, Span};

fn token(kind: TokenKind, range: Range<u32>) -> Token {
    Token { kind, span: Span(range) }
}

#[test]
fn literal_runs_coalesce() {
    assert_eq!(
        tokenize("abc").unwrap(),
        vec![token(TokenKind::Word, 0..3)]
    );
    assert_eq!(
        tokenize("a.b").unwrap(),
        vec![
            token(TokenKind::Word, 0..1),
            token(TokenKind::Dot, 1..2),
            token(TokenKind::Word, 2..3),
        ]
    );
}

#[test]
fn no_two_adjacent_words() {
    for pattern in [r"abc", r"a\+b", r"a\\bc\.d", r"x[a]yz", r"(?i)Ab"] {
        let tokens = tokenize(pattern).unwrap();
        assert!(
            !tokens.windows(2).any(|w| w[0].kind == TokenKind::Word
                && w[1].kind == TokenKind::Word),
            "{pattern}"
        );
    }
}

#[test]
fn metacharacters() {
    assert_eq!(
        tokenize("+*?^$.|()").unwrap(),
        vec![
            token(TokenKind::Plus, 0..1),
            token(TokenKind::Star, 1..2),
            token(TokenKind::Question, 2..3),
            token(TokenKind::Caret, 3..4),
            token(TokenKind::Dollar, 4..5),
            token(TokenKind::Dot, 5..6),
            token(TokenKind::Pipe, 6..7),
            token(TokenKind::LParen, 7..8),
            token(TokenKind::RParen, 8..9),
        ]
    );
}

#[test]
fn escaped_metacharacters_become_words() {
    // The escaping backslash stays inside the span; the compiler strips
    // it when copying the literal.
    assert_eq!(
        tokenize(r"a\+b").unwrap(),
        vec![token(TokenKind::Word, 0..4)]
    );
    assert_eq!(
        tokenize(r"\\").unwrap(),
        vec![token(TokenKind::Word, 0..2)]
    );
    assert_eq!(
        tokenize(r"\(\)").unwrap(),
        vec![token(TokenKind::Word, 0..4)]
    );
}

#[test]
fn trailing_backslash_is_ignored() {
    assert_eq!(
        tokenize("a\\").unwrap(),
        vec![token(TokenKind::Word, 0..1)]
    );
}

#[test]
fn classes() {
    assert_eq!(
        tokenize("[abc]").unwrap(),
        vec![token(TokenKind::Set, 0..5)]
    );
    assert_eq!(
        tokenize("x[a-z]y").unwrap(),
        vec![
            token(TokenKind::Word, 0..1),
            token(TokenKind::Set, 1..6),
            token(TokenKind::Word, 6..7),
        ]
    );
}

#[test]
fn negated_class_span_starts_at_the_caret() {
    assert_eq!(
        tokenize("[^ab]").unwrap(),
        vec![token(TokenKind::Set, 1..5)]
    );
}

#[test]
fn unterminated_class() {
    assert_eq!(tokenize("[ab").err(), Some(Error::Unbalanced { pos: 0 }));
    assert_eq!(tokenize("a[bc").err(), Some(Error::Unbalanced { pos: 1 }));
    assert_eq!(tokenize("[^ab").err(), Some(Error::Unbalanced { pos: 1 }));
}

#[test]
fn repetitions() {
    assert_eq!(
        tokenize("a{2,3}").unwrap(),
        vec![
            token(TokenKind::Word, 0..1),
            token(TokenKind::Repeat, 1..6),
        ]
    );
}

#[test]
fn unterminated_repetition() {
    assert_eq!(tokenize("a{2").err(), Some(Error::Unbalanced { pos: 1 }));
}

#[test]
fn backreferences_and_meta_classes() {
    assert_eq!(
        tokenize(r"\1").unwrap(),
        vec![token(TokenKind::Backref, 0..2)]
    );
    assert_eq!(
        tokenize(r"\d\S").unwrap(),
        vec![
            token(TokenKind::MetaClass, 0..2),
            token(TokenKind::MetaClass, 2..4),
        ]
    );
    // `\e` is not a meta class, just an escaped literal.
    assert_eq!(
        tokenize(r"\e").unwrap(),
        vec![token(TokenKind::Word, 0..2)]
    );
}

#[test]
fn multibyte_runes() {
    assert_eq!(
        tokenize("é+").unwrap(),
        vec![
            token(TokenKind::Word, 0..2),
            token(TokenKind::Plus, 2..3),
        ]
    );
}

#[test]
fn suffix_and_atom_predicates() {
    assert!(TokenKind::Star.is_suffix());
    assert!(TokenKind::Plus.is_suffix());
    assert!(TokenKind::Question.is_suffix());
    assert!(TokenKind::Repeat.is_suffix());
    assert!(!TokenKind::Pipe.is_suffix());

    assert!(TokenKind::Word.is_atom());
    assert!(TokenKind::Set.is_atom());
    assert!(TokenKind::Backref.is_atom());
    assert!(!TokenKind::Pipe.is_atom());
    assert!(!TokenKind::LParen.is_atom());
    assert!(!TokenKind::Star.is_atom());
}
