// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! Property suites for the A2ML engine: lexer and parser totality over
//! arbitrary input, and the round-trip laws.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use ochrance_core::a2ml::ast::{Document, Entry, Section, Value};
use ochrance_core::a2ml::token::{SectionKind, Token, TokenKind};
use ochrance_core::a2ml::{
    lex, parse, serialize, serialize_canonical, serialize_compact, validate,
};

fn ident_strategy() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,10}".prop_filter("reserved words collide with booleans", |s| {
        s != "true" && s != "false"
    })
}

fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<String>().prop_map(Value::Str),
        ident_strategy().prop_map(Value::Ident),
        "[0-9a-f]{2,64}".prop_filter("even length hex", |s| s.len() % 2 == 0).prop_map(Value::Hash),
        (0i64..i64::MAX).prop_map(Value::Int),
        (0i64..4_000_000_000i64).prop_map(|secs| {
            Value::Timestamp(Utc.timestamp_opt(secs, 0).single().expect("in range"))
        }),
        any::<bool>().prop_map(Value::Bool),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Blob),
    ];
    leaf.prop_recursive(2, 16, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(Value::List)
    })
}

fn entry_strategy() -> impl Strategy<Value = Entry> {
    let value_entry = (ident_strategy(), value_strategy())
        .prop_map(|(key, value)| Entry::new(key, value));
    value_entry.prop_recursive(3, 12, 4, |inner| {
        (ident_strategy(), prop::collection::vec(inner, 0..4))
            .prop_map(|(key, children)| Entry::block(key, children))
    })
}

fn document_strategy() -> impl Strategy<Value = Document> {
    let section = |kind: SectionKind| {
        prop::collection::vec(entry_strategy(), 0..6).prop_map(move |entries| Section {
            kind,
            entries,
        })
    };
    (
        section(SectionKind::Manifest),
        prop::option::of(section(SectionKind::Refs)),
        prop::option::of(section(SectionKind::Policy)),
        prop::option::of(section(SectionKind::Audit)),
    )
        .prop_map(|(manifest, refs, policy, audit)| {
            let mut doc = Document::new(1, 0);
            assert!(doc.insert_section(manifest));
            for section in [refs, policy, audit].into_iter().flatten() {
                assert!(doc.insert_section(section));
            }
            doc
        })
}

fn token_strategy() -> impl Strategy<Value = Token> {
    let punctuation = prop_oneof![
        Just(TokenKind::LBrace),
        Just(TokenKind::RBrace),
        Just(TokenKind::Colon),
        Just(TokenKind::Equals),
        Just(TokenKind::LBracket),
        Just(TokenKind::RBracket),
        Just(TokenKind::Comma),
        Just(TokenKind::Eof),
        Just(TokenKind::Header { major: 1, minor: 0 }),
        Just(TokenKind::Section(SectionKind::Manifest)),
    ];
    let value_bearing = prop_oneof![
        Just(TokenKind::Section(SectionKind::Refs)),
        ident_strategy().prop_map(TokenKind::Ident),
        any::<String>().prop_map(TokenKind::Str),
        "[0-9a-f]{2,16}".prop_map(TokenKind::HashLit),
        any::<i64>().prop_map(TokenKind::Int),
        any::<String>().prop_map(TokenKind::Timestamp),
        any::<String>().prop_map(TokenKind::Blob),
    ];
    let kind = prop_oneof![punctuation, value_bearing];
    (kind, 1u32..1000, 1u32..200).prop_map(|(kind, line, column)| Token { kind, line, column })
}

proptest! {
    /// Lexer totality: every input terminates as Eof-terminated tokens or
    /// a single error; it never panics and never loops.
    #[test]
    fn lexer_is_total(input in any::<String>()) {
        match lex(&input) {
            Ok(tokens) => {
                prop_assert!(matches!(
                    tokens.last().map(|t| &t.kind),
                    Some(TokenKind::Eof)
                ));
            }
            Err(err) => {
                prop_assert!(err.line >= 1);
                prop_assert!(err.column >= 1);
            }
        }
    }

    /// Parser totality: arbitrary token vectors terminate in a document or
    /// an error.
    #[test]
    fn parser_is_total(tokens in prop::collection::vec(token_strategy(), 0..64)) {
        let _ = parse(&tokens);
    }

    /// `parse(lex(serialize(m))) = Ok(m)` up to section-order
    /// normalisation, which the AST applies on construction.
    #[test]
    fn serialize_parse_roundtrip(doc in document_strategy()) {
        let text = serialize(&doc);
        let tokens = lex(&text).map_err(|e| {
            TestCaseError::fail(format!("serialised doc failed to lex: {e}"))
        })?;
        let reparsed = parse(&tokens).map_err(|e| {
            TestCaseError::fail(format!("serialised doc failed to parse: {e}"))
        })?;
        prop_assert_eq!(reparsed, doc);
    }

    /// The compact emitter reparses to the same AST as the pretty one.
    #[test]
    fn compact_and_pretty_agree(doc in document_strategy()) {
        let pretty = parse(&lex(&serialize(&doc)).map_err(|e| {
            TestCaseError::fail(format!("pretty lex: {e}"))
        })?);
        let compact = parse(&lex(&serialize_compact(&doc)).map_err(|e| {
            TestCaseError::fail(format!("compact lex: {e}"))
        })?);
        prop_assert_eq!(pretty.ok(), compact.ok());
    }

    /// Canonical output is a fixed point: serialising its reparse
    /// reproduces it byte for byte.
    #[test]
    fn canonical_is_a_fixed_point(doc in document_strategy()) {
        let canonical = serialize_canonical(&doc);
        let tokens = lex(&canonical).map_err(|e| {
            TestCaseError::fail(format!("canonical lex: {e}"))
        })?;
        let reparsed = parse(&tokens).map_err(|e| {
            TestCaseError::fail(format!("canonical parse: {e}"))
        })?;
        prop_assert_eq!(serialize_canonical(&reparsed), canonical);
    }

    /// The validator never panics, whatever the document shape.
    #[test]
    fn validator_is_total(doc in document_strategy()) {
        let _ = validate(&doc);
    }
}
