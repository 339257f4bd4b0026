// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! The A2ML parser: token vector in, [`Document`] out.
//!
//! Total by construction: the token cursor strictly advances and nesting is
//! bounded by [`MAX_NESTING_DEPTH`], so recursion depth and iteration count
//! are both finite for every input.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::ast::{Document, Entry, EntryValue, Section, Value};
use super::token::{SectionKind, Token, TokenKind};
use crate::diagnostic::{Diagnostic, Priority, Query, Zone};

pub const MAX_NESTING_DEPTH: usize = 8;
pub const MAX_SECTION_FIELDS: usize = 1024;
pub const MAX_LIST_ITEMS: usize = 65_536;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("duplicate-section({0})")]
    DuplicateSection(SectionKind),
    #[error("missing-required({0})")]
    MissingRequired(&'static str),
    #[error("nesting-exceeded")]
    NestingExceeded,
    #[error("section exceeds {MAX_SECTION_FIELDS} fields")]
    SectionFieldCap,
    #[error("list exceeds {MAX_LIST_ITEMS} items")]
    ListCap,
    #[error("expected {expected}, got {got}")]
    UnexpectedToken { expected: String, got: String },
    #[error("timestamp must be ISO-8601 with trailing Z: {0}")]
    InvalidTimestamp(String),
    #[error("blob payload is not valid base64")]
    InvalidBlob,
    #[error("missing a2ml/MAJOR.MINOR version header")]
    MissingVersionHeader,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at {line}:{column}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: u32,
    pub column: u32,
}

impl ParseError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        let query = match &self.kind {
            ParseErrorKind::MissingRequired(section) => Query::MissingSection {
                section: (*section).to_string(),
            },
            other => Query::ParseFailure {
                line: self.line,
                column: self.column,
                detail: other.to_string(),
            },
        };
        Diagnostic::new(
            query,
            Priority::Error,
            Zone::FullSubsystem {
                name: "manifest".into(),
            },
        )
    }
}

/// Parse a token vector produced by [`super::lexer::lex`].
pub fn parse(tokens: &[Token]) -> Result<Document, ParseError> {
    Parser { tokens, pos: 0 }.document()
}

const EOF_TOKEN: Token = Token {
    kind: TokenKind::Eof,
    line: 0,
    column: 0,
};

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        // The lexer guarantees a trailing Eof token.
        self.tokens.get(self.pos).unwrap_or(&EOF_TOKEN)
    }

    fn advance(&mut self) -> &Token {
        let tok = self.tokens.get(self.pos).unwrap_or(&EOF_TOKEN);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error_at(&self, tok: &Token, kind: ParseErrorKind) -> ParseError {
        ParseError {
            kind,
            line: tok.line,
            column: tok.column,
        }
    }

    fn unexpected(&self, tok: &Token, expected: &str) -> ParseError {
        self.error_at(
            tok,
            ParseErrorKind::UnexpectedToken {
                expected: expected.to_string(),
                got: tok.kind.describe().to_string(),
            },
        )
    }

    fn expect_lbrace(&mut self) -> Result<(), ParseError> {
        let tok = self.advance().clone();
        if tok.kind == TokenKind::LBrace {
            Ok(())
        } else {
            Err(self.unexpected(&tok, "'{'"))
        }
    }

    fn document(mut self) -> Result<Document, ParseError> {
        let header = self.advance().clone();
        let TokenKind::Header { major, minor } = header.kind else {
            return Err(self.error_at(&header, ParseErrorKind::MissingVersionHeader));
        };
        let mut doc = Document::new(major, minor);

        let eof = loop {
            let tok = self.advance().clone();
            match tok.kind {
                TokenKind::Eof => break tok,
                TokenKind::Section(kind) => {
                    self.expect_lbrace()?;
                    let entries = self.entries(0)?;
                    let section = Section { kind, entries };
                    if !doc.insert_section(section) {
                        return Err(self.error_at(&tok, ParseErrorKind::DuplicateSection(kind)));
                    }
                }
                _ => return Err(self.unexpected(&tok, "section keyword")),
            }
        };

        if doc.section(SectionKind::Manifest).is_none() {
            return Err(self.error_at(&eof, ParseErrorKind::MissingRequired("manifest")));
        }
        Ok(doc)
    }

    /// Parse `entry*` up to the closing brace, which is consumed.
    fn entries(&mut self, depth: usize) -> Result<Vec<Entry>, ParseError> {
        let mut out = Vec::new();
        loop {
            let tok = self.advance().clone();
            match tok.kind.clone() {
                TokenKind::RBrace => return Ok(out),
                TokenKind::Ident(key) => {
                    if out.len() >= MAX_SECTION_FIELDS {
                        return Err(self.error_at(&tok, ParseErrorKind::SectionFieldCap));
                    }
                    let sep = self.advance().clone();
                    let value = match sep.kind {
                        TokenKind::Colon | TokenKind::Equals => {
                            EntryValue::Value(self.value(depth)?)
                        }
                        TokenKind::LBrace => {
                            if depth + 1 > MAX_NESTING_DEPTH {
                                return Err(
                                    self.error_at(&sep, ParseErrorKind::NestingExceeded)
                                );
                            }
                            EntryValue::Block(self.entries(depth + 1)?)
                        }
                        _ => return Err(self.unexpected(&sep, "':', '=' or '{'")),
                    };
                    out.push(Entry {
                        key,
                        value,
                        line: tok.line,
                        column: tok.column,
                    });
                }
                _ => return Err(self.unexpected(&tok, "identifier or '}'")),
            }
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, ParseError> {
        let tok = self.advance().clone();
        match tok.kind.clone() {
            TokenKind::Str(s) => Ok(Value::Str(s)),
            TokenKind::Ident(name) => match name.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Ok(Value::Ident(name)),
            },
            TokenKind::HashLit(hex) => Ok(Value::Hash(hex)),
            TokenKind::Int(i) => Ok(Value::Int(i)),
            TokenKind::Timestamp(raw) => self.timestamp(&tok, &raw),
            TokenKind::Blob(b64) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(b64.as_bytes())
                    .map_err(|_| self.error_at(&tok, ParseErrorKind::InvalidBlob))?;
                Ok(Value::Blob(bytes))
            }
            TokenKind::LBracket => {
                if depth + 1 > MAX_NESTING_DEPTH {
                    return Err(self.error_at(&tok, ParseErrorKind::NestingExceeded));
                }
                self.list(depth + 1)
            }
            _ => Err(self.unexpected(&tok, "value")),
        }
    }

    fn timestamp(&self, tok: &Token, raw: &str) -> Result<Value, ParseError> {
        if !raw.ends_with('Z') {
            return Err(
                self.error_at(tok, ParseErrorKind::InvalidTimestamp(raw.to_string()))
            );
        }
        let parsed = DateTime::parse_from_rfc3339(raw)
            .map_err(|_| self.error_at(tok, ParseErrorKind::InvalidTimestamp(raw.to_string())))?;
        // Whole seconds only: fractional parts (and leap-second encodings)
        // have no stable canonical rendering.
        if parsed.timestamp_subsec_nanos() != 0 {
            return Err(
                self.error_at(tok, ParseErrorKind::InvalidTimestamp(raw.to_string()))
            );
        }
        Ok(Value::Timestamp(parsed.with_timezone(&Utc)))
    }

    fn list(&mut self, depth: usize) -> Result<Value, ParseError> {
        let mut items = Vec::new();
        if self.peek().kind == TokenKind::RBracket {
            self.advance();
            return Ok(Value::List(items));
        }
        loop {
            if items.len() >= MAX_LIST_ITEMS {
                let tok = self.peek().clone();
                return Err(self.error_at(&tok, ParseErrorKind::ListCap));
            }
            items.push(self.value(depth)?);
            let sep = self.advance().clone();
            match sep.kind {
                TokenKind::Comma => continue,
                TokenKind::RBracket => return Ok(Value::List(items)),
                _ => return Err(self.unexpected(&sep, "',' or ']'")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2ml::lexer::lex;

    fn parse_str(source: &str) -> Result<Document, ParseError> {
        parse(&lex(source).expect("lex"))
    }

    #[test]
    fn minimal_document_parses() {
        let doc = parse_str("a2ml/1.0\n@manifest {\nid: \"fs\"\n}").expect("parse");
        assert_eq!((doc.major, doc.minor), (1, 0));
        let m = doc.section(SectionKind::Manifest).expect("manifest");
        assert_eq!(m.get("id").and_then(Value::as_str), Some("fs"));
    }

    #[test]
    fn missing_manifest_section_is_required() {
        let err = parse_str("a2ml/1.0\n@refs {\n}").expect_err("missing");
        assert_eq!(err.kind, ParseErrorKind::MissingRequired("manifest"));
        let d = err.to_diagnostic();
        assert!(d.to_string().contains("missing-required(manifest)"));
    }

    #[test]
    fn duplicate_section_reports_second_occurrence() {
        let err = parse_str("a2ml/1.0\n@manifest {\n}\n@refs {\n}\n@refs {\n}")
            .expect_err("duplicate");
        assert_eq!(
            err.kind,
            ParseErrorKind::DuplicateSection(SectionKind::Refs)
        );
        assert_eq!((err.line, err.column), (6, 1));
    }

    #[test]
    fn nesting_beyond_eight_levels_is_rejected() {
        let mut body = String::new();
        for i in 0..9 {
            body.push_str(&format!("n{i} {{\n"));
        }
        body.push_str("leaf: 1\n");
        for _ in 0..9 {
            body.push('}');
        }
        let source = format!("a2ml/1.0\n@manifest {{\n{body}\n}}");
        let err = parse_str(&source).expect_err("deep");
        assert_eq!(err.kind, ParseErrorKind::NestingExceeded);
    }

    #[test]
    fn eight_levels_of_nesting_are_accepted() {
        let mut body = String::new();
        for i in 0..8 {
            body.push_str(&format!("n{i} {{\n"));
        }
        body.push_str("leaf: 1\n");
        for _ in 0..8 {
            body.push('}');
        }
        let source = format!("a2ml/1.0\n@manifest {{\n{body}\n}}");
        parse_str(&source).expect("eight levels fit the cap");
    }

    #[test]
    fn values_cover_the_sum() {
        let doc = parse_str(concat!(
            "a2ml/1.0\n@manifest {\n",
            "s: \"text\"\n",
            "w: bare-word\n",
            "b: true\n",
            "h: #00ff\n",
            "i: 42\n",
            "t: 2026-03-01T12:00:00Z\n",
            "l: [1, 2, 3]\n",
            "d: base64(aGVsbG8=)\n",
            "}"
        ))
        .expect("parse");
        let m = doc.section(SectionKind::Manifest).expect("manifest");
        assert_eq!(m.get("w").and_then(Value::as_str), Some("bare-word"));
        assert_eq!(m.get("b"), Some(&Value::Bool(true)));
        assert_eq!(m.get("h").and_then(Value::as_hash), Some("00ff"));
        assert_eq!(m.get("i").and_then(Value::as_int), Some(42));
        assert_eq!(m.get("l").and_then(Value::as_list).map(<[Value]>::len), Some(3));
        assert_eq!(m.get("d"), Some(&Value::Blob(b"hello".to_vec())));
    }

    #[test]
    fn timestamp_without_z_is_rejected() {
        let err =
            parse_str("a2ml/1.0\n@manifest {\nt: 2026-03-01T12:00:00+01:00\n}").expect_err("tz");
        assert!(matches!(err.kind, ParseErrorKind::InvalidTimestamp(_)));
    }

    #[test]
    fn fractional_seconds_are_rejected() {
        let err = parse_str("a2ml/1.0\n@manifest {\nt: 2026-03-01T12:00:00.250Z\n}")
            .expect_err("fraction");
        assert!(matches!(err.kind, ParseErrorKind::InvalidTimestamp(_)));
    }

    #[test]
    fn missing_header_is_rejected() {
        let err = parse_str("@manifest {\n}").expect_err("header");
        assert_eq!(err.kind, ParseErrorKind::MissingVersionHeader);
    }

    #[test]
    fn equals_separator_is_accepted() {
        let doc = parse_str("a2ml/1.0\n@manifest {\nid = \"x\"\n}").expect("parse");
        let m = doc.section(SectionKind::Manifest).expect("manifest");
        assert_eq!(m.get("id").and_then(Value::as_str), Some("x"));
    }
}
