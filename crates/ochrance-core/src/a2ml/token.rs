// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// The five recognised section tags. Unknown `@` keywords are a lex error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SectionKind {
    Manifest,
    Refs,
    Attestation,
    Policy,
    Audit,
}

impl SectionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            SectionKind::Manifest => "manifest",
            SectionKind::Refs => "refs",
            SectionKind::Attestation => "attestation",
            SectionKind::Policy => "policy",
            SectionKind::Audit => "audit",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "manifest" => Some(SectionKind::Manifest),
            "refs" => Some(SectionKind::Refs),
            "attestation" => Some(SectionKind::Attestation),
            "policy" => Some(SectionKind::Policy),
            "audit" => Some(SectionKind::Audit),
            _ => None,
        }
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// The `a2ml/MAJOR.MINOR` first line.
    Header { major: u32, minor: u32 },
    Section(SectionKind),
    LBrace,
    RBrace,
    Colon,
    Equals,
    LBracket,
    RBracket,
    Comma,
    Ident(String),
    Str(String),
    /// `#`-prefixed hex run, normalised to lowercase.
    HashLit(String),
    Int(i64),
    /// Raw timestamp text; shape-checked by the parser.
    Timestamp(String),
    /// Raw base64 payload of a `base64(...)` literal.
    Blob(String),
    Eof,
}

impl TokenKind {
    /// Short name for "expected X, got Y" parse errors.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Header { .. } => "version header",
            TokenKind::Section(_) => "section keyword",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Colon => "':'",
            TokenKind::Equals => "'='",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Comma => "','",
            TokenKind::Ident(_) => "identifier",
            TokenKind::Str(_) => "string literal",
            TokenKind::HashLit(_) => "hash literal",
            TokenKind::Int(_) => "integer",
            TokenKind::Timestamp(_) => "timestamp",
            TokenKind::Blob(_) => "blob literal",
            TokenKind::Eof => "end of input",
        }
    }
}

/// A token with its 1-based source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
}
