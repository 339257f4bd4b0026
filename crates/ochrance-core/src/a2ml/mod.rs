// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! The A2ML attestation-and-audit markup language.
//!
//! Text documents (`.a2ml`, MIME `application/vnd.ochrance.a2ml+text`) flow
//! through [`lexer::lex`] → [`parser::parse`] → [`validator::validate`];
//! [`serializer`] is the inverse direction.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod serializer;
pub mod token;
pub mod validator;

pub use ast::{Document, Entry, EntryValue, Section, Value};
pub use lexer::{lex, LexError, LexErrorKind};
pub use parser::{parse, ParseError, ParseErrorKind};
pub use serializer::{serialize, serialize_canonical, serialize_compact};
pub use token::{SectionKind, Token, TokenKind};
pub use validator::{validate, ValidationError};

use crate::diagnostic::{Diagnostic, Priority, Query, Zone};

/// Lex and parse a source document in one step, surfacing failures as
/// q/p/z diagnostics.
pub fn parse_source(source: &str) -> Result<Document, Diagnostic> {
    let tokens = lex(source).map_err(|e| {
        Diagnostic::new(
            Query::ParseFailure {
                line: e.line,
                column: e.column,
                detail: e.kind.to_string(),
            },
            Priority::Error,
            Zone::FullSubsystem {
                name: "manifest".into(),
            },
        )
    })?;
    parse(&tokens).map_err(|e| e.to_diagnostic())
}
