// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! The A2ML lexer.
//!
//! Total over arbitrary input: every step either consumes at least one
//! character or terminates with the `Eof` token or a single [`LexError`].
//! Inputs larger than [`MAX_DOCUMENT_BYTES`] are rejected before scanning.

use std::iter::Peekable;
use std::str::CharIndices;

use thiserror::Error;

use super::token::{SectionKind, Token, TokenKind};

/// Whole-document size cap, enforced before scanning.
pub const MAX_DOCUMENT_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    #[error("unterminated-string")]
    UnterminatedString,
    #[error("malformed-hash")]
    MalformedHash,
    #[error("unknown-keyword(@{0})")]
    UnknownKeyword(String),
    #[error("unexpected-character({0:?})")]
    UnexpectedCharacter(char),
    #[error("malformed-number")]
    MalformedNumber,
    #[error("unterminated-blob")]
    UnterminatedBlob,
    #[error("document exceeds {MAX_DOCUMENT_BYTES} bytes")]
    InputTooLarge,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at {line}:{column}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub line: u32,
    pub column: u32,
}

/// Tokenise a source string. On success the vector always ends in `Eof`.
pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    if source.len() > MAX_DOCUMENT_BYTES {
        return Err(LexError {
            kind: LexErrorKind::InputTooLarge,
            line: 1,
            column: 1,
        });
    }
    Lexer::new(source).run()
}

fn lex_error(kind: LexErrorKind, line: u32, column: u32) -> LexError {
    LexError { kind, line, column }
}

struct Lexer<'a> {
    chars: Peekable<CharIndices<'a>>,
    line: u32,
    column: u32,
    at_start: bool,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            at_start: true,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia()?;
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                out.push(Token {
                    kind: TokenKind::Eof,
                    line,
                    column,
                });
                return Ok(out);
            };
            let first_token = self.at_start;
            self.at_start = false;
            let kind = match c {
                '{' => {
                    self.bump();
                    TokenKind::LBrace
                }
                '}' => {
                    self.bump();
                    TokenKind::RBrace
                }
                ':' => {
                    self.bump();
                    TokenKind::Colon
                }
                '=' => {
                    self.bump();
                    TokenKind::Equals
                }
                '[' => {
                    self.bump();
                    TokenKind::LBracket
                }
                ']' => {
                    self.bump();
                    TokenKind::RBracket
                }
                ',' => {
                    self.bump();
                    TokenKind::Comma
                }
                '@' => self.section_keyword(line, column)?,
                '"' => self.string_literal(line, column)?,
                '#' => self.hash_literal(line, column)?,
                c if c.is_ascii_digit() => self.number_or_timestamp(line, column)?,
                c if c.is_ascii_alphabetic() || c == '_' => {
                    self.ident_like(first_token, line, column)?
                }
                other => {
                    return Err(lex_error(
                        LexErrorKind::UnexpectedCharacter(other),
                        line,
                        column,
                    ))
                }
            };
            out.push(Token { kind, line, column });
        }
    }

    /// Skip whitespace and `--` line comments. A lone `-` is left in place
    /// for the main loop to reject.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r' | '\n') => {
                    self.bump();
                }
                Some('-') => {
                    let (line, column) = (self.line, self.column);
                    self.bump();
                    if self.peek() == Some('-') {
                        while let Some(c) = self.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.bump();
                        }
                    } else {
                        return Err(lex_error(
                            LexErrorKind::UnexpectedCharacter('-'),
                            line,
                            column,
                        ));
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn take_ident_text(&mut self) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        text
    }

    fn section_keyword(&mut self, line: u32, column: u32) -> Result<TokenKind, LexError> {
        self.bump(); // '@'
        let name = self.take_ident_text();
        match SectionKind::parse(&name) {
            Some(kind) => Ok(TokenKind::Section(kind)),
            None => Err(lex_error(LexErrorKind::UnknownKeyword(name), line, column)),
        }
    }

    fn string_literal(&mut self, line: u32, column: u32) -> Result<TokenKind, LexError> {
        self.bump(); // opening quote
        let mut payload = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    // Error location is the opening quote.
                    return Err(lex_error(LexErrorKind::UnterminatedString, line, column));
                }
                Some('"') => return Ok(TokenKind::Str(payload)),
                Some('\\') => match self.bump() {
                    // One-character escape: the escaped character is kept
                    // verbatim in the payload.
                    Some(escaped) => payload.push(escaped),
                    None => {
                        return Err(lex_error(LexErrorKind::UnterminatedString, line, column))
                    }
                },
                Some(c) => payload.push(c),
            }
        }
    }

    fn hash_literal(&mut self, line: u32, column: u32) -> Result<TokenKind, LexError> {
        self.bump(); // '#'
        let mut hex = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_hexdigit() {
                hex.push(c.to_ascii_lowercase());
                self.bump();
            } else {
                break;
            }
        }
        let trailing_junk = self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        if hex.is_empty() || trailing_junk {
            return Err(lex_error(LexErrorKind::MalformedHash, line, column));
        }
        Ok(TokenKind::HashLit(hex))
    }

    fn number_or_timestamp(&mut self, line: u32, column: u32) -> Result<TokenKind, LexError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('-') {
            // Datelike: keep consuming the RFC3339 alphabet; the parser
            // checks the shape and the mandatory trailing Z.
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() || matches!(c, '-' | ':' | 'T' | 'Z' | '.' | '+') {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            return Ok(TokenKind::Timestamp(text));
        }
        if self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(lex_error(LexErrorKind::MalformedNumber, line, column));
        }
        match text.parse::<i64>() {
            Ok(value) => Ok(TokenKind::Int(value)),
            Err(_) => Err(lex_error(LexErrorKind::MalformedNumber, line, column)),
        }
    }

    fn ident_like(
        &mut self,
        first_token: bool,
        line: u32,
        column: u32,
    ) -> Result<TokenKind, LexError> {
        let text = self.take_ident_text();
        if first_token && text == "a2ml" && self.peek() == Some('/') {
            return self.version_header(line, column);
        }
        if text == "base64" && self.peek() == Some('(') {
            return self.blob_literal(line, column);
        }
        Ok(TokenKind::Ident(text))
    }

    fn version_header(&mut self, line: u32, column: u32) -> Result<TokenKind, LexError> {
        self.bump(); // '/'
        let major = self.version_component(line, column)?;
        if self.peek() != Some('.') {
            return Err(lex_error(LexErrorKind::MalformedNumber, line, column));
        }
        self.bump();
        let minor = self.version_component(line, column)?;
        Ok(TokenKind::Header { major, minor })
    }

    fn version_component(&mut self, line: u32, column: u32) -> Result<u32, LexError> {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.bump();
            } else {
                break;
            }
        }
        digits
            .parse::<u32>()
            .map_err(|_| lex_error(LexErrorKind::MalformedNumber, line, column))
    }

    fn blob_literal(&mut self, line: u32, column: u32) -> Result<TokenKind, LexError> {
        self.bump(); // '('
        let mut payload = String::new();
        loop {
            match self.bump() {
                None => return Err(lex_error(LexErrorKind::UnterminatedBlob, line, column)),
                Some(')') => return Ok(TokenKind::Blob(payload)),
                Some(c) => payload.push(c),
            }
        }
    }
}
