#![no_main]

use libfuzzer_sys::fuzz_target;
use ochrance_core::a2ml::lexer::lex;
use ochrance_core::a2ml::token::TokenKind;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Totality: either a token list ending in Eof, or a single error.
        if let Ok(tokens) = lex(s) {
            assert!(matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Eof)));
        }
    }
});
