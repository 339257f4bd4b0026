#![no_main]

use libfuzzer_sys::fuzz_target;
use ochrance_core::a2ml::{lex, parse, serialize, validate};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(tokens) = lex(s) {
            if let Ok(doc) = parse(&tokens) {
                let _ = validate(&doc);
                // Any document that parses must reparse from its own
                // serialisation to an equal AST.
                let text = serialize(&doc);
                let tokens = lex(&text).expect("serialised document lexes");
                let reparsed = parse(&tokens).expect("serialised document parses");
                assert_eq!(reparsed, doc);
            }
        }
    }
});
