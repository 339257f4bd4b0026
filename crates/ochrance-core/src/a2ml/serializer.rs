// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! A2ML emitters.
//!
//! [`serialize`] is the parse inverse: two-space indentation, field order
//! preserved. [`serialize_canonical`] is signature-grade: fields sorted
//! lexicographically by key at every level, LF endings, no trailing
//! whitespace, no newline after the final `}`. [`serialize_compact`] emits
//! the same AST without indentation.

use base64::Engine as _;

use super::ast::{format_timestamp, Document, Entry, EntryValue, Value};

/// Pretty emitter preserving field order.
pub fn serialize(doc: &Document) -> String {
    emit(doc, Layout::Pretty, false)
}

/// Canonical emitter for signature-grade output.
pub fn serialize_canonical(doc: &Document) -> String {
    emit(doc, Layout::Pretty, true)
}

/// Single-purpose emitter for logs and tests: no indentation.
pub fn serialize_compact(doc: &Document) -> String {
    emit(doc, Layout::Compact, false)
}

#[derive(Clone, Copy, PartialEq)]
enum Layout {
    Pretty,
    Compact,
}

fn emit(doc: &Document, layout: Layout, sorted: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!("a2ml/{}.{}\n", doc.major, doc.minor));
    for section in doc.sections() {
        out.push_str(&format!("@{} {{\n", section.kind));
        let mut entries: Vec<&Entry> = section.entries.iter().collect();
        if sorted {
            entries.sort_by(|a, b| a.key.cmp(&b.key));
        }
        for entry in entries {
            emit_entry(&mut out, entry, 1, layout, sorted);
        }
        out.push_str("}\n");
    }
    // No trailing newline after the final closing brace.
    if out.ends_with('\n') {
        out.pop();
    }
    out
}

fn indent(out: &mut String, depth: usize, layout: Layout) {
    if layout == Layout::Pretty {
        for _ in 0..depth {
            out.push_str("  ");
        }
    }
}

fn emit_entry(out: &mut String, entry: &Entry, depth: usize, layout: Layout, sorted: bool) {
    indent(out, depth, layout);
    match &entry.value {
        EntryValue::Value(v) => {
            out.push_str(&entry.key);
            out.push_str(": ");
            emit_value(out, v);
            out.push('\n');
        }
        EntryValue::Block(children) => {
            out.push_str(&entry.key);
            out.push_str(" {\n");
            let mut children: Vec<&Entry> = children.iter().collect();
            if sorted {
                children.sort_by(|a, b| a.key.cmp(&b.key));
            }
            for child in children {
                emit_entry(out, child, depth + 1, layout, sorted);
            }
            indent(out, depth, layout);
            out.push_str("}\n");
        }
    }
}

fn emit_value(out: &mut String, value: &Value) {
    match value {
        Value::Str(s) => {
            out.push('"');
            for c in s.chars() {
                if matches!(c, '"' | '\\' | '\n') {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        }
        Value::Ident(name) => out.push_str(name),
        Value::Hash(hex) => {
            out.push('#');
            out.push_str(hex);
        }
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Timestamp(t) => out.push_str(&format_timestamp(*t)),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Blob(bytes) => {
            out.push_str("base64(");
            out.push_str(&base64::engine::general_purpose::STANDARD.encode(bytes));
            out.push(')');
        }
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                emit_value(out, item);
            }
            out.push(']');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2ml::ast::{Section, Value};
    use crate::a2ml::lexer::lex;
    use crate::a2ml::parser::parse;
    use crate::a2ml::token::SectionKind;

    fn reparse(text: &str) -> Document {
        parse(&lex(text).expect("lex")).expect("parse")
    }

    fn sample() -> Document {
        let mut doc = Document::new(1, 0);
        let mut m = Section::new(SectionKind::Manifest);
        m.push("id", Value::Str("fs-root".into()));
        m.push("version", Value::Str("1.0".into()));
        m.push("producer", Value::Str("ochrancectl".into()));
        doc.insert_section(m);
        let mut r = Section::new(SectionKind::Refs);
        r.push("algorithm", Value::Ident("sha256".into()));
        r.push("merkle_root", Value::Hash("ab".repeat(32)));
        r.push("block_count", Value::Int(4));
        doc.insert_section(r);
        doc
    }

    #[test]
    fn serialize_then_parse_is_identity() {
        let doc = sample();
        assert_eq!(reparse(&serialize(&doc)), doc);
    }

    #[test]
    fn compact_output_reparses_to_same_ast() {
        let doc = sample();
        assert_eq!(reparse(&serialize_compact(&doc)), doc);
    }

    #[test]
    fn canonical_document_reserializes_byte_for_byte() {
        let doc = sample();
        let canonical = serialize_canonical(&doc);
        assert_eq!(serialize_canonical(&reparse(&canonical)), canonical);
    }

    #[test]
    fn canonical_sorts_fields_and_has_no_trailing_newline() {
        let mut doc = Document::new(1, 0);
        let mut m = Section::new(SectionKind::Manifest);
        m.push("zeta", Value::Int(1));
        m.push("alpha", Value::Int(2));
        doc.insert_section(m);
        let canonical = serialize_canonical(&doc);
        assert!(canonical.contains("  alpha: 2\n  zeta: 1"));
        assert!(!canonical.ends_with('\n'));
        assert!(canonical.ends_with('}'));
    }

    #[test]
    fn string_escapes_survive_roundtrip() {
        let mut doc = Document::new(1, 0);
        let mut m = Section::new(SectionKind::Manifest);
        m.push("id", Value::Str("with \"quotes\" and \\slash".into()));
        doc.insert_section(m);
        assert_eq!(reparse(&serialize(&doc)), doc);
    }

    #[test]
    fn no_line_has_trailing_whitespace() {
        let canonical = serialize_canonical(&sample());
        for line in canonical.lines() {
            assert_eq!(line.trim_end(), line);
        }
    }
}
