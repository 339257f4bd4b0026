// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! The A2ML abstract syntax tree.
//!
//! Field order within a section is preserved (it shapes serialisation);
//! section order is normalised to `manifest, refs, attestation, policy,
//! audit` on construction, so AST equality is section-order-insensitive by
//! construction.

use chrono::{DateTime, SecondsFormat, Utc};

use super::token::SectionKind;

pub const SUPPORTED_MAJOR: u32 = 1;
pub const SUPPORTED_MINOR: u32 = 0;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    /// A bare word, e.g. `algorithm: sha256` or `mode: checked`.
    Ident(String),
    /// Lowercase hex, without the `#` sigil.
    Hash(String),
    Int(i64),
    Timestamp(DateTime<Utc>),
    List(Vec<Value>),
    Blob(Vec<u8>),
    Bool(bool),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Ident(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&str> {
        match self {
            Value::Hash(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Canonical text form of a timestamp: RFC3339, second precision, `Z`.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryValue {
    Value(Value),
    /// Nested `key { ... }` block.
    Block(Vec<Entry>),
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub key: String,
    pub value: EntryValue,
    pub line: u32,
    pub column: u32,
}

/// Locations are carried for diagnostics only; they do not participate in
/// equality, so a rebuilt AST compares equal to its reparse.
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.value == other.value
    }
}

impl Entry {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value: EntryValue::Value(value),
            line: 0,
            column: 0,
        }
    }

    pub fn block(key: impl Into<String>, entries: Vec<Entry>) -> Self {
        Self {
            key: key.into(),
            value: EntryValue::Block(entries),
            line: 0,
            column: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub kind: SectionKind,
    pub entries: Vec<Entry>,
}

impl Section {
    pub fn new(kind: SectionKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find_map(|e| match &e.value {
            EntryValue::Value(v) if e.key == key => Some(v),
            _ => None,
        })
    }

    pub fn get_entry(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn push(&mut self, key: impl Into<String>, value: Value) {
        self.entries.push(Entry::new(key, value));
    }
}

/// A parsed A2ML document. `sections` is kept in normalised order.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub major: u32,
    pub minor: u32,
    sections: Vec<Section>,
}

impl Document {
    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            sections: Vec::new(),
        }
    }

    /// Insert a section, keeping the normalised order. Returns `false` if
    /// the section kind is already present.
    pub fn insert_section(&mut self, section: Section) -> bool {
        if self.section(section.kind).is_some() {
            return false;
        }
        self.sections.push(section);
        self.sections.sort_by_key(|s| s.kind);
        true
    }

    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn section_mut(&mut self, kind: SectionKind) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.kind == kind)
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_order_is_normalised_on_insert() {
        let mut doc = Document::new(1, 0);
        assert!(doc.insert_section(Section::new(SectionKind::Policy)));
        assert!(doc.insert_section(Section::new(SectionKind::Manifest)));
        assert!(doc.insert_section(Section::new(SectionKind::Refs)));
        let kinds: Vec<_> = doc.sections().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SectionKind::Manifest, SectionKind::Refs, SectionKind::Policy]
        );
    }

    #[test]
    fn duplicate_insert_is_refused() {
        let mut doc = Document::new(1, 0);
        assert!(doc.insert_section(Section::new(SectionKind::Refs)));
        assert!(!doc.insert_section(Section::new(SectionKind::Refs)));
    }

    #[test]
    fn entry_lookup_ignores_nested_blocks_with_same_key() {
        let mut section = Section::new(SectionKind::Manifest);
        section.entries.push(Entry::block("id", vec![]));
        section.push("id", Value::Str("fs-root".into()));
        assert_eq!(section.get("id").and_then(Value::as_str), Some("fs-root"));
    }
}
