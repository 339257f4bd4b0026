// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! Append-only audit chain backing the `@audit` section.
//!
//! Entries are hash-chained: `chain_i = H(0x02 ∥ chain_{i-1} ∥
//! leaf_hash(entry_text))`, seeded with the all-zero digest. Appending
//! never rewrites earlier links, so the chain of any snapshot of the log is
//! a prefix of every later snapshot's chain.

use chrono::{DateTime, Utc};

use crate::a2ml::{Entry, Section, SectionKind, Value};
use crate::digest::{Digest, HashAlgorithm};
use crate::merkle::leaf_hash;

const CHAIN_PREFIX: u8 = 0x02;

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub event: String,
    pub detail: String,
    pub chain: Digest,
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    algorithm: HashAlgorithm,
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn head(&self) -> Digest {
        self.entries
            .last()
            .map(|e| e.chain.clone())
            .unwrap_or_else(|| self.algorithm.zero_digest())
    }

    pub fn append(&mut self, event: &str, detail: &str) -> &AuditEntry {
        self.append_at(Utc::now(), event, detail)
    }

    pub fn append_at(&mut self, at: DateTime<Utc>, event: &str, detail: &str) -> &AuditEntry {
        let text = format!(
            "{}|{event}|{detail}",
            crate::a2ml::ast::format_timestamp(at)
        );
        let entry_digest = leaf_hash(self.algorithm, text.as_bytes());
        let previous = self.head();
        let mut preimage =
            Vec::with_capacity(1 + previous.as_bytes().len() + entry_digest.as_bytes().len());
        preimage.push(CHAIN_PREFIX);
        preimage.extend_from_slice(previous.as_bytes());
        preimage.extend_from_slice(entry_digest.as_bytes());
        let chain = self.algorithm.hash(&preimage);
        self.entries.push(AuditEntry {
            at,
            event: event.to_string(),
            detail: detail.to_string(),
            chain,
        });
        // Appends only; earlier links are never revisited.
        self.entries.last().unwrap_or_else(|| unreachable!())
    }

    /// Prefix stability: every entry of `self` appears unchanged, in order,
    /// at the head of `other`.
    pub fn is_prefix_of(&self, other: &AuditLog) -> bool {
        self.entries.len() <= other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|(a, b)| a.chain == b.chain)
    }

    /// Render as the `@audit` section of an attestation document.
    pub fn to_section(&self) -> Section {
        let mut section = Section::new(SectionKind::Audit);
        for (i, entry) in self.entries.iter().enumerate() {
            section.entries.push(Entry::block(
                format!("e{i}"),
                vec![
                    Entry::new("at", Value::Timestamp(entry.at)),
                    Entry::new("event", Value::Str(entry.event.clone())),
                    Entry::new("detail", Value::Str(entry.detail.clone())),
                    Entry::new("chain", Value::Hash(entry.chain.to_hex())),
                ],
            ));
        }
        section
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_head_moves_with_each_append() {
        let mut log = AuditLog::new(HashAlgorithm::Sha256);
        assert_eq!(log.head(), HashAlgorithm::Sha256.zero_digest());
        let first = log.append("verify", "mode=checked").chain.clone();
        assert_eq!(log.head(), first);
        let second = log.append("repair", "restore-block(2)").chain.clone();
        assert_ne!(first, second);
        assert_eq!(log.head(), second);
    }

    #[test]
    fn identical_appends_chain_differently() {
        let mut log = AuditLog::new(HashAlgorithm::Sha256);
        let at = Utc::now();
        let a = log.append_at(at, "verify", "x").chain.clone();
        let b = log.append_at(at, "verify", "x").chain.clone();
        assert_ne!(a, b);
    }

    #[test]
    fn snapshots_are_prefix_stable() {
        let mut log = AuditLog::new(HashAlgorithm::Sha256);
        log.append("verify", "1");
        let earlier = log.clone();
        log.append("repair", "2");
        log.append("verify", "3");
        assert!(earlier.is_prefix_of(&log));
        assert!(!log.is_prefix_of(&earlier));
    }

    #[test]
    fn diverged_logs_are_not_prefixes() {
        let mut a = AuditLog::new(HashAlgorithm::Sha256);
        let mut b = AuditLog::new(HashAlgorithm::Sha256);
        a.append("verify", "x");
        b.append("verify", "y");
        b.append("verify", "z");
        assert!(!a.is_prefix_of(&b));
    }

    #[test]
    fn audit_section_passes_the_validator_shape() {
        let mut log = AuditLog::new(HashAlgorithm::Sha256);
        log.append("verify", "ok");
        log.append("repair", "restore-block(0)");
        let section = log.to_section();
        assert_eq!(section.entries.len(), 2);
        let first = &section.entries[0];
        assert_eq!(first.key, "e0");
    }
}
