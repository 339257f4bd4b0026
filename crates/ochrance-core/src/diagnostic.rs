// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! The q/p/z diagnostic triple: what failed, how severe, what blast radius.
//!
//! Every failing operation in the engine surfaces exactly one [`Diagnostic`].
//! The user-visible rendering is a single line, `[PRIORITY] query | zone`;
//! the structured form feeds the audit log.

use serde::{Deserialize, Serialize};

use crate::digest::Digest;

/// The `q` axis: structural cause of the failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    MissingStructure { detail: String },
    HashMismatch {
        field: String,
        expected: String,
        actual: String,
    },
    MissingSection { section: String },
    VersionMismatch { expected: String, got: String },
    InvariantViolation { detail: String },
    ParseFailure {
        line: u32,
        column: u32,
        detail: String,
    },
    IoFailure { detail: String },
    SnapshotCorrupt { detail: String },
    SnapshotIncompatible { expected: u64, got: u64 },
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Query::MissingStructure { detail } => write!(f, "missing-structure: {detail}"),
            Query::HashMismatch {
                field,
                expected,
                actual,
            } => write!(f, "hash-mismatch on {field}: expected {expected}, got {actual}"),
            Query::MissingSection { section } => write!(f, "missing-required({section})"),
            Query::VersionMismatch { expected, got } => {
                write!(f, "version-mismatch: expected {expected}, got {got}")
            }
            Query::InvariantViolation { detail } => write!(f, "invariant-violation: {detail}"),
            Query::ParseFailure {
                line,
                column,
                detail,
            } => write!(f, "parse-failure at {line}:{column}: {detail}"),
            Query::IoFailure { detail } => write!(f, "io-failure: {detail}"),
            Query::SnapshotCorrupt { detail } => write!(f, "snapshot-corrupt: {detail}"),
            Query::SnapshotIncompatible { expected, got } => {
                write!(f, "snapshot-incompatible: state has {expected} blocks, snapshot {got}")
            }
        }
    }
}

/// The `p` axis. Total order: `Info < Warn < Error < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Priority {
    Info,
    Warn,
    Error,
    Critical,
}

impl Priority {
    pub const fn as_str(self) -> &'static str {
        match self {
            Priority::Info => "INFO",
            Priority::Warn => "WARN",
            Priority::Error => "ERROR",
            Priority::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `z` axis: affected scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Zone {
    SingleBlock { index: u64 },
    Subtree { root: String, depth: u32 },
    FullSubsystem { name: String },
    CrossCutting { members: Vec<String> },
}

impl Zone {
    pub fn subtree(root: &Digest, depth: u32) -> Self {
        Zone::Subtree {
            root: root.to_hex(),
            depth,
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Zone::SingleBlock { index } => write!(f, "block:{index}"),
            Zone::Subtree { root, depth } => write!(f, "subtree:{root}@{depth}"),
            Zone::FullSubsystem { name } => write!(f, "subsystem:{name}"),
            Zone::CrossCutting { members } => write!(f, "cross-cutting:{}", members.join(",")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub query: Query,
    pub priority: Priority,
    pub zone: Zone,
}

impl Diagnostic {
    pub fn new(query: Query, priority: Priority, zone: Zone) -> Self {
        Self {
            query,
            priority,
            zone,
        }
    }

    /// Remediable failures yield an Ephapax token; fatal ones never do.
    /// Block-level hash mismatches, metadata drift and single-block I/O
    /// failures are remediable. Everything else is fatal.
    pub fn is_remediable(&self) -> bool {
        matches!(self.zone, Zone::SingleBlock { .. })
            && matches!(
                self.query,
                Query::HashMismatch { .. }
                    | Query::InvariantViolation { .. }
                    | Query::IoFailure { .. }
            )
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} | {}", self.priority, self.query, self.zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_is_total() {
        assert!(Priority::Info < Priority::Warn);
        assert!(Priority::Warn < Priority::Error);
        assert!(Priority::Error < Priority::Critical);
    }

    #[test]
    fn display_matches_single_line_form() {
        let d = Diagnostic::new(
            Query::HashMismatch {
                field: "blocks".into(),
                expected: "aa".into(),
                actual: "bb".into(),
            },
            Priority::Error,
            Zone::SingleBlock { index: 2 },
        );
        assert_eq!(
            d.to_string(),
            "[ERROR] hash-mismatch on blocks: expected aa, got bb | block:2"
        );
    }

    #[test]
    fn root_mismatch_is_fatal_block_mismatch_is_not() {
        let block = Diagnostic::new(
            Query::HashMismatch {
                field: "blocks".into(),
                expected: "aa".into(),
                actual: "bb".into(),
            },
            Priority::Error,
            Zone::SingleBlock { index: 0 },
        );
        let root = Diagnostic::new(
            Query::HashMismatch {
                field: "merkle-root".into(),
                expected: "aa".into(),
                actual: "bb".into(),
            },
            Priority::Critical,
            Zone::FullSubsystem {
                name: "filesystem".into(),
            },
        );
        assert!(block.is_remediable());
        assert!(!root.is_remediable());
    }
}
