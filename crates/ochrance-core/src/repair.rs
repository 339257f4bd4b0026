// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! Token-gated restoration from a snapshot.
//!
//! Every entry point consumes an Ephapax token, so the type system enforces
//! the one-failure-one-repair correspondence. Mutations are staged from the
//! decoded snapshot first and applied as single assignments, so a failing
//! step leaves the original state untouched. After the mutation the state
//! is re-verified at the mode the original failure was detected at.

use crate::audit::AuditLog;
use crate::diagnostic::{Diagnostic, Priority, Query, Zone};
use crate::fs::FsState;
use crate::manifest::FsManifest;
use crate::snapshot::Snapshot;
use crate::token::{EphapaxToken, RepairAction, RepairOrder};
use crate::verifier::verify;
use crate::witness::Witness;

/// Outcome of one repair application.
#[derive(Debug)]
pub enum RepairResult {
    /// The mutation applied and re-verification succeeded.
    Ok {
        blocks_restored: u64,
        witness: Witness,
    },
    /// A step failed, or re-verification still fails; the state is either
    /// untouched (step failure) or restored-but-still-wrong.
    Failed { diagnostic: Diagnostic },
}

impl RepairResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, RepairResult::Ok { .. })
    }
}

fn snapshot_corrupt(detail: String) -> Diagnostic {
    Diagnostic::new(
        Query::SnapshotCorrupt { detail },
        Priority::Error,
        Zone::FullSubsystem {
            name: "snapshot".into(),
        },
    )
}

/// Resolve a repair path to a block index: a literal `block/<i>` form, or
/// the owner recorded in the state's metadata.
fn resolve_path(state: &FsState, path: &str) -> Option<u64> {
    if let Some(index) = path.strip_prefix("block/").and_then(|s| s.parse().ok()) {
        return Some(index);
    }
    state
        .metadata()
        .iter()
        .position(|m| m.owner == path)
        .map(|i| i as u64)
}

/// Apply the repair a token authorises, then re-verify.
pub fn repair(
    state: &mut FsState,
    manifest: &FsManifest,
    snapshot: &Snapshot,
    token: EphapaxToken,
    audit: &mut AuditLog,
) -> RepairResult {
    let order = token.consume();
    let result = apply(state, manifest, snapshot, &order);
    let outcome = match &result {
        RepairResult::Ok {
            blocks_restored, ..
        } => format!("repair-ok({blocks_restored})"),
        // Audit entries carry the structured q/p/z form, not the display
        // line.
        RepairResult::Failed { diagnostic } => format!(
            "repair-failed: {}",
            serde_json::to_string(diagnostic)
                .unwrap_or_else(|_| diagnostic.to_string())
        ),
    };
    tracing::info!(action = %order.action, %outcome, "repair attempt");
    audit.append("repair", &format!("{} -> {outcome}", order.action));
    result
}

fn apply(
    state: &mut FsState,
    manifest: &FsManifest,
    snapshot: &Snapshot,
    order: &RepairOrder,
) -> RepairResult {
    let decoded = match snapshot.decode() {
        Ok(decoded) => decoded,
        Err(err) => {
            return RepairResult::Failed {
                diagnostic: snapshot_corrupt(err.to_string()),
            }
        }
    };

    if decoded.block_count() != state.block_count() {
        return RepairResult::Failed {
            diagnostic: Diagnostic::new(
                Query::SnapshotIncompatible {
                    expected: state.block_count(),
                    got: decoded.block_count(),
                },
                Priority::Error,
                Zone::FullSubsystem {
                    name: "snapshot".into(),
                },
            ),
        };
    }

    let blocks_restored = match &order.action {
        RepairAction::RestoreBlock { index } => {
            let Some((metadata, data)) = decoded.blocks.get(*index as usize).cloned() else {
                return RepairResult::Failed {
                    diagnostic: snapshot_corrupt(format!("no record for block {index}")),
                };
            };
            let unchanged = state
                .block(*index)
                .is_some_and(|b| *b.digest() == decoded.algorithm.hash(&data));
            if unchanged {
                0
            } else if state.replace_block(*index, data, metadata).is_err() {
                return RepairResult::Failed {
                    diagnostic: snapshot_corrupt(format!("block {index} out of range")),
                };
            } else {
                1
            }
        }
        RepairAction::RewriteMetadata { path } => {
            let Some(index) = resolve_path(state, path) else {
                return RepairResult::Failed {
                    diagnostic: snapshot_corrupt(format!("path {path} does not resolve")),
                };
            };
            let Some((metadata, _)) = decoded.blocks.get(index as usize).cloned() else {
                return RepairResult::Failed {
                    diagnostic: snapshot_corrupt(format!("no record for block {index}")),
                };
            };
            if state.replace_metadata(index, metadata).is_err() {
                return RepairResult::Failed {
                    diagnostic: snapshot_corrupt(format!("block {index} out of range")),
                };
            }
            0
        }
        RepairAction::QuarantineFile { path } => {
            let Some(index) = resolve_path(state, path) else {
                return RepairResult::Failed {
                    diagnostic: snapshot_corrupt(format!("path {path} does not resolve")),
                };
            };
            if state.quarantine_block(index).is_err() {
                return RepairResult::Failed {
                    diagnostic: snapshot_corrupt(format!("block {index} out of range")),
                };
            }
            0
        }
        RepairAction::RebuildIndex => {
            // Full restore: stage the whole replacement state, count the
            // differing blocks, then swap in one assignment.
            let staged = match decoded.to_state() {
                Ok(staged) => staged,
                Err(_) => {
                    return RepairResult::Failed {
                        diagnostic: snapshot_corrupt("snapshot does not rebuild".into()),
                    }
                }
            };
            let differing = state
                .blocks()
                .iter()
                .zip(staged.blocks())
                .filter(|(a, b)| a.digest() != b.digest())
                .count() as u64;
            if state.replace_all(staged).is_err() {
                return RepairResult::Failed {
                    diagnostic: snapshot_corrupt("snapshot algorithm differs".into()),
                };
            }
            differing
        }
    };

    match verify(order.detected_at, state, manifest) {
        Ok(witness) => RepairResult::Ok {
            blocks_restored,
            witness,
        },
        // The mutation applied but the state still does not verify; the
        // result is a failure carrying the fresh diagnostic.
        Err(diagnostic) => RepairResult::Failed { diagnostic },
    }
}
