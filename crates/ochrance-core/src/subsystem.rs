// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! The `VerifiedSubsystem` capability set and the filesystem subsystem.
//!
//! `verify` is pure, `repair` and `attest` are effectful. The
//! `verify_or_repair` pipeline holds the subsystem's exclusive guard from
//! token issuance through re-verification, so a verification in flight can
//! never race a repair on the same state.

use chrono::Utc;
use parking_lot::Mutex;

use crate::audit::AuditLog;
use crate::diagnostic::Diagnostic;
use crate::fs::FsState;
use crate::manifest::FsManifest;
use crate::mode::VerificationMode;
use crate::repair::{repair, RepairResult};
use crate::snapshot::Snapshot;
use crate::token::EphapaxToken;
use crate::verifier::{verify, verify_with_remediation, VerificationOutcome};
use crate::witness::Witness;

/// The three capabilities every verified subsystem exposes over its own
/// state and manifest types.
pub trait VerifiedSubsystem {
    type State;
    type Manifest;

    /// Pure, deterministic verification.
    fn verify(
        &self,
        mode: VerificationMode,
        state: &Self::State,
        manifest: &Self::Manifest,
    ) -> Result<Witness, Diagnostic>;

    /// Effectful restoration; consumes the repair token.
    fn repair(
        &self,
        state: &mut Self::State,
        manifest: &Self::Manifest,
        snapshot: &Snapshot,
        token: EphapaxToken,
    ) -> RepairResult;

    /// Effectful attestation: read the state, produce its manifest.
    fn attest(&self, state: &Self::State) -> Result<Self::Manifest, Diagnostic>;
}

/// Progress of one verify/repair cycle. Terminal states are `AttestedOk`
/// and `Fatal`; `Fatal` never triggers an automatic repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Quiescent,
    Remediable,
    RepairPending,
    Repaired,
    AttestedOk,
    Fatal,
}

impl CycleState {
    pub fn transition(self, to: CycleState) -> Result<CycleState, Diagnostic> {
        let valid = matches!(
            (self, to),
            (CycleState::Quiescent, CycleState::AttestedOk)
                | (CycleState::Quiescent, CycleState::Remediable)
                | (CycleState::Quiescent, CycleState::Fatal)
                | (CycleState::Remediable, CycleState::RepairPending)
                | (CycleState::RepairPending, CycleState::Repaired)
                | (CycleState::RepairPending, CycleState::Fatal)
                | (CycleState::Repaired, CycleState::AttestedOk)
                | (CycleState::Repaired, CycleState::Remediable)
                | (CycleState::Repaired, CycleState::Fatal)
        );
        if valid {
            Ok(to)
        } else {
            Err(Diagnostic::new(
                crate::diagnostic::Query::InvariantViolation {
                    detail: format!("invalid cycle transition {self:?} -> {to:?}"),
                },
                crate::diagnostic::Priority::Critical,
                crate::diagnostic::Zone::FullSubsystem {
                    name: "filesystem".into(),
                },
            ))
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubsystemConfig {
    pub name: String,
    pub manifest_version: String,
    /// Repair cycles attempted by `verify_or_repair` before the failure is
    /// escalated as fatal.
    pub max_repair_attempts: u32,
}

impl Default for SubsystemConfig {
    fn default() -> Self {
        Self {
            name: "filesystem".into(),
            manifest_version: "1.0".into(),
            max_repair_attempts: 1,
        }
    }
}

/// The filesystem subsystem: block states verified against block manifests.
pub struct FilesystemSubsystem {
    config: SubsystemConfig,
    audit: Mutex<AuditLog>,
    // Exclusive window from token issuance to re-verification completion.
    repair_guard: Mutex<()>,
}

impl FilesystemSubsystem {
    pub fn new(config: SubsystemConfig, audit: AuditLog) -> Self {
        Self {
            config,
            audit: Mutex::new(audit),
            repair_guard: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SubsystemConfig {
        &self.config
    }

    /// Snapshot of the audit log (the log itself stays append-only).
    pub fn audit_log(&self) -> AuditLog {
        self.audit.lock().clone()
    }

    /// Verification with at most `max_repair_attempts` repair cycles on
    /// remediable failures. Fatal failures and exhausted attempts surface
    /// as `Err`.
    pub fn verify_or_repair(
        &self,
        mode: VerificationMode,
        state: &mut FsState,
        manifest: &FsManifest,
        snapshot: &Snapshot,
    ) -> Result<Witness, Diagnostic> {
        let _exclusive = self.repair_guard.lock();
        let mut cycle = CycleState::Quiescent;
        let mut attempts = 0u32;

        loop {
            match verify_with_remediation(mode, state, manifest) {
                VerificationOutcome::Verified(witness) => {
                    cycle.transition(CycleState::AttestedOk)?;
                    self.audit
                        .lock()
                        .append("verify", &format!("mode={mode} ok"));
                    return Ok(witness);
                }
                VerificationOutcome::Fatal(diagnostic) => {
                    cycle.transition(CycleState::Fatal)?;
                    let structured = serde_json::to_string(&diagnostic)
                        .unwrap_or_else(|_| diagnostic.to_string());
                    self.audit
                        .lock()
                        .append("verify", &format!("mode={mode} fatal: {structured}"));
                    return Err(diagnostic);
                }
                VerificationOutcome::Remediable(token) => {
                    if attempts >= self.config.max_repair_attempts {
                        // Exhausted attempts are fatal; surrender the token
                        // by consuming it without applying a repair.
                        let order = token.consume();
                        cycle.transition(CycleState::Fatal)?;
                        self.audit.lock().append(
                            "verify",
                            &format!("mode={mode} repair attempts exhausted"),
                        );
                        return Err(order.diagnostic);
                    }
                    attempts += 1;
                    cycle = cycle
                        .transition(CycleState::Remediable)?
                        .transition(CycleState::RepairPending)?;
                    let mut audit = self.audit.lock();
                    match repair(state, manifest, snapshot, token, &mut audit) {
                        RepairResult::Ok { witness, .. } => {
                            drop(audit);
                            // The repair already re-verified at `mode`.
                            cycle
                                .transition(CycleState::Repaired)?
                                .transition(CycleState::AttestedOk)?;
                            return Ok(witness);
                        }
                        RepairResult::Failed { diagnostic } => {
                            drop(audit);
                            if diagnostic.is_remediable()
                                && attempts < self.config.max_repair_attempts
                            {
                                // A different remediable failure surfaced on
                                // re-verification; start a fresh cycle that
                                // issues its own token.
                                cycle = CycleState::Quiescent;
                                continue;
                            }
                            cycle.transition(CycleState::Fatal)?;
                            return Err(diagnostic);
                        }
                    }
                }
            }
        }
    }
}

impl VerifiedSubsystem for FilesystemSubsystem {
    type State = FsState;
    type Manifest = FsManifest;

    fn verify(
        &self,
        mode: VerificationMode,
        state: &FsState,
        manifest: &FsManifest,
    ) -> Result<Witness, Diagnostic> {
        verify(mode, state, manifest)
    }

    fn repair(
        &self,
        state: &mut FsState,
        manifest: &FsManifest,
        snapshot: &Snapshot,
        token: EphapaxToken,
    ) -> RepairResult {
        let _exclusive = self.repair_guard.lock();
        let mut audit = self.audit.lock();
        repair(state, manifest, snapshot, token, &mut audit)
    }

    fn attest(&self, state: &FsState) -> Result<FsManifest, Diagnostic> {
        let manifest = FsManifest::from_state(self.config.manifest_version.clone(), state)
            .map_err(|_| {
                Diagnostic::new(
                    crate::diagnostic::Query::InvariantViolation {
                        detail: "state digests do not form a tree".into(),
                    },
                    crate::diagnostic::Priority::Critical,
                    crate::diagnostic::Zone::FullSubsystem {
                        name: self.config.name.clone(),
                    },
                )
            })?;
        self.audit.lock().append_at(
            Utc::now(),
            "attest",
            &format!("root={}", manifest.root().to_hex()),
        );
        tracing::info!(root = %manifest.root().to_hex(), blocks = manifest.block_count(), "attested state");
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::HashAlgorithm;
    use crate::fs::test_support::zero_state;
    use crate::fs::{BlockMetadata, BLOCK_SIZE};
    use crate::witness::WitnessTier;

    fn subsystem() -> FilesystemSubsystem {
        FilesystemSubsystem::new(
            SubsystemConfig::default(),
            AuditLog::new(HashAlgorithm::Sha256),
        )
    }

    fn corrupt_state(n: usize, index: usize) -> FsState {
        let mut data = vec![vec![0u8; BLOCK_SIZE]; n];
        data[index][0] ^= 0x01;
        let metadata = (0..n)
            .map(|i| BlockMetadata::new(Utc::now(), format!("owner-{i}")))
            .collect();
        FsState::new(HashAlgorithm::Sha256, data, metadata).expect("state")
    }

    #[test]
    fn cycle_transitions_follow_the_machine() {
        let ok = CycleState::Quiescent
            .transition(CycleState::Remediable)
            .and_then(|s| s.transition(CycleState::RepairPending))
            .and_then(|s| s.transition(CycleState::Repaired))
            .and_then(|s| s.transition(CycleState::AttestedOk));
        assert_eq!(ok.expect("valid chain"), CycleState::AttestedOk);

        assert!(CycleState::Fatal.transition(CycleState::Quiescent).is_err());
        assert!(CycleState::Quiescent
            .transition(CycleState::Repaired)
            .is_err());
    }

    #[test]
    fn attest_then_verify_roundtrip() {
        let sys = subsystem();
        let state = zero_state(4);
        let manifest = sys.attest(&state).expect("attest");
        let witness = sys
            .verify(VerificationMode::Attested, &state, &manifest)
            .expect("verify");
        assert_eq!(witness.tier(), WitnessTier::Attested);
        assert_eq!(sys.audit_log().entries().len(), 1);
    }

    #[test]
    fn verify_or_repair_heals_a_flipped_block() {
        let sys = subsystem();
        let good = zero_state(4);
        let manifest = sys.attest(&good).expect("attest");
        let snapshot = Snapshot::capture(&good, [3u8; 16], Utc::now()).expect("snapshot");

        let mut state = corrupt_state(4, 2);
        let witness = sys
            .verify_or_repair(VerificationMode::Checked, &mut state, &manifest, &snapshot)
            .expect("repair cycle");
        assert_eq!(witness.tier(), WitnessTier::HashMatch);

        // The audit log saw the attest and the repair.
        let events: Vec<String> = sys
            .audit_log()
            .entries()
            .iter()
            .map(|e| e.event.clone())
            .collect();
        assert!(events.contains(&"repair".to_string()));
    }

    #[test]
    fn fatal_failure_never_repairs() {
        let sys = subsystem();
        let good = zero_state(4);
        let manifest = sys.attest(&good).expect("attest");
        let tampered = FsManifest::with_root(
            manifest.version().to_string(),
            manifest.algorithm(),
            manifest.root().bitwise_not(),
            manifest.block_digests().to_vec(),
        );
        let snapshot = Snapshot::capture(&good, [3u8; 16], Utc::now()).expect("snapshot");

        let mut state = zero_state(4);
        let before = state.block_digests();
        let err = sys
            .verify_or_repair(
                VerificationMode::Attested,
                &mut state,
                &tampered,
                &snapshot,
            )
            .expect_err("fatal");
        assert!(!err.is_remediable());
        assert_eq!(state.block_digests(), before);
    }

    #[test]
    fn audit_log_is_prefix_stable_across_cycles() {
        let sys = subsystem();
        let state = zero_state(2);
        let manifest = sys.attest(&state).expect("attest");
        let earlier = sys.audit_log();
        sys.verify(VerificationMode::Lax, &state, &manifest)
            .expect("verify");
        let snapshot = Snapshot::capture(&state, [0u8; 16], Utc::now()).expect("snapshot");
        let mut mutable = zero_state(2);
        sys.verify_or_repair(VerificationMode::Checked, &mut mutable, &manifest, &snapshot)
            .expect("ok");
        assert!(earlier.is_prefix_of(&sys.audit_log()));
    }
}
