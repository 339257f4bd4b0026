// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! The tri-modal filesystem verifier.
//!
//! Lax checks shape, Checked adds per-block hash equality, Attested adds
//! the Merkle-root check and yields a timestamped witness. Verification is
//! pure: it borrows the state immutably, mutates nothing and suspends
//! nowhere. Each stricter mode runs every weaker mode's checks first, which
//! is what makes verifier monotonicity hold by construction.

use chrono::Utc;

use crate::diagnostic::{Diagnostic, Priority, Query, Zone};
use crate::fs::FsState;
use crate::manifest::FsManifest;
use crate::merkle::merkle_root;
use crate::mode::VerificationMode;
use crate::token::{EphapaxToken, RepairAction};
use crate::witness::{AttestedWitness, HashMatchWitness, StructuralWitness, Witness};

/// Verify `state` against `manifest` at `mode`. Pure and deterministic up
/// to the attestation timestamp recorded in an Attested witness.
pub fn verify(
    mode: VerificationMode,
    state: &FsState,
    manifest: &FsManifest,
) -> Result<Witness, Diagnostic> {
    let structural = check_lax(state, manifest)?;
    if mode == VerificationMode::Lax {
        return Ok(Witness::Structural(structural));
    }

    check_blocks(state, manifest)?;
    if mode == VerificationMode::Checked {
        // Per-block equality just held, so the two recomputed roots agree;
        // the manifest's declared root is deliberately not consulted here.
        let computed = merkle_root(state.algorithm(), &state.block_digests())
            .map_err(internal_error)?;
        let expected = merkle_root(manifest.algorithm(), manifest.block_digests())
            .map_err(internal_error)?;
        let witness =
            HashMatchWitness::promote(structural, computed, expected).map_err(internal_error)?;
        return Ok(Witness::HashMatch(witness));
    }

    // Attested: the manifest's declared root is authoritative.
    let computed = merkle_root(manifest.algorithm(), manifest.block_digests())
        .map_err(internal_error)?;
    if computed != *manifest.root() {
        return Err(Diagnostic::new(
            Query::HashMismatch {
                field: "merkle-root".into(),
                expected: manifest.root().to_hex(),
                actual: computed.to_hex(),
            },
            Priority::Critical,
            Zone::FullSubsystem {
                name: "filesystem".into(),
            },
        ));
    }
    let hash_match = HashMatchWitness::promote(structural, computed, manifest.root().clone())
        .map_err(internal_error)?;
    let witness =
        AttestedWitness::promote(hash_match, Utc::now(), true).map_err(internal_error)?;
    Ok(Witness::Attested(witness))
}

fn internal_error(_: crate::error::OchranceError) -> Diagnostic {
    Diagnostic::new(
        Query::InvariantViolation {
            detail: "verifier internal invariant broke".into(),
        },
        Priority::Critical,
        Zone::FullSubsystem {
            name: "filesystem".into(),
        },
    )
}

fn check_lax(state: &FsState, manifest: &FsManifest) -> Result<StructuralWitness, Diagnostic> {
    if state.block_count() != manifest.block_count() {
        return Err(Diagnostic::new(
            Query::MissingStructure {
                detail: format!(
                    "state has {} blocks, manifest describes {}",
                    state.block_count(),
                    manifest.block_count()
                ),
            },
            Priority::Error,
            Zone::FullSubsystem {
                name: "filesystem".into(),
            },
        ));
    }
    if manifest.version().is_empty() {
        return Err(Diagnostic::new(
            Query::InvariantViolation {
                detail: "manifest version is empty".into(),
            },
            Priority::Error,
            Zone::FullSubsystem {
                name: "filesystem".into(),
            },
        ));
    }
    if state.algorithm() != manifest.algorithm() {
        return Err(Diagnostic::new(
            Query::InvariantViolation {
                detail: format!(
                    "state hashed with {}, manifest declares {}",
                    state.algorithm(),
                    manifest.algorithm()
                ),
            },
            Priority::Error,
            Zone::FullSubsystem {
                name: "filesystem".into(),
            },
        ));
    }
    for (index, metadata) in state.metadata().iter().enumerate() {
        if metadata.owner.is_empty() {
            return Err(Diagnostic::new(
                Query::InvariantViolation {
                    detail: "metadata record has an empty owner".into(),
                },
                Priority::Warn,
                Zone::SingleBlock {
                    index: index as u64,
                },
            ));
        }
    }
    Ok(StructuralWitness::new(
        state.block_count(),
        manifest.version().to_string(),
    ))
}

fn check_blocks(state: &FsState, manifest: &FsManifest) -> Result<(), Diagnostic> {
    for (index, (block, expected)) in state
        .blocks()
        .iter()
        .zip(manifest.block_digests())
        .enumerate()
    {
        // Digest equality is constant-time.
        if block.digest() != expected {
            return Err(Diagnostic::new(
                Query::HashMismatch {
                    field: "blocks".into(),
                    expected: expected.to_hex(),
                    actual: block.digest().to_hex(),
                },
                Priority::Error,
                Zone::SingleBlock {
                    index: index as u64,
                },
            ));
        }
    }
    Ok(())
}

/// A verification outcome with the token discipline applied: remediable
/// diagnostics arrive holding their Ephapax token, fatal ones never do.
#[derive(Debug)]
pub enum VerificationOutcome {
    Verified(Witness),
    Remediable(EphapaxToken),
    Fatal(Diagnostic),
}

/// Run [`verify`] and mint a repair token iff the failure is remediable.
pub fn verify_with_remediation(
    mode: VerificationMode,
    state: &FsState,
    manifest: &FsManifest,
) -> VerificationOutcome {
    match verify(mode, state, manifest) {
        Ok(witness) => VerificationOutcome::Verified(witness),
        Err(diagnostic) if diagnostic.is_remediable() => {
            let action = remediation_for(&diagnostic);
            VerificationOutcome::Remediable(EphapaxToken::issue(action, mode, diagnostic))
        }
        Err(diagnostic) => VerificationOutcome::Fatal(diagnostic),
    }
}

fn remediation_for(diagnostic: &Diagnostic) -> RepairAction {
    let index = match diagnostic.zone {
        Zone::SingleBlock { index } => index,
        _ => 0,
    };
    match diagnostic.query {
        Query::InvariantViolation { .. } => RepairAction::RewriteMetadata {
            path: format!("block/{index}"),
        },
        _ => RepairAction::RestoreBlock { index },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::test_support::zero_state;
    use crate::fs::{BlockMetadata, FsState, BLOCK_SIZE};
    use crate::digest::HashAlgorithm;
    use crate::witness::WitnessTier;

    fn state_and_manifest(n: usize) -> (FsState, FsManifest) {
        let state = zero_state(n);
        let manifest = FsManifest::from_state("1.0", &state).expect("manifest");
        (state, manifest)
    }

    fn flipped_state(n: usize, index: usize) -> FsState {
        let mut data = vec![vec![0u8; BLOCK_SIZE]; n];
        data[index][0] ^= 0x01;
        let metadata = (0..n)
            .map(|i| BlockMetadata::new(Utc::now(), format!("owner-{i}")))
            .collect();
        FsState::new(HashAlgorithm::Sha256, data, metadata).expect("state")
    }

    #[test]
    fn attested_success_yields_timestamped_witness() {
        let (state, manifest) = state_and_manifest(4);
        let witness = verify(VerificationMode::Attested, &state, &manifest).expect("verify");
        assert_eq!(witness.tier(), WitnessTier::Attested);
        let Witness::Attested(w) = witness else {
            unreachable!("tier checked above");
        };
        assert!(w.invariants_hold());
    }

    #[test]
    fn monotonicity_success_flows_downward() {
        let (state, manifest) = state_and_manifest(4);
        for mode in [
            VerificationMode::Lax,
            VerificationMode::Checked,
            VerificationMode::Attested,
        ] {
            assert!(verify(mode, &state, &manifest).is_ok(), "mode {mode}");
        }
    }

    #[test]
    fn lax_failure_implies_failure_everywhere() {
        let (_, manifest) = state_and_manifest(4);
        let short = zero_state(3);
        for mode in [
            VerificationMode::Lax,
            VerificationMode::Checked,
            VerificationMode::Attested,
        ] {
            let err = verify(mode, &short, &manifest).expect_err("short state");
            assert!(matches!(err.query, Query::MissingStructure { .. }));
        }
    }

    #[test]
    fn single_bit_flip_passes_lax_fails_checked() {
        let (_, manifest) = state_and_manifest(4);
        let corrupt = flipped_state(4, 2);

        let lax = verify(VerificationMode::Lax, &corrupt, &manifest).expect("lax passes");
        assert_eq!(lax.tier(), WitnessTier::Structural);

        let err =
            verify(VerificationMode::Checked, &corrupt, &manifest).expect_err("checked fails");
        assert_eq!(err.zone, Zone::SingleBlock { index: 2 });
        assert!(err.to_string().starts_with("[ERROR] hash-mismatch on blocks"));
        assert!(err.to_string().ends_with("| block:2"));
    }

    #[test]
    fn root_tamper_passes_checked_fails_attested_fatally() {
        let (state, manifest) = state_and_manifest(4);
        let tampered = FsManifest::with_root(
            manifest.version().to_string(),
            manifest.algorithm(),
            manifest.root().bitwise_not(),
            manifest.block_digests().to_vec(),
        );

        verify(VerificationMode::Checked, &state, &tampered).expect("checked ignores root");

        let err =
            verify(VerificationMode::Attested, &state, &tampered).expect_err("attested fails");
        assert!(matches!(
            &err.query,
            Query::HashMismatch { field, .. } if field == "merkle-root"
        ));
        assert_eq!(
            err.zone,
            Zone::FullSubsystem {
                name: "filesystem".into()
            }
        );
        assert!(!err.is_remediable());
        assert!(matches!(
            verify_with_remediation(VerificationMode::Attested, &state, &tampered),
            VerificationOutcome::Fatal(_)
        ));
    }

    #[test]
    fn remediable_failure_mints_a_restore_token() {
        let (_, manifest) = state_and_manifest(4);
        let corrupt = flipped_state(4, 2);
        match verify_with_remediation(VerificationMode::Checked, &corrupt, &manifest) {
            VerificationOutcome::Remediable(token) => {
                assert_eq!(token.action(), &RepairAction::RestoreBlock { index: 2 });
                let _ = token.consume();
            }
            other => panic!("expected a token, got {other:?}"),
        }
    }

    #[test]
    fn empty_owner_is_metadata_drift_with_rewrite_action() {
        let n = 2;
        let data = vec![vec![0u8; BLOCK_SIZE]; n];
        let mut metadata: Vec<BlockMetadata> = (0..n)
            .map(|i| BlockMetadata::new(Utc::now(), format!("owner-{i}")))
            .collect();
        metadata[1].owner.clear();
        let state = FsState::new(HashAlgorithm::Sha256, data, metadata).expect("state");
        let manifest = FsManifest::from_state("1.0", &state).expect("manifest");
        match verify_with_remediation(VerificationMode::Lax, &state, &manifest) {
            VerificationOutcome::Remediable(token) => {
                assert_eq!(
                    token.action(),
                    &RepairAction::RewriteMetadata {
                        path: "block/1".into()
                    }
                );
                let _ = token.consume();
            }
            other => panic!("expected a token, got {other:?}"),
        }
    }
}
