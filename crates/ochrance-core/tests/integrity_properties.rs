// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! Randomised properties over the Merkle engine, the verifier and the
//! snapshot codec.

use chrono::Utc;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use ochrance_core::audit::AuditLog;
use ochrance_core::digest::HashAlgorithm;
use ochrance_core::fs::{BlockMetadata, FsState, BLOCK_SIZE};
use ochrance_core::manifest::FsManifest;
use ochrance_core::merkle::{merkle_root, tree_depth, verify_inclusion, MerkleTree};
use ochrance_core::mode::VerificationMode;
use ochrance_core::repair::{repair, RepairResult};
use ochrance_core::snapshot::Snapshot;
use ochrance_core::verifier::{verify, verify_with_remediation, VerificationOutcome};

const MODES: [VerificationMode; 3] = [
    VerificationMode::Lax,
    VerificationMode::Checked,
    VerificationMode::Attested,
];

/// Compact block seeds; each byte expands to one whole block filled with
/// that value, keeping case generation cheap.
fn state_from_seeds(seeds: &[u8]) -> FsState {
    let data = seeds.iter().map(|&b| vec![b; BLOCK_SIZE]).collect();
    let metadata = (0..seeds.len())
        .map(|i| BlockMetadata::new(Utc::now(), format!("block/{i}")))
        .collect();
    FsState::new(HashAlgorithm::Sha256, data, metadata).expect("state")
}

proptest! {
    #[test]
    fn merkle_root_is_deterministic_per_algorithm(
        seeds in prop::collection::vec(any::<u8>(), 0..32),
    ) {
        for algorithm in [HashAlgorithm::Sha256, HashAlgorithm::Blake3] {
            let leaves: Vec<_> = seeds.iter().map(|&b| algorithm.hash(&[b])).collect();
            let a = merkle_root(algorithm, &leaves).expect("root a");
            let b = merkle_root(algorithm, &leaves).expect("root b");
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn inclusion_proofs_verify_and_reject_tampering(
        seeds in prop::collection::vec(any::<u8>(), 1..48),
        target in any::<prop::sample::Index>(),
    ) {
        let algorithm = HashAlgorithm::Sha256;
        let leaves: Vec<_> = seeds.iter().map(|&b| algorithm.hash(&[b])).collect();
        let tree = MerkleTree::build(algorithm, leaves.clone()).expect("tree");
        let index = target.index(leaves.len());

        let proof = tree.proof(index).expect("proof");
        prop_assert_eq!(proof.path.len() as u32, tree_depth(leaves.len() as u64));
        prop_assert!(verify_inclusion(algorithm, &proof, &tree.root()));

        // Tampering with the expected root must fail.
        prop_assert!(!verify_inclusion(algorithm, &proof, &tree.root().bitwise_not()));
    }

    /// Attested success implies success in every weaker mode; Lax failure
    /// implies failure in every mode.
    #[test]
    fn verifier_is_monotone(
        seeds in prop::collection::vec(any::<u8>(), 1..12),
        corrupt_index in any::<prop::sample::Index>(),
        corrupt in any::<bool>(),
    ) {
        let good = state_from_seeds(&seeds);
        let manifest = FsManifest::from_state("1.0", &good).expect("manifest");
        let state = if corrupt {
            let mut twisted = seeds.clone();
            let i = corrupt_index.index(twisted.len());
            twisted[i] = twisted[i].wrapping_add(1);
            state_from_seeds(&twisted)
        } else {
            good
        };

        let verdicts: Vec<bool> = MODES
            .iter()
            .map(|&mode| verify(mode, &state, &manifest).is_ok())
            .collect();
        // Success may only degrade as strictness rises.
        prop_assert!(verdicts.windows(2).all(|w| w[0] || !w[1]));
        if verdicts[2] {
            prop_assert!(verdicts[0] && verdicts[1]);
        }
        if !verdicts[0] {
            prop_assert!(!verdicts[1] && !verdicts[2]);
        }
    }

    /// Snapshot encode/decode preserves contents; repair driven end to end
    /// from random corruption always restores attestation.
    #[test]
    fn random_corruption_always_repairs(
        seeds in prop::collection::vec(any::<u8>(), 1..10),
        corrupt_index in any::<prop::sample::Index>(),
    ) {
        let good = state_from_seeds(&seeds);
        let manifest = FsManifest::from_state("1.0", &good).expect("manifest");
        let snapshot = Snapshot::capture(&good, [2u8; 16], Utc::now()).expect("snapshot");

        let decoded = snapshot.decode().expect("decode");
        prop_assert_eq!(decoded.block_count(), seeds.len() as u64);

        let mut twisted = seeds.clone();
        let i = corrupt_index.index(twisted.len());
        twisted[i] = twisted[i].wrapping_add(1);
        let mut state = state_from_seeds(&twisted);

        let token = match verify_with_remediation(VerificationMode::Checked, &state, &manifest) {
            VerificationOutcome::Remediable(token) => token,
            other => {
                return Err(TestCaseError::fail(format!("expected token, got {other:?}")));
            }
        };
        let mut audit = AuditLog::new(HashAlgorithm::Sha256);
        let result = repair(&mut state, &manifest, &snapshot, token, &mut audit);
        prop_assert!(result.is_ok());
        prop_assert!(verify(VerificationMode::Attested, &state, &manifest).is_ok());
    }

    /// Token conservation: every outcome over a random pair either yields
    /// no token or exactly one, and that one is consumed here.
    #[test]
    fn tokens_are_conserved(
        seeds in prop::collection::vec(any::<u8>(), 1..8),
        tamper_root in any::<bool>(),
    ) {
        let state = state_from_seeds(&seeds);
        let manifest = FsManifest::from_state("1.0", &state).expect("manifest");
        let manifest = if tamper_root {
            FsManifest::with_root(
                manifest.version().to_string(),
                manifest.algorithm(),
                manifest.root().bitwise_not(),
                manifest.block_digests().to_vec(),
            )
        } else {
            manifest
        };
        let mut minted = 0u32;
        let mut consumed = 0u32;
        for mode in MODES {
            if let VerificationOutcome::Remediable(token) =
                verify_with_remediation(mode, &state, &manifest)
            {
                minted += 1;
                let _ = token.consume();
                consumed += 1;
            }
        }
        prop_assert_eq!(minted, consumed);
        // A root tamper over matching blocks is never remediable.
        if tamper_root {
            prop_assert_eq!(minted, 0);
        }
    }
}
