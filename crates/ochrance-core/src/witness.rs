// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! The three-tier proof witness algebra.
//!
//! `Structural < HashMatch < Attested`, each tier a strict strengthening of
//! the one below. Promotions are the only constructors of the higher tiers
//! and demand the evidence their tier asserts; weakenings project back down
//! by discarding the extra evidence. No tier has a default constructor, so
//! a witness in hand always means its checks actually ran.

use chrono::{DateTime, Utc};

use crate::digest::Digest;
use crate::error::{OchranceError, OchranceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WitnessTier {
    Structural,
    HashMatch,
    Attested,
}

impl std::fmt::Display for WitnessTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            WitnessTier::Structural => "structural",
            WitnessTier::HashMatch => "hash-match",
            WitnessTier::Attested => "attested",
        })
    }
}

/// Evidence that the state is structurally sound: the block count matches
/// the manifest and the manifest carries a usable version.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralWitness {
    block_count: u64,
    manifest_version: String,
}

impl StructuralWitness {
    pub(crate) fn new(block_count: u64, manifest_version: String) -> Self {
        Self {
            block_count,
            manifest_version,
        }
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    pub fn manifest_version(&self) -> &str {
        &self.manifest_version
    }
}

/// Structural evidence plus per-block hash equality. Construction checks
/// the equality it asserts; an unequal pair refuses to promote.
#[derive(Debug, Clone, PartialEq)]
pub struct HashMatchWitness {
    structural: StructuralWitness,
    computed_root: Digest,
    expected_root: Digest,
}

impl HashMatchWitness {
    pub fn promote(
        structural: StructuralWitness,
        computed_root: Digest,
        expected_root: Digest,
    ) -> OchranceResult<Self> {
        if computed_root != expected_root {
            return Err(OchranceError::InvalidArgument);
        }
        Ok(Self {
            structural,
            computed_root,
            expected_root,
        })
    }

    /// Projection back to the pre-promotion witness.
    pub fn weaken(&self) -> StructuralWitness {
        self.structural.clone()
    }

    pub fn structural(&self) -> &StructuralWitness {
        &self.structural
    }

    pub fn root(&self) -> &Digest {
        &self.expected_root
    }
}

/// Hash-match evidence plus attestation metadata. Promotion requires the
/// invariant flag to actually hold.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestedWitness {
    hash_match: HashMatchWitness,
    verified_at: DateTime<Utc>,
    invariants_hold: bool,
}

impl AttestedWitness {
    pub fn promote(
        hash_match: HashMatchWitness,
        verified_at: DateTime<Utc>,
        invariants_hold: bool,
    ) -> OchranceResult<Self> {
        if !invariants_hold {
            return Err(OchranceError::InvalidArgument);
        }
        Ok(Self {
            hash_match,
            verified_at,
            invariants_hold,
        })
    }

    pub fn weaken(&self) -> HashMatchWitness {
        self.hash_match.clone()
    }

    pub fn verified_at(&self) -> DateTime<Utc> {
        self.verified_at
    }

    pub fn invariants_hold(&self) -> bool {
        self.invariants_hold
    }
}

/// The tagged sum over the tiers. A consumer requiring tier T accepts any
/// witness with `tier() >= T`.
#[derive(Debug, Clone, PartialEq)]
pub enum Witness {
    Structural(StructuralWitness),
    HashMatch(HashMatchWitness),
    Attested(AttestedWitness),
}

impl Witness {
    pub fn tier(&self) -> WitnessTier {
        match self {
            Witness::Structural(_) => WitnessTier::Structural,
            Witness::HashMatch(_) => WitnessTier::HashMatch,
            Witness::Attested(_) => WitnessTier::Attested,
        }
    }

    pub fn satisfies(&self, required: WitnessTier) -> bool {
        self.tier() >= required
    }

    /// Project down to `target`. Fails only when `target` is stricter than
    /// this witness.
    pub fn weaken_to(&self, target: WitnessTier) -> OchranceResult<Witness> {
        if self.tier() < target {
            return Err(OchranceError::InvalidArgument);
        }
        let mut current = self.clone();
        while current.tier() > target {
            current = match current {
                Witness::Attested(w) => Witness::HashMatch(w.weaken()),
                Witness::HashMatch(w) => Witness::Structural(w.weaken()),
                Witness::Structural(_) => current,
            };
        }
        Ok(current)
    }

    pub fn structural(&self) -> &StructuralWitness {
        match self {
            Witness::Structural(w) => w,
            Witness::HashMatch(w) => w.structural(),
            Witness::Attested(w) => w.hash_match.structural(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::HashAlgorithm;

    fn structural() -> StructuralWitness {
        StructuralWitness::new(4, "1.0".into())
    }

    #[test]
    fn tier_order_is_strict() {
        assert!(WitnessTier::Structural < WitnessTier::HashMatch);
        assert!(WitnessTier::HashMatch < WitnessTier::Attested);
    }

    #[test]
    fn promotion_requires_equal_roots() {
        let root = HashAlgorithm::Sha256.hash(b"root");
        assert!(HashMatchWitness::promote(structural(), root.clone(), root.clone()).is_ok());
        assert!(
            HashMatchWitness::promote(structural(), root.clone(), root.bitwise_not()).is_err()
        );
    }

    #[test]
    fn attested_promotion_requires_invariants() {
        let root = HashAlgorithm::Sha256.hash(b"root");
        let hm = HashMatchWitness::promote(structural(), root.clone(), root).expect("promote");
        assert!(AttestedWitness::promote(hm.clone(), Utc::now(), false).is_err());
        assert!(AttestedWitness::promote(hm, Utc::now(), true).is_ok());
    }

    #[test]
    fn weakening_projects_back_to_pre_promotion_witness() {
        let root = HashAlgorithm::Sha256.hash(b"root");
        let s = structural();
        let hm =
            HashMatchWitness::promote(s.clone(), root.clone(), root).expect("promote");
        let at = AttestedWitness::promote(hm.clone(), Utc::now(), true).expect("attest");
        assert_eq!(at.weaken(), hm);
        assert_eq!(hm.weaken(), s);
    }

    #[test]
    fn weaken_to_walks_the_lattice() {
        let root = HashAlgorithm::Sha256.hash(b"root");
        let hm = HashMatchWitness::promote(structural(), root.clone(), root).expect("promote");
        let at = AttestedWitness::promote(hm, Utc::now(), true).expect("attest");
        let w = Witness::Attested(at);
        assert_eq!(
            w.weaken_to(WitnessTier::Structural).expect("weaken").tier(),
            WitnessTier::Structural
        );
        assert!(Witness::Structural(structural())
            .weaken_to(WitnessTier::Attested)
            .is_err());
    }

    #[test]
    fn satisfies_accepts_stricter_witnesses() {
        let w = Witness::Structural(structural());
        assert!(w.satisfies(WitnessTier::Structural));
        assert!(!w.satisfies(WitnessTier::HashMatch));
    }
}
