// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! Binary hash tree over block digests.
//!
//! Levels are built bottom-up: each level pairs adjacent nodes and an odd
//! trailing node is combined with a duplicate of itself, so the shape is a
//! pure function of the leaf count. Domain separation keeps leaves and
//! internal nodes in distinct preimage spaces: leaf = `H(0x00 ∥ data)`,
//! node = `H(0x01 ∥ left ∥ right)`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::digest::{Digest, HashAlgorithm};
use crate::error::{OchranceError, OchranceResult};

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Leaf-layer hashing switches to rayon at and above this many items.
pub const PARALLEL_THRESHOLD: usize = 1 << 14;

pub fn leaf_hash(algorithm: HashAlgorithm, data: &[u8]) -> Digest {
    let mut buf = Vec::with_capacity(1 + data.len());
    buf.push(LEAF_PREFIX);
    buf.extend_from_slice(data);
    algorithm.hash(&buf)
}

pub fn node_hash(algorithm: HashAlgorithm, left: &Digest, right: &Digest) -> Digest {
    let mut buf = Vec::with_capacity(1 + left.as_bytes().len() + right.as_bytes().len());
    buf.push(NODE_PREFIX);
    buf.extend_from_slice(left.as_bytes());
    buf.extend_from_slice(right.as_bytes());
    algorithm.hash(&buf)
}

/// Depth of the tree over `n` leaves: `ceil(log2(n))`, 0 for `n <= 1`.
pub fn tree_depth(n: u64) -> u32 {
    if n <= 1 {
        0
    } else {
        u64::BITS - (n - 1).leading_zeros()
    }
}

/// Which side the sibling sits on, viewed from the claimed leaf's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProofStep {
    pub side: Side,
    pub sibling: Digest,
}

/// An inclusion proof: the claimed leaf digest plus one sibling per level.
#[derive(Debug, Clone, PartialEq)]
pub struct MerkleProof {
    pub leaf: Digest,
    pub path: Vec<ProofStep>,
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    algorithm: HashAlgorithm,
    // levels[0] holds the leaf digests; the last level is the root.
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build the tree. All leaf digests must carry `algorithm`.
    pub fn build(algorithm: HashAlgorithm, leaves: Vec<Digest>) -> OchranceResult<Self> {
        if leaves.iter().any(|d| d.algorithm() != algorithm) {
            return Err(OchranceError::InvalidArgument);
        }
        let mut levels = vec![leaves];
        while levels
            .last()
            .map(|level| level.len() > 1)
            .unwrap_or(false)
        {
            let current = match levels.last() {
                Some(level) => level,
                None => return Err(OchranceError::Internal),
            };
            let next = if current.len() >= PARALLEL_THRESHOLD {
                current
                    .par_chunks(2)
                    .map(|pair| combine(algorithm, pair))
                    .collect()
            } else {
                current
                    .chunks(2)
                    .map(|pair| combine(algorithm, pair))
                    .collect()
            };
            levels.push(next);
        }
        Ok(Self { algorithm, levels })
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn depth(&self) -> u32 {
        tree_depth(self.leaf_count() as u64)
    }

    /// The top digest; the all-zero sentinel for an empty tree.
    pub fn root(&self) -> Digest {
        self.levels
            .last()
            .and_then(|level| level.first())
            .cloned()
            .unwrap_or_else(|| self.algorithm.zero_digest())
    }

    /// Inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> OchranceResult<MerkleProof> {
        if index >= self.leaf_count() {
            return Err(OchranceError::NotFound);
        }
        let leaf = self.levels[0][index].clone();
        let mut path = Vec::with_capacity(self.depth() as usize);
        let mut i = index;
        for level in &self.levels[..self.levels.len().saturating_sub(1)] {
            let (side, sibling_index) = if i % 2 == 0 {
                (Side::Right, i + 1)
            } else {
                (Side::Left, i - 1)
            };
            // Odd trailing node: its sibling is its own duplicate.
            let sibling = level.get(sibling_index).unwrap_or(&level[i]).clone();
            path.push(ProofStep { side, sibling });
            i /= 2;
        }
        Ok(MerkleProof { leaf, path })
    }
}

fn combine(algorithm: HashAlgorithm, pair: &[Digest]) -> Digest {
    match pair {
        [left, right] => node_hash(algorithm, left, right),
        [lone] => node_hash(algorithm, lone, lone),
        _ => algorithm.zero_digest(),
    }
}

/// Convenience root over a leaf sequence. Deterministic: identical leaves
/// under an identical algorithm always yield an identical root.
pub fn merkle_root(algorithm: HashAlgorithm, leaves: &[Digest]) -> OchranceResult<Digest> {
    Ok(MerkleTree::build(algorithm, leaves.to_vec())?.root())
}

/// Walk an inclusion proof and compare against the expected root. The final
/// comparison is constant-time (digest equality is).
pub fn verify_inclusion(
    algorithm: HashAlgorithm,
    proof: &MerkleProof,
    expected_root: &Digest,
) -> bool {
    let mut current = proof.leaf.clone();
    for step in &proof.path {
        current = match step.side {
            Side::Left => node_hash(algorithm, &step.sibling, &current),
            Side::Right => node_hash(algorithm, &current, &step.sibling),
        };
    }
    current == *expected_root
}
