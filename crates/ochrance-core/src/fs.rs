// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runtime filesystem state: fixed-size blocks plus their metadata records.
//!
//! `FsState::new` is the sole point where the equal-length invariant between
//! the block vector and the metadata vector is established; everything
//! downstream indexes without re-checking. Mutation is reserved to the
//! repair engine.

use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::digest::{Digest, HashAlgorithm};
use crate::error::{OchranceError, OchranceResult};
use crate::merkle::PARALLEL_THRESHOLD;

/// System block size in bytes.
pub const BLOCK_SIZE: usize = 4096;

/// Per-block metadata. Never participates in integrity hashing.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockMetadata {
    pub modified_at: DateTime<Utc>,
    pub owner: String,
    pub read_only: bool,
}

impl BlockMetadata {
    pub fn new(modified_at: DateTime<Utc>, owner: impl Into<String>) -> Self {
        Self {
            modified_at,
            owner: owner.into(),
            read_only: false,
        }
    }
}

/// A raw block and its digest under the state's algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    data: Vec<u8>,
    digest: Digest,
}

impl Block {
    fn new(algorithm: HashAlgorithm, data: Vec<u8>) -> Self {
        let digest = algorithm.hash(&data);
        Self { data, digest }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }
}

#[derive(Debug, Clone)]
pub struct FsState {
    algorithm: HashAlgorithm,
    blocks: Vec<Block>,
    metadata: Vec<BlockMetadata>,
}

impl FsState {
    /// Build a state from raw block payloads. Rejects a length mismatch
    /// between blocks and metadata and any block that is not exactly
    /// [`BLOCK_SIZE`] bytes. Block digests are computed here, in parallel
    /// for large states.
    pub fn new(
        algorithm: HashAlgorithm,
        data: Vec<Vec<u8>>,
        metadata: Vec<BlockMetadata>,
    ) -> OchranceResult<Self> {
        if data.len() != metadata.len() {
            return Err(OchranceError::LengthMismatch);
        }
        if data.iter().any(|block| block.len() != BLOCK_SIZE) {
            return Err(OchranceError::InvalidArgument);
        }
        let blocks = if data.len() >= PARALLEL_THRESHOLD {
            data.into_par_iter()
                .map(|bytes| Block::new(algorithm, bytes))
                .collect()
        } else {
            data.into_iter()
                .map(|bytes| Block::new(algorithm, bytes))
                .collect()
        };
        Ok(Self {
            algorithm,
            blocks,
            metadata,
        })
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn block_count(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn metadata(&self) -> &[BlockMetadata] {
        &self.metadata
    }

    pub fn block(&self, index: u64) -> Option<&Block> {
        self.blocks.get(index as usize)
    }

    pub fn block_metadata(&self, index: u64) -> Option<&BlockMetadata> {
        self.metadata.get(index as usize)
    }

    /// Digest vector in block order, for manifest construction.
    pub fn block_digests(&self) -> Vec<Digest> {
        self.blocks.iter().map(|b| b.digest().clone()).collect()
    }

    /// Replace one block and its metadata. Repair-engine only.
    pub(crate) fn replace_block(
        &mut self,
        index: u64,
        data: Vec<u8>,
        metadata: BlockMetadata,
    ) -> OchranceResult<()> {
        if data.len() != BLOCK_SIZE {
            return Err(OchranceError::InvalidArgument);
        }
        let slot = self
            .blocks
            .get_mut(index as usize)
            .ok_or(OchranceError::NotFound)?;
        *slot = Block::new(self.algorithm, data);
        self.metadata[index as usize] = metadata;
        Ok(())
    }

    /// Replace metadata only. Repair-engine only.
    pub(crate) fn replace_metadata(
        &mut self,
        index: u64,
        metadata: BlockMetadata,
    ) -> OchranceResult<()> {
        let slot = self
            .metadata
            .get_mut(index as usize)
            .ok_or(OchranceError::NotFound)?;
        *slot = metadata;
        Ok(())
    }

    /// Quarantine: mark the block read-only and zero its digest field so a
    /// later Checked pass reports it instead of trusting stale bytes.
    pub(crate) fn quarantine_block(&mut self, index: u64) -> OchranceResult<()> {
        let meta = self
            .metadata
            .get_mut(index as usize)
            .ok_or(OchranceError::NotFound)?;
        meta.read_only = true;
        let block = self
            .blocks
            .get_mut(index as usize)
            .ok_or(OchranceError::NotFound)?;
        block.digest = self.algorithm.zero_digest();
        Ok(())
    }

    /// Wholesale replacement, used by full restore.
    pub(crate) fn replace_all(&mut self, other: FsState) -> OchranceResult<()> {
        if other.algorithm != self.algorithm {
            return Err(OchranceError::InvalidArgument);
        }
        *self = other;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn zero_state(n: usize) -> FsState {
        let data = vec![vec![0u8; BLOCK_SIZE]; n];
        let metadata = (0..n)
            .map(|i| BlockMetadata::new(Utc::now(), format!("owner-{i}")))
            .collect();
        FsState::new(HashAlgorithm::Sha256, data, metadata).expect("state")
    }
}
