// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! Content-addressed snapshots: a prior good state the repair engine can
//! restore from.
//!
//! The payload layout is private to this module. Header, then one
//! CRC-guarded record per block, then the root digest as a trailer:
//!
//! ```text
//! "OCSNAP" | version u16 | algo tag u8 | reserved u8
//! | block_size u32 | block_count u64 | snapshot_id [16] | created_at i64
//! records: modified_at i64 | owner_len u16 | owner | read_only u8
//!          | data[block_size] | crc32 u32
//! trailer: root digest bytes
//! ```
//!
//! All integers little-endian. Decoding re-verifies every record CRC and
//! the trailer against the recomputed Merkle root, so a snapshot that
//! decodes at all is known to be the state it claims to address.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

use crate::digest::{Digest, HashAlgorithm};
use crate::error::{OchranceError, OchranceResult};
use crate::fs::{BlockMetadata, FsState, BLOCK_SIZE};
use crate::merkle::merkle_root;

const MAGIC: &[u8; 6] = b"OCSNAP";
const FORMAT_VERSION: u16 = 1;
pub const SNAPSHOT_EXTENSION: &str = "ocsnap";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("bad snapshot magic")]
    BadMagic,
    #[error("unsupported snapshot format version {0}")]
    UnsupportedVersion(u16),
    #[error("unknown algorithm tag {0}")]
    UnknownAlgorithmTag(u8),
    #[error("snapshot payload truncated")]
    Truncated,
    #[error("record {index} failed its checksum")]
    CrcMismatch { index: u64 },
    #[error("snapshot block size {0} does not match the system block size")]
    BlockSizeMismatch(u32),
    #[error("trailer root does not match the snapshot contents")]
    RootMismatch,
    #[error("owner name exceeds the record limit")]
    OwnerTooLong,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// `(snapshot-id, timestamp, opaque-payload)`. Append-only once written.
#[derive(Debug, Clone)]
pub struct Snapshot {
    id: [u8; 16],
    created_at: DateTime<Utc>,
    payload: Vec<u8>,
}

/// The decoded view the repair engine works from.
#[derive(Debug)]
pub struct DecodedSnapshot {
    pub algorithm: HashAlgorithm,
    pub blocks: Vec<(BlockMetadata, Vec<u8>)>,
    pub root: Digest,
}

impl DecodedSnapshot {
    pub fn block_count(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Rebuild a full state from the snapshot contents.
    pub fn to_state(&self) -> OchranceResult<FsState> {
        let (metadata, data): (Vec<BlockMetadata>, Vec<Vec<u8>>) =
            self.blocks.iter().cloned().unzip();
        FsState::new(self.algorithm, data, metadata)
    }
}

fn record_checksum(meta: &[u8], data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(meta);
    hasher.update(data);
    hasher.finalize()
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], SnapshotError> {
        let end = self.pos.checked_add(n).ok_or(SnapshotError::Truncated)?;
        if end > self.bytes.len() {
            return Err(SnapshotError::Truncated);
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16_le(&mut self) -> Result<u16, SnapshotError> {
        Ok(u16::from_le_bytes(
            self.take(2)?.try_into().map_err(|_| SnapshotError::Truncated)?,
        ))
    }

    fn u32_le(&mut self) -> Result<u32, SnapshotError> {
        Ok(u32::from_le_bytes(
            self.take(4)?.try_into().map_err(|_| SnapshotError::Truncated)?,
        ))
    }

    fn u64_le(&mut self) -> Result<u64, SnapshotError> {
        Ok(u64::from_le_bytes(
            self.take(8)?.try_into().map_err(|_| SnapshotError::Truncated)?,
        ))
    }

    fn i64_le(&mut self) -> Result<i64, SnapshotError> {
        Ok(i64::from_le_bytes(
            self.take(8)?.try_into().map_err(|_| SnapshotError::Truncated)?,
        ))
    }
}

impl Snapshot {
    /// Capture the current state into a snapshot payload.
    pub fn capture(
        state: &FsState,
        id: [u8; 16],
        created_at: DateTime<Utc>,
    ) -> OchranceResult<Self> {
        let algorithm = state.algorithm();
        let mut payload = Vec::new();
        payload.extend_from_slice(MAGIC);
        payload.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        payload.push(algorithm.tag());
        payload.push(0u8);
        payload.extend_from_slice(&(BLOCK_SIZE as u32).to_le_bytes());
        payload.extend_from_slice(&state.block_count().to_le_bytes());
        payload.extend_from_slice(&id);
        payload.extend_from_slice(&created_at.timestamp().to_le_bytes());

        for (block, metadata) in state.blocks().iter().zip(state.metadata()) {
            let owner = metadata.owner.as_bytes();
            let owner_len =
                u16::try_from(owner.len()).map_err(|_| OchranceError::InvalidArgument)?;
            let mut meta = Vec::with_capacity(11 + owner.len());
            meta.extend_from_slice(&metadata.modified_at.timestamp().to_le_bytes());
            meta.extend_from_slice(&owner_len.to_le_bytes());
            meta.extend_from_slice(owner);
            meta.push(u8::from(metadata.read_only));
            let crc = record_checksum(&meta, block.data());
            payload.extend_from_slice(&meta);
            payload.extend_from_slice(block.data());
            payload.extend_from_slice(&crc.to_le_bytes());
        }

        let root = merkle_root(algorithm, &state.block_digests())?;
        payload.extend_from_slice(root.as_bytes());

        Ok(Self {
            id,
            created_at,
            payload,
        })
    }

    pub fn id(&self) -> [u8; 16] {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decode and integrity-check the payload.
    pub fn decode(&self) -> Result<DecodedSnapshot, SnapshotError> {
        let mut cursor = Cursor {
            bytes: &self.payload,
            pos: 0,
        };
        if cursor.take(6)? != MAGIC {
            return Err(SnapshotError::BadMagic);
        }
        let version = cursor.u16_le()?;
        if version != FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }
        let tag = cursor.take(1)?[0];
        let algorithm =
            HashAlgorithm::from_tag(tag).ok_or(SnapshotError::UnknownAlgorithmTag(tag))?;
        let _reserved = cursor.take(1)?;
        let block_size = cursor.u32_le()?;
        if block_size as usize != BLOCK_SIZE {
            return Err(SnapshotError::BlockSizeMismatch(block_size));
        }
        let block_count = cursor.u64_le()?;
        let _id = cursor.take(16)?;
        let _created_at = cursor.i64_le()?;

        let mut blocks = Vec::new();
        let mut digests = Vec::new();
        for index in 0..block_count {
            let meta_start = cursor.pos;
            let modified_at = cursor.i64_le()?;
            let owner_len = cursor.u16_le()? as usize;
            let owner = String::from_utf8(cursor.take(owner_len)?.to_vec())
                .map_err(|_| SnapshotError::CrcMismatch { index })?;
            let read_only = cursor.take(1)?[0] != 0;
            let meta_bytes = self.payload[meta_start..cursor.pos].to_vec();
            let data = cursor.take(BLOCK_SIZE)?.to_vec();
            let stored_crc = cursor.u32_le()?;
            if record_checksum(&meta_bytes, &data) != stored_crc {
                return Err(SnapshotError::CrcMismatch { index });
            }
            let modified_at = Utc
                .timestamp_opt(modified_at, 0)
                .single()
                .ok_or(SnapshotError::CrcMismatch { index })?;
            digests.push(algorithm.hash(&data));
            blocks.push((
                BlockMetadata {
                    modified_at,
                    owner,
                    read_only,
                },
                data,
            ));
        }

        let trailer = cursor.take(algorithm.digest_len())?.to_vec();
        let declared = Digest::from_bytes(algorithm, trailer)
            .map_err(|_| SnapshotError::Truncated)?;
        let recomputed =
            merkle_root(algorithm, &digests).map_err(|_| SnapshotError::RootMismatch)?;
        if declared != recomputed {
            return Err(SnapshotError::RootMismatch);
        }

        Ok(DecodedSnapshot {
            algorithm,
            blocks,
            root: declared,
        })
    }

    /// The content address: the root digest over the snapshotted blocks.
    pub fn content_address(&self) -> Result<Digest, SnapshotError> {
        Ok(self.decode()?.root)
    }
}

/// Directory-backed snapshot store, content-addressed by root digest.
#[derive(Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    /// Persist a snapshot under its content address. Historical snapshots
    /// are never modified: an existing file with the same address is left
    /// untouched.
    pub fn save(&self, snapshot: &Snapshot) -> Result<PathBuf, SnapshotError> {
        let address = snapshot.content_address()?;
        let path = self
            .dir
            .join(format!("{}.{SNAPSHOT_EXTENSION}", address.to_hex()));
        if !path.exists() {
            fs::write(&path, snapshot.payload())?;
            tracing::info!(path = %path.display(), "snapshot persisted");
        }
        Ok(path)
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<Snapshot, SnapshotError> {
        Snapshot::from_payload(fs::read(path.as_ref())?)
    }
}

impl Snapshot {
    /// Recover the `(id, timestamp)` pair from a raw payload read back
    /// from storage.
    pub fn from_payload(payload: Vec<u8>) -> Result<Self, SnapshotError> {
        let mut cursor = Cursor {
            bytes: &payload,
            pos: 0,
        };
        if cursor.take(6)? != MAGIC {
            return Err(SnapshotError::BadMagic);
        }
        let version = cursor.u16_le()?;
        if version != FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }
        let _algo_and_reserved = cursor.take(2)?;
        let _block_size = cursor.u32_le()?;
        let _block_count = cursor.u64_le()?;
        let id: [u8; 16] = cursor
            .take(16)?
            .try_into()
            .map_err(|_| SnapshotError::Truncated)?;
        let created_at = cursor.i64_le()?;
        let created_at = Utc
            .timestamp_opt(created_at, 0)
            .single()
            .ok_or(SnapshotError::Truncated)?;
        Ok(Self {
            id,
            created_at,
            payload,
        })
    }
}
