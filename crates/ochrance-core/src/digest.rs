// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! Algorithm-tagged digests and the content-hash oracle.
//!
//! A [`Digest`] pairs a [`HashAlgorithm`] with its fixed-length byte
//! sequence. Equality over digest bytes is constant-time: verifier inputs
//! are adversary-influenced and must not leak a mismatch position.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

use crate::error::{OchranceError, OchranceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
    Blake3,
}

impl HashAlgorithm {
    pub const fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
            HashAlgorithm::Blake3 => 32,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    /// Wire tag used in the snapshot header.
    pub const fn tag(self) -> u8 {
        match self {
            HashAlgorithm::Sha256 => 1,
            HashAlgorithm::Sha384 => 2,
            HashAlgorithm::Sha512 => 3,
            HashAlgorithm::Blake3 => 4,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(HashAlgorithm::Sha256),
            2 => Some(HashAlgorithm::Sha384),
            3 => Some(HashAlgorithm::Sha512),
            4 => Some(HashAlgorithm::Blake3),
            _ => None,
        }
    }

    pub fn parse(name: &str) -> OchranceResult<Self> {
        match name {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(OchranceError::UnknownAlgorithm(other.to_string())),
        }
    }

    /// The pure hash oracle: bytes in, fixed-length digest out.
    pub fn hash(self, data: &[u8]) -> Digest {
        let bytes = match self {
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
            HashAlgorithm::Blake3 => blake3::hash(data).as_bytes().to_vec(),
        };
        Digest {
            algorithm: self,
            bytes,
        }
    }

    /// Sentinel root for an empty Merkle tree.
    pub fn zero_digest(self) -> Digest {
        Digest {
            algorithm: self,
            bytes: vec![0u8; self.digest_len()],
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Digest {
    algorithm: HashAlgorithm,
    bytes: Vec<u8>,
}

impl Digest {
    /// Sole constructor from raw bytes; the length must match the tag.
    pub fn from_bytes(algorithm: HashAlgorithm, bytes: Vec<u8>) -> OchranceResult<Self> {
        if bytes.len() != algorithm.digest_len() {
            return Err(OchranceError::DigestLength {
                expected: algorithm.digest_len(),
                got: bytes.len(),
            });
        }
        Ok(Self { algorithm, bytes })
    }

    /// Parse a hex digest; accepts either case, renders lowercase.
    pub fn from_hex(algorithm: HashAlgorithm, text: &str) -> OchranceResult<Self> {
        let bytes = hex::decode(text).map_err(|_| OchranceError::InvalidArgument)?;
        Self::from_bytes(algorithm, bytes)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Bitwise inverse, preserving the algorithm tag. Test fixtures use
    /// this to fabricate a wrong-but-well-formed root.
    pub fn bitwise_not(&self) -> Digest {
        Digest {
            algorithm: self.algorithm,
            bytes: self.bytes.iter().map(|b| !b).collect(),
        }
    }
}

impl PartialEq for Digest {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm && bool::from(self.bytes.ct_eq(&other.bytes))
    }
}

impl std::hash::Hash for Digest {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::hash::Hash::hash(&self.algorithm, state);
        self.bytes.hash(state);
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}
