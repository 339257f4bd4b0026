// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! The immutable integrity manifest and its A2ML binding.

use chrono::{DateTime, Utc};

use crate::a2ml::{Document, Section, SectionKind, Value};
use crate::diagnostic::{Diagnostic, Priority, Query, Zone};
use crate::digest::{Digest, HashAlgorithm};
use crate::error::OchranceResult;
use crate::fs::{FsState, BLOCK_SIZE};
use crate::merkle::{merkle_root, tree_depth};

/// The integrity specification for an `FsState(n)`: the Merkle root, the
/// per-block digest vector and the format version. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct FsManifest {
    version: String,
    algorithm: HashAlgorithm,
    root: Digest,
    block_digests: Vec<Digest>,
}

impl FsManifest {
    /// Attestation-side constructor: the root is computed here, so the
    /// `root = merkle-root(block_digests)` invariant holds by construction.
    pub fn new(
        version: impl Into<String>,
        algorithm: HashAlgorithm,
        block_digests: Vec<Digest>,
    ) -> OchranceResult<Self> {
        let root = merkle_root(algorithm, &block_digests)?;
        Ok(Self {
            version: version.into(),
            algorithm,
            root,
            block_digests,
        })
    }

    /// Load-side constructor for manifests read back from storage: the
    /// declared root is taken as authoritative and checked against the
    /// digest vector only by the Attested verifier.
    pub fn with_root(
        version: impl Into<String>,
        algorithm: HashAlgorithm,
        root: Digest,
        block_digests: Vec<Digest>,
    ) -> Self {
        Self {
            version: version.into(),
            algorithm,
            root,
            block_digests,
        }
    }

    pub fn from_state(version: impl Into<String>, state: &FsState) -> OchranceResult<Self> {
        Self::new(version, state.algorithm(), state.block_digests())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn root(&self) -> &Digest {
        &self.root
    }

    pub fn block_digests(&self) -> &[Digest] {
        &self.block_digests
    }

    pub fn block_count(&self) -> u64 {
        self.block_digests.len() as u64
    }
}

/// Provenance fields for the `@manifest` section of an attestation
/// document.
#[derive(Debug, Clone)]
pub struct ManifestHeader {
    pub id: String,
    pub producer: String,
    pub subsystem: String,
    pub produced_at: DateTime<Utc>,
    pub device: Option<String>,
    pub hostname: Option<String>,
    /// Root of the previous attestation document, for the hash chain.
    pub previous_root: Option<Digest>,
    pub chain_length: Option<i64>,
}

impl ManifestHeader {
    pub fn new(id: impl Into<String>, produced_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            producer: "ochrancectl".into(),
            subsystem: "filesystem".into(),
            produced_at,
            device: None,
            hostname: None,
            previous_root: None,
            chain_length: None,
        }
    }
}

/// Render a manifest and its provenance into an A2ML document with
/// `@manifest` and `@refs` sections.
pub fn to_document(manifest: &FsManifest, header: &ManifestHeader) -> Document {
    let mut doc = Document::new(1, 0);

    let mut m = Section::new(SectionKind::Manifest);
    m.push("id", Value::Str(header.id.clone()));
    m.push("version", Value::Str(manifest.version().to_string()));
    m.push("producer", Value::Str(header.producer.clone()));
    m.push("produced_at", Value::Timestamp(header.produced_at));
    m.push("subsystem", Value::Str(header.subsystem.clone()));
    if let Some(device) = &header.device {
        m.push("device", Value::Str(device.clone()));
    }
    if let Some(hostname) = &header.hostname {
        m.push("hostname", Value::Str(hostname.clone()));
    }
    doc.insert_section(m);

    let mut r = Section::new(SectionKind::Refs);
    r.push("merkle_root", Value::Hash(manifest.root().to_hex()));
    r.push(
        "algorithm",
        Value::Ident(manifest.algorithm().as_str().to_string()),
    );
    r.push("block_count", Value::Int(manifest.block_count() as i64));
    r.push(
        "tree_depth",
        Value::Int(i64::from(tree_depth(manifest.block_count()))),
    );
    r.push("leaf_size", Value::Int(BLOCK_SIZE as i64));
    r.push(
        "block_digests",
        Value::List(
            manifest
                .block_digests()
                .iter()
                .map(|d| Value::Hash(d.to_hex()))
                .collect(),
        ),
    );
    if let Some(previous) = &header.previous_root {
        r.push("previous_root", Value::Hash(previous.to_hex()));
    }
    if let Some(chain_length) = header.chain_length {
        r.push("chain_length", Value::Int(chain_length));
    }
    doc.insert_section(r);

    doc
}

fn structure_error(detail: &str) -> Diagnostic {
    Diagnostic::new(
        Query::MissingStructure {
            detail: detail.to_string(),
        },
        Priority::Error,
        Zone::FullSubsystem {
            name: "manifest".into(),
        },
    )
}

/// Extract the integrity manifest from a parsed attestation document.
pub fn from_document(doc: &Document) -> Result<FsManifest, Diagnostic> {
    let manifest_section = doc
        .section(SectionKind::Manifest)
        .ok_or_else(|| structure_error("@manifest section missing"))?;
    let version = manifest_section
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| structure_error("@manifest has no version"))?
        .to_string();

    let refs = doc
        .section(SectionKind::Refs)
        .ok_or_else(|| structure_error("@refs section missing"))?;
    let algorithm = refs
        .get("algorithm")
        .and_then(Value::as_str)
        .ok_or_else(|| structure_error("@refs has no algorithm"))
        .and_then(|name| {
            HashAlgorithm::parse(name)
                .map_err(|_| structure_error(&format!("unknown algorithm {name}")))
        })?;
    let root_hex = refs
        .get("merkle_root")
        .and_then(Value::as_hash)
        .ok_or_else(|| structure_error("@refs has no merkle_root"))?;
    let root = Digest::from_hex(algorithm, root_hex)
        .map_err(|_| structure_error("merkle_root length does not fit the algorithm"))?;

    let digest_values = refs
        .get("block_digests")
        .and_then(Value::as_list)
        .ok_or_else(|| structure_error("@refs has no block_digests vector"))?;
    let mut block_digests = Vec::with_capacity(digest_values.len());
    for value in digest_values {
        let hex = value
            .as_hash()
            .ok_or_else(|| structure_error("block_digests entries must be hash literals"))?;
        let digest = Digest::from_hex(algorithm, hex)
            .map_err(|_| structure_error("block digest length does not fit the algorithm"))?;
        block_digests.push(digest);
    }

    if let Some(count) = refs.get("block_count").and_then(Value::as_int) {
        if count as usize != block_digests.len() {
            return Err(structure_error(
                "block_count disagrees with the block_digests vector",
            ));
        }
    }

    Ok(FsManifest::with_root(version, algorithm, root, block_digests))
}

/// The device path an attestation document points at, if any.
pub fn device_path(doc: &Document) -> Option<String> {
    doc.section(SectionKind::Manifest)?
        .get("device")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn chain_fields(doc: &Document) -> (Option<&str>, Option<i64>) {
    match doc.section(SectionKind::Refs) {
        Some(refs) => (
            refs.get("previous_root").and_then(Value::as_hash),
            refs.get("chain_length").and_then(Value::as_int),
        ),
        None => (None, None),
    }
}

/// Check a sequence of attestation documents, oldest first: each document's
/// `previous_root` must equal its predecessor's `merkle_root` and
/// `chain_length` must increment by one.
pub fn verify_chain(documents: &[Document]) -> Result<(), Diagnostic> {
    let mut previous: Option<(FsManifest, i64)> = None;
    for (position, doc) in documents.iter().enumerate() {
        let manifest = from_document(doc)?;
        let (declared_previous, declared_length) = chain_fields(doc);
        let length = declared_length.unwrap_or(1);
        if let Some((prior, prior_length)) = &previous {
            let Some(declared_previous) = declared_previous else {
                return Err(structure_error(&format!(
                    "document {position} does not reference its predecessor"
                )));
            };
            if declared_previous != prior.root().to_hex() {
                return Err(Diagnostic::new(
                    Query::HashMismatch {
                        field: "previous_root".into(),
                        expected: prior.root().to_hex(),
                        actual: declared_previous.to_string(),
                    },
                    Priority::Error,
                    Zone::CrossCutting {
                        members: vec![format!("document:{}", position - 1), format!("document:{position}")],
                    },
                ));
            }
            if length != prior_length + 1 {
                return Err(structure_error(&format!(
                    "document {position} chain_length {length} does not extend {prior_length}"
                )));
            }
        }
        previous = Some((manifest, length));
    }
    Ok(())
}
