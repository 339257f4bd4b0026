// Copyright [2026] [Ochránce Contributors]
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ochrance_blockio::{read_all_blocks, BlockDevice, FileBlockDevice};
use ochrance_core::a2ml;
use ochrance_core::audit::AuditLog;
use ochrance_core::diagnostic::{Diagnostic, Query};
use ochrance_core::digest::HashAlgorithm;
use ochrance_core::fs::{BlockMetadata, FsState, BLOCK_SIZE};
use ochrance_core::manifest::{self, FsManifest, ManifestHeader};
use ochrance_core::mode::VerificationMode;
use ochrance_core::policy::{
    self, evaluate_all, HealthSample, Policy, PolicyContext,
};
use ochrance_core::snapshot::{Snapshot, SnapshotStore};
use ochrance_core::subsystem::{FilesystemSubsystem, SubsystemConfig, VerifiedSubsystem};
use ochrance_core::verifier::{verify_with_remediation, VerificationOutcome};

const EXIT_OK: u8 = 0;
const EXIT_STRUCTURAL: u8 = 2;
const EXIT_HASH_MISMATCH: u8 = 3;
const EXIT_ROOT_MISMATCH: u8 = 4;
const EXIT_REPAIR_FAILED: u8 = 5;
const EXIT_USAGE: u8 = 64;
const EXIT_INTERNAL: u8 = 70;

#[derive(Debug, Parser)]
#[command(name = "ochrancectl")]
#[command(about = "Ochránce filesystem integrity: attest, verify, repair")]
struct Cli {
    #[arg(long, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write an A2ML manifest describing the attestable state at --path.
    Attest {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value = "sha256")]
        algorithm: String,
        /// Previous attestation document, to extend the hash chain.
        #[arg(long)]
        previous: Option<PathBuf>,
    },
    /// Verify a device against a manifest at the given strictness.
    Verify {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long, default_value = "attested")]
        mode: String,
        /// Override the device path recorded in the manifest.
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Capture a content-addressed snapshot of the device.
    Snapshot {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        store: PathBuf,
        #[arg(long, default_value = "sha256")]
        algorithm: String,
    },
    /// Check the previous_root hash chain across attestation documents,
    /// oldest first.
    Chain {
        #[arg(required = true)]
        documents: Vec<PathBuf>,
    },
    /// Verify and, on a remediable failure, restore from a snapshot.
    Repair {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long, default_value = "checked")]
        mode: String,
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version are not usage errors.
            if err.use_stderr() {
                eprintln!("{err}");
                return ExitCode::from(EXIT_USAGE);
            }
            let _ = err.print();
            return ExitCode::from(EXIT_OK);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cli.log.clone()))
        .with_writer(std::io::stderr)
        .init();

    let code = match run(cli.cmd) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("ochrancectl: {err:#}");
            EXIT_INTERNAL
        }
    };
    ExitCode::from(code)
}

fn run(cmd: Command) -> Result<u8> {
    match cmd {
        Command::Attest {
            path,
            output,
            algorithm,
            previous,
        } => attest(&path, &output, &algorithm, previous.as_deref()),
        Command::Verify {
            manifest,
            mode,
            path,
        } => verify(&manifest, &mode, path.as_deref()),
        Command::Snapshot {
            path,
            store,
            algorithm,
        } => snapshot(&path, &store, &algorithm),
        Command::Chain { documents } => chain(&documents),
        Command::Repair {
            manifest,
            snapshot,
            mode,
            path,
        } => repair(&manifest, &snapshot, &mode, path.as_deref()),
    }
}

fn exit_code_for(diagnostic: &Diagnostic) -> u8 {
    match &diagnostic.query {
        Query::HashMismatch { field, .. } if field == "merkle-root" => EXIT_ROOT_MISMATCH,
        Query::HashMismatch { .. } => EXIT_HASH_MISMATCH,
        Query::MissingStructure { .. }
        | Query::MissingSection { .. }
        | Query::VersionMismatch { .. }
        | Query::InvariantViolation { .. }
        | Query::ParseFailure { .. } => EXIT_STRUCTURAL,
        Query::IoFailure { .. }
        | Query::SnapshotCorrupt { .. }
        | Query::SnapshotIncompatible { .. } => EXIT_INTERNAL,
    }
}

fn fail(diagnostic: &Diagnostic) -> u8 {
    eprintln!("{diagnostic}");
    exit_code_for(diagnostic)
}

fn parse_mode(name: &str) -> Result<VerificationMode> {
    VerificationMode::parse(name)
        .ok_or_else(|| anyhow!("mode must be lax, checked or attested, got {name:?}"))
}

fn parse_algorithm(name: &str) -> Result<HashAlgorithm> {
    HashAlgorithm::parse(name).map_err(|_| anyhow!("unknown hash algorithm {name:?}"))
}

fn device_mtime(path: &Path) -> DateTime<Utc> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

/// Read the device into an in-memory state. Trailing bytes that do not
/// fill a whole block are ignored.
fn read_state(path: &Path, algorithm: HashAlgorithm) -> Result<(FsState, HealthSample)> {
    let mut device = FileBlockDevice::open(path, BLOCK_SIZE)
        .map_err(|e| anyhow!("cannot open {}: {e}", path.display()))?;
    let health = device
        .read_health()
        .map_err(|e| anyhow!("health telemetry failed: {e}"))?;
    let blocks =
        read_all_blocks(&mut device, BLOCK_SIZE).map_err(|e| anyhow!("device read failed: {e}"))?;
    let modified_at = device_mtime(path);
    let metadata = (0..blocks.len())
        .map(|i| BlockMetadata::new(modified_at, format!("block/{i}")))
        .collect();
    let state = FsState::new(algorithm, blocks, metadata)
        .map_err(|e| anyhow!("state construction failed: {e}"))?;
    let sample = HealthSample {
        critical_warning: health.critical_warning,
        available_spare: health.available_spare,
        percentage_used: health.percentage_used,
        media_errors: u64::from(health.media_errors),
    };
    Ok((state, sample))
}

fn integrity_policies() -> Vec<Policy> {
    vec![
        policy::block_count_matches(),
        policy::version_supported(),
        policy::device_health_ok(10, 95, 0),
    ]
}

fn attest(
    path: &Path,
    output: &Path,
    algorithm: &str,
    previous: Option<&Path>,
) -> Result<u8> {
    let algorithm = parse_algorithm(algorithm)?;
    let (state, health) = read_state(path, algorithm)?;

    let subsystem = FilesystemSubsystem::new(
        SubsystemConfig::default(),
        AuditLog::new(algorithm),
    );
    let fs_manifest = match subsystem.attest(&state) {
        Ok(m) => m,
        Err(diagnostic) => return Ok(fail(&diagnostic)),
    };

    let mut header = ManifestHeader::new(
        format!("fs-{}", &fs_manifest.root().to_hex()[..16]),
        Utc::now(),
    );
    header.device = Some(path.display().to_string());
    if let Some(previous) = previous {
        let text = fs::read_to_string(previous)
            .with_context(|| format!("reading {}", previous.display()))?;
        let doc = match a2ml::parse_source(&text) {
            Ok(doc) => doc,
            Err(diagnostic) => return Ok(fail(&diagnostic)),
        };
        let prior = match manifest::from_document(&doc) {
            Ok(m) => m,
            Err(diagnostic) => return Ok(fail(&diagnostic)),
        };
        header.previous_root = Some(prior.root().clone());
        header.chain_length = Some(chain_length(&doc) + 1);
    } else {
        header.chain_length = Some(1);
    }

    let mut doc = manifest::to_document(&fs_manifest, &header);
    let report = evaluate_all(
        &integrity_policies(),
        &PolicyContext {
            state: &state,
            manifest: &fs_manifest,
            health: Some(health),
            mode: VerificationMode::Attested,
        },
    );
    doc.insert_section(report.to_section());

    // Prove the fresh manifest against its own state and record the cycle.
    let started = std::time::Instant::now();
    let witness = match subsystem.verify(VerificationMode::Attested, &state, &fs_manifest) {
        Ok(witness) => witness,
        Err(diagnostic) => return Ok(fail(&diagnostic)),
    };
    doc.insert_section(attestation_section(&witness, &fs_manifest, started.elapsed()));
    doc.insert_section(subsystem.audit_log().to_section());

    fs::write(output, a2ml::serialize_canonical(&doc))
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "attested {} blocks, root {}",
        fs_manifest.block_count(),
        fs_manifest.root()
    );
    Ok(EXIT_OK)
}

fn attestation_section(
    witness: &ochrance_core::Witness,
    fs_manifest: &FsManifest,
    duration: std::time::Duration,
) -> a2ml::Section {
    let mut section = a2ml::Section::new(a2ml::SectionKind::Attestation);
    section.push("type", a2ml::Value::Ident("merkle-root".into()));
    section.push("verified_at", a2ml::Value::Timestamp(Utc::now()));
    section.push(
        "duration_ms",
        a2ml::Value::Int(duration.as_millis().min(i64::MAX as u128) as i64),
    );
    let descriptor = serde_json::json!({
        "tier": witness.tier().to_string(),
        "block_count": witness.structural().block_count(),
        "root": fs_manifest.root().to_hex(),
    });
    section.push(
        "proof_witness",
        a2ml::Value::Blob(descriptor.to_string().into_bytes()),
    );
    section
}

fn chain_length(doc: &a2ml::Document) -> i64 {
    doc.section(a2ml::SectionKind::Refs)
        .and_then(|refs| refs.get("chain_length"))
        .and_then(a2ml::Value::as_int)
        .unwrap_or(1)
}

fn load_manifest(path: &Path) -> Result<Result<(a2ml::Document, FsManifest), Diagnostic>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let doc = match a2ml::parse_source(&text) {
        Ok(doc) => doc,
        Err(diagnostic) => return Ok(Err(diagnostic)),
    };
    if let Err(errors) = a2ml::validate(&doc) {
        for error in &errors {
            eprintln!("manifest: {error}");
        }
        return Ok(Err(Diagnostic::new(
            Query::InvariantViolation {
                detail: format!("{} validation errors", errors.len()),
            },
            ochrance_core::diagnostic::Priority::Error,
            ochrance_core::diagnostic::Zone::FullSubsystem {
                name: "manifest".into(),
            },
        )));
    }
    match manifest::from_document(&doc) {
        Ok(m) => Ok(Ok((doc, m))),
        Err(diagnostic) => Ok(Err(diagnostic)),
    }
}

fn resolve_device(
    doc: &a2ml::Document,
    override_path: Option<&Path>,
) -> Result<PathBuf, u8> {
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }
    match manifest::device_path(doc) {
        Some(path) => Ok(PathBuf::from(path)),
        None => {
            eprintln!("ochrancectl: manifest records no device; pass --path");
            Err(EXIT_USAGE)
        }
    }
}

fn verify(manifest_path: &Path, mode: &str, path: Option<&Path>) -> Result<u8> {
    let mode = match parse_mode(mode) {
        Ok(mode) => mode,
        Err(err) => {
            eprintln!("ochrancectl: {err}");
            return Ok(EXIT_USAGE);
        }
    };
    let (doc, fs_manifest) = match load_manifest(manifest_path)? {
        Ok(loaded) => loaded,
        Err(diagnostic) => return Ok(fail(&diagnostic)),
    };
    let device = match resolve_device(&doc, path) {
        Ok(device) => device,
        Err(code) => return Ok(code),
    };
    let (state, _) = read_state(&device, fs_manifest.algorithm())?;

    let subsystem = FilesystemSubsystem::new(
        SubsystemConfig::default(),
        AuditLog::new(fs_manifest.algorithm()),
    );
    match subsystem.verify(mode, &state, &fs_manifest) {
        Ok(witness) => {
            println!("ok: {} witness over {} blocks", witness.tier(), state.block_count());
            Ok(EXIT_OK)
        }
        Err(diagnostic) => Ok(fail(&diagnostic)),
    }
}

fn snapshot(path: &Path, store_dir: &Path, algorithm: &str) -> Result<u8> {
    let algorithm = parse_algorithm(algorithm)?;
    let (state, _) = read_state(path, algorithm)?;
    let mut id = [0u8; 16];
    let root = ochrance_core::merkle::merkle_root(algorithm, &state.block_digests())
        .map_err(|e| anyhow!("root computation failed: {e}"))?;
    id.copy_from_slice(&root.as_bytes()[..16]);
    let snapshot = Snapshot::capture(&state, id, Utc::now())
        .map_err(|e| anyhow!("snapshot capture failed: {e}"))?;
    let store = SnapshotStore::open(store_dir)?;
    let stored = store.save(&snapshot)?;
    println!("snapshot written to {}", stored.display());
    Ok(EXIT_OK)
}

fn chain(paths: &[PathBuf]) -> Result<u8> {
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        match a2ml::parse_source(&text) {
            Ok(doc) => documents.push(doc),
            Err(diagnostic) => return Ok(fail(&diagnostic)),
        }
    }
    match manifest::verify_chain(&documents) {
        Ok(()) => {
            println!("chain of {} attestations holds", documents.len());
            Ok(EXIT_OK)
        }
        Err(diagnostic) => Ok(fail(&diagnostic)),
    }
}

fn repair(
    manifest_path: &Path,
    snapshot_path: &Path,
    mode: &str,
    path: Option<&Path>,
) -> Result<u8> {
    let mode = match parse_mode(mode) {
        Ok(mode) => mode,
        Err(err) => {
            eprintln!("ochrancectl: {err}");
            return Ok(EXIT_USAGE);
        }
    };
    let (doc, fs_manifest) = match load_manifest(manifest_path)? {
        Ok(loaded) => loaded,
        Err(diagnostic) => return Ok(fail(&diagnostic)),
    };
    let device = match resolve_device(&doc, path) {
        Ok(device) => device,
        Err(code) => return Ok(code),
    };
    let (mut state, _) = read_state(&device, fs_manifest.algorithm())?;

    let payload = fs::read(snapshot_path)
        .with_context(|| format!("reading {}", snapshot_path.display()))?;
    let snapshot = match Snapshot::from_payload(payload) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            eprintln!("ochrancectl: snapshot: {err}");
            return Ok(EXIT_REPAIR_FAILED);
        }
    };

    match verify_with_remediation(mode, &state, &fs_manifest) {
        VerificationOutcome::Verified(witness) => {
            println!("ok: {} witness, nothing to repair", witness.tier());
            Ok(EXIT_OK)
        }
        VerificationOutcome::Fatal(diagnostic) => Ok(fail(&diagnostic)),
        VerificationOutcome::Remediable(token) => {
            let mut audit = AuditLog::new(fs_manifest.algorithm());
            let result = ochrance_core::repair::repair(
                &mut state,
                &fs_manifest,
                &snapshot,
                token,
                &mut audit,
            );
            match result {
                ochrance_core::repair::RepairResult::Ok {
                    blocks_restored,
                    witness,
                } => {
                    write_back(&device, &state)?;
                    println!(
                        "repair-ok({blocks_restored}): {} witness after re-verification",
                        witness.tier()
                    );
                    Ok(EXIT_OK)
                }
                ochrance_core::repair::RepairResult::Failed { diagnostic } => {
                    eprintln!("{diagnostic}");
                    Ok(EXIT_REPAIR_FAILED)
                }
            }
        }
    }
}

/// Flush a repaired in-memory state back onto the device.
fn write_back(device_path: &Path, state: &FsState) -> Result<()> {
    let mut device = FileBlockDevice::open(device_path, BLOCK_SIZE)
        .map_err(|e| anyhow!("cannot reopen {}: {e}", device_path.display()))?;
    for (lba, block) in state.blocks().iter().enumerate() {
        device
            .write_block(lba as u64, block.data())
            .map_err(|e| anyhow!("write-back of block {lba} failed: {e}"))?;
    }
    tracing::info!(blocks = state.block_count(), "state written back to device");
    Ok(())
}
