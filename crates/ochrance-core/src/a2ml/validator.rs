// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! Semantic validation of parsed A2ML documents.
//!
//! Never fail-fast: the whole document is checked and every violated
//! invariant is reported, so a batch of authoring mistakes is fixed in one
//! pass.

use thiserror::Error;

use super::ast::{Document, Entry, EntryValue, Value};
use super::token::SectionKind;
use crate::digest::HashAlgorithm;
use crate::merkle::tree_depth;

pub const POLICY_MODES: [&str; 3] = ["lax", "checked", "attested"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unsupported document version {major}.{minor}")]
    UnsupportedVersion { major: u32, minor: u32 },
    #[error("missing section @{0}")]
    MissingSection(&'static str),
    #[error("@{section} is missing required field {field}")]
    MissingField {
        section: &'static str,
        field: &'static str,
    },
    #[error("@{section} field {field} must not be empty")]
    EmptyField {
        section: &'static str,
        field: &'static str,
    },
    #[error("@{section} field {field} must be a {expected}")]
    BadType {
        section: &'static str,
        field: &'static str,
        expected: &'static str,
    },
    #[error("unknown hash algorithm {0}")]
    UnknownAlgorithm(String),
    #[error("hash literal {field} has {got} hex chars, algorithm expects {expected}")]
    HashLength {
        field: String,
        expected: usize,
        got: usize,
    },
    #[error("block_count must be non-negative, got {0}")]
    NegativeBlockCount(i64),
    #[error("tree_depth {got} inconsistent with block_count (expected {expected})")]
    TreeDepthMismatch { expected: u32, got: i64 },
    #[error("policy counters disagree: passed {passed} + failed {failed} + skipped {skipped} != total {total}")]
    PolicyCounters {
        total: i64,
        passed: i64,
        failed: i64,
        skipped: i64,
    },
    #[error("policy lists {violations} violations but only {failed} failures")]
    ViolationsExceedFailed { violations: usize, failed: i64 },
    #[error("policy mode {0:?} is not one of lax/checked/attested")]
    BadPolicyMode(String),
    #[error("@audit entry {index} timestamp precedes its predecessor")]
    AuditNotMonotonic { index: usize },
}

/// Validate a parsed document. `Err` carries every failing invariant.
pub fn validate(doc: &Document) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if doc.major != super::ast::SUPPORTED_MAJOR {
        errors.push(ValidationError::UnsupportedVersion {
            major: doc.major,
            minor: doc.minor,
        });
    }

    let algorithm = check_refs(doc, &mut errors);
    check_manifest(doc, &mut errors);
    check_policy(doc, &mut errors);
    check_audit(doc, &mut errors);
    if let Some(algorithm) = algorithm {
        check_hash_lengths(doc, algorithm, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn require_nonempty_str(
    section: &super::ast::Section,
    section_name: &'static str,
    field: &'static str,
    errors: &mut Vec<ValidationError>,
) {
    match section.get(field) {
        None => errors.push(ValidationError::MissingField {
            section: section_name,
            field,
        }),
        Some(v) => match v.as_str() {
            Some("") => errors.push(ValidationError::EmptyField {
                section: section_name,
                field,
            }),
            Some(_) => {}
            None => errors.push(ValidationError::BadType {
                section: section_name,
                field,
                expected: "string",
            }),
        },
    }
}

fn check_manifest(doc: &Document, errors: &mut Vec<ValidationError>) {
    let Some(manifest) = doc.section(SectionKind::Manifest) else {
        // Unreachable after parsing, but the validator stands alone.
        errors.push(ValidationError::MissingSection("manifest"));
        return;
    };
    for field in ["id", "version", "producer", "subsystem"] {
        require_nonempty_str(manifest, "manifest", field, errors);
    }
    match manifest.get("produced_at") {
        None => errors.push(ValidationError::MissingField {
            section: "manifest",
            field: "produced_at",
        }),
        Some(Value::Timestamp(_)) => {}
        Some(_) => errors.push(ValidationError::BadType {
            section: "manifest",
            field: "produced_at",
            expected: "timestamp",
        }),
    }
}

fn check_refs(doc: &Document, errors: &mut Vec<ValidationError>) -> Option<HashAlgorithm> {
    let Some(refs) = doc.section(SectionKind::Refs) else {
        errors.push(ValidationError::MissingSection("refs"));
        return None;
    };

    let algorithm = match refs.get("algorithm") {
        None => {
            errors.push(ValidationError::MissingField {
                section: "refs",
                field: "algorithm",
            });
            None
        }
        Some(v) => match v.as_str().map(HashAlgorithm::parse) {
            Some(Ok(algorithm)) => Some(algorithm),
            Some(Err(_)) => {
                errors.push(ValidationError::UnknownAlgorithm(
                    v.as_str().unwrap_or_default().to_string(),
                ));
                None
            }
            None => {
                errors.push(ValidationError::BadType {
                    section: "refs",
                    field: "algorithm",
                    expected: "identifier",
                });
                None
            }
        },
    };

    if refs.get("merkle_root").is_none() {
        errors.push(ValidationError::MissingField {
            section: "refs",
            field: "merkle_root",
        });
    } else if refs.get("merkle_root").and_then(Value::as_hash).is_none() {
        errors.push(ValidationError::BadType {
            section: "refs",
            field: "merkle_root",
            expected: "hash literal",
        });
    }

    let block_count = match refs.get("block_count") {
        None => {
            errors.push(ValidationError::MissingField {
                section: "refs",
                field: "block_count",
            });
            None
        }
        Some(Value::Int(n)) if *n < 0 => {
            errors.push(ValidationError::NegativeBlockCount(*n));
            None
        }
        Some(Value::Int(n)) => Some(*n as u64),
        Some(_) => {
            errors.push(ValidationError::BadType {
                section: "refs",
                field: "block_count",
                expected: "integer",
            });
            None
        }
    };

    if let (Some(count), Some(Value::Int(depth))) = (block_count, refs.get("tree_depth")) {
        let expected = tree_depth(count);
        if *depth != i64::from(expected) {
            errors.push(ValidationError::TreeDepthMismatch {
                expected,
                got: *depth,
            });
        }
    }

    algorithm
}

fn policy_counter(
    section: &super::ast::Section,
    field: &'static str,
    errors: &mut Vec<ValidationError>,
) -> Option<i64> {
    match section.get(field) {
        None => None,
        Some(Value::Int(n)) => Some(*n),
        Some(_) => {
            errors.push(ValidationError::BadType {
                section: "policy",
                field,
                expected: "integer",
            });
            None
        }
    }
}

fn check_policy(doc: &Document, errors: &mut Vec<ValidationError>) {
    let Some(policy) = doc.section(SectionKind::Policy) else {
        return;
    };

    let total = policy_counter(policy, "total_policies", errors);
    let passed = policy_counter(policy, "passed", errors);
    let failed = policy_counter(policy, "failed", errors);
    let skipped = policy_counter(policy, "skipped", errors);
    if let (Some(total), Some(passed), Some(failed), Some(skipped)) =
        (total, passed, failed, skipped)
    {
        if passed + failed + skipped != total {
            errors.push(ValidationError::PolicyCounters {
                total,
                passed,
                failed,
                skipped,
            });
        }
        if let Some(violations) = policy.get("violations").and_then(Value::as_list) {
            if violations.len() as i64 > failed {
                errors.push(ValidationError::ViolationsExceedFailed {
                    violations: violations.len(),
                    failed,
                });
            }
        }
    }

    check_modes(&policy.entries, errors);
}

fn check_modes(entries: &[Entry], errors: &mut Vec<ValidationError>) {
    for entry in entries {
        match &entry.value {
            EntryValue::Value(v) if entry.key == "mode" => {
                if let Some(mode) = v.as_str() {
                    if !POLICY_MODES.contains(&mode) {
                        errors.push(ValidationError::BadPolicyMode(mode.to_string()));
                    }
                }
            }
            EntryValue::Block(children) => check_modes(children, errors),
            _ => {}
        }
    }
}

fn check_audit(doc: &Document, errors: &mut Vec<ValidationError>) {
    let Some(audit) = doc.section(SectionKind::Audit) else {
        return;
    };
    let mut previous = None;
    for (index, entry) in audit.entries.iter().enumerate() {
        let EntryValue::Block(fields) = &entry.value else {
            continue;
        };
        let at = fields.iter().find_map(|f| match &f.value {
            EntryValue::Value(Value::Timestamp(t)) if f.key == "at" => Some(*t),
            _ => None,
        });
        if let Some(at) = at {
            if previous.is_some_and(|p| at < p) {
                errors.push(ValidationError::AuditNotMonotonic { index });
            }
            previous = Some(at);
        }
    }
}

fn check_hash_lengths(
    doc: &Document,
    algorithm: HashAlgorithm,
    errors: &mut Vec<ValidationError>,
) {
    let expected = algorithm.digest_len() * 2;
    for section in doc.sections() {
        walk_hashes(&section.entries, expected, errors);
    }
}

fn walk_hashes(entries: &[Entry], expected: usize, errors: &mut Vec<ValidationError>) {
    for entry in entries {
        match &entry.value {
            EntryValue::Value(Value::Hash(hex)) => {
                if hex.len() != expected {
                    errors.push(ValidationError::HashLength {
                        field: entry.key.clone(),
                        expected,
                        got: hex.len(),
                    });
                }
            }
            EntryValue::Value(Value::List(items)) => {
                for item in items {
                    if let Value::Hash(hex) = item {
                        if hex.len() != expected {
                            errors.push(ValidationError::HashLength {
                                field: entry.key.clone(),
                                expected,
                                got: hex.len(),
                            });
                        }
                    }
                }
            }
            EntryValue::Block(children) => walk_hashes(children, expected, errors),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2ml::lexer::lex;
    use crate::a2ml::parser::parse;

    fn doc(source: &str) -> Document {
        parse(&lex(source).expect("lex")).expect("parse")
    }

    fn valid_source() -> String {
        format!(
            concat!(
                "a2ml/1.0\n",
                "@manifest {{\n",
                "id: \"fs-root\"\n",
                "version: \"1.0\"\n",
                "producer: \"ochrancectl\"\n",
                "subsystem: \"filesystem\"\n",
                "produced_at: 2026-03-01T12:00:00Z\n",
                "}}\n",
                "@refs {{\n",
                "algorithm: sha256\n",
                "merkle_root: #{root}\n",
                "block_count: 4\n",
                "tree_depth: 2\n",
                "}}"
            ),
            root = "ab".repeat(32)
        )
    }

    #[test]
    fn valid_document_passes() {
        validate(&doc(&valid_source())).expect("valid");
    }

    #[test]
    fn all_errors_are_accumulated_not_first_only() {
        let source = concat!(
            "a2ml/1.0\n",
            "@manifest {\n",
            "id: \"\"\n",
            "producer: \"p\"\n",
            "subsystem: \"fs\"\n",
            "produced_at: \"not-a-timestamp\"\n",
            "}\n",
            "@refs {\n",
            "algorithm: md5\n",
            "block_count: -1\n",
            "}"
        );
        let errors = validate(&doc(source)).expect_err("invalid");
        assert!(errors.contains(&ValidationError::EmptyField {
            section: "manifest",
            field: "id"
        }));
        assert!(errors.contains(&ValidationError::MissingField {
            section: "manifest",
            field: "version"
        }));
        assert!(errors.contains(&ValidationError::BadType {
            section: "manifest",
            field: "produced_at",
            expected: "timestamp"
        }));
        assert!(errors.contains(&ValidationError::UnknownAlgorithm("md5".into())));
        assert!(errors.contains(&ValidationError::NegativeBlockCount(-1)));
        assert!(errors.contains(&ValidationError::MissingField {
            section: "refs",
            field: "merkle_root"
        }));
        assert!(errors.len() >= 6);
    }

    #[test]
    fn hash_length_must_match_algorithm() {
        let source = valid_source().replace(&"ab".repeat(32), &"ab".repeat(24));
        let errors = validate(&doc(&source)).expect_err("short root");
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::HashLength { expected: 64, got: 48, .. })));
    }

    #[test]
    fn tree_depth_must_match_block_count() {
        let source = valid_source().replace("tree_depth: 2", "tree_depth: 3");
        let errors = validate(&doc(&source)).expect_err("depth");
        assert!(errors.contains(&ValidationError::TreeDepthMismatch {
            expected: 2,
            got: 3
        }));
    }

    #[test]
    fn policy_counters_must_sum() {
        let source = format!(
            "{}\n@policy {{\ntotal_policies: 5\npassed: 3\nfailed: 1\nskipped: 0\nmode: paranoid\nviolations: [\"v1\", \"v2\"]\n}}",
            valid_source()
        );
        let errors = validate(&doc(&source)).expect_err("policy");
        assert!(errors.contains(&ValidationError::PolicyCounters {
            total: 5,
            passed: 3,
            failed: 1,
            skipped: 0
        }));
        assert!(errors.contains(&ValidationError::ViolationsExceedFailed {
            violations: 2,
            failed: 1
        }));
        assert!(errors.contains(&ValidationError::BadPolicyMode("paranoid".into())));
    }

    #[test]
    fn audit_timestamps_must_be_monotone() {
        let source = format!(
            concat!(
                "{}\n@audit {{\n",
                "e0 {{\nat: 2026-03-01T12:00:05Z\nevent: \"verify\"\n}}\n",
                "e1 {{\nat: 2026-03-01T12:00:01Z\nevent: \"repair\"\n}}\n",
                "}}"
            ),
            valid_source()
        );
        let errors = validate(&doc(&source)).expect_err("audit");
        assert!(errors.contains(&ValidationError::AuditNotMonotonic { index: 1 }));
    }

    #[test]
    fn missing_refs_is_reported() {
        let source = concat!(
            "a2ml/1.0\n@manifest {\n",
            "id: \"x\"\nversion: \"1\"\nproducer: \"p\"\nsubsystem: \"fs\"\n",
            "produced_at: 2026-03-01T12:00:00Z\n}"
        );
        let errors = validate(&doc(source)).expect_err("no refs");
        assert_eq!(errors, vec![ValidationError::MissingSection("refs")]);
    }
}
