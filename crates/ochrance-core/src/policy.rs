// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! Decidable integrity policies.
//!
//! A policy is a named total function from the evaluation context to
//! `ok(evidence)` or `violation(counter-example)`; a policy whose inputs
//! are absent reports `skipped`. Combinators compose policies with
//! short-circuit semantics on `all_of`.

use crate::a2ml::{Section, SectionKind, Value};
use crate::fs::FsState;
use crate::manifest::FsManifest;
use crate::mode::VerificationMode;

/// Device health sample relevant to integrity gating; mapped from the
/// block I/O port's SMART telemetry by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSample {
    pub critical_warning: u8,
    pub available_spare: u8,
    pub percentage_used: u8,
    pub media_errors: u64,
}

pub struct PolicyContext<'a> {
    pub state: &'a FsState,
    pub manifest: &'a FsManifest,
    pub health: Option<HealthSample>,
    pub mode: VerificationMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    Ok { evidence: String },
    Violation { counterexample: String },
    Skipped { reason: String },
}

impl PolicyOutcome {
    pub fn ok(evidence: impl Into<String>) -> Self {
        PolicyOutcome::Ok {
            evidence: evidence.into(),
        }
    }

    pub fn violation(counterexample: impl Into<String>) -> Self {
        PolicyOutcome::Violation {
            counterexample: counterexample.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        PolicyOutcome::Skipped {
            reason: reason.into(),
        }
    }
}

type Check = Box<dyn Fn(&PolicyContext<'_>) -> PolicyOutcome + Send + Sync>;

pub struct Policy {
    name: String,
    check: Check,
}

impl Policy {
    pub fn new(
        name: impl Into<String>,
        check: impl Fn(&PolicyContext<'_>) -> PolicyOutcome + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            check: Box::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, ctx: &PolicyContext<'_>) -> PolicyOutcome {
        (self.check)(ctx)
    }
}

/// Conjunction; stops at the first violation.
pub fn all_of(name: impl Into<String>, policies: Vec<Policy>) -> Policy {
    let name = name.into();
    Policy::new(name, move |ctx| {
        let mut passed = 0usize;
        for policy in &policies {
            match policy.evaluate(ctx) {
                PolicyOutcome::Ok { .. } => passed += 1,
                PolicyOutcome::Skipped { .. } => {}
                PolicyOutcome::Violation { counterexample } => {
                    return PolicyOutcome::violation(format!(
                        "{}: {counterexample}",
                        policy.name()
                    ));
                }
            }
        }
        PolicyOutcome::ok(format!("{passed} member policies hold"))
    })
}

/// Disjunction; succeeds on the first ok.
pub fn any_of(name: impl Into<String>, policies: Vec<Policy>) -> Policy {
    let name = name.into();
    Policy::new(name, move |ctx| {
        let mut counterexamples = Vec::new();
        for policy in &policies {
            match policy.evaluate(ctx) {
                PolicyOutcome::Ok { evidence } => {
                    return PolicyOutcome::ok(format!("{}: {evidence}", policy.name()));
                }
                PolicyOutcome::Skipped { .. } => {}
                PolicyOutcome::Violation { counterexample } => {
                    counterexamples.push(format!("{}: {counterexample}", policy.name()));
                }
            }
        }
        if counterexamples.is_empty() {
            PolicyOutcome::skipped("no member policy was applicable")
        } else {
            PolicyOutcome::violation(counterexamples.join("; "))
        }
    })
}

/// Negation. Skipped stays skipped.
pub fn not(policy: Policy) -> Policy {
    let name = format!("not-{}", policy.name());
    Policy::new(name, move |ctx| match policy.evaluate(ctx) {
        PolicyOutcome::Ok { evidence } => PolicyOutcome::violation(evidence),
        PolicyOutcome::Violation { counterexample } => PolicyOutcome::ok(counterexample),
        skipped @ PolicyOutcome::Skipped { .. } => skipped,
    })
}

/// Built-in: the state's block count matches the manifest.
pub fn block_count_matches() -> Policy {
    Policy::new("block-count-matches", |ctx| {
        let state = ctx.state.block_count();
        let manifest = ctx.manifest.block_count();
        if state == manifest {
            PolicyOutcome::ok(format!("{state} blocks"))
        } else {
            PolicyOutcome::violation(format!("state {state}, manifest {manifest}"))
        }
    })
}

/// Built-in: the manifest carries a supported format version.
pub fn version_supported() -> Policy {
    Policy::new("manifest-version-supported", |ctx| {
        let version = ctx.manifest.version();
        if version.starts_with("1.") {
            PolicyOutcome::ok(format!("version {version}"))
        } else {
            PolicyOutcome::violation(format!("unsupported version {version:?}"))
        }
    })
}

/// Built-in: device health gates. Skips when no sample is attached.
pub fn device_health_ok(min_spare: u8, max_used: u8, max_media_errors: u64) -> Policy {
    Policy::new("device-health", move |ctx| {
        let Some(health) = ctx.health else {
            return PolicyOutcome::skipped("no health telemetry attached");
        };
        if health.critical_warning != 0 {
            return PolicyOutcome::violation(format!(
                "critical warning bitmask 0x{:02x}",
                health.critical_warning
            ));
        }
        if health.available_spare < min_spare {
            return PolicyOutcome::violation(format!(
                "available spare {}% below {min_spare}%",
                health.available_spare
            ));
        }
        if health.percentage_used > max_used {
            return PolicyOutcome::violation(format!(
                "endurance used {}% above {max_used}%",
                health.percentage_used
            ));
        }
        if health.media_errors > max_media_errors {
            return PolicyOutcome::violation(format!(
                "{} media errors above {max_media_errors}",
                health.media_errors
            ));
        }
        PolicyOutcome::ok("health within thresholds")
    })
}

/// Evaluation report feeding the `@policy` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub mode: VerificationMode,
    pub violations: Vec<(String, String)>,
}

pub fn evaluate_all(policies: &[Policy], ctx: &PolicyContext<'_>) -> PolicyReport {
    let mut report = PolicyReport {
        total: policies.len(),
        passed: 0,
        failed: 0,
        skipped: 0,
        mode: ctx.mode,
        violations: Vec::new(),
    };
    for policy in policies {
        match policy.evaluate(ctx) {
            PolicyOutcome::Ok { .. } => report.passed += 1,
            PolicyOutcome::Skipped { .. } => report.skipped += 1,
            PolicyOutcome::Violation { counterexample } => {
                report.failed += 1;
                report
                    .violations
                    .push((policy.name().to_string(), counterexample));
            }
        }
    }
    report
}

impl PolicyReport {
    /// Render as the `@policy` section. Counters satisfy
    /// `passed + failed + skipped = total` and `|violations| <= failed` by
    /// construction.
    pub fn to_section(&self) -> Section {
        let mut section = Section::new(SectionKind::Policy);
        section.push("total_policies", Value::Int(self.total as i64));
        section.push("passed", Value::Int(self.passed as i64));
        section.push("failed", Value::Int(self.failed as i64));
        section.push("skipped", Value::Int(self.skipped as i64));
        section.push("mode", Value::Ident(self.mode.as_str().to_string()));
        if !self.violations.is_empty() {
            section.push(
                "violations",
                Value::List(
                    self.violations
                        .iter()
                        .map(|(name, counterexample)| {
                            Value::Str(format!("{name}: {counterexample}"))
                        })
                        .collect(),
                ),
            );
        }
        section
    }
}
