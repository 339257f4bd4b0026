// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ephapax: the single-use repair permit.
//!
//! A token is minted exactly when a verifier reports a remediable failure
//! and must be consumed by exactly one repair application. Move semantics
//! make double consumption a compile error; the drop guard makes silent
//! discard a loud runtime failure.
//!
//! ```compile_fail
//! use ochrance_core::token::EphapaxToken;
//! fn double_consume(token: EphapaxToken) {
//!     let first = token.consume();
//!     let second = token.consume(); // error[E0382]: use of moved value
//!     let _ = (first, second);
//! }
//! ```

use crate::diagnostic::Diagnostic;
use crate::mode::VerificationMode;

/// The remediation a token authorises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairAction {
    RestoreBlock { index: u64 },
    RewriteMetadata { path: String },
    QuarantineFile { path: String },
    RebuildIndex,
}

impl std::fmt::Display for RepairAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepairAction::RestoreBlock { index } => write!(f, "restore-block({index})"),
            RepairAction::RewriteMetadata { path } => write!(f, "rewrite-metadata({path})"),
            RepairAction::QuarantineFile { path } => write!(f, "quarantine-file({path})"),
            RepairAction::RebuildIndex => write!(f, "rebuild-index"),
        }
    }
}

/// What a consumed token hands to the repair engine.
#[derive(Debug, Clone)]
pub struct RepairOrder {
    pub action: RepairAction,
    /// Mode at which the original failure was detected; re-verification
    /// after the mutation runs at this mode.
    pub detected_at: VerificationMode,
    pub diagnostic: Diagnostic,
}

/// A move-only repair permit. There is no way to duplicate one, no way to
/// consume one twice, and dropping one unconsumed panics.
#[derive(Debug)]
pub struct EphapaxToken {
    action: RepairAction,
    detected_at: VerificationMode,
    diagnostic: Diagnostic,
    armed: bool,
}

impl EphapaxToken {
    /// Minting is reserved to the verification layer.
    pub(crate) fn issue(
        action: RepairAction,
        detected_at: VerificationMode,
        diagnostic: Diagnostic,
    ) -> Self {
        Self {
            action,
            detected_at,
            diagnostic,
            armed: true,
        }
    }

    pub fn action(&self) -> &RepairAction {
        &self.action
    }

    pub fn diagnostic(&self) -> &Diagnostic {
        &self.diagnostic
    }

    /// Consume the token, disarming the drop guard. Takes `self` by value:
    /// the borrow checker rules out a second consumption.
    pub fn consume(mut self) -> RepairOrder {
        self.armed = false;
        RepairOrder {
            action: self.action.clone(),
            detected_at: self.detected_at,
            diagnostic: self.diagnostic.clone(),
        }
    }
}

impl Drop for EphapaxToken {
    fn drop(&mut self) {
        // A token that reaches Drop still armed was neither consumed nor
        // surrendered; that is a broken repair pipeline, not a recoverable
        // condition. Stay quiet during unwinding so the original panic is
        // the one that surfaces.
        #[allow(clippy::panic)]
        if self.armed && !std::thread::panicking() {
            panic!(
                "Ephapax token for {} dropped without being consumed",
                self.action
            );
        }
    }
}
