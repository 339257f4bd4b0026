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

//! ochrance-core
//!
//! The Ochránce filesystem integrity verification and repair engine:
//! - A2ML: the attestation-and-audit manifest language (lexer, parser,
//!   validator, serializers)
//! - Merkle engine: domain-separated hash tree with inclusion proofs
//! - Proof witness algebra: Structural / Hash-Match / Attested tiers
//! - Tri-modal filesystem verifier (Lax / Checked / Attested)
//! - Ephapax tokens and snapshot-based, exactly-once repair
//! - q/p/z diagnostics, decidable policies, the append-only audit chain

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod a2ml;
pub mod audit;
pub mod diagnostic;
pub mod digest;
pub mod error;
pub mod fs;
pub mod manifest;
pub mod merkle;
pub mod mode;
pub mod policy;
pub mod repair;
pub mod snapshot;
pub mod subsystem;
pub mod token;
pub mod verifier;
pub mod witness;

pub use crate::diagnostic::{Diagnostic, Priority, Query, Zone};
pub use crate::digest::{Digest, HashAlgorithm};
pub use crate::error::{OchranceError, OchranceResult};
pub use crate::mode::VerificationMode;
pub use crate::witness::{Witness, WitnessTier};
