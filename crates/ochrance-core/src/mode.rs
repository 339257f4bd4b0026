// Copyright (c) 2026 Ochránce Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use crate::witness::WitnessTier;

/// Verification strictness. Total order: `Lax < Checked < Attested`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum VerificationMode {
    Lax,
    Checked,
    Attested,
}

impl VerificationMode {
    /// The witness tier a successful verification at this mode yields, and
    /// the minimum tier a consumer at this mode accepts.
    pub const fn required_tier(self) -> WitnessTier {
        match self {
            VerificationMode::Lax => WitnessTier::Structural,
            VerificationMode::Checked => WitnessTier::HashMatch,
            VerificationMode::Attested => WitnessTier::Attested,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            VerificationMode::Lax => "lax",
            VerificationMode::Checked => "checked",
            VerificationMode::Attested => "attested",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "lax" => Some(VerificationMode::Lax),
            "checked" => Some(VerificationMode::Checked),
            "attested" => Some(VerificationMode::Attested),
            _ => None,
        }
    }
}

impl std::fmt::Display for VerificationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decidable `actual >= threshold` in the strictness order.
pub fn satisfies_minimum(threshold: VerificationMode, actual: VerificationMode) -> bool {
    actual >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_and_tier_mapping_agree() {
        assert!(VerificationMode::Lax < VerificationMode::Checked);
        assert!(VerificationMode::Checked < VerificationMode::Attested);
        assert!(
            VerificationMode::Lax.required_tier() < VerificationMode::Attested.required_tier()
        );
    }

    #[test]
    fn satisfies_minimum_is_reflexive_and_monotone() {
        for mode in [
            VerificationMode::Lax,
            VerificationMode::Checked,
            VerificationMode::Attested,
        ] {
            assert!(satisfies_minimum(mode, mode));
            assert!(satisfies_minimum(VerificationMode::Lax, mode));
        }
        assert!(!satisfies_minimum(
            VerificationMode::Attested,
            VerificationMode::Checked
        ));
    }

    #[test]
    fn parse_roundtrips_display() {
        for mode in [
            VerificationMode::Lax,
            VerificationMode::Checked,
            VerificationMode::Attested,
        ] {
            assert_eq!(VerificationMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(VerificationMode::parse("paranoid"), None);
    }
}
