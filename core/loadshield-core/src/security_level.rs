//! The remote security posture ladder.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::InvalidSecurityLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Off,
    EssentiallyOff,
    Low,
    Medium,
    High,
    UnderAttack,
}

impl SecurityLevel {
    pub const ALL: [SecurityLevel; 6] = [
        SecurityLevel::Off,
        SecurityLevel::EssentiallyOff,
        SecurityLevel::Low,
        SecurityLevel::Medium,
        SecurityLevel::High,
        SecurityLevel::UnderAttack,
    ];

    /// Wire name used by the remote API.
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Off => "off",
            SecurityLevel::EssentiallyOff => "essentially_off",
            SecurityLevel::Low => "low",
            SecurityLevel::Medium => "medium",
            SecurityLevel::High => "high",
            SecurityLevel::UnderAttack => "under_attack",
        }
    }

    /// Human-readable form for messages ("under attack").
    pub fn display_name(&self) -> String {
        self.as_str().replace('_', " ")
    }

    pub fn is_under_attack(&self) -> bool {
        matches!(self, SecurityLevel::UnderAttack)
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityLevel {
    type Err = InvalidSecurityLevel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        SecurityLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == trimmed)
            .ok_or_else(|| InvalidSecurityLevel {
                given: trimmed.to_string(),
                valid: SecurityLevel::ALL
                    .iter()
                    .map(SecurityLevel::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}
