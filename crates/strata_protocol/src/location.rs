//! Storage locations and location modes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which of the two replicas an attempt targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageLocation {
    /// The writable primary endpoint.
    Primary,
    /// The read-only secondary replica.
    Secondary,
}

impl StorageLocation {
    /// Returns the other location.
    pub fn other(self) -> Self {
        match self {
            StorageLocation::Primary => StorageLocation::Secondary,
            StorageLocation::Secondary => StorageLocation::Primary,
        }
    }

    /// Returns the lowercase name used in logs and diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            StorageLocation::Primary => "primary",
            StorageLocation::Secondary => "secondary",
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(StorageLocation::Primary),
            "secondary" => Ok(StorageLocation::Secondary),
            other => Err(format!("unknown location: {other}")),
        }
    }
}

/// Which locations a client may use, and in what order.
///
/// The mode fixes the location of the first attempt and the order in which
/// retries fall back between replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocationMode {
    /// Only ever talk to the primary.
    #[default]
    PrimaryOnly,
    /// Only ever talk to the secondary.
    SecondaryOnly,
    /// Start on the primary, fall back to the secondary.
    PrimaryThenSecondary,
    /// Start on the secondary, fall back to the primary.
    SecondaryThenPrimary,
}

impl LocationMode {
    /// Location targeted by the first attempt of a call.
    pub fn initial_location(self) -> StorageLocation {
        match self {
            LocationMode::PrimaryOnly | LocationMode::PrimaryThenSecondary => {
                StorageLocation::Primary
            }
            LocationMode::SecondaryOnly | LocationMode::SecondaryThenPrimary => {
                StorageLocation::Secondary
            }
        }
    }

    /// Returns true if attempts may target `location` under this mode.
    pub fn allows(self, location: StorageLocation) -> bool {
        match self {
            LocationMode::PrimaryOnly => location == StorageLocation::Primary,
            LocationMode::SecondaryOnly => location == StorageLocation::Secondary,
            LocationMode::PrimaryThenSecondary | LocationMode::SecondaryThenPrimary => true,
        }
    }

    /// Returns true if the mode cannot operate without a secondary endpoint.
    pub fn requires_secondary(self) -> bool {
        !matches!(self, LocationMode::PrimaryOnly)
    }

    /// Returns true if the mode alternates between replicas on failure.
    pub fn is_fallback(self) -> bool {
        matches!(
            self,
            LocationMode::PrimaryThenSecondary | LocationMode::SecondaryThenPrimary
        )
    }

    /// Location for the next attempt after a failure at `current`.
    ///
    /// Only the two fallback modes switch, and only when the failure is
    /// one that another replica might not share.
    pub fn next_location(self, current: StorageLocation, fallback_eligible: bool) -> StorageLocation {
        if self.is_fallback() && fallback_eligible {
            current.other()
        } else {
            current
        }
    }
}

impl fmt::Display for LocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LocationMode::PrimaryOnly => "primary-only",
            LocationMode::SecondaryOnly => "secondary-only",
            LocationMode::PrimaryThenSecondary => "primary-then-secondary",
            LocationMode::SecondaryThenPrimary => "secondary-then-primary",
        };
        f.write_str(name)
    }
}

impl FromStr for LocationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary-only" => Ok(LocationMode::PrimaryOnly),
            "secondary-only" => Ok(LocationMode::SecondaryOnly),
            "primary-then-secondary" => Ok(LocationMode::PrimaryThenSecondary),
            "secondary-then-primary" => Ok(LocationMode::SecondaryThenPrimary),
            other => Err(format!("unknown location mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_locations() {
        assert_eq!(
            LocationMode::PrimaryOnly.initial_location(),
            StorageLocation::Primary
        );
        assert_eq!(
            LocationMode::SecondaryThenPrimary.initial_location(),
            StorageLocation::Secondary
        );
    }

    #[test]
    fn fallback_only_when_mode_and_failure_allow() {
        let mode = LocationMode::PrimaryThenSecondary;
        assert_eq!(
            mode.next_location(StorageLocation::Primary, true),
            StorageLocation::Secondary
        );
        assert_eq!(
            mode.next_location(StorageLocation::Secondary, true),
            StorageLocation::Primary
        );
        assert_eq!(
            mode.next_location(StorageLocation::Primary, false),
            StorageLocation::Primary
        );
        assert_eq!(
            LocationMode::PrimaryOnly.next_location(StorageLocation::Primary, true),
            StorageLocation::Primary
        );
    }

    #[test]
    fn allowed_locations() {
        assert!(LocationMode::PrimaryOnly.allows(StorageLocation::Primary));
        assert!(!LocationMode::PrimaryOnly.allows(StorageLocation::Secondary));
        assert!(!LocationMode::SecondaryOnly.allows(StorageLocation::Primary));
        assert!(LocationMode::SecondaryThenPrimary.allows(StorageLocation::Primary));
        assert!(!LocationMode::PrimaryOnly.requires_secondary());
        assert!(LocationMode::SecondaryOnly.requires_secondary());
    }

    #[test]
    fn mode_parse_roundtrip() {
        for mode in [
            LocationMode::PrimaryOnly,
            LocationMode::SecondaryOnly,
            LocationMode::PrimaryThenSecondary,
            LocationMode::SecondaryThenPrimary,
        ] {
            assert_eq!(mode.to_string().parse::<LocationMode>(), Ok(mode));
        }
        assert!("sideways".parse::<LocationMode>().is_err());
        assert_eq!("secondary".parse::<StorageLocation>(), Ok(StorageLocation::Secondary));
        assert!("tertiary".parse::<StorageLocation>().is_err());
    }
}
