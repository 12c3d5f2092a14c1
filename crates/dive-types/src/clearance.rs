//! The canonical five-level classification hierarchy.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical clearance / classification level.
///
/// Ordering follows sensitivity: `Unclassified < Restricted < Confidential
/// < Secret < TopSecret`. The derived `Ord` is the hierarchy; [`Clearance::rank`]
/// exposes the same ordering as an integer for wire formats and logs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Clearance {
    #[default]
    Unclassified,
    Restricted,
    Confidential,
    Secret,
    TopSecret,
}

/// Error returned when a string is not one of the five canonical levels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown clearance level: {0}")]
pub struct ParseClearanceError(pub String);

impl Clearance {
    /// All levels, lowest first.
    pub const ALL: [Clearance; 5] = [
        Clearance::Unclassified,
        Clearance::Restricted,
        Clearance::Confidential,
        Clearance::Secret,
        Clearance::TopSecret,
    ];

    /// Ordinal rank: UNCLASSIFIED=0 .. TOP_SECRET=4.
    pub fn rank(self) -> u8 {
        match self {
            Clearance::Unclassified => 0,
            Clearance::Restricted => 1,
            Clearance::Confidential => 2,
            Clearance::Secret => 3,
            Clearance::TopSecret => 4,
        }
    }

    /// The canonical wire name (e.g. `TOP_SECRET`).
    pub fn as_str(self) -> &'static str {
        match self {
            Clearance::Unclassified => "UNCLASSIFIED",
            Clearance::Restricted => "RESTRICTED",
            Clearance::Confidential => "CONFIDENTIAL",
            Clearance::Secret => "SECRET",
            Clearance::TopSecret => "TOP_SECRET",
        }
    }

    /// Parses a canonical level name, ignoring case and surrounding whitespace.
    ///
    /// National vocabularies are not accepted here; see the clearance
    /// translation table in `dive-abac`.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
    }

    /// Returns true if a holder of `self` may see data classified `classification`.
    pub fn dominates(self, classification: Clearance) -> bool {
        self >= classification
    }
}

impl Display for Clearance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Clearance {
    type Err = ParseClearanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ParseClearanceError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case("UNCLASSIFIED", Clearance::Unclassified)]
    #[test_case("restricted", Clearance::Restricted)]
    #[test_case(" Confidential ", Clearance::Confidential)]
    #[test_case("SECRET", Clearance::Secret)]
    #[test_case("TOP_SECRET", Clearance::TopSecret)]
    fn parses_canonical_names(input: &str, expected: Clearance) {
        assert_eq!(Clearance::parse(input), Some(expected));
    }

    #[test]
    fn rejects_unknown_names() {
        assert_eq!(Clearance::parse("UNKNOWN"), None);
        assert_eq!(Clearance::parse("GEHEIM"), None);
        assert!("TOP SECRET".parse::<Clearance>().is_err());
    }

    #[test]
    fn serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&Clearance::TopSecret).unwrap();
        assert_eq!(json, "\"TOP_SECRET\"");
        let back: Clearance = serde_json::from_str("\"CONFIDENTIAL\"").unwrap();
        assert_eq!(back, Clearance::Confidential);
    }

    proptest! {
        #[test]
        fn rank_agrees_with_ordering(a in 0usize..5, b in 0usize..5) {
            let (x, y) = (Clearance::ALL[a], Clearance::ALL[b]);
            prop_assert_eq!(x.cmp(&y), x.rank().cmp(&y.rank()));
            prop_assert_eq!(x.dominates(y), x.rank() >= y.rank());
        }

        #[test]
        fn display_roundtrips(idx in 0usize..5) {
            let level = Clearance::ALL[idx];
            prop_assert_eq!(level.to_string().parse::<Clearance>().unwrap(), level);
        }
    }
}
