//! Tradable resource codes.
//!
//! Every market is keyed by a [`ResourceCode`]. Currency is a reserved code:
//! it is held in every city ledger but is never a market of its own.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::BourseError;

/// Wire name of the reserved currency resource.
pub const CURRENCY_CODE: &str = "CURRENCY";

/// A tradable commodity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceCode {
    Wood,
    Stone,
    Clay,
    Iron,
    Grain,
    Fish,
    Tools,
    Cloth,
}

impl ResourceCode {
    /// Every tradable resource, in declaration order.
    pub const ALL: [ResourceCode; 8] = [
        Self::Wood,
        Self::Stone,
        Self::Clay,
        Self::Iron,
        Self::Grain,
        Self::Fish,
        Self::Tools,
        Self::Cloth,
    ];

    /// The wire code (e.g. `"WOOD"`).
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Wood => "WOOD",
            Self::Stone => "STONE",
            Self::Clay => "CLAY",
            Self::Iron => "IRON",
            Self::Grain => "GRAIN",
            Self::Fish => "FISH",
            Self::Tools => "TOOLS",
            Self::Cloth => "CLOTH",
        }
    }
}

impl fmt::Display for ResourceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ResourceCode {
    type Err = BourseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        if upper == CURRENCY_CODE {
            return Err(BourseError::InvalidOrder {
                reason: "currency is not a tradable resource".to_string(),
            });
        }
        Self::ALL
            .into_iter()
            .find(|r| r.code() == upper)
            .ok_or(BourseError::UnknownResource(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("wood".parse::<ResourceCode>().unwrap(), ResourceCode::Wood);
        assert_eq!(" IRON ".parse::<ResourceCode>().unwrap(), ResourceCode::Iron);
    }

    #[test]
    fn currency_is_not_tradable() {
        let err = "currency".parse::<ResourceCode>().unwrap_err();
        assert!(matches!(err, BourseError::InvalidOrder { .. }));
    }

    #[test]
    fn unknown_code_is_not_found() {
        let err = "UNOBTAINIUM".parse::<ResourceCode>().unwrap_err();
        assert!(matches!(err, BourseError::UnknownResource(_)));
    }

    #[test]
    fn display_matches_serde() {
        for r in ResourceCode::ALL {
            let json = serde_json::to_string(&r).unwrap();
            assert_eq!(json, format!("\"{r}\""));
        }
    }
}
