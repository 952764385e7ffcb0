//! Identifiers used throughout Bourse.
//!
//! Order, fill and trade IDs use UUIDv7 so they sort by creation time.
//! Cities and regions are owned by the surrounding game and arrive as
//! plain integer keys.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A time-ordered UUIDv7 newtype with `new`, `Default` and a prefixed
/// `Display`.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

uuid_id!(
    /// Globally unique order identifier. Sorts by creation time.
    OrderId,
    ""
);

uuid_id!(
    /// Identifier of one quantity-level match produced by an order book.
    ///
    /// A fill becomes a [`crate::Trade`] only once settlement succeeds, so
    /// the two carry separate identifiers.
    FillId,
    "fill:"
);

uuid_id!(
    /// Identifier of a settled trade.
    TradeId,
    "trade:"
);

impl OrderId {
    /// Milliseconds since the Unix epoch embedded in the UUIDv7.
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        let b = self.0.as_bytes();
        u64::from_be_bytes([0, 0, b[0], b[1], b[2], b[3], b[4], b[5]])
    }
}

// ---------------------------------------------------------------------------
// CityId / RegionId
// ---------------------------------------------------------------------------

/// A city owns one ledger account and trades on every resource market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CityId(pub u64);

impl fmt::Display for CityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "city:{}", self.0)
    }
}

/// A governing region. Every city belongs to exactly one region, whose tax
/// rate applies when that city sells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RegionId(pub u32);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
