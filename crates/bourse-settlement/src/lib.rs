//! # bourse-settlement
//!
//! **Settlement Engine**: turns quantity-level fills into money and goods
//! movements between two city accounts.
//!
//! For every fill, inside one ledger transaction:
//! 1. Re-check both orders and both accounts against current ledger state
//! 2. Compute gross value, fee and the seller-region tax
//! 3. Debit the buyer, credit the seller, move the goods
//! 4. Increment both orders' filled counts
//! 5. Credit the region treasury and the fee pool, append the [`Trade`]
//!
//! A failed precondition rolls the transaction back and compensates only the
//! order at fault: its remaining escrow is refunded and it is cancelled.
//! Nothing is retried.
//!
//! [`Trade`]: bourse_types::Trade

pub mod fees;
pub mod settler;
pub mod supply_conservation;

pub use fees::{FeeSchedule, SettlementBreakdown};
pub use settler::{SettlementEngine, SettlementOutcome};
pub use supply_conservation::{SupplyReport, verify_supply};
