//! # bourse-ingress
//!
//! **Order ingress**: everything a placement passes through before it
//! reaches a resource's order book.
//!
//! 1. **RiskKernel**: boundary validation of the raw request
//! 2. **PriceValidator**: rejects prices outside the band around a
//!    manipulation-resistant reference price
//! 3. **EscrowManager**: reserves the order's cost (currency for bids,
//!    goods for asks) and writes the order row, in one ledger transaction
//!
//! ## Order Flow
//!
//! ```text
//! OrderRequest → RiskKernel.validate() → PriceValidator.validate()
//!     → EscrowManager.open() → OrderBook actor
//! ```
//!
//! Cancellation and expiry come back through [`EscrowManager::release_remaining`].

pub mod escrow;
pub mod price_band;
pub mod risk_kernel;

pub use escrow::EscrowManager;
pub use price_band::{PriceBand, PriceValidator};
pub use risk_kernel::RiskKernel;
