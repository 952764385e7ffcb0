//! # bourse-matchcore
//!
//! **Pure order book for one resource market.**
//!
//! MatchCore owns the sorted bid/ask queues and the continuous
//! price-time-priority matching loop. It has:
//!
//! - **Zero side effects**: no ledger writes, no balance checks
//! - **Deterministic output**: the same insertions produce the same fills
//! - **Maker pricing**: every fill executes at the resting order's price
//! - **Never crossed**: after [`match_book`] returns, best bid < best ask
//!
//! Fills are quantity-level reconciliations only. Turning them into money
//! movements is the settlement crate's job.

pub mod determinism;
pub mod matcher;
pub mod orderbook;
pub mod price_level;

pub use determinism::{compute_fill_root, fill_root_hex, verify_fill_root};
pub use matcher::match_book;
pub use orderbook::{BookDepth, DepthLevel, OrderBook};
pub use price_level::PriceLevel;
