//! # bourse-ledger
//!
//! **Ledger Store**: the durable source of truth for per-city balances,
//! order rows, the append-only trade history, regional treasuries and the
//! fee pool.
//!
//! ## Consistency model
//!
//! All writes go through [`Ledger::transact`]. A [`LedgerTx`] stages rows in
//! an overlay and commits them together, bumping the `version` token of every
//! city row it touched. A failing closure leaves the ledger untouched, so a
//! settlement can never half-apply.
//!
//! The in-memory order books are a separate store. They are rebuilt from
//! [`Ledger::open_orders`] whenever the two may have diverged.

pub mod ledger;
pub mod state;
pub mod transaction;

pub use ledger::Ledger;
pub use state::{Issuance, LedgerState, Region};
pub use transaction::LedgerTx;
