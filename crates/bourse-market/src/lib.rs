//! # bourse-market
//!
//! **Gateway**: the request/response surface the rest of the game calls.
//!
//! ## Architecture
//!
//! ```text
//! place_order ─► RiskKernel ─► PriceValidator ─► EscrowManager (ledger tx)
//!                                                     │
//!                                                     ▼
//!                          BookHandle ──mpsc──► book worker (one per resource)
//!                                                     │ match_book
//!                                                     ▼
//!                                           SettlementEngine (ledger tx per fill)
//! ```
//!
//! Every resource has exactly one worker task owning its [`OrderBook`].
//! All mutations of one resource's book are totally ordered through that
//! task's mailbox; different resources proceed independently.
//!
//! The worker expires orders lazily before each command, and an optional
//! [`spawn_expiry_sweeper`] task sweeps periodically. When settlement
//! compensates an order, the worker rebuilds its book from the ledger's
//! open orders.
//!
//! [`OrderBook`]: bourse_matchcore::OrderBook

pub mod actor;
pub mod history;
pub mod service;
pub mod sweeper;

pub use actor::{BookHandle, PlacementReport};
pub use history::{Candle, CandleBucket, build_candles};
pub use service::{MarketService, PlacementResult};
pub use sweeper::spawn_expiry_sweeper;
