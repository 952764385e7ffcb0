//! # bourse-types
//!
//! Shared types, errors, and configuration for the **Bourse** market engine.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`OrderId`], [`FillId`], [`TradeId`], [`CityId`], [`RegionId`]
//! - **Resources**: [`ResourceCode`]
//! - **Order model**: [`Order`], [`OrderRequest`], [`OrderSide`], [`OrderStatus`]
//! - **Match model**: [`Fill`], [`Trade`]
//! - **Balance model**: [`CityAccount`], [`CurrencyBalance`], [`ResourceBalance`]
//! - **Configuration**: [`MarketConfig`]
//! - **Errors**: [`BourseError`] with `BRS_ERR_` prefix codes, [`ErrorKind`]
//! - **Money**: half-up currency rounding
//! - **Constants**: system-wide limits and defaults

pub mod balance;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod money;
pub mod order;
pub mod resource;
pub mod trade;

// Re-export all primary types at crate root for ergonomic imports:
//   use bourse_types::{Order, OrderSide, Trade, CityAccount, ...};

pub use balance::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use money::*;
pub use order::*;
pub use resource::*;
pub use trade::*;

// Constants are accessed via `bourse_types::constants::FOO`
// (not re-exported to avoid name collisions).
