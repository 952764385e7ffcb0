//! System-wide constants for the Bourse market engine.

use rust_decimal::Decimal;

/// Decimal places kept on every currency amount.
pub const CURRENCY_DP: u32 = 2;

/// Default fee rate charged on each leg of a trade (1%).
pub const DEFAULT_FEE_RATE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Default manipulation band around the reference price (40%).
pub const DEFAULT_BAND_PERCENT: Decimal = Decimal::from_parts(40, 0, 0, false, 2);

/// Ceiling applied to any region's tax rate (25%).
pub const DEFAULT_MAX_TAX_RATE: Decimal = Decimal::from_parts(25, 0, 0, false, 2);

/// Rolling window of trades used for the reference price, in hours.
pub const DEFAULT_PRICE_WINDOW_HOURS: u32 = 24;

/// Largest quantity accepted on a single order.
pub const DEFAULT_MAX_ORDER_QUANTITY: u64 = 1_000_000;

/// Storage capacity per resource for cities without an explicit limit.
pub const DEFAULT_STORAGE_CAPACITY: u64 = 100_000;

/// Interval between periodic expiry sweeps, in seconds.
pub const DEFAULT_EXPIRY_SWEEP_SECS: u64 = 60;

/// Bounded mailbox size of each order book actor.
pub const DEFAULT_ACTOR_MAILBOX: usize = 1024;

/// Maximum number of price levels returned by a depth query.
pub const MAX_BOOK_DEPTH: usize = 100;

/// Maximum number of candles returned by a history query.
pub const MAX_CANDLES: usize = 500;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Bourse";
