//! OHLCV candles from the trade history.
//!
//! Buckets are aligned to the Unix epoch: a 1h candle always starts on the
//! hour, a 24h candle at midnight UTC.

use std::collections::BTreeMap;
use std::str::FromStr;

use bourse_types::{BourseError, Trade, constants};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleBucket {
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    OneDay,
}

impl CandleBucket {
    #[must_use]
    pub fn seconds(self) -> i64 {
        match self {
            Self::FifteenMinutes => 15 * 60,
            Self::OneHour => 60 * 60,
            Self::OneDay => 24 * 60 * 60,
        }
    }

    #[must_use]
    pub fn duration(self) -> Duration {
        Duration::seconds(self.seconds())
    }

    /// Start of the bucket containing `at`.
    #[must_use]
    pub fn floor(self, at: DateTime<Utc>) -> DateTime<Utc> {
        let secs = at.timestamp().div_euclid(self.seconds()) * self.seconds();
        DateTime::from_timestamp(secs, 0).unwrap_or(at)
    }
}

impl std::fmt::Display for CandleBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FifteenMinutes => write!(f, "15m"),
            Self::OneHour => write!(f, "1h"),
            Self::OneDay => write!(f, "24h"),
        }
    }
}

impl FromStr for CandleBucket {
    type Err = BourseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "15m" => Ok(Self::FifteenMinutes),
            "1h" => Ok(Self::OneHour),
            "24h" | "1d" => Ok(Self::OneDay),
            other => Err(BourseError::InvalidOrder {
                reason: format!("unknown candle bucket {other:?}, expected 15m, 1h or 24h"),
            }),
        }
    }
}

/// One OHLCV bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub bucket_start: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Units traded.
    pub volume: u64,
    /// Currency traded (sum of gross values).
    pub turnover: Decimal,
    pub trades: usize,
}

impl Candle {
    fn open_with(bucket_start: DateTime<Utc>, trade: &Trade) -> Self {
        Self {
            bucket_start,
            open: trade.price,
            high: trade.price,
            low: trade.price,
            close: trade.price,
            volume: trade.quantity,
            turnover: trade.gross_value,
            trades: 1,
        }
    }

    fn absorb(&mut self, trade: &Trade) {
        self.high = self.high.max(trade.price);
        self.low = self.low.min(trade.price);
        self.close = trade.price;
        self.volume += trade.quantity;
        self.turnover += trade.gross_value;
        self.trades += 1;
    }
}

/// Aggregate `trades` (oldest first) into the newest `limit` candles,
/// returned oldest first. Buckets without trades are omitted.
#[must_use]
pub fn build_candles(trades: &[Trade], bucket: CandleBucket, limit: usize) -> Vec<Candle> {
    let limit = limit.min(constants::MAX_CANDLES);
    let mut candles: BTreeMap<DateTime<Utc>, Candle> = BTreeMap::new();
    for trade in trades {
        let start = bucket.floor(trade.executed_at);
        candles
            .entry(start)
            .and_modify(|c| c.absorb(trade))
            .or_insert_with(|| Candle::open_with(start, trade));
    }
    let skip = candles.len().saturating_sub(limit);
    candles.into_values().skip(skip).collect()
}
