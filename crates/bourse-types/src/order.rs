//! Order types for the Bourse market engine.
//!
//! An order escrows its cost at placement: buy orders reserve
//! `escrow_per_unit` currency per unfilled unit, sell orders reserve the
//! unfilled resource quantity itself.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BourseError, CityId, OrderId, ResourceCode, Result};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    /// Terminal orders never change again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// A limit order on one resource market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub city_id: CityId,
    pub resource: ResourceCode,
    pub side: OrderSide,
    pub status: OrderStatus,
    /// Limit price per unit, in currency.
    pub price: Decimal,
    pub quantity: u64,
    pub filled_qty: u64,
    /// Currency reserved per unfilled unit. Zero for sell orders.
    pub escrow_per_unit: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Time-in-force deadline, if any.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Units still waiting to be filled.
    #[must_use]
    pub fn remaining_qty(&self) -> u64 {
        self.quantity.saturating_sub(self.filled_qty)
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.filled_qty == self.quantity
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }

    /// `true` once the time-in-force deadline has passed.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    /// Currency still held in escrow for the unfilled remainder.
    #[must_use]
    pub fn escrowed_currency(&self) -> Decimal {
        self.escrow_per_unit * Decimal::from(self.remaining_qty())
    }

    /// Price-time priority key within one price level.
    #[must_use]
    pub fn time_priority(&self) -> (DateTime<Utc>, OrderId) {
        (self.created_at, self.id)
    }

    /// Record `qty` more filled units. Flips the status to `Filled` once the
    /// order is complete.
    ///
    /// # Errors
    /// `InvalidOrder` if the fill would push `filled_qty` past `quantity`.
    pub fn record_fill(&mut self, qty: u64, now: DateTime<Utc>) -> Result<()> {
        if qty > self.remaining_qty() {
            return Err(BourseError::InvalidOrder {
                reason: format!(
                    "fill of {qty} exceeds remaining {} on order {}",
                    self.remaining_qty(),
                    self.id
                ),
            });
        }
        self.filled_qty += qty;
        if self.is_filled() {
            self.status = OrderStatus::Filled;
        }
        self.updated_at = now;
        Ok(())
    }

    #[must_use]
    pub fn fill_ratio(&self) -> Decimal {
        if self.quantity == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.filled_qty) / Decimal::from(self.quantity)
        }
    }
}

/// An incoming placement, before it has been validated or escrowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub city_id: CityId,
    pub resource: ResourceCode,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: u64,
    /// Time-in-force in seconds. `None` means good-till-cancelled.
    pub time_in_force_secs: Option<u64>,
}

impl OrderRequest {
    #[must_use]
    pub fn new(
        city_id: CityId,
        resource: ResourceCode,
        side: OrderSide,
        price: Decimal,
        quantity: u64,
    ) -> Self {
        Self {
            city_id,
            resource,
            side,
            price,
            quantity,
            time_in_force_secs: None,
        }
    }

    #[must_use]
    pub fn with_time_in_force(mut self, secs: u64) -> Self {
        self.time_in_force_secs = Some(secs);
        self
    }

    /// Materialize the request as an open order created at `now`.
    #[must_use]
    pub fn into_order(self, escrow_per_unit: Decimal, now: DateTime<Utc>) -> Order {
        let expires_at = self
            .time_in_force_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| now + chrono::Duration::seconds(secs));
        Order {
            id: OrderId::new(),
            city_id: self.city_id,
            resource: self.resource,
            side: self.side,
            status: OrderStatus::Open,
            price: self.price,
            quantity: self.quantity,
            filled_qty: 0,
            escrow_per_unit,
            created_at: now,
            updated_at: now,
            expires_at,
        }
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy_limit(side: OrderSide, price: Decimal, qty: u64) -> Self {
        Self::dummy_for_city(CityId(1), side, price, qty)
    }

    pub fn dummy_for_city(city_id: CityId, side: OrderSide, price: Decimal, qty: u64) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            city_id,
            resource: ResourceCode::Wood,
            side,
            status: OrderStatus::Open,
            price,
            quantity: qty,
            filled_qty: 0,
            escrow_per_unit: Decimal::ZERO,
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }
}
