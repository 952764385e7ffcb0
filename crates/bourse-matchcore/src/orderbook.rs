//! The order book for a single resource.
//!
//! Bids are keyed by `Reverse(price)` and asks by `price`, so the first
//! entry of either map is the best level. An id index maps each resting
//! order to its side, price and arrival number for cancellation without a
//! scan. Arrival numbers count insertions into this book and decide which
//! side of a cross is the maker.
//!
//! The book only ever holds `Open` orders with unfilled quantity.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use bourse_types::{BourseError, Order, OrderId, OrderSide, ResourceCode, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::price_level::PriceLevel;

/// Aggregated quantity at one price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub quantity: u64,
    pub orders: usize,
}

/// Top-of-book view, best prices first on both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDepth {
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

/// The order book for one resource.
#[derive(Debug)]
pub struct OrderBook {
    pub resource: ResourceCode,
    /// Buy side: highest price first (`Reverse` key).
    pub(crate) bids: BTreeMap<Reverse<Decimal>, PriceLevel>,
    /// Sell side: lowest price first.
    pub(crate) asks: BTreeMap<Decimal, PriceLevel>,
    /// `OrderId -> (side, price, arrival)` for O(log N) cancel.
    pub(crate) index: HashMap<OrderId, (OrderSide, Decimal, u64)>,
    /// Arrival number handed to the next inserted order.
    next_arrival: u64,
    /// Sequence number of the last fill produced by this book.
    pub(crate) fill_sequence: u64,
}

impl OrderBook {
    #[must_use]
    pub fn new(resource: ResourceCode) -> Self {
        Self {
            resource,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
            next_arrival: 0,
            fill_sequence: 0,
        }
    }

    /// Rebuild a book from persisted open orders.
    ///
    /// Input order does not matter: orders arrive in time-priority order, so
    /// the same set of orders always yields the same book. Orders that are
    /// not open, or already fully filled, are skipped.
    pub fn rebuild(resource: ResourceCode, orders: impl IntoIterator<Item = Order>) -> Result<Self> {
        Self::new(resource).reconcile(orders)
    }

    /// Build a fresh book from `orders`, the ledger's current open set.
    ///
    /// Orders this book already holds keep their relative arrival order;
    /// the rest queue behind them by time priority. Fill numbering carries
    /// over.
    pub fn reconcile(&self, orders: impl IntoIterator<Item = Order>) -> Result<Self> {
        let mut orders: Vec<Order> = orders
            .into_iter()
            .filter(|o| o.is_open() && o.remaining_qty() > 0)
            .collect();
        orders.sort_by_key(|o| (self.arrival(&o.id).unwrap_or(u64::MAX), o.time_priority()));

        let mut book = Self::new(self.resource);
        book.fill_sequence = self.fill_sequence;
        for order in orders {
            book.insert_order(order)?;
        }
        Ok(book)
    }

    // =================================================================
    // Insertion
    // =================================================================

    /// Insert a single order at its price, preserving time priority.
    pub fn insert_order(&mut self, order: Order) -> Result<()> {
        if order.resource != self.resource {
            return Err(BourseError::InvalidOrder {
                reason: format!(
                    "order {} is for {}, book is {}",
                    order.id, order.resource, self.resource
                ),
            });
        }
        if !order.is_open() || order.remaining_qty() == 0 {
            return Err(BourseError::InvalidOrder {
                reason: format!("order {} has nothing left to rest", order.id),
            });
        }
        if self.index.contains_key(&order.id) {
            return Err(BourseError::DuplicateOrder(order.id));
        }

        let price = order.price;
        self.next_arrival += 1;
        self.index.insert(order.id, (order.side, price, self.next_arrival));

        match order.side {
            OrderSide::Buy => {
                self.bids
                    .entry(Reverse(price))
                    .or_insert_with(|| PriceLevel::new(price))
                    .insert(order);
            }
            OrderSide::Sell => {
                self.asks
                    .entry(price)
                    .or_insert_with(|| PriceLevel::new(price))
                    .insert(order);
            }
        }
        Ok(())
    }

    // =================================================================
    // Removal
    // =================================================================

    /// Remove an order from whichever side holds it.
    ///
    /// Returns `None` if the order is not resting here. That is not an
    /// error: the order may already have been filled or evicted.
    pub fn cancel_order(&mut self, order_id: &OrderId) -> Option<Order> {
        let (side, price, _) = self.index.remove(order_id)?;
        match side {
            OrderSide::Buy => {
                let level = self.bids.get_mut(&Reverse(price))?;
                let order = level.remove_order(order_id);
                if level.is_empty() {
                    self.bids.remove(&Reverse(price));
                }
                order
            }
            OrderSide::Sell => {
                let level = self.asks.get_mut(&price)?;
                let order = level.remove_order(order_id);
                if level.is_empty() {
                    self.asks.remove(&price);
                }
                order
            }
        }
    }

    /// Remove every order whose time-in-force has lapsed at `now`.
    pub fn remove_expired(&mut self, now: DateTime<Utc>) -> Vec<Order> {
        let expired: Vec<OrderId> = self
            .orders()
            .filter(|o| o.is_expired_at(now))
            .map(|o| o.id)
            .collect();
        expired
            .iter()
            .filter_map(|id| self.cancel_order(id))
            .collect()
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Best (highest) bid price, or `None` if no bids.
    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next().map(|r| r.0)
    }

    /// Best (lowest) ask price, or `None` if no asks.
    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Best price and the total quantity resting there on one side.
    #[must_use]
    pub fn best_level(&self, side: OrderSide) -> Option<(Decimal, u64)> {
        let level = match side {
            OrderSide::Buy => self.bids.values().next(),
            OrderSide::Sell => self.asks.values().next(),
        }?;
        Some((level.price, level.total_quantity()))
    }

    /// Spread = best_ask - best_bid. `None` if either side is empty.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// `true` if the best bid meets or exceeds the best ask.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(bid), Some(ask)) if bid >= ask)
    }

    /// Aggregated depth, at most `levels` price levels per side.
    #[must_use]
    pub fn depth(&self, levels: usize) -> BookDepth {
        let summarize = |level: &PriceLevel| DepthLevel {
            price: level.price,
            quantity: level.total_quantity(),
            orders: level.len(),
        };
        BookDepth {
            bids: self.bids.values().take(levels).map(summarize).collect(),
            asks: self.asks.values().take(levels).map(summarize).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        let (side, price, _) = self.index.get(order_id)?;
        let level = match side {
            OrderSide::Buy => self.bids.get(&Reverse(*price)),
            OrderSide::Sell => self.asks.get(price),
        }?;
        level.orders.iter().find(|o| o.id == *order_id)
    }

    /// Every resting order, bids best-first then asks best-first.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.bids
            .values()
            .chain(self.asks.values())
            .flat_map(|level| level.orders.iter())
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    #[must_use]
    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn contains_order(&self, order_id: &OrderId) -> bool {
        self.index.contains_key(order_id)
    }

    /// When the order entered this book, relative to the others. Lower
    /// arrived earlier.
    #[must_use]
    pub fn arrival(&self, order_id: &OrderId) -> Option<u64> {
        self.index.get(order_id).map(|&(_, _, arrival)| arrival)
    }

    /// Sequence number of the most recent fill.
    #[must_use]
    pub fn fill_sequence(&self) -> u64 {
        self.fill_sequence
    }

    /// Continue fill numbering from `sequence`, e.g. after a rebuild.
    pub fn resume_sequence(&mut self, sequence: u64) {
        self.fill_sequence = self.fill_sequence.max(sequence);
    }

    /// Iterate bid levels from best (highest) to worst.
    pub fn bid_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.bids.values()
    }

    /// Iterate ask levels from best (lowest) to worst.
    pub fn ask_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.values()
    }
}
