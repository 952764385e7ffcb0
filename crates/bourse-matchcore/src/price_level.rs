//! A single price level in the order book.
//!
//! Orders at the same price are kept in time-priority order
//! (`created_at`, then id) using a [`VecDeque`].

use std::collections::VecDeque;

use bourse_types::{Order, OrderId};
use rust_decimal::Decimal;

/// All resting orders at one price.
///
/// The front of the deque has the highest time priority and is filled first.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: Decimal,
    pub orders: VecDeque<Order>,
}

impl PriceLevel {
    #[must_use]
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
        }
    }

    /// Insert an order behind every order with earlier time priority.
    ///
    /// New arrivals almost always go to the back; the scan only matters when
    /// the book is rebuilt from the ledger in arbitrary order.
    pub fn insert(&mut self, order: Order) {
        let key = order.time_priority();
        let pos = self
            .orders
            .iter()
            .rposition(|o| o.time_priority() <= key)
            .map_or(0, |i| i + 1);
        self.orders.insert(pos, order);
    }

    pub fn pop_front(&mut self) -> Option<Order> {
        self.orders.pop_front()
    }

    #[must_use]
    pub fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut Order> {
        self.orders.front_mut()
    }

    /// Total unfilled units across the level.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.orders.iter().map(Order::remaining_qty).sum()
    }

    pub fn remove_order(&mut self, order_id: &OrderId) -> Option<Order> {
        let pos = self.orders.iter().position(|o| o.id == *order_id)?;
        self.orders.remove(pos)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }
}
