//! Fills and trades.
//!
//! A [`Fill`] is what the order book produces: a pure reconciliation of
//! quantities between a bid and an ask. A [`Trade`] is the immutable audit
//! record written once the fill has been settled against the ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CityId, FillId, OrderId, OrderSide, ResourceCode, TradeId};

/// A quantity-level match between one bid and one ask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub id: FillId,
    pub resource: ResourceCode,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer_city: CityId,
    pub seller_city: CityId,
    /// Execution price: the resting (maker) order's price.
    pub price: Decimal,
    pub quantity: u64,
    /// Side of the resting order whose price was used.
    pub maker_side: OrderSide,
    /// Monotonic per-book sequence number.
    pub sequence: u64,
}

impl Fill {
    /// The order on the given side of this fill.
    #[must_use]
    pub fn order_on(&self, side: OrderSide) -> OrderId {
        match side {
            OrderSide::Buy => self.buy_order_id,
            OrderSide::Sell => self.sell_order_id,
        }
    }
}

impl std::fmt::Display for Fill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Fill[{}] {} {} @ {} (maker {})",
            self.sequence, self.resource, self.quantity, self.price, self.maker_side,
        )
    }
}

/// The settled record of one fill. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    /// The fill this trade settles.
    pub fill_id: FillId,
    pub resource: ResourceCode,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer_city: CityId,
    pub seller_city: CityId,
    pub price: Decimal,
    pub quantity: u64,
    /// `price × quantity`, rounded.
    pub gross_value: Decimal,
    /// Fees collected from both legs.
    pub fee: Decimal,
    /// Tax collected from both legs and credited to the seller's region.
    pub tax: Decimal,
    /// Currency debited from the buyer.
    pub buyer_cost: Decimal,
    /// Currency credited to the seller.
    pub seller_proceeds: Decimal,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    /// Everything the system skimmed off this trade.
    #[must_use]
    pub fn total_skim(&self) -> Decimal {
        self.fee + self.tax
    }
}

impl std::fmt::Display for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trade[{}] {} {} @ {} = {}",
            self.id, self.resource, self.quantity, self.price, self.gross_value,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_trade() -> Trade {
        Trade {
            id: TradeId::new(),
            fill_id: FillId::new(),
            resource: ResourceCode::Wood,
            buy_order_id: OrderId::new(),
            sell_order_id: OrderId::new(),
            buyer_city: CityId(2),
            seller_city: CityId(1),
            price: Decimal::new(5, 0),
            quantity: 100,
            gross_value: Decimal::new(500, 0),
            fee: Decimal::new(10, 0),
            tax: Decimal::new(50, 0),
            buyer_cost: Decimal::new(530, 0),
            seller_proceeds: Decimal::new(470, 0),
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn trade_skim_balances_legs() {
        let t = make_trade();
        assert_eq!(t.buyer_cost, t.seller_proceeds + t.total_skim());
    }

    #[test]
    fn trade_display() {
        let s = format!("{}", make_trade());
        assert!(s.contains("WOOD"));
        assert!(s.contains("500"));
    }

    #[test]
    fn fill_order_on_side() {
        let fill = Fill {
            id: FillId::new(),
            resource: ResourceCode::Stone,
            buy_order_id: OrderId::from_bytes([1; 16]),
            sell_order_id: OrderId::from_bytes([2; 16]),
            buyer_city: CityId(1),
            seller_city: CityId(2),
            price: Decimal::ONE,
            quantity: 3,
            maker_side: OrderSide::Sell,
            sequence: 0,
        };
        assert_eq!(fill.order_on(OrderSide::Buy), OrderId::from_bytes([1; 16]));
        assert_eq!(fill.order_on(OrderSide::Sell), OrderId::from_bytes([2; 16]));
    }

    #[test]
    fn trade_serde_roundtrip() {
        let trade = make_trade();
        let json = serde_json::to_string(&trade).unwrap();
        let back: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(trade, back);
    }
}
