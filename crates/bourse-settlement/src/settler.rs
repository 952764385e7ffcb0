//! Atomic settlement of one fill against the ledger.
//!
//! Settlement re-reads both orders and both accounts inside a ledger
//! transaction, so it always acts on current state rather than on what the
//! order book believed when it matched. Any failed precondition rolls the
//! transaction back and becomes a [`BourseError::SettlementConsistency`]
//! naming the order at fault; that order alone is then compensated.
//!
//! Each resource's fills carry a strictly increasing sequence. The ledger
//! keeps the highest sequence settled per resource, and every settlement,
//! skip or compensation advances it in the same transaction that moves the
//! money, so a replayed fill is refused even across restarts.

use std::fmt::Display;

use bourse_ingress::EscrowManager;
use bourse_ledger::{Ledger, LedgerTx};
use bourse_types::{
    BourseError, Fill, FillId, MarketConfig, Order, OrderId, OrderStatus, Result, Trade, TradeId,
};
use rust_decimal::Decimal;

use crate::FeeSchedule;

/// What happened to one fill.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// Money and goods moved; the trade was recorded.
    Settled(Trade),
    /// A precondition failed. The order at fault was cancelled and its
    /// remaining escrow refunded (`None` if it was already closed).
    Compensated {
        order_id: OrderId,
        reason: String,
        cancelled: Option<Order>,
    },
    /// One side was no longer open in the ledger; nothing was written.
    Skipped { fill_id: FillId, reason: String },
}

impl SettlementOutcome {
    #[must_use]
    pub fn trade(&self) -> Option<&Trade> {
        match self {
            Self::Settled(trade) => Some(trade),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled(_))
    }
}

enum Applied {
    Trade(Trade),
    Skipped(String),
}

/// Settles fills produced by the order books.
///
/// Shared by every resource worker. Per-resource ordering is the worker's
/// job; the ledger lock makes each individual settlement atomic.
#[derive(Debug)]
pub struct SettlementEngine {
    fees: FeeSchedule,
    escrow: EscrowManager,
}

impl SettlementEngine {
    #[must_use]
    pub fn new(fees: FeeSchedule, escrow: EscrowManager) -> Self {
        Self { fees, escrow }
    }

    #[must_use]
    pub fn from_config(config: &MarketConfig) -> Self {
        Self::new(
            FeeSchedule::from_config(config),
            EscrowManager::from_config(config),
        )
    }

    #[must_use]
    pub fn fee_schedule(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Settle one fill, compensating the faulty order on failure.
    ///
    /// # Errors
    /// - `FillAlreadySettled` if the resource has already settled a fill
    ///   with this sequence or a later one
    /// - ledger errors from the compensation transaction itself
    pub fn settle(&self, ledger: &Ledger, fill: &Fill) -> Result<SettlementOutcome> {
        match ledger.transact(|tx| self.apply(tx, fill)) {
            Ok(Applied::Trade(trade)) => {
                tracing::info!(
                    trade_id = %trade.id,
                    resource = %trade.resource,
                    buyer = %trade.buyer_city,
                    seller = %trade.seller_city,
                    price = %trade.price,
                    quantity = trade.quantity,
                    buyer_cost = %trade.buyer_cost,
                    seller_proceeds = %trade.seller_proceeds,
                    fee = %trade.fee,
                    tax = %trade.tax,
                    "Fill settled"
                );
                Ok(SettlementOutcome::Settled(trade))
            }
            Ok(Applied::Skipped(reason)) => {
                tracing::debug!(fill_id = %fill.id, %reason, "Fill skipped");
                Ok(SettlementOutcome::Skipped {
                    fill_id: fill.id,
                    reason,
                })
            }
            Err(BourseError::SettlementConsistency { order_id, reason }) => {
                tracing::warn!(
                    fill_id = %fill.id,
                    order_id = %order_id,
                    %reason,
                    "Settlement precondition failed, compensating order"
                );
                let cancelled = ledger.transact(|tx| {
                    tx.claim_sequence(fill.resource, fill.sequence)?;
                    self.escrow
                        .release_remaining(tx, order_id, OrderStatus::Cancelled)
                })?;
                Ok(SettlementOutcome::Compensated {
                    order_id,
                    reason,
                    cancelled,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn apply(&self, tx: &mut LedgerTx<'_>, fill: &Fill) -> Result<Applied> {
        tx.claim_sequence(fill.resource, fill.sequence)?;

        let (Some(buy), Some(sell)) = (
            tx.order(fill.buy_order_id).cloned(),
            tx.order(fill.sell_order_id).cloned(),
        ) else {
            return Ok(Applied::Skipped("order missing from ledger".into()));
        };
        if !buy.is_open() || !sell.is_open() {
            return Ok(Applied::Skipped(format!(
                "orders no longer open (buy {}, sell {})",
                buy.status, sell.status
            )));
        }

        let qty = fill.quantity;
        for order in [&buy, &sell] {
            if order.remaining_qty() < qty {
                return Err(inconsistent(
                    order.id,
                    format!("fill of {qty} exceeds remaining {}", order.remaining_qty()),
                ));
            }
        }

        let seller_region = tx
            .city(sell.city_id)
            .map_err(|e| inconsistent(sell.id, e))?
            .region_id;
        let region_rate = tx.region(seller_region).map_err(|e| inconsistent(sell.id, e))?.tax_rate;
        let breakdown = self.fees.breakdown(fill.price, qty, region_rate);

        // 1. Buyer pays: release this fill's share of escrow, then debit cost
        let held = buy.escrow_per_unit * Decimal::from(qty);
        {
            let buyer = tx.city_mut(buy.city_id).map_err(|e| inconsistent(buy.id, e))?;
            buyer
                .release_currency(held)
                .map_err(|e| inconsistent(buy.id, e))?;
            buyer
                .debit_currency(breakdown.buyer_cost)
                .map_err(|e| inconsistent(buy.id, e))?;
        }

        // 2. Seller delivers escrowed goods
        tx.city_mut(sell.city_id)
            .and_then(|seller| seller.consume_reserved_resource(fill.resource, qty))
            .map_err(|e| inconsistent(sell.id, e))?;

        // 3. Buyer receives goods, within storage capacity
        tx.city_mut(buy.city_id)
            .and_then(|buyer| buyer.credit_resource(fill.resource, qty))
            .map_err(|e| inconsistent(buy.id, e))?;

        // 4. Seller is paid
        tx.city_mut(sell.city_id)
            .and_then(|seller| seller.credit_currency(breakdown.seller_proceeds))
            .map_err(|e| inconsistent(sell.id, e))?;

        // 5. Orders advance
        let now = tx.now();
        tx.order_mut(buy.id)
            .and_then(|o| o.record_fill(qty, now))
            .map_err(|e| inconsistent(buy.id, e))?;
        tx.order_mut(sell.id)
            .and_then(|o| o.record_fill(qty, now))
            .map_err(|e| inconsistent(sell.id, e))?;

        // 6. Skim
        if breakdown.total_tax() > Decimal::ZERO {
            tx.credit_treasury(seller_region, breakdown.total_tax())?;
        }
        tx.collect_fee(breakdown.total_fee())?;

        let trade = Trade {
            id: TradeId::new(),
            fill_id: fill.id,
            resource: fill.resource,
            buy_order_id: buy.id,
            sell_order_id: sell.id,
            buyer_city: buy.city_id,
            seller_city: sell.city_id,
            price: fill.price,
            quantity: qty,
            gross_value: breakdown.gross_value,
            fee: breakdown.total_fee(),
            tax: breakdown.total_tax(),
            buyer_cost: breakdown.buyer_cost,
            seller_proceeds: breakdown.seller_proceeds,
            executed_at: now,
        };
        tx.append_trade(trade.clone());
        Ok(Applied::Trade(trade))
    }
}

fn inconsistent(order_id: OrderId, reason: impl Display) -> BourseError {
    BourseError::SettlementConsistency {
        order_id,
        reason: reason.to_string(),
    }
}
