//! Escrow manager -- reserves an order's cost at placement and returns the
//! unfilled remainder on cancellation or expiry.
//!
//! - **Buy** orders reserve `escrow_per_unit` currency for every unit: the
//!   price, plus the fee and the highest possible tax each rounded up to the
//!   cent. Settlement rounds fee and tax separately, so each gets its own
//!   upper bound.
//! - **Sell** orders reserve the resource units themselves.
//!
//! Both directions run inside a caller-supplied [`LedgerTx`], so the
//! reservation and the order row commit together or not at all.

use bourse_ledger::LedgerTx;
use bourse_types::{
    MarketConfig, Order, OrderId, OrderRequest, OrderSide, OrderStatus, Result, round_currency_up,
};
use rust_decimal::Decimal;

/// Reserves and releases order escrow.
#[derive(Debug, Clone)]
pub struct EscrowManager {
    fee_rate: Decimal,
    max_tax_rate: Decimal,
}

impl EscrowManager {
    #[must_use]
    pub fn new(fee_rate: Decimal, max_tax_rate: Decimal) -> Self {
        Self {
            fee_rate,
            max_tax_rate,
        }
    }

    #[must_use]
    pub fn from_config(config: &MarketConfig) -> Self {
        Self::new(config.fee_rate, config.max_tax_rate)
    }

    /// Currency held per unit of a buy order at `price`. Zero for sells.
    #[must_use]
    pub fn escrow_per_unit(&self, side: OrderSide, price: Decimal) -> Decimal {
        match side {
            OrderSide::Buy => {
                price
                    + round_currency_up(price * self.fee_rate)
                    + round_currency_up(price * self.max_tax_rate)
            }
            OrderSide::Sell => Decimal::ZERO,
        }
    }

    /// Reserve the request's cost and insert it as an open order.
    ///
    /// # Errors
    /// - `CityNotFound` if the city has no account
    /// - `InsufficientFunds` / `InsufficientResource` if the hold cannot be made
    pub fn open(&self, tx: &mut LedgerTx<'_>, request: OrderRequest) -> Result<Order> {
        let per_unit = self.escrow_per_unit(request.side, request.price);
        let order = request.into_order(per_unit, tx.now());

        let account = tx.city_mut(order.city_id)?;
        match order.side {
            OrderSide::Buy => account.reserve_currency(order.escrowed_currency())?,
            OrderSide::Sell => account.reserve_resource(order.resource, order.quantity)?,
        }
        tx.insert_order(order.clone())?;

        tracing::info!(
            order_id = %order.id,
            city = %order.city_id,
            resource = %order.resource,
            side = %order.side,
            price = %order.price,
            quantity = order.quantity,
            escrow_per_unit = %order.escrow_per_unit,
            "Order escrowed"
        );
        Ok(order)
    }

    /// Return the unfilled remainder's escrow and close the order with
    /// `status`.
    ///
    /// Returns `None` when the order is unknown or no longer open, so
    /// cancelling twice is harmless.
    pub fn release_remaining(
        &self,
        tx: &mut LedgerTx<'_>,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<Order>> {
        let Some(order) = tx.order(order_id).filter(|o| o.is_open()).cloned() else {
            return Ok(None);
        };

        // Release what is actually held. A shortfall only happens after the
        // ledger and the book have diverged, and must not block the refund.
        let account = tx.city_mut(order.city_id)?;
        match order.side {
            OrderSide::Buy => {
                let owed = order.escrowed_currency();
                let held = owed.min(account.currency.reserved);
                if held < owed {
                    tracing::warn!(order_id = %order_id, %owed, %held, "Currency escrow short");
                }
                account.release_currency(held)?;
            }
            OrderSide::Sell => {
                let owed = order.remaining_qty();
                let held = owed.min(account.resource(order.resource).reserved);
                if held < owed {
                    tracing::warn!(order_id = %order_id, owed, held, "Resource escrow short");
                }
                account.release_resource(order.resource, held)?;
            }
        }

        let now = tx.now();
        let row = tx.order_mut(order_id)?;
        row.status = status;
        row.updated_at = now;
        let closed = row.clone();

        tracing::info!(
            order_id = %order_id,
            city = %closed.city_id,
            resource = %closed.resource,
            %status,
            refunded_qty = closed.remaining_qty(),
            "Order escrow released"
        );
        Ok(Some(closed))
    }
}
