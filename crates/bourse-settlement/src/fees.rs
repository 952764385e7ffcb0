//! Fee and tax computation.
//!
//! ```text
//! gross  = price × qty
//! fee    = gross × fee_rate
//! tax    = min(gross, gross × clamp(region_rate, 0, max_tax_rate))
//! buyer  = gross + fee + tax
//! seller = max(0, gross − fee − tax)
//! ```
//!
//! Every amount is rounded half-up to the cent where it is computed. Both
//! legs are charged, so the system keeps `2 × fee` and `2 × tax` in total,
//! except that the seller leg can never take more than `gross`. That keeps
//! `buyer_cost == seller_proceeds + total_fee + total_tax` exact.

use bourse_types::{MarketConfig, round_currency};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rates applied to every trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub fee_rate: Decimal,
    pub max_tax_rate: Decimal,
}

/// The money side of one trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementBreakdown {
    pub gross_value: Decimal,
    /// Tax rate actually applied after clamping.
    pub tax_rate: Decimal,
    pub buyer_fee: Decimal,
    pub buyer_tax: Decimal,
    pub seller_fee: Decimal,
    pub seller_tax: Decimal,
    pub buyer_cost: Decimal,
    pub seller_proceeds: Decimal,
}

impl SettlementBreakdown {
    /// Fees from both legs.
    #[must_use]
    pub fn total_fee(&self) -> Decimal {
        self.buyer_fee + self.seller_fee
    }

    /// Tax from both legs.
    #[must_use]
    pub fn total_tax(&self) -> Decimal {
        self.buyer_tax + self.seller_tax
    }
}

impl FeeSchedule {
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

    /// Clamp a governance-set rate into `[0, max_tax_rate]`.
    #[must_use]
    pub fn effective_tax_rate(&self, region_rate: Decimal) -> Decimal {
        region_rate.clamp(Decimal::ZERO, self.max_tax_rate)
    }

    #[must_use]
    pub fn breakdown(&self, price: Decimal, quantity: u64, region_rate: Decimal) -> SettlementBreakdown {
        let gross_value = round_currency(price * Decimal::from(quantity));
        let tax_rate = self.effective_tax_rate(region_rate);

        let fee = round_currency(gross_value * self.fee_rate);
        let tax = round_currency(gross_value.min(gross_value * tax_rate));

        let seller_fee = fee.min(gross_value);
        let seller_tax = tax.min(gross_value - seller_fee);

        SettlementBreakdown {
            gross_value,
            tax_rate,
            buyer_fee: fee,
            buyer_tax: tax,
            seller_fee,
            seller_tax,
            buyer_cost: gross_value + fee + tax,
            seller_proceeds: gross_value - seller_fee - seller_tax,
        }
    }
}
