//! Market engine configuration.
//!
//! Every field has a default from [`crate::constants`], so a config file only
//! needs to name what it overrides.

use std::{collections::BTreeMap, path::Path};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BourseError, ResourceCode, Result, constants};

/// Configuration shared by every resource market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Fee charged on each leg, as a fraction of gross value.
    pub fee_rate: Decimal,
    /// Half-width of the accepted price band, as a fraction of the reference.
    pub band_percent: Decimal,
    /// Rolling window for the VWAP reference, in hours.
    pub price_window_hours: u32,
    /// Ceiling on any region's tax rate.
    pub max_tax_rate: Decimal,
    /// Static fallback reference price per resource, used before a market
    /// has traded.
    pub reference_prices: BTreeMap<ResourceCode, Decimal>,
    /// Largest quantity accepted on a single order.
    pub max_order_quantity: u64,
    /// Interval between periodic expiry sweeps.
    pub expiry_sweep_secs: u64,
    /// Bounded mailbox size of each book actor.
    pub actor_mailbox_capacity: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            fee_rate: constants::DEFAULT_FEE_RATE,
            band_percent: constants::DEFAULT_BAND_PERCENT,
            price_window_hours: constants::DEFAULT_PRICE_WINDOW_HOURS,
            max_tax_rate: constants::DEFAULT_MAX_TAX_RATE,
            reference_prices: default_reference_prices(),
            max_order_quantity: constants::DEFAULT_MAX_ORDER_QUANTITY,
            expiry_sweep_secs: constants::DEFAULT_EXPIRY_SWEEP_SECS,
            actor_mailbox_capacity: constants::DEFAULT_ACTOR_MAILBOX,
        }
    }
}

fn default_reference_prices() -> BTreeMap<ResourceCode, Decimal> {
    BTreeMap::from([
        (ResourceCode::Wood, Decimal::new(10, 0)),
        (ResourceCode::Stone, Decimal::new(12, 0)),
        (ResourceCode::Clay, Decimal::new(8, 0)),
        (ResourceCode::Iron, Decimal::new(25, 0)),
        (ResourceCode::Grain, Decimal::new(5, 0)),
        (ResourceCode::Fish, Decimal::new(6, 0)),
        (ResourceCode::Tools, Decimal::new(60, 0)),
        (ResourceCode::Cloth, Decimal::new(30, 0)),
    ])
}

impl MarketConfig {
    /// Parse a JSON config and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Static fallback reference for `resource`, if configured.
    #[must_use]
    pub fn reference_price(&self, resource: ResourceCode) -> Option<Decimal> {
        self.reference_prices.get(&resource).copied()
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<()> {
        let unit = Decimal::ZERO..Decimal::ONE;
        if !unit.contains(&self.fee_rate) {
            return Err(BourseError::Configuration(format!(
                "fee_rate {} must be in [0, 1)",
                self.fee_rate
            )));
        }
        if self.band_percent <= Decimal::ZERO || self.band_percent >= Decimal::ONE {
            return Err(BourseError::Configuration(format!(
                "band_percent {} must be in (0, 1)",
                self.band_percent
            )));
        }
        if !unit.contains(&self.max_tax_rate) {
            return Err(BourseError::Configuration(format!(
                "max_tax_rate {} must be in [0, 1)",
                self.max_tax_rate
            )));
        }
        if self.price_window_hours == 0 {
            return Err(BourseError::Configuration(
                "price_window_hours must be positive".into(),
            ));
        }
        if self.max_order_quantity == 0 || self.actor_mailbox_capacity == 0 {
            return Err(BourseError::Configuration(
                "max_order_quantity and actor_mailbox_capacity must be positive".into(),
            ));
        }
        if let Some((resource, price)) = self
            .reference_prices
            .iter()
            .find(|(_, p)| **p <= Decimal::ZERO)
        {
            return Err(BourseError::Configuration(format!(
                "reference price for {resource} must be positive, got {price}"
            )));
        }
        Ok(())
    }

    /// Length of the VWAP window.
    #[must_use]
    pub fn price_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.price_window_hours))
    }
}
