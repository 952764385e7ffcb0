//! Manipulation-resistant price validation.
//!
//! The reference price for a resource is, in order of preference:
//! 1. the volume-weighted average price of trades inside the rolling window
//! 2. the simple average of those trades' prices, if their volume is zero
//! 3. the configured static reference price
//!
//! With no reference at all the order cannot be validated and is rejected.
//! A price is accepted when it lies within `reference ± reference × band`,
//! both ends inclusive.

use bourse_types::{BourseError, MarketConfig, ResourceCode, Result, Trade, round_currency};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Accepted price range around a reference price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBand {
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub reference_price: Decimal,
}

impl PriceBand {
    #[must_use]
    pub fn contains(&self, price: Decimal) -> bool {
        price >= self.min_price && price <= self.max_price
    }
}

/// Computes reference prices and enforces the band.
#[derive(Debug, Clone)]
pub struct PriceValidator {
    band_percent: Decimal,
    window: Duration,
}

impl PriceValidator {
    #[must_use]
    pub fn new(band_percent: Decimal, window: Duration) -> Self {
        Self {
            band_percent,
            window,
        }
    }

    #[must_use]
    pub fn from_config(config: &MarketConfig) -> Self {
        Self::new(config.band_percent, config.price_window())
    }

    /// Oldest trade timestamp that still counts towards the reference.
    #[must_use]
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    /// Reference price from the in-window trades, falling back to `fallback`.
    #[must_use]
    pub fn reference_price(
        &self,
        trades: &[Trade],
        fallback: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Option<Decimal> {
        let since = self.window_start(now);
        let in_window: Vec<&Trade> = trades.iter().filter(|t| t.executed_at >= since).collect();
        if in_window.is_empty() {
            return fallback;
        }

        let volume: u64 = in_window.iter().map(|t| t.quantity).sum();
        let reference = if volume == 0 {
            let sum: Decimal = in_window.iter().map(|t| t.price).sum();
            sum / Decimal::from(in_window.len())
        } else {
            let notional: Decimal = in_window
                .iter()
                .map(|t| t.price * Decimal::from(t.quantity))
                .sum();
            notional / Decimal::from(volume)
        };
        Some(round_currency(reference))
    }

    #[must_use]
    pub fn band_around(&self, reference_price: Decimal) -> PriceBand {
        let band = round_currency(reference_price * self.band_percent);
        PriceBand {
            min_price: reference_price - band,
            max_price: reference_price + band,
            reference_price,
        }
    }

    /// Check `price` against the band for `resource`.
    ///
    /// # Errors
    /// - `NoReferencePrice` if neither trades nor a fallback exist
    /// - `PriceOutOfBand` carrying the min, max and reference prices
    pub fn validate(
        &self,
        resource: ResourceCode,
        price: Decimal,
        trades: &[Trade],
        fallback: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<PriceBand> {
        let reference = self
            .reference_price(trades, fallback, now)
            .ok_or(BourseError::NoReferencePrice(resource))?;
        let band = self.band_around(reference);
        if !band.contains(price) {
            tracing::debug!(
                %resource,
                %price,
                min_price = %band.min_price,
                max_price = %band.max_price,
                reference_price = %band.reference_price,
                "Price outside band"
            );
            return Err(BourseError::PriceOutOfBand {
                price,
                min_price: band.min_price,
                max_price: band.max_price,
                reference_price: band.reference_price,
            });
        }
        Ok(band)
    }
}

#[cfg(test)]
mod tests {
    use bourse_types::*;

    use super::*;

    fn trade(price: Decimal, quantity: u64, age: Duration) -> Trade {
        let gross = notional(price, quantity);
        Trade {
            id: TradeId::new(),
            fill_id: FillId::new(),
            resource: ResourceCode::Wood,
            buy_order_id: OrderId::new(),
            sell_order_id: OrderId::new(),
            buyer_city: CityId(2),
            seller_city: CityId(1),
            price,
            quantity,
            gross_value: gross,
            fee: Decimal::ZERO,
            tax: Decimal::ZERO,
            buyer_cost: gross,
            seller_proceeds: gross,
            executed_at: Utc::now() - age,
        }
    }

    fn validator() -> PriceValidator {
        PriceValidator::from_config(&MarketConfig::default())
    }

    #[test]
    fn vwap_band_edges() {
        let trades = vec![
            trade(Decimal::new(8, 0), 50, Duration::hours(1)),
            trade(Decimal::new(12, 0), 50, Duration::hours(2)),
        ];
        let v = validator();
        let now = Utc::now();

        let band = v
            .validate(ResourceCode::Wood, Decimal::new(14, 0), &trades, None, now)
            .unwrap();
        assert_eq!(band.reference_price, Decimal::new(10, 0));
        assert_eq!(band.min_price, Decimal::new(6, 0));
        assert_eq!(band.max_price, Decimal::new(14, 0));
        assert!(
            v.validate(ResourceCode::Wood, Decimal::new(6, 0), &trades, None, now)
                .is_ok()
        );

        let err = v
            .validate(ResourceCode::Wood, Decimal::new(1401, 2), &trades, None, now)
            .unwrap_err();
        match err {
            BourseError::PriceOutOfBand {
                min_price,
                max_price,
                reference_price,
                ..
            } => {
                assert_eq!(min_price, Decimal::new(60, 1));
                assert_eq!(max_price, Decimal::new(140, 1));
                assert_eq!(reference_price, Decimal::new(100, 1));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(
            v.validate(ResourceCode::Wood, Decimal::new(599, 2), &trades, None, now)
                .is_err()
        );
    }

    #[test]
    fn vwap_weights_by_volume() {
        let trades = vec![
            trade(Decimal::new(10, 0), 90, Duration::minutes(5)),
            trade(Decimal::new(20, 0), 10, Duration::minutes(5)),
        ];
        let reference = validator().reference_price(&trades, None, Utc::now());
        assert_eq!(reference, Some(Decimal::new(11, 0)));
    }

    #[test]
    fn zero_volume_falls_back_to_simple_average() {
        let trades = vec![
            trade(Decimal::new(10, 0), 0, Duration::minutes(5)),
            trade(Decimal::new(20, 0), 0, Duration::minutes(5)),
        ];
        let reference = validator().reference_price(&trades, None, Utc::now());
        assert_eq!(reference, Some(Decimal::new(15, 0)));
    }

    #[test]
    fn stale_trades_ignored_in_favor_of_static_reference() {
        let trades = vec![trade(Decimal::new(100, 0), 10, Duration::hours(25))];
        let reference =
            validator().reference_price(&trades, Some(Decimal::new(10, 0)), Utc::now());
        assert_eq!(reference, Some(Decimal::new(10, 0)));
    }

    #[test]
    fn no_reference_rejects() {
        let err = validator()
            .validate(ResourceCode::Tools, Decimal::ONE, &[], None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, BourseError::NoReferencePrice(ResourceCode::Tools)));
    }

    #[test]
    fn band_is_rounded_to_cents() {
        let band = validator().band_around(Decimal::new(333, 2));
        assert_eq!(band.min_price, Decimal::new(200, 2));
        assert_eq!(band.max_price, Decimal::new(466, 2));
    }
}
