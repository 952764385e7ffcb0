//! Risk kernel -- hard gate for request validation.
//!
//! Every placement is checked here before any ledger state is touched.
//! Malformed input never reaches the order book, which is what lets the
//! book itself be infallible.

use bourse_types::{
    BourseError, MarketConfig, OrderRequest, Result, constants, has_currency_precision,
};

/// Validates the shape of a request.
#[derive(Debug, Clone)]
pub struct RiskKernel {
    max_order_quantity: u64,
}

impl Default for RiskKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskKernel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_order_quantity: constants::DEFAULT_MAX_ORDER_QUANTITY,
        }
    }

    #[must_use]
    pub fn from_config(config: &MarketConfig) -> Self {
        Self {
            max_order_quantity: config.max_order_quantity,
        }
    }

    /// Validate a request against all boundary checks.
    ///
    /// # Errors
    /// `InvalidOrder` naming the first check that failed.
    pub fn validate(&self, request: &OrderRequest) -> Result<()> {
        // 1. Price
        if request.price <= rust_decimal::Decimal::ZERO {
            return Err(invalid(format!("price must be positive, got {}", request.price)));
        }
        if !has_currency_precision(request.price) {
            return Err(invalid(format!(
                "price {} has more than {} decimals",
                request.price,
                constants::CURRENCY_DP
            )));
        }

        // 2. Quantity
        if request.quantity == 0 {
            return Err(invalid("quantity must be positive".to_string()));
        }
        if request.quantity > self.max_order_quantity {
            return Err(invalid(format!(
                "quantity {} exceeds maximum {}",
                request.quantity, self.max_order_quantity
            )));
        }

        // 3. Time in force
        if request.time_in_force_secs == Some(0) {
            return Err(invalid("time in force must be positive".to_string()));
        }

        Ok(())
    }
}

fn invalid(reason: String) -> BourseError {
    BourseError::InvalidOrder { reason }
}

#[cfg(test)]
mod tests {
    use bourse_types::*;
    use rust_decimal::Decimal;

    use super::*;

    fn request(price: Decimal, quantity: u64) -> OrderRequest {
        OrderRequest::new(CityId(1), ResourceCode::Wood, OrderSide::Buy, price, quantity)
    }

    #[test]
    fn valid_request_passes() {
        let kernel = RiskKernel::new();
        assert!(kernel.validate(&request(Decimal::new(1001, 2), 10)).is_ok());
    }

    #[test]
    fn rejects_non_positive_price() {
        let kernel = RiskKernel::new();
        assert!(kernel.validate(&request(Decimal::ZERO, 1)).is_err());
        assert!(kernel.validate(&request(Decimal::new(-5, 0), 1)).is_err());
    }

    #[test]
    fn rejects_sub_cent_price() {
        let kernel = RiskKernel::new();
        let err = kernel.validate(&request(Decimal::new(10001, 3), 1)).unwrap_err();
        assert!(matches!(err, BourseError::InvalidOrder { .. }));
    }

    #[test]
    fn rejects_bad_quantity() {
        let config = MarketConfig {
            max_order_quantity: 50,
            ..MarketConfig::default()
        };
        let kernel = RiskKernel::from_config(&config);
        assert!(kernel.validate(&request(Decimal::ONE, 0)).is_err());
        assert!(kernel.validate(&request(Decimal::ONE, 51)).is_err());
        assert!(kernel.validate(&request(Decimal::ONE, 50)).is_ok());
    }

    #[test]
    fn rejects_zero_time_in_force() {
        let kernel = RiskKernel::new();
        let req = request(Decimal::ONE, 1).with_time_in_force(0);
        assert!(kernel.validate(&req).is_err());
        let req = request(Decimal::ONE, 1).with_time_in_force(1);
        assert!(kernel.validate(&req).is_ok());
    }
}
