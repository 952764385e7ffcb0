//! Currency rounding.
//!
//! Currency amounts are exact decimals rounded to [`CURRENCY_DP`] places at
//! the point where they are computed. Resource quantities are `u64` and never
//! pass through here.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::constants::CURRENCY_DP;

/// Round a currency amount half-up to two decimals.
#[must_use]
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a currency amount up to two decimals. Used for escrow holds, which
/// must never fall short of the eventual charge.
#[must_use]
pub fn round_currency_up(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_DP, RoundingStrategy::ToPositiveInfinity)
}

/// `true` if the amount needs no more than two decimals.
#[must_use]
pub fn has_currency_precision(amount: Decimal) -> bool {
    amount.normalize().scale() <= CURRENCY_DP
}

/// Currency value of `quantity` units at `price`, rounded.
#[must_use]
pub fn notional(price: Decimal, quantity: u64) -> Decimal {
    round_currency(price * Decimal::from(quantity))
}
