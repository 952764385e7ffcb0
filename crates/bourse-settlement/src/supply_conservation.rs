//! Supply conservation invariant checker.
//!
//! ```text
//! currency:   Σ city(available + reserved) + Σ treasuries + fee_pool == issued
//! ∀ resource: Σ city(available + reserved)                            == issued
//! ```
//!
//! where `issued` is deposits minus withdrawals since genesis. Trading only
//! moves value between these buckets, so a mismatch means a settlement
//! created or destroyed value.

use std::collections::BTreeMap;

use bourse_ledger::LedgerState;
use bourse_types::{BourseError, ResourceCode, Result};
use rust_decimal::Decimal;

/// Actual holdings, summed over the whole ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplyReport {
    pub city_currency: Decimal,
    pub treasuries: Decimal,
    pub fee_pool: Decimal,
    pub resources: BTreeMap<ResourceCode, i128>,
}

impl SupplyReport {
    #[must_use]
    pub fn from_state(state: &LedgerState) -> Self {
        let mut resources: BTreeMap<ResourceCode, i128> = BTreeMap::new();
        for account in state.cities.values() {
            for (resource, balance) in &account.resources {
                *resources.entry(*resource).or_insert(0) += i128::from(balance.total());
            }
        }
        Self {
            city_currency: state.cities.values().map(|c| c.currency.total()).sum(),
            treasuries: state.regions.values().map(|r| r.treasury).sum(),
            fee_pool: state.fee_pool,
            resources,
        }
    }

    /// All currency held anywhere in the ledger.
    #[must_use]
    pub fn currency_total(&self) -> Decimal {
        self.city_currency + self.treasuries + self.fee_pool
    }
}

/// Verify that the ledger holds exactly what was issued into it.
///
/// # Errors
/// [`BourseError::SupplyInvariantViolation`] naming the first mismatch.
pub fn verify_supply(state: &LedgerState) -> Result<SupplyReport> {
    let report = SupplyReport::from_state(state);

    let issued = state.issuance.currency;
    if report.currency_total() != issued {
        return Err(BourseError::SupplyInvariantViolation {
            reason: format!(
                "currency: actual {} != issued {issued} \
                 (cities={}, treasuries={}, fee_pool={})",
                report.currency_total(),
                report.city_currency,
                report.treasuries,
                report.fee_pool,
            ),
        });
    }

    for resource in ResourceCode::ALL {
        let actual = report.resources.get(&resource).copied().unwrap_or(0);
        let expected = state.issuance.resources.get(&resource).copied().unwrap_or(0);
        if actual != expected {
            return Err(BourseError::SupplyInvariantViolation {
                reason: format!("{resource}: actual supply {actual} != issued {expected}"),
            });
        }
    }

    Ok(report)
}
