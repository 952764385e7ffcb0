//! The ledger's committed state.
//!
//! [`LedgerState`] is plain data: it is what a snapshot serializes and what
//! a transaction commits into.

use std::collections::BTreeMap;

use bourse_types::{
    BourseError, CityAccount, CityId, Order, OrderId, RegionId, ResourceCode, Result, Trade,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A governing region: its tax rate and the treasury its tax accrues into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    /// Raw rate as set by governance. Settlement clamps it.
    pub tax_rate: Decimal,
    pub treasury: Decimal,
}

/// Net supply brought into the ledger from outside (deposits − withdrawals).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuance {
    pub currency: Decimal,
    pub resources: BTreeMap<ResourceCode, i128>,
}

/// Everything the ledger stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    pub cities: BTreeMap<CityId, CityAccount>,
    pub regions: BTreeMap<RegionId, Region>,
    pub orders: BTreeMap<OrderId, Order>,
    /// Append-only, per resource, in settlement order.
    pub trades: BTreeMap<ResourceCode, Vec<Trade>>,
    /// Fees collected from both legs of every trade.
    pub fee_pool: Decimal,
    pub issuance: Issuance,
    /// Highest fill sequence settled per resource. A book resumes numbering
    /// above it, and settlement refuses anything at or below it.
    #[serde(default)]
    pub settled_sequences: BTreeMap<ResourceCode, u64>,
}

impl LedgerState {
    pub(crate) fn city(&self, city_id: CityId) -> Result<&CityAccount> {
        self.cities
            .get(&city_id)
            .ok_or(BourseError::CityNotFound(city_id))
    }

    pub(crate) fn region(&self, region_id: RegionId) -> Result<&Region> {
        self.regions
            .get(&region_id)
            .ok_or(BourseError::RegionNotFound(region_id))
    }

    /// Open orders for one resource, oldest first.
    #[must_use]
    pub fn open_orders(&self, resource: ResourceCode) -> Vec<Order> {
        let mut open: Vec<Order> = self
            .orders
            .values()
            .filter(|o| o.resource == resource && o.is_open())
            .cloned()
            .collect();
        open.sort_by_key(Order::time_priority);
        open
    }

    /// Highest fill sequence settled on `resource`, `0` if none.
    #[must_use]
    pub fn settled_sequence(&self, resource: ResourceCode) -> u64 {
        self.settled_sequences.get(&resource).copied().unwrap_or(0)
    }

    /// Total trade count across all resources.
    #[must_use]
    pub fn trade_count(&self) -> usize {
        self.trades.values().map(Vec::len).sum()
    }
}
