//! Ledger transactions.
//!
//! A [`LedgerTx`] reads through to the committed [`LedgerState`] and stages
//! every write in an overlay. The overlay is applied in one step when the
//! transaction closure returns `Ok`, and dropped untouched when it returns
//! `Err`, so a multi-row settlement is all-or-nothing.

use std::collections::BTreeMap;

use bourse_types::{
    BourseError, CityAccount, CityId, Order, OrderId, RegionId, ResourceCode, Result, Trade,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::state::{LedgerState, Region};

/// A staged unit of work against the ledger.
pub struct LedgerTx<'a> {
    base: &'a LedgerState,
    now: DateTime<Utc>,
    cities: BTreeMap<CityId, CityAccount>,
    orders: BTreeMap<OrderId, Order>,
    regions: BTreeMap<RegionId, Region>,
    trades: Vec<Trade>,
    fee_delta: Decimal,
    currency_issued: Decimal,
    resources_issued: BTreeMap<ResourceCode, i128>,
    sequences: BTreeMap<ResourceCode, u64>,
}

/// The owned result of a successful transaction, ready to apply.
pub(crate) struct StagedWrites {
    cities: BTreeMap<CityId, CityAccount>,
    orders: BTreeMap<OrderId, Order>,
    regions: BTreeMap<RegionId, Region>,
    trades: Vec<Trade>,
    fee_delta: Decimal,
    currency_issued: Decimal,
    resources_issued: BTreeMap<ResourceCode, i128>,
    sequences: BTreeMap<ResourceCode, u64>,
}

impl<'a> LedgerTx<'a> {
    pub(crate) fn new(base: &'a LedgerState, now: DateTime<Utc>) -> Self {
        Self {
            base,
            now,
            cities: BTreeMap::new(),
            orders: BTreeMap::new(),
            regions: BTreeMap::new(),
            trades: Vec::new(),
            fee_delta: Decimal::ZERO,
            currency_issued: Decimal::ZERO,
            resources_issued: BTreeMap::new(),
            sequences: BTreeMap::new(),
        }
    }

    /// Wall-clock time this transaction runs at.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    // =================================================================
    // Cities
    // =================================================================

    pub fn city(&self, city_id: CityId) -> Result<&CityAccount> {
        match self.cities.get(&city_id) {
            Some(staged) => Ok(staged),
            None => self.base.city(city_id),
        }
    }

    pub fn city_mut(&mut self, city_id: CityId) -> Result<&mut CityAccount> {
        if !self.cities.contains_key(&city_id) {
            let committed = self.base.city(city_id)?.clone();
            self.cities.insert(city_id, committed);
        }
        self.cities
            .get_mut(&city_id)
            .ok_or(BourseError::CityNotFound(city_id))
    }

    pub fn insert_city(&mut self, account: CityAccount) -> Result<()> {
        if self.city(account.city_id).is_ok() {
            return Err(BourseError::DuplicateCity(account.city_id));
        }
        self.region(account.region_id)?;
        self.cities.insert(account.city_id, account);
        Ok(())
    }

    // =================================================================
    // Orders
    // =================================================================

    #[must_use]
    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.orders
            .get(&order_id)
            .or_else(|| self.base.orders.get(&order_id))
    }

    pub fn order_mut(&mut self, order_id: OrderId) -> Result<&mut Order> {
        if !self.orders.contains_key(&order_id) {
            let committed = self
                .base
                .orders
                .get(&order_id)
                .ok_or(BourseError::OrderNotFound(order_id))?
                .clone();
            self.orders.insert(order_id, committed);
        }
        self.orders
            .get_mut(&order_id)
            .ok_or(BourseError::OrderNotFound(order_id))
    }

    pub fn insert_order(&mut self, order: Order) -> Result<()> {
        if self.order(order.id).is_some() {
            return Err(BourseError::DuplicateOrder(order.id));
        }
        self.orders.insert(order.id, order);
        Ok(())
    }

    // =================================================================
    // Regions / treasury
    // =================================================================

    pub fn region(&self, region_id: RegionId) -> Result<&Region> {
        match self.regions.get(&region_id) {
            Some(staged) => Ok(staged),
            None => self.base.region(region_id),
        }
    }

    pub fn region_mut(&mut self, region_id: RegionId) -> Result<&mut Region> {
        if !self.regions.contains_key(&region_id) {
            let committed = self.base.region(region_id)?.clone();
            self.regions.insert(region_id, committed);
        }
        self.regions
            .get_mut(&region_id)
            .ok_or(BourseError::RegionNotFound(region_id))
    }

    /// Register a region, or replace its tax rate if it exists.
    pub fn upsert_region(&mut self, region_id: RegionId, tax_rate: Decimal) {
        let treasury = self
            .region(region_id)
            .map(|r| r.treasury)
            .unwrap_or(Decimal::ZERO);
        self.regions.insert(
            region_id,
            Region {
                id: region_id,
                tax_rate,
                treasury,
            },
        );
    }

    /// Raw tax rate of the region governing `city_id`.
    pub fn tax_rate_for_city(&self, city_id: CityId) -> Result<Decimal> {
        let region_id = self.city(city_id)?.region_id;
        Ok(self.region(region_id)?.tax_rate)
    }

    pub fn credit_treasury(&mut self, region_id: RegionId, amount: Decimal) -> Result<()> {
        if amount.is_sign_negative() {
            return Err(BourseError::BalanceUnderflow);
        }
        self.region_mut(region_id)?.treasury += amount;
        Ok(())
    }

    // =================================================================
    // Trades, fees, issuance
    // =================================================================

    pub fn append_trade(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub fn collect_fee(&mut self, amount: Decimal) -> Result<()> {
        if amount.is_sign_negative() {
            return Err(BourseError::BalanceUnderflow);
        }
        self.fee_delta += amount;
        Ok(())
    }

    /// Record currency entering (`> 0`) or leaving (`< 0`) the system.
    pub fn record_currency_issuance(&mut self, delta: Decimal) {
        self.currency_issued += delta;
    }

    /// Record resource units entering or leaving the system.
    pub fn record_resource_issuance(&mut self, resource: ResourceCode, delta: i128) {
        *self.resources_issued.entry(resource).or_insert(0) += delta;
    }

    /// Highest fill sequence settled on `resource`, including this
    /// transaction's own writes.
    #[must_use]
    pub fn settled_sequence(&self, resource: ResourceCode) -> u64 {
        self.sequences
            .get(&resource)
            .copied()
            .unwrap_or_else(|| self.base.settled_sequence(resource))
    }

    /// Claim fill `sequence` on `resource`. Sequences must strictly increase.
    pub fn claim_sequence(&mut self, resource: ResourceCode, sequence: u64) -> Result<()> {
        let settled_through = self.settled_sequence(resource);
        if sequence <= settled_through {
            return Err(BourseError::FillAlreadySettled {
                resource,
                sequence,
                settled_through,
            });
        }
        self.sequences.insert(resource, sequence);
        Ok(())
    }

    pub(crate) fn into_writes(self) -> StagedWrites {
        StagedWrites {
            cities: self.cities,
            orders: self.orders,
            regions: self.regions,
            trades: self.trades,
            fee_delta: self.fee_delta,
            currency_issued: self.currency_issued,
            resources_issued: self.resources_issued,
            sequences: self.sequences,
        }
    }
}

impl StagedWrites {
    /// Apply staged rows. Each written city gets its version token bumped.
    pub(crate) fn apply(self, state: &mut LedgerState) {
        for (id, mut account) in self.cities {
            let committed_version = state.cities.get(&id).map_or(0, |c| c.version);
            account.version = committed_version + 1;
            state.cities.insert(id, account);
        }
        state.orders.extend(self.orders);
        state.regions.extend(self.regions);
        for trade in self.trades {
            state.trades.entry(trade.resource).or_default().push(trade);
        }
        state.fee_pool += self.fee_delta;
        state.issuance.currency += self.currency_issued;
        for (resource, delta) in self.resources_issued {
            *state.issuance.resources.entry(resource).or_insert(0) += delta;
        }
        state.settled_sequences.extend(self.sequences);
    }

    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.cities.is_empty()
            && self.orders.is_empty()
            && self.regions.is_empty()
            && self.trades.is_empty()
            && self.fee_delta.is_zero()
            && self.currency_issued.is_zero()
            && self.resources_issued.is_empty()
            && self.sequences.is_empty()
    }
}
