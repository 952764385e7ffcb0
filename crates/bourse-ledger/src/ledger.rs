//! The ledger store.
//!
//! [`Ledger`] is the durable source of truth for balances, orders, trades and
//! treasuries. Every write runs inside [`Ledger::transact`]: the store lock
//! is held for the whole closure, so transactions are serializable, and the
//! staged overlay is only committed when the closure succeeds.

use std::path::Path;

use bourse_types::{
    BourseError, CityAccount, CityId, Order, OrderId, RegionId, ResourceCode, Result, Trade,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::{
    state::{Issuance, LedgerState},
    transaction::LedgerTx,
};

/// Thread-safe transactional ledger.
#[derive(Debug, Default)]
pub struct Ledger {
    state: Mutex<LedgerState>,
}

impl Ledger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from a snapshot (cold start).
    #[must_use]
    pub fn from_state(state: LedgerState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    // =================================================================
    // Transactions
    // =================================================================

    /// Run `f` as one atomic transaction.
    ///
    /// All writes staged through the [`LedgerTx`] are committed together if
    /// `f` returns `Ok`; if it returns `Err` nothing is written.
    pub fn transact<T>(&self, f: impl FnOnce(&mut LedgerTx<'_>) -> Result<T>) -> Result<T> {
        let mut guard = self.state.lock();
        let (value, writes) = {
            let mut tx = LedgerTx::new(&guard, Utc::now());
            let value = f(&mut tx)?;
            (value, tx.into_writes())
        };
        if !writes.is_empty() {
            writes.apply(&mut guard);
        }
        Ok(value)
    }

    // =================================================================
    // Administration (collaborator-facing)
    // =================================================================

    /// Register a region, or update its tax rate.
    pub fn set_region_tax_rate(&self, region_id: RegionId, tax_rate: Decimal) -> Result<()> {
        if tax_rate.is_sign_negative() {
            return Err(BourseError::InvalidOrder {
                reason: format!("tax rate {tax_rate} for {region_id} is negative"),
            });
        }
        self.transact(|tx| {
            tx.upsert_region(region_id, tax_rate);
            Ok(())
        })?;
        tracing::info!(region = %region_id, %tax_rate, "Region tax rate set");
        Ok(())
    }

    /// Open a ledger account for a city in an existing region.
    pub fn open_city(&self, city_id: CityId, region_id: RegionId) -> Result<()> {
        self.transact(|tx| tx.insert_city(CityAccount::new(city_id, region_id)))?;
        tracing::info!(city = %city_id, region = %region_id, "City account opened");
        Ok(())
    }

    /// Set the storage limit of one resource for a city.
    pub fn set_capacity(&self, city_id: CityId, resource: ResourceCode, capacity: u64) -> Result<()> {
        self.transact(|tx| {
            tx.city_mut(city_id)?.capacity.insert(resource, capacity);
            Ok(())
        })
    }

    /// Bring currency into a city from outside the market.
    pub fn deposit_currency(&self, city_id: CityId, amount: Decimal) -> Result<()> {
        self.transact(|tx| {
            tx.city_mut(city_id)?.credit_currency(amount)?;
            tx.record_currency_issuance(amount);
            Ok(())
        })
    }

    /// Take available currency out of a city.
    pub fn withdraw_currency(&self, city_id: CityId, amount: Decimal) -> Result<()> {
        self.transact(|tx| {
            tx.city_mut(city_id)?.debit_currency(amount)?;
            tx.record_currency_issuance(-amount);
            Ok(())
        })
    }

    /// Bring resource units into a city (e.g. production output).
    pub fn deposit_resource(&self, city_id: CityId, resource: ResourceCode, qty: u64) -> Result<()> {
        self.transact(|tx| {
            tx.city_mut(city_id)?.credit_resource(resource, qty)?;
            tx.record_resource_issuance(resource, i128::from(qty));
            Ok(())
        })
    }

    /// Take available resource units out of a city (e.g. consumption).
    pub fn withdraw_resource(&self, city_id: CityId, resource: ResourceCode, qty: u64) -> Result<()> {
        self.transact(|tx| {
            tx.city_mut(city_id)?.debit_resource(resource, qty)?;
            tx.record_resource_issuance(resource, -i128::from(qty));
            Ok(())
        })
    }

    // =================================================================
    // Queries
    // =================================================================

    pub fn city(&self, city_id: CityId) -> Result<CityAccount> {
        self.state.lock().city(city_id).cloned()
    }

    #[must_use]
    pub fn contains_city(&self, city_id: CityId) -> bool {
        self.state.lock().cities.contains_key(&city_id)
    }

    #[must_use]
    pub fn order(&self, order_id: OrderId) -> Option<Order> {
        self.state.lock().orders.get(&order_id).cloned()
    }

    /// Open orders for one resource, oldest first.
    #[must_use]
    pub fn open_orders(&self, resource: ResourceCode) -> Vec<Order> {
        self.state.lock().open_orders(resource)
    }

    /// Open orders owned by one city, oldest first.
    #[must_use]
    pub fn open_orders_for_city(&self, city_id: CityId) -> Vec<Order> {
        let state = self.state.lock();
        let mut open: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.city_id == city_id && o.is_open())
            .cloned()
            .collect();
        open.sort_by_key(Order::time_priority);
        open
    }

    /// Trades on `resource` executed at or after `since`, oldest first.
    #[must_use]
    pub fn trades_since(&self, resource: ResourceCode, since: DateTime<Utc>) -> Vec<Trade> {
        let state = self.state.lock();
        let Some(trades) = state.trades.get(&resource) else {
            return Vec::new();
        };
        let start = trades.partition_point(|t| t.executed_at < since);
        trades[start..].to_vec()
    }

    /// Every trade on `resource`, oldest first.
    #[must_use]
    pub fn trades(&self, resource: ResourceCode) -> Vec<Trade> {
        self.state
            .lock()
            .trades
            .get(&resource)
            .cloned()
            .unwrap_or_default()
    }

    pub fn treasury(&self, region_id: RegionId) -> Result<Decimal> {
        Ok(self.state.lock().region(region_id)?.treasury)
    }

    pub fn tax_rate(&self, region_id: RegionId) -> Result<Decimal> {
        Ok(self.state.lock().region(region_id)?.tax_rate)
    }

    #[must_use]
    pub fn fee_pool(&self) -> Decimal {
        self.state.lock().fee_pool
    }

    /// Highest fill sequence settled on `resource`.
    #[must_use]
    pub fn settled_sequence(&self, resource: ResourceCode) -> u64 {
        self.state.lock().settled_sequence(resource)
    }

    #[must_use]
    pub fn issuance(&self) -> Issuance {
        self.state.lock().issuance.clone()
    }

    // =================================================================
    // Snapshots
    // =================================================================

    /// A consistent copy of the whole ledger.
    #[must_use]
    pub fn snapshot(&self) -> LedgerState {
        self.state.lock().clone()
    }

    /// Persist a snapshot as JSON.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.snapshot())?;
        std::fs::write(path.as_ref(), json)?;
        tracing::info!(path = %path.as_ref().display(), "Ledger snapshot written");
        Ok(())
    }

    /// Load a ledger persisted by [`Ledger::save_to`].
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read(path.as_ref())?;
        let state: LedgerState = serde_json::from_slice(&raw)?;
        tracing::info!(
            path = %path.as_ref().display(),
            cities = state.cities.len(),
            orders = state.orders.len(),
            trades = state.trade_count(),
            "Ledger snapshot loaded"
        );
        Ok(Self::from_state(state))
    }
}

#[cfg(test)]
mod tests {
    use bourse_types::OrderSide;

    use super::*;

    fn setup() -> Ledger {
        let ledger = Ledger::new();
        ledger.set_region_tax_rate(RegionId(1), Decimal::new(10, 2)).unwrap();
        ledger.open_city(CityId(1), RegionId(1)).unwrap();
        ledger
    }

    #[test]
    fn open_city_requires_region() {
        let ledger = Ledger::new();
        let err = ledger.open_city(CityId(1), RegionId(9)).unwrap_err();
        assert!(matches!(err, BourseError::RegionNotFound(RegionId(9))));
        assert!(!ledger.contains_city(CityId(1)));
    }

    #[test]
    fn duplicate_city_rejected() {
        let ledger = setup();
        let err = ledger.open_city(CityId(1), RegionId(1)).unwrap_err();
        assert!(matches!(err, BourseError::DuplicateCity(CityId(1))));
    }

    #[test]
    fn deposit_bumps_version_and_issuance() {
        let ledger = setup();
        let before = ledger.city(CityId(1)).unwrap().version;
        ledger.deposit_currency(CityId(1), Decimal::new(500, 0)).unwrap();
        let acct = ledger.city(CityId(1)).unwrap();
        assert_eq!(acct.currency.available, Decimal::new(500, 0));
        assert_eq!(acct.version, before + 1);
        assert_eq!(ledger.issuance().currency, Decimal::new(500, 0));
    }

    #[test]
    fn failed_transaction_writes_nothing() {
        let ledger = setup();
        ledger.deposit_currency(CityId(1), Decimal::new(100, 0)).unwrap();
        let version = ledger.city(CityId(1)).unwrap().version;

        let result: Result<()> = ledger.transact(|tx| {
            tx.city_mut(CityId(1))?.debit_currency(Decimal::new(60, 0))?;
            tx.collect_fee(Decimal::new(60, 0))?;
            // second debit fails, so the first must not stick either
            tx.city_mut(CityId(1))?.debit_currency(Decimal::new(60, 0))?;
            Ok(())
        });

        assert!(matches!(result, Err(BourseError::InsufficientFunds { .. })));
        let acct = ledger.city(CityId(1)).unwrap();
        assert_eq!(acct.currency.available, Decimal::new(100, 0));
        assert_eq!(acct.version, version);
        assert_eq!(ledger.fee_pool(), Decimal::ZERO);
    }

    #[test]
    fn withdraw_cannot_go_negative() {
        let ledger = setup();
        ledger.deposit_resource(CityId(1), ResourceCode::Wood, 10).unwrap();
        let err = ledger
            .withdraw_resource(CityId(1), ResourceCode::Wood, 11)
            .unwrap_err();
        assert!(matches!(err, BourseError::InsufficientResource { .. }));
        ledger.withdraw_resource(CityId(1), ResourceCode::Wood, 4).unwrap();
        assert_eq!(
            ledger.city(CityId(1)).unwrap().resource(ResourceCode::Wood).available,
            6
        );
        assert_eq!(ledger.issuance().resources[&ResourceCode::Wood], 6);
    }

    #[test]
    fn capacity_applies_to_deposits() {
        let ledger = setup();
        ledger.set_capacity(CityId(1), ResourceCode::Stone, 5).unwrap();
        let err = ledger
            .deposit_resource(CityId(1), ResourceCode::Stone, 6)
            .unwrap_err();
        assert!(matches!(err, BourseError::CapacityExceeded { .. }));
    }

    #[test]
    fn orders_visible_after_commit() {
        let ledger = setup();
        let order = Order::dummy_limit(OrderSide::Buy, Decimal::ONE, 3);
        let id = order.id;
        ledger.transact(|tx| tx.insert_order(order.clone())).unwrap();
        assert_eq!(ledger.order(id).unwrap().quantity, 3);
        assert_eq!(ledger.open_orders(ResourceCode::Wood).len(), 1);
        assert_eq!(ledger.open_orders_for_city(CityId(1)).len(), 1);

        let dup = ledger.transact(|tx| tx.insert_order(order.clone()));
        assert!(matches!(dup, Err(BourseError::DuplicateOrder(_))));
    }

    #[test]
    fn settled_sequence_only_moves_forward() {
        let ledger = setup();
        assert_eq!(ledger.settled_sequence(ResourceCode::Iron), 0);
        ledger.transact(|tx| tx.claim_sequence(ResourceCode::Iron, 3)).unwrap();
        assert_eq!(ledger.settled_sequence(ResourceCode::Iron), 3);

        for stale in [1, 3] {
            let err = ledger
                .transact(|tx| tx.claim_sequence(ResourceCode::Iron, stale))
                .unwrap_err();
            assert!(matches!(
                err,
                BourseError::FillAlreadySettled { settled_through: 3, .. }
            ));
        }
        // independent per resource
        ledger.transact(|tx| tx.claim_sequence(ResourceCode::Fish, 1)).unwrap();

        // a rolled-back claim leaves the watermark alone
        let failed: Result<()> = ledger.transact(|tx| {
            tx.claim_sequence(ResourceCode::Iron, 4)?;
            Err(BourseError::Internal("abort".into()))
        });
        assert!(failed.is_err());
        assert_eq!(ledger.settled_sequence(ResourceCode::Iron), 3);
    }

    #[test]
    fn snapshot_roundtrip_through_disk() {
        let ledger = setup();
        ledger.deposit_currency(CityId(1), Decimal::new(4250, 2)).unwrap();
        ledger.transact(|tx| tx.claim_sequence(ResourceCode::Wood, 17)).unwrap();
        let path = std::env::temp_dir().join(format!("bourse-ledger-{}.json", OrderId::new()));
        ledger.save_to(&path).unwrap();
        let restored = Ledger::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(restored.snapshot(), ledger.snapshot());
        assert_eq!(restored.settled_sequence(ResourceCode::Wood), 17);
    }
}
