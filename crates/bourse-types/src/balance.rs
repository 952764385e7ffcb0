//! Balance tracking types for the Bourse escrow model.
//!
//! Every city has an `available` balance (usable for new orders) and a
//! `reserved` balance (escrowed by open orders) for currency and for each
//! resource. All mutations check for underflow and leave the entry unchanged
//! on error.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BourseError, CityId, RegionId, ResourceCode, Result, constants};

/// Currency held by one city.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyBalance {
    pub available: Decimal,
    pub reserved: Decimal,
}

impl CurrencyBalance {
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.available + self.reserved
    }
}

/// Units of one resource held by one city.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBalance {
    pub available: u64,
    pub reserved: u64,
}

impl ResourceBalance {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.available + self.reserved
    }
}

/// A city's ledger row: currency, resources, storage limits, and a version
/// token bumped on every committed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityAccount {
    pub city_id: CityId,
    pub region_id: RegionId,
    pub currency: CurrencyBalance,
    pub resources: BTreeMap<ResourceCode, ResourceBalance>,
    /// Per-resource storage limits. Missing entries use
    /// [`constants::DEFAULT_STORAGE_CAPACITY`].
    pub capacity: BTreeMap<ResourceCode, u64>,
    pub version: u64,
}

impl CityAccount {
    #[must_use]
    pub fn new(city_id: CityId, region_id: RegionId) -> Self {
        Self {
            city_id,
            region_id,
            currency: CurrencyBalance::default(),
            resources: BTreeMap::new(),
            capacity: BTreeMap::new(),
            version: 0,
        }
    }

    // =================================================================
    // Currency
    // =================================================================

    /// Add currency to the available balance.
    pub fn credit_currency(&mut self, amount: Decimal) -> Result<()> {
        if amount.is_sign_negative() {
            return Err(BourseError::BalanceUnderflow);
        }
        self.currency.available += amount;
        Ok(())
    }

    /// Remove currency from the available balance.
    pub fn debit_currency(&mut self, amount: Decimal) -> Result<()> {
        if self.currency.available < amount {
            return Err(BourseError::InsufficientFunds {
                needed: amount,
                available: self.currency.available,
            });
        }
        self.currency.available -= amount;
        Ok(())
    }

    /// Move currency from available into escrow.
    pub fn reserve_currency(&mut self, amount: Decimal) -> Result<()> {
        self.debit_currency(amount)?;
        self.currency.reserved += amount;
        Ok(())
    }

    /// Move escrowed currency back to available.
    pub fn release_currency(&mut self, amount: Decimal) -> Result<()> {
        if self.currency.reserved < amount {
            return Err(BourseError::BalanceUnderflow);
        }
        self.currency.reserved -= amount;
        self.currency.available += amount;
        Ok(())
    }

    // =================================================================
    // Resources
    // =================================================================

    #[must_use]
    pub fn resource(&self, resource: ResourceCode) -> ResourceBalance {
        self.resources.get(&resource).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn capacity_for(&self, resource: ResourceCode) -> u64 {
        self.capacity
            .get(&resource)
            .copied()
            .unwrap_or(constants::DEFAULT_STORAGE_CAPACITY)
    }

    /// Storage still free for `resource`, counting reserved units as held.
    #[must_use]
    pub fn free_capacity(&self, resource: ResourceCode) -> u64 {
        self.capacity_for(resource)
            .saturating_sub(self.resource(resource).total())
    }

    /// Add units to the available balance, respecting storage capacity.
    pub fn credit_resource(&mut self, resource: ResourceCode, qty: u64) -> Result<()> {
        let free = self.free_capacity(resource);
        if qty > free {
            return Err(BourseError::CapacityExceeded {
                resource,
                requested: qty,
                free,
            });
        }
        self.resources.entry(resource).or_default().available += qty;
        Ok(())
    }

    /// Remove units from the available balance.
    pub fn debit_resource(&mut self, resource: ResourceCode, qty: u64) -> Result<()> {
        let entry = self.resources.entry(resource).or_default();
        if entry.available < qty {
            return Err(BourseError::InsufficientResource {
                resource,
                needed: qty,
                available: entry.available,
            });
        }
        entry.available -= qty;
        Ok(())
    }

    /// Move units from available into escrow.
    pub fn reserve_resource(&mut self, resource: ResourceCode, qty: u64) -> Result<()> {
        self.debit_resource(resource, qty)?;
        self.resources.entry(resource).or_default().reserved += qty;
        Ok(())
    }

    /// Move escrowed units back to available.
    pub fn release_resource(&mut self, resource: ResourceCode, qty: u64) -> Result<()> {
        let entry = self.resources.entry(resource).or_default();
        if entry.reserved < qty {
            return Err(BourseError::BalanceUnderflow);
        }
        entry.reserved -= qty;
        entry.available += qty;
        Ok(())
    }

    /// Remove escrowed units for delivery to a buyer.
    pub fn consume_reserved_resource(&mut self, resource: ResourceCode, qty: u64) -> Result<()> {
        let entry = self.resources.entry(resource).or_default();
        if entry.reserved < qty {
            return Err(BourseError::InsufficientResource {
                resource,
                needed: qty,
                available: entry.reserved,
            });
        }
        entry.reserved -= qty;
        Ok(())
    }
}
