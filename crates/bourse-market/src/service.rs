//! The market gateway.
//!
//! [`MarketService`] composes validation, escrow, the per-resource book
//! workers and the ledger into the operations other game systems call.

use std::collections::BTreeMap;
use std::sync::Arc;

use bourse_ingress::{EscrowManager, PriceBand, PriceValidator, RiskKernel};
use bourse_ledger::Ledger;
use bourse_matchcore::BookDepth;
use bourse_settlement::SettlementEngine;
use bourse_types::{
    BourseError, CityId, MarketConfig, Order, OrderId, OrderRequest, OrderSide, OrderStatus,
    ResourceCode, Result, Trade, constants,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::actor::BookHandle;
use crate::history::{Candle, CandleBucket, build_candles};

/// Final state of a placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementResult {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub filled_qty: u64,
    pub matches_executed: usize,
    /// Trades settled while this placement ran.
    pub trades: Vec<Trade>,
}

/// Request/response surface of the market.
#[derive(Debug)]
pub struct MarketService {
    config: MarketConfig,
    ledger: Arc<Ledger>,
    risk: RiskKernel,
    prices: PriceValidator,
    escrow: EscrowManager,
    books: BTreeMap<ResourceCode, BookHandle>,
    workers: Vec<JoinHandle<()>>,
}

impl MarketService {
    /// Validate `config`, rebuild every book from `ledger` and start one
    /// worker task per resource.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: MarketConfig, ledger: Arc<Ledger>) -> Result<Self> {
        config.validate()?;
        let engine = Arc::new(SettlementEngine::from_config(&config));
        let escrow = EscrowManager::from_config(&config);

        let mut books = BTreeMap::new();
        let mut workers = Vec::with_capacity(ResourceCode::ALL.len());
        for resource in ResourceCode::ALL {
            let (handle, task) = BookHandle::spawn(
                resource,
                ledger.clone(),
                engine.clone(),
                escrow.clone(),
                config.actor_mailbox_capacity,
            )?;
            books.insert(resource, handle);
            workers.push(task);
        }

        tracing::info!(
            engine = constants::ENGINE_NAME,
            version = constants::VERSION,
            resources = books.len(),
            fee_rate = %config.fee_rate,
            band_percent = %config.band_percent,
            "Market started"
        );

        Ok(Self {
            risk: RiskKernel::from_config(&config),
            prices: PriceValidator::from_config(&config),
            escrow,
            config,
            ledger,
            books,
            workers,
        })
    }

    #[must_use]
    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    fn book(&self, resource: ResourceCode) -> Result<&BookHandle> {
        self.books
            .get(&resource)
            .ok_or(BourseError::ActorUnavailable(resource))
    }

    // =================================================================
    // Orders
    // =================================================================

    /// Validate, escrow and match a new limit order.
    ///
    /// # Errors
    /// - `InvalidOrder` for malformed requests
    /// - `PriceOutOfBand` / `NoReferencePrice` from the price guard
    /// - `CityNotFound`, `InsufficientFunds`, `InsufficientResource` from escrow
    /// - `ActorUnavailable` if the resource's worker is gone
    pub async fn place_order(&self, request: OrderRequest) -> Result<PlacementResult> {
        self.risk.validate(&request)?;

        let resource = request.resource;
        let now = Utc::now();
        let trades = self
            .ledger
            .trades_since(resource, self.prices.window_start(now));
        self.prices.validate(
            resource,
            request.price,
            &trades,
            self.config.reference_price(resource),
            now,
        )?;

        let order = self.ledger.transact(|tx| self.escrow.open(tx, request))?;
        let report = self.book(resource)?.place(order.id).await?;

        let result = PlacementResult {
            order_id: report.order.id,
            status: report.order.status,
            filled_qty: report.order.filled_qty,
            matches_executed: report.matches_executed(),
            trades: report
                .outcomes
                .iter()
                .filter_map(|o| o.trade().cloned())
                .collect(),
        };
        tracing::info!(
            order_id = %result.order_id,
            %resource,
            status = %result.status,
            filled_qty = result.filled_qty,
            matches = result.matches_executed,
            "Order placed"
        );
        Ok(result)
    }

    /// Cancel an open order and refund its unfilled remainder.
    ///
    /// Returns `true` if the order was open and is now cancelled, `false` if
    /// there was nothing to do (unknown, filled, cancelled or expired). Both
    /// count as success.
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<bool> {
        let Some(order) = self.ledger.order(order_id) else {
            return Ok(false);
        };
        if !order.is_open() {
            return Ok(false);
        }
        let cancelled = self.book(order.resource)?.cancel(order_id).await?;
        Ok(cancelled.is_some())
    }

    /// Buy up to `quantity` at the current best ask.
    ///
    /// # Errors
    /// `NoLiquidity` if nothing is resting on the ask side.
    pub async fn quick_buy(&self, city_id: CityId, resource: ResourceCode, quantity: u64) -> Result<PlacementResult> {
        self.quick(city_id, resource, OrderSide::Buy, quantity).await
    }

    /// Sell up to `quantity` at the current best bid.
    pub async fn quick_sell(&self, city_id: CityId, resource: ResourceCode, quantity: u64) -> Result<PlacementResult> {
        self.quick(city_id, resource, OrderSide::Sell, quantity).await
    }

    async fn quick(
        &self,
        city_id: CityId,
        resource: ResourceCode,
        side: OrderSide,
        quantity: u64,
    ) -> Result<PlacementResult> {
        let (price, available) = self
            .book(resource)?
            .best_level(side.opposite())
            .await?
            .ok_or(BourseError::NoLiquidity(resource))?;
        let request = OrderRequest::new(city_id, resource, side, price, quantity.min(available));
        self.place_order(request).await
    }

    /// An order's ledger row. Expiry is applied before reading.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        let order = self
            .ledger
            .order(order_id)
            .ok_or(BourseError::OrderNotFound(order_id))?;
        if order.is_open() && order.is_expired_at(Utc::now()) {
            self.book(order.resource)?.sweep_expired().await?;
            return self
                .ledger
                .order(order_id)
                .ok_or(BourseError::OrderNotFound(order_id));
        }
        Ok(order)
    }

    /// Open orders owned by `city_id`, oldest first.
    #[must_use]
    pub fn open_orders(&self, city_id: CityId) -> Vec<Order> {
        let now = Utc::now();
        self.ledger
            .open_orders_for_city(city_id)
            .into_iter()
            .filter(|o| !o.is_expired_at(now))
            .collect()
    }

    // =================================================================
    // Market data
    // =================================================================

    /// Aggregated book depth, at most `depth` levels per side.
    pub async fn get_order_book(&self, resource: ResourceCode, depth: usize) -> Result<BookDepth> {
        self.book(resource)?
            .depth(depth.clamp(1, constants::MAX_BOOK_DEPTH))
            .await
    }

    /// The newest `limit` OHLCV candles, oldest first.
    #[must_use]
    pub fn get_trade_history(&self, resource: ResourceCode, bucket: CandleBucket, limit: usize) -> Vec<Candle> {
        let limit = limit.clamp(1, constants::MAX_CANDLES);
        let span = i32::try_from(limit - 1).unwrap_or(i32::MAX);
        let since = bucket.floor(Utc::now()) - bucket.duration() * span;
        build_candles(&self.ledger.trades_since(resource, since), bucket, limit)
    }

    /// The band a new order on `resource` must fall within right now.
    pub fn price_band(&self, resource: ResourceCode) -> Result<PriceBand> {
        let now = Utc::now();
        let trades = self
            .ledger
            .trades_since(resource, self.prices.window_start(now));
        let reference = self
            .prices
            .reference_price(&trades, self.config.reference_price(resource), now)
            .ok_or(BourseError::NoReferencePrice(resource))?;
        Ok(self.prices.band_around(reference))
    }

    // =================================================================
    // Maintenance
    // =================================================================

    /// Expire lapsed orders on every resource. Returns the total expired.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let mut total = 0;
        for handle in self.books.values() {
            total += handle.sweep_expired().await?;
        }
        Ok(total)
    }

    /// Rebuild every book from the ledger.
    pub async fn resync_all(&self) -> Result<()> {
        for handle in self.books.values() {
            handle.resync().await?;
        }
        Ok(())
    }

    /// Stop every book worker.
    pub fn shutdown(&self) {
        for worker in &self.workers {
            worker.abort();
        }
        tracing::info!("Market stopped");
    }
}
