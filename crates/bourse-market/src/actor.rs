//! The per-resource order-book worker.
//!
//! A [`BookHandle`] is a cheap, cloneable sender into one worker task. The
//! worker owns the resource's [`OrderBook`] and processes commands one at a
//! time, so two matching runs on the same resource can never interleave.
//!
//! The book is a cache of the ledger's open orders. It is rebuilt from the
//! ledger at start-up and again whenever settlement reports that the two
//! have diverged. A rebuilt book may be crossed, so every rebuild is
//! followed by a matching run.

use std::sync::Arc;

use bourse_ingress::EscrowManager;
use bourse_ledger::Ledger;
use bourse_matchcore::{BookDepth, OrderBook, fill_root_hex, match_book};
use bourse_settlement::{SettlementEngine, SettlementOutcome};
use bourse_types::{BourseError, Order, OrderId, OrderSide, OrderStatus, ResourceCode, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Upper bound on match/resync rounds for one command. Every extra round
/// follows a compensation, which closes an order, so this is never reached
/// in practice.
const MAX_MATCH_ROUNDS: usize = 16;

/// What one placement did inside the book.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementReport {
    /// The order's ledger row after matching and settlement.
    pub order: Order,
    /// Every settlement outcome produced while this command ran, in order.
    pub outcomes: Vec<SettlementOutcome>,
}

impl PlacementReport {
    /// Number of fills that settled into trades.
    #[must_use]
    pub fn matches_executed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_settled()).count()
    }
}

enum BookCommand {
    Place {
        order_id: OrderId,
        reply: oneshot::Sender<Result<PlacementReport>>,
    },
    Cancel {
        order_id: OrderId,
        reply: oneshot::Sender<Result<Option<Order>>>,
    },
    Depth {
        levels: usize,
        reply: oneshot::Sender<Result<BookDepth>>,
    },
    BestLevel {
        side: OrderSide,
        reply: oneshot::Sender<Result<Option<(Decimal, u64)>>>,
    },
    SweepExpired {
        reply: oneshot::Sender<Result<usize>>,
    },
    Resync {
        reply: oneshot::Sender<Result<usize>>,
    },
}

/// Sender side of a resource's book worker.
#[derive(Debug, Clone)]
pub struct BookHandle {
    resource: ResourceCode,
    tx: mpsc::Sender<BookCommand>,
}

impl std::fmt::Debug for BookCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Place { .. } => "Place",
            Self::Cancel { .. } => "Cancel",
            Self::Depth { .. } => "Depth",
            Self::BestLevel { .. } => "BestLevel",
            Self::SweepExpired { .. } => "SweepExpired",
            Self::Resync { .. } => "Resync",
        };
        f.write_str(name)
    }
}

impl BookHandle {
    /// Rebuild the book from the ledger and start its worker task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        resource: ResourceCode,
        ledger: Arc<Ledger>,
        engine: Arc<SettlementEngine>,
        escrow: EscrowManager,
        mailbox: usize,
    ) -> Result<(Self, JoinHandle<()>)> {
        let mut worker = BookWorker {
            resource,
            book: OrderBook::new(resource),
            needs_resync: false,
            ledger,
            engine,
            escrow,
        };
        worker.rebuild_and_match()?;

        let (tx, rx) = mpsc::channel(mailbox.max(1));
        let task = tokio::spawn(worker.run(rx));
        Ok((Self { resource, tx }, task))
    }

    #[must_use]
    pub fn resource(&self) -> ResourceCode {
        self.resource
    }

    /// Hand an escrowed, open order to the book and run matching.
    pub async fn place(&self, order_id: OrderId) -> Result<PlacementReport> {
        self.request(|reply| BookCommand::Place { order_id, reply }).await?
    }

    /// Remove an order and refund its remainder. `None` if it was not open.
    pub async fn cancel(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.request(|reply| BookCommand::Cancel { order_id, reply }).await?
    }

    pub async fn depth(&self, levels: usize) -> Result<BookDepth> {
        self.request(|reply| BookCommand::Depth { levels, reply }).await?
    }

    /// Best price and resting quantity on `side`.
    pub async fn best_level(&self, side: OrderSide) -> Result<Option<(Decimal, u64)>> {
        self.request(|reply| BookCommand::BestLevel { side, reply }).await?
    }

    /// Expire lapsed orders now. Returns how many were expired.
    pub async fn sweep_expired(&self) -> Result<usize> {
        self.request(|reply| BookCommand::SweepExpired { reply }).await?
    }

    /// Force a full rebuild from the ledger. Returns the resting order count.
    pub async fn resync(&self) -> Result<usize> {
        self.request(|reply| BookCommand::Resync { reply }).await?
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> BookCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| BourseError::ActorUnavailable(self.resource))?;
        rx.await
            .map_err(|_| BourseError::ActorUnavailable(self.resource))
    }
}

struct BookWorker {
    resource: ResourceCode,
    book: OrderBook,
    /// Set when the book may disagree with the ledger.
    needs_resync: bool,
    ledger: Arc<Ledger>,
    engine: Arc<SettlementEngine>,
    escrow: EscrowManager,
}

impl BookWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<BookCommand>) {
        tracing::info!(resource = %self.resource, orders = self.book.order_count(), "Book worker started");
        while let Some(command) = rx.recv().await {
            tracing::trace!(resource = %self.resource, ?command, "Book command");
            // A dropped receiver only means the caller stopped waiting.
            match command {
                BookCommand::Place { order_id, reply } => {
                    let _ = reply.send(self.place(order_id));
                }
                BookCommand::Cancel { order_id, reply } => {
                    let _ = reply.send(self.cancel(order_id));
                }
                BookCommand::Depth { levels, reply } => {
                    let _ = reply.send(self.prepare().map(|()| self.book.depth(levels)));
                }
                BookCommand::BestLevel { side, reply } => {
                    let _ = reply.send(self.prepare().map(|()| self.book.best_level(side)));
                }
                BookCommand::SweepExpired { reply } => {
                    let _ = reply.send(self.sweep_expired());
                }
                BookCommand::Resync { reply } => {
                    let _ = reply.send(self.rebuild_and_match().map(|()| self.book.order_count()));
                }
            }
        }
        tracing::info!(resource = %self.resource, "Book worker stopped");
    }

    /// Lazy maintenance run before every command.
    fn prepare(&mut self) -> Result<()> {
        if self.needs_resync {
            self.rebuild_and_match()?;
        }
        self.sweep_expired()?;
        Ok(())
    }

    fn place(&mut self, order_id: OrderId) -> Result<PlacementReport> {
        self.prepare()?;

        let row = self
            .ledger
            .order(order_id)
            .ok_or(BourseError::OrderNotFound(order_id))?;
        if row.resource != self.resource {
            return Err(BourseError::InvalidOrder {
                reason: format!("order {order_id} is for {}, not {}", row.resource, self.resource),
            });
        }

        let mut outcomes = Vec::new();
        if row.is_open() {
            // Already resting if a resync picked it up before this command.
            if !self.book.contains_order(&order_id) {
                self.book.insert_order(row)?;
            }
            self.match_and_settle(&mut outcomes)?;
        } else {
            tracing::debug!(order_id = %order_id, status = %row.status, "Order closed before reaching book");
        }

        let order = self
            .ledger
            .order(order_id)
            .ok_or(BourseError::OrderNotFound(order_id))?;
        Ok(PlacementReport { order, outcomes })
    }

    /// Match until the book is quiet, settling each fill in sequence.
    fn match_and_settle(&mut self, outcomes: &mut Vec<SettlementOutcome>) -> Result<()> {
        for _ in 0..MAX_MATCH_ROUNDS {
            let fills = match match_book(&mut self.book, Utc::now()) {
                Ok(fills) => fills,
                Err(e) => {
                    tracing::error!(resource = %self.resource, error = %e, "Matching failed");
                    self.needs_resync = true;
                    return Err(e);
                }
            };
            if fills.is_empty() {
                return Ok(());
            }
            tracing::debug!(
                resource = %self.resource,
                fills = fills.len(),
                fill_root = %fill_root_hex(&fills),
                "Book matched"
            );

            for fill in &fills {
                let outcome = match self.engine.settle(&self.ledger, fill) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(fill_id = %fill.id, error = %e, "Settlement failed");
                        self.needs_resync = true;
                        continue;
                    }
                };
                match &outcome {
                    SettlementOutcome::Settled(_) => {}
                    SettlementOutcome::Compensated { order_id, .. } => {
                        self.book.cancel_order(order_id);
                        self.needs_resync = true;
                    }
                    SettlementOutcome::Skipped { .. } => self.needs_resync = true,
                }
                outcomes.push(outcome);
            }

            if !self.needs_resync {
                return Ok(());
            }
            // Diverged: rebuild from the ledger and re-run matching, since
            // the rebuilt book may cross again.
            self.resync()?;
        }
        tracing::warn!(resource = %self.resource, "Match rounds exhausted");
        Ok(())
    }

    fn cancel(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        self.prepare()?;
        self.book.cancel_order(&order_id);
        self.ledger
            .transact(|tx| self.escrow.release_remaining(tx, order_id, OrderStatus::Cancelled))
    }

    fn sweep_expired(&mut self) -> Result<usize> {
        let now = Utc::now();
        let expired = self.book.remove_expired(now);
        let mut count = 0;
        for order in expired {
            let closed = self
                .ledger
                .transact(|tx| self.escrow.release_remaining(tx, order.id, OrderStatus::Expired))?;
            if closed.is_some() {
                count += 1;
            }
        }
        if count > 0 {
            tracing::info!(resource = %self.resource, expired = count, "Orders expired");
        }
        Ok(count)
    }

    /// Rebuild, then settle whatever the rebuilt book crosses.
    fn rebuild_and_match(&mut self) -> Result<()> {
        self.resync()?;
        let mut outcomes = Vec::new();
        self.match_and_settle(&mut outcomes)?;
        if !outcomes.is_empty() {
            tracing::info!(
                resource = %self.resource,
                fills = outcomes.len(),
                settled = outcomes.iter().filter(|o| o.is_settled()).count(),
                "Rebuilt book was crossed, matched"
            );
        }
        Ok(())
    }

    /// Rebuild the book from the ledger's open orders.
    ///
    /// Fill numbering resumes above both this book's last fill and the
    /// ledger's settled watermark, so a restarted worker never reuses a
    /// sequence.
    fn resync(&mut self) -> Result<()> {
        let mut book = self.book.reconcile(self.ledger.open_orders(self.resource))?;
        book.resume_sequence(self.ledger.settled_sequence(self.resource));
        self.book = book;
        self.needs_resync = false;
        tracing::info!(
            resource = %self.resource,
            orders = self.book.order_count(),
            best_bid = ?self.book.best_bid(),
            best_ask = ?self.book.best_ask(),
            "Book resynced from ledger"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bourse_types::*;

    use super::*;

    fn setup() -> (Arc<Ledger>, Arc<SettlementEngine>, EscrowManager) {
        let config = MarketConfig::default();
        let ledger = Arc::new(Ledger::new());
        ledger.set_region_tax_rate(RegionId(1), Decimal::ZERO).unwrap();
        for city in [CityId(1), CityId(2)] {
            ledger.open_city(city, RegionId(1)).unwrap();
            ledger.deposit_currency(city, Decimal::new(1000, 0)).unwrap();
            ledger.deposit_resource(city, ResourceCode::Clay, 100).unwrap();
        }
        (
            ledger,
            Arc::new(SettlementEngine::from_config(&config)),
            EscrowManager::from_config(&config),
        )
    }

    fn escrow_order(ledger: &Ledger, escrow: &EscrowManager, city: CityId, side: OrderSide, qty: u64) -> Order {
        escrow_at(ledger, escrow, city, side, 8, qty)
    }

    fn escrow_at(
        ledger: &Ledger,
        escrow: &EscrowManager,
        city: CityId,
        side: OrderSide,
        price: i64,
        qty: u64,
    ) -> Order {
        let req = OrderRequest::new(city, ResourceCode::Clay, side, Decimal::new(price, 0), qty);
        ledger.transact(|tx| escrow.open(tx, req)).unwrap()
    }

    #[tokio::test]
    async fn place_matches_and_reports() {
        let (ledger, engine, escrow) = setup();
        let (handle, _task) =
            BookHandle::spawn(ResourceCode::Clay, ledger.clone(), engine, escrow.clone(), 16).unwrap();

        let sell = escrow_order(&ledger, &escrow, CityId(1), OrderSide::Sell, 10);
        let report = handle.place(sell.id).await.unwrap();
        assert_eq!(report.matches_executed(), 0);
        assert_eq!(report.order.status, OrderStatus::Open);

        let buy = escrow_order(&ledger, &escrow, CityId(2), OrderSide::Buy, 10);
        let report = handle.place(buy.id).await.unwrap();
        assert_eq!(report.matches_executed(), 1);
        assert_eq!(report.order.status, OrderStatus::Filled);

        let depth = handle.depth(10).await.unwrap();
        assert!(depth.bids.is_empty() && depth.asks.is_empty());
    }

    #[tokio::test]
    async fn cold_start_rebuilds_from_ledger() {
        let (ledger, engine, escrow) = setup();
        escrow_order(&ledger, &escrow, CityId(1), OrderSide::Sell, 7);
        escrow_order(&ledger, &escrow, CityId(1), OrderSide::Sell, 3);

        let (handle, _task) =
            BookHandle::spawn(ResourceCode::Clay, ledger, engine, escrow, 16).unwrap();
        let level = handle.best_level(OrderSide::Sell).await.unwrap();
        assert_eq!(level, Some((Decimal::new(8, 0), 10)));
    }

    #[tokio::test]
    async fn incoming_order_trades_at_resting_price_whatever_its_timestamp() {
        let (ledger, engine, escrow) = setup();
        let (handle, _task) =
            BookHandle::spawn(ResourceCode::Clay, ledger.clone(), engine, escrow.clone(), 16).unwrap();

        // escrowed (and timestamped) first, but handed to the book second
        let buy = escrow_at(&ledger, &escrow, CityId(2), OrderSide::Buy, 9, 1);
        let sell = escrow_at(&ledger, &escrow, CityId(1), OrderSide::Sell, 7, 1);
        handle.place(sell.id).await.unwrap();
        let report = handle.place(buy.id).await.unwrap();

        let trade = report.outcomes[0].trade().unwrap();
        assert_eq!(trade.price, Decimal::new(7, 0));
        assert_eq!(report.order.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn cold_start_settles_a_crossed_ledger() {
        let (ledger, engine, escrow) = setup();
        escrow_at(&ledger, &escrow, CityId(2), OrderSide::Buy, 9, 4);
        escrow_at(&ledger, &escrow, CityId(1), OrderSide::Sell, 8, 4);

        let (handle, _task) =
            BookHandle::spawn(ResourceCode::Clay, ledger.clone(), engine, escrow, 16).unwrap();
        let trades = ledger.trades(ResourceCode::Clay);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity, 4);

        let depth = handle.depth(5).await.unwrap();
        assert!(depth.bids.is_empty() && depth.asks.is_empty());
    }

    #[tokio::test]
    async fn restarted_worker_numbers_fills_above_the_ledger() {
        let (ledger, engine, escrow) = setup();
        let (first, task) =
            BookHandle::spawn(ResourceCode::Clay, ledger.clone(), engine.clone(), escrow.clone(), 16).unwrap();
        for _ in 0..3 {
            let sell = escrow_order(&ledger, &escrow, CityId(1), OrderSide::Sell, 1);
            first.place(sell.id).await.unwrap();
            let buy = escrow_order(&ledger, &escrow, CityId(2), OrderSide::Buy, 1);
            first.place(buy.id).await.unwrap();
        }
        drop(first);
        let _ = task.await;
        assert_eq!(ledger.settled_sequence(ResourceCode::Clay), 3);

        let (second, _task) =
            BookHandle::spawn(ResourceCode::Clay, ledger.clone(), engine, escrow.clone(), 16).unwrap();
        let sell = escrow_order(&ledger, &escrow, CityId(1), OrderSide::Sell, 1);
        second.place(sell.id).await.unwrap();
        let buy = escrow_order(&ledger, &escrow, CityId(2), OrderSide::Buy, 1);
        let report = second.place(buy.id).await.unwrap();

        assert_eq!(report.matches_executed(), 1);
        assert_eq!(report.order.status, OrderStatus::Filled);
        assert_eq!(ledger.settled_sequence(ResourceCode::Clay), 4);
    }

    #[tokio::test]
    async fn place_of_order_already_resting_just_matches() {
        let (ledger, engine, escrow) = setup();
        let (handle, _task) =
            BookHandle::spawn(ResourceCode::Clay, ledger.clone(), engine, escrow.clone(), 16).unwrap();
        let sell = escrow_order(&ledger, &escrow, CityId(1), OrderSide::Sell, 5);
        // a resync before the Place command arrives picks the order up first
        assert_eq!(handle.resync().await.unwrap(), 1);
        let report = handle.place(sell.id).await.unwrap();
        assert_eq!(report.order.status, OrderStatus::Open);
        assert_eq!(handle.depth(5).await.unwrap().asks[0].quantity, 5);
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let (ledger, engine, escrow) = setup();
        let (handle, _task) =
            BookHandle::spawn(ResourceCode::Clay, ledger.clone(), engine, escrow.clone(), 16).unwrap();
        let buy = escrow_order(&ledger, &escrow, CityId(2), OrderSide::Buy, 5);
        handle.place(buy.id).await.unwrap();

        assert!(handle.cancel(buy.id).await.unwrap().is_some());
        assert!(handle.cancel(buy.id).await.unwrap().is_none());
        assert!(handle.cancel(OrderId::new()).await.unwrap().is_none());
        assert_eq!(ledger.city(CityId(2)).unwrap().currency.available, Decimal::new(1000, 0));
    }

    #[tokio::test]
    async fn closed_worker_reports_unavailable() {
        let (ledger, engine, escrow) = setup();
        let (handle, task) =
            BookHandle::spawn(ResourceCode::Clay, ledger, engine, escrow, 16).unwrap();
        task.abort();
        let _ = task.await;
        let err = handle.depth(1).await.unwrap_err();
        assert!(matches!(err, BourseError::ActorUnavailable(ResourceCode::Clay)));
    }
}
