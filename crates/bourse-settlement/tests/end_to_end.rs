//! End-to-end: escrow → order book → settlement → conservation, without the
//! async layer.

use bourse_ingress::EscrowManager;
use bourse_ledger::Ledger;
use bourse_matchcore::{OrderBook, match_book};
use bourse_settlement::{SettlementEngine, SettlementOutcome, verify_supply};
use bourse_types::*;
use chrono::Utc;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rust_decimal::Decimal;

const CITY_A: CityId = CityId(1);
const CITY_B: CityId = CityId(2);

struct Market {
    ledger: Ledger,
    book: OrderBook,
    escrow: EscrowManager,
    engine: SettlementEngine,
}

impl Market {
    fn new(tax_rate: Decimal) -> Self {
        let config = MarketConfig::default();
        let ledger = Ledger::new();
        ledger.set_region_tax_rate(RegionId(1), tax_rate).unwrap();
        for city in [CITY_A, CITY_B] {
            ledger.open_city(city, RegionId(1)).unwrap();
            ledger.deposit_currency(city, Decimal::new(10_000, 0)).unwrap();
            ledger.deposit_resource(city, ResourceCode::Wood, 1_000).unwrap();
        }
        Self {
            ledger,
            book: OrderBook::new(ResourceCode::Wood),
            escrow: EscrowManager::from_config(&config),
            engine: SettlementEngine::from_config(&config),
        }
    }

    fn place(&mut self, city: CityId, side: OrderSide, price: Decimal, qty: u64) -> (Order, Vec<SettlementOutcome>) {
        let req = OrderRequest::new(city, ResourceCode::Wood, side, price, qty);
        let order = self.ledger.transact(|tx| self.escrow.open(tx, req)).unwrap();
        self.book.insert_order(order.clone()).unwrap();
        let fills = match_book(&mut self.book, Utc::now()).unwrap();
        let outcomes = fills
            .iter()
            .map(|fill| self.engine.settle(&self.ledger, fill).unwrap())
            .collect();
        (order, outcomes)
    }

    fn cancel(&mut self, order_id: OrderId) -> Option<Order> {
        self.book.cancel_order(&order_id);
        self.ledger
            .transact(|tx| self.escrow.release_remaining(tx, order_id, OrderStatus::Cancelled))
            .unwrap()
    }
}

#[test]
fn full_cross_settles_one_trade() {
    let mut m = Market::new(Decimal::new(10, 2));
    m.place(CITY_A, OrderSide::Sell, Decimal::new(5, 0), 100);
    let (_, outcomes) = m.place(CITY_B, OrderSide::Buy, Decimal::new(5, 0), 100);

    assert_eq!(outcomes.len(), 1);
    let trade = outcomes[0].trade().unwrap();
    assert_eq!(trade.quantity, 100);
    assert_eq!(trade.price, Decimal::new(5, 0));

    // buyer pays 500 + fee + tax, seller receives 500 − fee − tax
    let fee = Decimal::new(5, 0);
    let tax = Decimal::new(50, 0);
    assert_eq!(trade.buyer_cost, Decimal::new(500, 0) + fee + tax);
    assert_eq!(trade.seller_proceeds, Decimal::new(500, 0) - fee - tax);

    let buyer = m.ledger.city(CITY_B).unwrap();
    assert_eq!(buyer.currency.total(), Decimal::new(10_000, 0) - trade.buyer_cost);
    assert_eq!(buyer.resource(ResourceCode::Wood).available, 1_100);
    let seller = m.ledger.city(CITY_A).unwrap();
    assert_eq!(seller.currency.total(), Decimal::new(10_000, 0) + trade.seller_proceeds);
    assert_eq!(seller.resource(ResourceCode::Wood).total(), 900);

    assert!(m.book.is_empty());
    verify_supply(&m.ledger.snapshot()).unwrap();
}

#[test]
fn partial_fill_rests_remainder() {
    let mut m = Market::new(Decimal::ZERO);
    m.place(CITY_A, OrderSide::Sell, Decimal::new(5, 0), 50);
    let (buy, outcomes) = m.place(CITY_B, OrderSide::Buy, Decimal::new(5, 0), 80);

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].trade().unwrap().quantity, 50);

    let row = m.ledger.order(buy.id).unwrap();
    assert_eq!(row.status, OrderStatus::Open);
    assert_eq!(row.filled_qty, 50);
    assert_eq!(m.book.best_level(OrderSide::Buy), Some((Decimal::new(5, 0), 30)));

    // the 30 unfilled units are still escrowed
    let buyer = m.ledger.city(CITY_B).unwrap();
    assert_eq!(buyer.currency.reserved, buy.escrow_per_unit * Decimal::from(30u64));
    verify_supply(&m.ledger.snapshot()).unwrap();
}

#[test]
fn cancel_refunds_unfilled_remainder() {
    let mut m = Market::new(Decimal::ZERO);
    let (resting, _) = m.place(CITY_A, OrderSide::Sell, Decimal::new(6, 0), 100);
    m.place(CITY_B, OrderSide::Buy, Decimal::new(6, 0), 30);
    let before = m.ledger.city(CITY_A).unwrap().resource(ResourceCode::Wood);
    assert_eq!(before.reserved, 70);

    let cancelled = m.cancel(resting.id).unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.filled_qty, 30);
    assert_eq!(cancelled.remaining_qty(), 70);

    let after = m.ledger.city(CITY_A).unwrap().resource(ResourceCode::Wood);
    assert_eq!(after.reserved, 0);
    assert_eq!(after.available, before.available + 70);
    assert!(!m.book.contains_order(&resting.id));

    // idempotent
    assert!(m.cancel(resting.id).is_none());
    assert!(m.cancel(OrderId::new()).is_none());
    verify_supply(&m.ledger.snapshot()).unwrap();
}

#[test]
fn cancelled_bid_returns_escrow_in_full() {
    let mut m = Market::new(Decimal::ZERO);
    let (bid, _) = m.place(CITY_B, OrderSide::Buy, Decimal::new(5, 0), 100);
    assert!(m.ledger.city(CITY_B).unwrap().currency.reserved > Decimal::ZERO);

    m.cancel(bid.id).unwrap();
    let buyer = m.ledger.city(CITY_B).unwrap();
    assert_eq!(buyer.currency.reserved, Decimal::ZERO);
    assert_eq!(buyer.currency.available, Decimal::new(10_000, 0));
}

#[test]
fn tax_clamped_to_maximum() {
    let mut m = Market::new(Decimal::new(80, 2));
    m.place(CITY_A, OrderSide::Sell, Decimal::new(10, 0), 10);
    let (_, outcomes) = m.place(CITY_B, OrderSide::Buy, Decimal::new(10, 0), 10);
    let trade = outcomes[0].trade().unwrap();
    // 25% of 100 on each leg
    assert_eq!(trade.tax, Decimal::new(50, 0));
    assert_eq!(m.ledger.treasury(RegionId(1)).unwrap(), Decimal::new(50, 0));
}

#[test]
fn random_flow_conserves_supply() {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut m = Market::new(Decimal::new(7, 2));
    let mut live: Vec<OrderId> = Vec::new();

    for _ in 0..400 {
        if !live.is_empty() && rng.gen_bool(0.15) {
            let idx = rng.gen_range(0..live.len());
            m.cancel(live.swap_remove(idx));
            continue;
        }
        let city = if rng.gen_bool(0.5) { CITY_A } else { CITY_B };
        let side = if rng.gen_bool(0.5) { OrderSide::Buy } else { OrderSide::Sell };
        let price = Decimal::new(rng.gen_range(450..=550), 2);
        let qty = rng.gen_range(1..=20);
        let req = OrderRequest::new(city, ResourceCode::Wood, side, price, qty);
        let Ok(order) = m.ledger.transact(|tx| m.escrow.open(tx, req)) else {
            continue;
        };
        live.push(order.id);
        m.book.insert_order(order).unwrap();
        for fill in match_book(&mut m.book, Utc::now()).unwrap() {
            let outcome = m.engine.settle(&m.ledger, &fill).unwrap();
            if let Some(trade) = outcome.trade() {
                assert_eq!(trade.buyer_cost, trade.seller_proceeds + trade.fee + trade.tax);
            }
        }
        assert!(!m.book.is_crossed());
    }

    let snapshot = m.ledger.snapshot();
    verify_supply(&snapshot).unwrap();
    for order in snapshot.orders.values() {
        assert!(order.filled_qty <= order.quantity);
    }
    // every open order's escrow is accounted for
    let reserved: Decimal = snapshot
        .orders
        .values()
        .filter(|o| o.is_open())
        .map(Order::escrowed_currency)
        .sum();
    let held: Decimal = snapshot.cities.values().map(|c| c.currency.reserved).sum();
    assert_eq!(reserved, held);
}
