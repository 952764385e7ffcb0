//! Randomized invariant checks for the order book and matcher.

use std::collections::HashMap;

use bourse_matchcore::{OrderBook, compute_fill_root, match_book};
use bourse_types::*;
use chrono::{Duration, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rust_decimal::Decimal;

fn random_orders(seed: u64, count: usize) -> Vec<Order> {
    let mut rng = StdRng::seed_from_u64(seed);
    let base = Utc::now();
    (0..count)
        .map(|i| {
            let side = if rng.gen_bool(0.5) { OrderSide::Buy } else { OrderSide::Sell };
            let price = Decimal::new(rng.gen_range(80..=120), 1);
            let qty = rng.gen_range(1..=50);
            let city = CityId(rng.gen_range(1..=5));
            let mut order = Order::dummy_for_city(city, side, price, qty);
            order.id = OrderId::from_bytes((i as u128 + 1).to_be_bytes());
            order.created_at = base + Duration::milliseconds(i64::try_from(i).unwrap());
            order
        })
        .collect()
}

fn replay(orders: &[Order]) -> (OrderBook, Vec<Fill>) {
    let mut book = OrderBook::new(ResourceCode::Wood);
    let mut fills = Vec::new();
    for order in orders {
        book.insert_order(order.clone()).unwrap();
        fills.extend(match_book(&mut book, order.created_at).unwrap());
        assert!(!book.is_crossed(), "book crossed after matching");
    }
    (book, fills)
}

#[test]
fn book_never_crossed_and_fills_bounded() {
    for seed in 0..20 {
        let orders = random_orders(seed, 300);
        let (book, fills) = replay(&orders);

        let mut filled: HashMap<OrderId, u64> = HashMap::new();
        for fill in &fills {
            assert!(fill.quantity > 0);
            *filled.entry(fill.buy_order_id).or_default() += fill.quantity;
            *filled.entry(fill.sell_order_id).or_default() += fill.quantity;
        }

        for order in &orders {
            let total = filled.get(&order.id).copied().unwrap_or(0);
            assert!(total <= order.quantity, "order {} overfilled", order.id);
            match book.get(&order.id) {
                Some(resting) => {
                    assert_eq!(resting.filled_qty, total);
                    assert!(resting.filled_qty < resting.quantity);
                }
                None => assert_eq!(total, order.quantity, "evicted order not fully filled"),
            }
        }
    }
}

#[test]
fn fills_execute_at_a_crossing_maker_price() {
    let orders = random_orders(42, 200);
    let by_id: HashMap<OrderId, &Order> = orders.iter().map(|o| (o.id, o)).collect();
    let (_, fills) = replay(&orders);

    for fill in &fills {
        let bid = by_id[&fill.buy_order_id];
        let ask = by_id[&fill.sell_order_id];
        assert!(bid.price >= ask.price);
        let maker = by_id[&fill.order_on(fill.maker_side)];
        assert_eq!(fill.price, maker.price);
        assert!(fill.price >= ask.price && fill.price <= bid.price);
    }
}

#[test]
fn replay_is_deterministic() {
    let orders = random_orders(7, 250);
    let (_, first) = replay(&orders);
    let (_, second) = replay(&orders);
    assert!(!first.is_empty());
    assert_eq!(compute_fill_root(&first), compute_fill_root(&second));
}
