//! Drive a market with a handful of simulated cities trading concurrently.
//!
//! ```text
//! bourse-sim [config.json] [snapshot.json]
//! ```
//!
//! If the snapshot exists the ledger is restored from it, otherwise a fresh
//! world is seeded. The ledger is written back to the snapshot path on exit.
//! `BOURSE_SIM_SEED` and `BOURSE_SIM_STEPS` tune the run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bourse_ledger::Ledger;
use bourse_market::{CandleBucket, MarketService, spawn_expiry_sweeper};
use bourse_settlement::verify_supply;
use bourse_types::{
    BourseError, CityId, ErrorKind, MarketConfig, OrderId, OrderRequest, OrderSide, RegionId, ResourceCode,
    Result, round_currency,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tracing_subscriber::{EnvFilter, fmt};

const CITIES: u64 = 6;
const STARTING_CURRENCY: i64 = 25_000;
const STARTING_STOCK: u64 = 400;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bourse_market=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => MarketConfig::from_json_file(path)?,
        None => MarketConfig::default(),
    };
    let snapshot: Option<PathBuf> = args.next().map(PathBuf::from);
    let seed = env_or("BOURSE_SIM_SEED", 7);
    let steps = env_or("BOURSE_SIM_STEPS", 250);

    let ledger = match &snapshot {
        Some(path) if path.exists() => Arc::new(Ledger::load_from(path)?),
        _ => {
            let ledger = Arc::new(Ledger::new());
            seed_world(&ledger)?;
            ledger
        }
    };

    let service = Arc::new(MarketService::start(config, ledger.clone())?);
    let sweeper = spawn_expiry_sweeper(
        service.clone(),
        Duration::from_secs(service.config().expiry_sweep_secs.max(1)),
    );

    let mut traders = Vec::new();
    for city in 1..=CITIES {
        let service = service.clone();
        traders.push(tokio::spawn(async move {
            trade_loop(&service, CityId(city), seed.wrapping_add(city), steps).await
        }));
    }
    let mut placed = 0usize;
    for trader in traders {
        placed += trader
            .await
            .map_err(|e| BourseError::Internal(format!("trader task failed: {e}")))?;
    }
    sweeper.abort();

    for resource in ResourceCode::ALL {
        let candles = service.get_trade_history(resource, CandleBucket::FifteenMinutes, 4);
        if candles.is_empty() {
            continue;
        }
        println!("{resource}: {}", serde_json::to_string(&candles)?);
    }

    let report = verify_supply(&ledger.snapshot())?;
    tracing::info!(
        placed,
        city_currency = %report.city_currency,
        treasuries = %report.treasuries,
        fee_pool = %report.fee_pool,
        "Supply conserved"
    );

    service.shutdown();
    if let Some(path) = snapshot {
        ledger.save_to(&path)?;
    }
    Ok(())
}

fn env_or(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Three regions with different tax rates, two cities each.
fn seed_world(ledger: &Ledger) -> Result<()> {
    for (region, rate) in [(1, 0), (2, 5), (3, 10)] {
        ledger.set_region_tax_rate(RegionId(region), Decimal::new(rate, 2))?;
    }
    for city in 1..=CITIES {
        let region = RegionId(u32::try_from((city - 1) / 2 + 1).unwrap_or(1));
        ledger.open_city(CityId(city), region)?;
        ledger.deposit_currency(CityId(city), Decimal::new(STARTING_CURRENCY, 0))?;
        for resource in ResourceCode::ALL {
            ledger.deposit_resource(CityId(city), resource, STARTING_STOCK)?;
        }
    }
    tracing::info!(cities = CITIES, "World seeded");
    Ok(())
}

/// Place, cancel and quick-trade at random. Business rejections are
/// expected and only logged. Returns the number of orders accepted.
async fn trade_loop(service: &MarketService, city: CityId, seed: u64, steps: u64) -> usize {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut mine: Vec<OrderId> = Vec::new();
    let mut accepted = 0;

    for _ in 0..steps {
        let resource = ResourceCode::ALL[rng.gen_range(0..ResourceCode::ALL.len())];
        let side = if rng.gen_bool(0.5) { OrderSide::Buy } else { OrderSide::Sell };
        let quantity = rng.gen_range(1..=20);

        let outcome = match rng.gen_range(0..10) {
            0 => match mine.pop() {
                Some(order_id) => service.cancel_order(order_id).await.map(|_| None),
                None => Ok(None),
            },
            1 => {
                let quick = match side {
                    OrderSide::Buy => service.quick_buy(city, resource, quantity).await,
                    OrderSide::Sell => service.quick_sell(city, resource, quantity).await,
                };
                quick.map(Some)
            }
            _ => {
                let Ok(band) = service.price_band(resource) else {
                    continue;
                };
                let spread = band.max_price - band.min_price;
                let price = round_currency(band.min_price + spread * Decimal::new(rng.gen_range(0..=100), 2));
                let mut request = OrderRequest::new(city, resource, side, price, quantity);
                if rng.gen_bool(0.2) {
                    request = request.with_time_in_force(rng.gen_range(1..=5));
                }
                service.place_order(request).await.map(Some)
            }
        };

        match outcome {
            Ok(Some(result)) => {
                accepted += 1;
                mine.push(result.order_id);
            }
            Ok(None) => {}
            Err(e) if e.kind() == ErrorKind::ActorUnavailable => {
                tracing::warn!(%city, error = %e, "Market unavailable, stopping trader");
                break;
            }
            Err(e) => tracing::debug!(%city, kind = %e.kind(), error = %e, "Rejected"),
        }
    }
    accepted
}
