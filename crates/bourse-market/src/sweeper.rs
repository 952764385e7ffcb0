//! Periodic expiry sweep.
//!
//! Expiry is already applied lazily whenever a book worker handles a
//! command. The sweeper catches orders on quiet resources that no command
//! has touched.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::MarketService;

/// Sweep every `period` until the returned task is aborted.
pub fn spawn_expiry_sweeper(service: Arc<MarketService>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match service.sweep_expired().await {
                Ok(0) => {}
                Ok(expired) => tracing::info!(expired, "Expiry sweep"),
                Err(e) => tracing::warn!(error = %e, "Expiry sweep failed"),
            }
        }
    })
}
