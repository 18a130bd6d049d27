use std::{sync::Arc, time::Duration};

use chrono::Utc;
use log::*;
use tokio::task::JoinHandle;
use vending_engine::VendingPipeline;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Starts the maintenance worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every minute the worker drops resolved order tokens that have outlived the idempotency retention period, and
/// reports how many devices are currently live.
pub fn start_maintenance_worker<B, P>(pipeline: Arc<VendingPipeline<B, P>>) -> JoinHandle<()>
where
    B: Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(MAINTENANCE_INTERVAL);
        info!("🧹️ Maintenance worker started");
        loop {
            timer.tick().await;
            run_maintenance(&pipeline);
        }
    })
}

/// A single maintenance pass. Returns the number of tokens evicted.
pub fn run_maintenance<B, P>(pipeline: &VendingPipeline<B, P>) -> usize {
    let now = Utc::now();
    let evicted = pipeline.evict_expired(now);
    if evicted > 0 {
        info!("🧹️ {evicted} expired order tokens evicted. {} still tracked", pipeline.tracked_tokens());
    }
    let devices = pipeline.device_snapshot(now);
    let live = devices.iter().filter(|d| d.is_live).count();
    debug!("🧹️ {live} of {} devices are live", devices.len());
    evicted
}
