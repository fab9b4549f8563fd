//! Periodic hard-delete of products whose restore window has passed.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::services::Catalog;
use crate::Result;

pub struct SoftDeleteSweeper {
    catalog: Catalog,
    interval: Duration,
    stop_signal: watch::Receiver<bool>,
}

impl SoftDeleteSweeper {
    pub fn new(catalog: Catalog, interval: Duration, stop_signal: watch::Receiver<bool>) -> Self {
        Self { catalog, interval, stop_signal }
    }

    pub async fn run_once(&self) -> Result<u64> {
        self.catalog.purge_expired(Utc::now()).await
    }

    /// Sweeps on every tick until the stop signal turns true or its sender goes away.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(0) => debug!("Sweep found nothing to purge"),
                        Ok(purged) => info!(purged, "Purged expired products"),
                        Err(e) => error!(error = %e, "Product sweep failed"),
                    }
                }
                changed = self.stop_signal.changed() => {
                    if changed.is_err() || *self.stop_signal.borrow() {
                        info!("Product sweeper stopped");
                        break;
                    }
                }
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
