use std::sync::Arc;
use chrono::Duration as ChronoDuration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{debug, info, instrument};

use crate::RebalanceWorkerConfig;
use crate::services::engine::QueueEngine;

/// Background task that keeps every queue in step with elapsed wait time and
/// drops finished entries once they age out.
pub struct RebalanceWorker {
    worker_id: String,
    config: RebalanceWorkerConfig,
    engine: Arc<QueueEngine>,
    is_shutdown: Arc<RwLock<bool>>,
    shutdown_signal: Arc<Notify>,
}

impl RebalanceWorker {
    pub fn new(config: RebalanceWorkerConfig, engine: Arc<QueueEngine>) -> Self {
        Self {
            worker_id: config.worker_id.clone(),
            config,
            engine,
            is_shutdown: Arc::new(RwLock::new(false)),
            shutdown_signal: Arc::new(Notify::new()),
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn run(&self) {
        info!(
            "Starting rebalance worker {} (every {}s)",
            self.worker_id, self.config.interval_seconds
        );

        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_seconds.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.shutdown_signal.notified() => break,
            }

            if *self.is_shutdown.read().await {
                break;
            }

            self.run_once().await;
        }

        info!("Rebalance worker {} stopped", self.worker_id);
    }

    /// One pass: rebalance all doctors, then purge aged-out entries.
    pub async fn run_once(&self) -> (usize, usize) {
        let reordered = self.engine.rebalance_all().await;
        let purged = self
            .engine
            .purge_finished(ChronoDuration::minutes(self.config.finished_retention_minutes))
            .await;

        debug!(
            "Rebalance pass complete: {} queues reordered, {} finished entries purged",
            reordered, purged
        );
        (reordered, purged)
    }

    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown for rebalance worker {}", self.worker_id);
        let mut is_shutdown = self.is_shutdown.write().await;
        *is_shutdown = true;
        // Stored as a permit if the loop is mid-pass, so the next wait returns at once.
        self.shutdown_signal.notify_one();
    }

    pub async fn is_shutdown(&self) -> bool {
        *self.is_shutdown.read().await
    }
}
