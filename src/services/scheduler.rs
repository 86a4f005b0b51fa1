// src/services/scheduler.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::{abortable, AbortHandle};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::settings::Settings;
use crate::services::compute::ComputeService;
use crate::services::ingestion::IngestionService;
use crate::services::market_hours::is_market_open;
use crate::utils::types::Timeframe;

/// Drives the periodic pipeline: per configured timeframe, one ingest loop
/// and one compute loop, each behind the market-hours gate.
///
/// All ingest ticks share one mutex and all compute ticks share another, so
/// the upstream provider and the database never see the same workflow twice
/// concurrently. Interval timers use delayed missed-tick behavior: a tick
/// that outlives its interval runs once when the mutex frees up instead of
/// queueing a backlog.
pub struct Scheduler {
    settings: Settings,
    ingestion: Arc<IngestionService>,
    compute: Arc<ComputeService>,
    ingest_lock: Arc<Mutex<()>>,
    compute_lock: Arc<Mutex<()>>,
    handles: std::sync::Mutex<Vec<AbortHandle>>,
}

impl Scheduler {
    pub fn new(
        settings: Settings,
        ingestion: Arc<IngestionService>,
        compute: Arc<ComputeService>,
    ) -> Self {
        Self {
            settings,
            ingestion,
            compute,
            ingest_lock: Arc::new(Mutex::new(())),
            compute_lock: Arc::new(Mutex::new(())),
            handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Spawns every loop; calling twice is a no-op.
    pub fn start(&self) -> anyhow::Result<()> {
        let mut handles = self.handles.lock().expect("scheduler handle lock");
        if !handles.is_empty() {
            return Ok(());
        }

        for timeframe in self.settings.timeframes()? {
            info!(timeframe = %timeframe, "scheduler loops starting");

            let (ingest_fut, ingest_handle) = abortable(Self::ingest_loop(
                self.settings.clone(),
                self.ingestion.clone(),
                self.ingest_lock.clone(),
                timeframe,
            ));
            tokio::spawn(ingest_fut);
            handles.push(ingest_handle);

            let (compute_fut, compute_handle) = abortable(Self::compute_loop(
                self.settings.clone(),
                self.compute.clone(),
                self.compute_lock.clone(),
                timeframe,
            ));
            tokio::spawn(compute_fut);
            handles.push(compute_handle);
        }
        Ok(())
    }

    /// Cancels every loop at its next suspension point. In-flight awaits are
    /// dropped; loops are never restarted after a stop.
    pub fn stop(&self) {
        let mut handles = self.handles.lock().expect("scheduler handle lock");
        for handle in handles.drain(..) {
            handle.abort();
        }
        info!("scheduler stopped");
    }

    async fn ingest_loop(
        settings: Settings,
        ingestion: Arc<IngestionService>,
        lock: Arc<Mutex<()>>,
        timeframe: Timeframe,
    ) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(settings.scheduler_ingest_interval_sec));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !is_market_open(Utc::now(), &settings) {
                debug!(timeframe = %timeframe, "market closed, skipping ingestion");
                continue;
            }

            let _guard = lock.lock().await;
            if let Err(e) = ingestion.run_once(timeframe).await {
                error!(timeframe = %timeframe, error = %e, "ingestion tick failed");
            }
        }
    }

    async fn compute_loop(
        settings: Settings,
        compute: Arc<ComputeService>,
        lock: Arc<Mutex<()>>,
        timeframe: Timeframe,
    ) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(settings.scheduler_compute_interval_sec));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !is_market_open(Utc::now(), &settings) {
                debug!(timeframe = %timeframe, "market closed, skipping compute");
                continue;
            }

            let _guard = lock.lock().await;
            if let Err(e) = compute.compute_timeframe(timeframe).await {
                error!(timeframe = %timeframe, error = %e, "compute tick failed");
            }
        }
    }
}
