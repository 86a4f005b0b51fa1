// src/services/reads.rs

use std::sync::Arc;

use crate::db::models::{BenchmarkPayload, ScannerPayload};
use crate::db::stores::{cache_get_json, BenchmarkStore, Cache, SnapshotStore};
use crate::services::compute::rank_rows;
use crate::utils::errors::ScanError;
use crate::utils::types::Timeframe;

/// Read path behind the HTTP adapter: hot cache first, persistent snapshot
/// store on a miss. Store reads come back symbol-ordered, so rows are
/// re-ranked before serving.
pub struct ScannerReads {
    cache: Arc<dyn Cache>,
    snapshots: Arc<dyn SnapshotStore>,
    benchmarks: Arc<dyn BenchmarkStore>,
}

impl ScannerReads {
    pub fn new(
        cache: Arc<dyn Cache>,
        snapshots: Arc<dyn SnapshotStore>,
        benchmarks: Arc<dyn BenchmarkStore>,
    ) -> Self {
        Self {
            cache,
            snapshots,
            benchmarks,
        }
    }

    pub async fn scanner(&self, timeframe: Timeframe) -> Result<Option<ScannerPayload>, ScanError> {
        let key = format!("scanner:{timeframe}");
        if let Some(payload) = cache_get_json::<ScannerPayload>(self.cache.as_ref(), &key).await {
            return Ok(Some(payload));
        }

        let Some(mut payload) = self.snapshots.latest_snapshot(timeframe).await? else {
            return Ok(None);
        };
        rank_rows(&mut payload.rows);
        Ok(Some(payload))
    }

    /// The scanner payload filtered to one symbol; `None` when there is no
    /// snapshot or the symbol is not in it.
    pub async fn symbol(
        &self,
        timeframe: Timeframe,
        symbol: &str,
    ) -> Result<Option<ScannerPayload>, ScanError> {
        let Some(mut payload) = self.scanner(timeframe).await? else {
            return Ok(None);
        };
        payload.rows.retain(|row| row.symbol == symbol);
        if payload.rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(payload))
    }

    pub async fn benchmarks(
        &self,
        timeframe: Timeframe,
    ) -> Result<Option<BenchmarkPayload>, ScanError> {
        let key = format!("benchmarks:{timeframe}");
        if let Some(payload) = cache_get_json::<BenchmarkPayload>(self.cache.as_ref(), &key).await {
            return Ok(Some(payload));
        }
        self.benchmarks.latest_states(timeframe).await
    }
}
