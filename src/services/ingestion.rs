// src/services/ingestion.rs

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use metrics::{counter, increment_counter};
use tracing::{info, warn};

use crate::config::settings::Settings;
use crate::db::models::CandleSeries;
use crate::db::stores::{cache_set_json, Cache, CandleStore, WatchlistStore};
use crate::services::groww::MarketDataClient;
use crate::services::rate_limit::RateLimiter;
use crate::services::retries::RetryPolicy;
use crate::utils::errors::ScanError;
use crate::utils::types::Timeframe;

/// Periodic candle ingestion for one timeframe: resolve the active symbol
/// set, fetch a provider-bounded window per symbol, upsert, and refresh the
/// hot cache. Per-symbol fetch failures skip that symbol; store failures are
/// fatal for the tick.
pub struct IngestionService {
    settings: Settings,
    client: Arc<dyn MarketDataClient>,
    candles: Arc<dyn CandleStore>,
    cache: Arc<dyn Cache>,
    watchlists: Arc<dyn WatchlistStore>,
    rate_limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicy,
}

impl IngestionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Settings,
        client: Arc<dyn MarketDataClient>,
        candles: Arc<dyn CandleStore>,
        cache: Arc<dyn Cache>,
        watchlists: Arc<dyn WatchlistStore>,
        rate_limiter: Arc<RateLimiter>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            settings,
            client,
            candles,
            cache,
            watchlists,
            rate_limiter,
            retry_policy,
        }
    }

    pub async fn run_once(&self, timeframe: Timeframe) -> Result<(), ScanError> {
        let symbols = self.symbols().await?;

        let minutes = timeframe.minutes() as u64;
        let bars = (self.settings.ingest_bars as u64)
            .min(timeframe.max_days() as u64 * 1440 / minutes);
        let end = Utc::now();
        let start = end - Duration::minutes((bars * minutes) as i64);

        info!(
            timeframe = %timeframe,
            symbols = symbols.len(),
            start = %start,
            end = %end,
            "ingestion start"
        );

        let mut fetched_ok = 0usize;
        let mut skipped = 0usize;

        for symbol in &symbols {
            self.rate_limiter.acquire().await;

            let fetched = self
                .retry_policy
                .run(|| self.client.fetch_candles(symbol, timeframe, start, end))
                .await;

            let candles = match fetched {
                Ok(candles) if candles.is_empty() => {
                    warn!(symbol = %symbol, timeframe = %timeframe, "no candles returned");
                    skipped += 1;
                    continue;
                }
                Ok(candles) => candles,
                Err(e) => {
                    warn!(symbol = %symbol, timeframe = %timeframe, error = %e, "fetch failed, skipping symbol");
                    increment_counter!("relscan_ingest_fetch_failures_total");
                    skipped += 1;
                    continue;
                }
            };

            self.candles
                .upsert_candles(symbol, timeframe, &candles)
                .await?;
            counter!("relscan_candles_upserted_total", candles.len() as u64);

            let series = CandleSeries::from_candles(&candles);
            let key = format!("candles:{symbol}:{timeframe}");
            cache_set_json(self.cache.as_ref(), &key, &series, None).await;
            fetched_ok += 1;
        }

        info!(
            timeframe = %timeframe,
            ok = fetched_ok,
            skipped,
            "ingestion complete"
        );
        Ok(())
    }

    /// Active stocks ∪ active indices' data symbols ∪ mapped index symbols ∪
    /// the default benchmark, deduplicated and sorted.
    async fn symbols(&self) -> Result<Vec<String>, ScanError> {
        let mut set = BTreeSet::new();
        set.extend(self.watchlists.active_stock_symbols().await?);
        set.extend(self.watchlists.active_index_data_symbols().await?);
        set.extend(self.watchlists.mapped_index_symbols().await?);
        set.insert(self.settings.nifty_symbol.clone());
        Ok(set.into_iter().collect())
    }
}
