// tests/pipeline.rs
//
// End-to-end tick over in-memory fakes: ingest a monotone ramp for
// {A, B, BENCH}, compute the 5m snapshot, and check the cache, the stores,
// and the broadcast side effects.

mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use relscan_backend::config::settings::Settings;
use relscan_backend::db::models::{BenchmarkPayload, Candle, ScannerPayload};
use relscan_backend::db::stores::{
    cache_get_json, BenchmarkStore, Cache, CandleStore, SnapshotStore, WatchlistStore,
};
use relscan_backend::services::broadcaster::Broadcaster;
use relscan_backend::services::compute::ComputeService;
use relscan_backend::services::groww::MarketDataClient;
use relscan_backend::services::ingestion::IngestionService;
use relscan_backend::services::rate_limit::RateLimiter;
use relscan_backend::services::retries::RetryPolicy;
use relscan_backend::utils::types::{Regime, Signal, Timeframe};

use support::{
    FakeProvider, MemoryBenchmarkStore, MemoryCache, MemoryCandleStore, MemorySnapshotStore,
    MemoryWatchlists,
};

fn test_settings() -> Settings {
    Settings {
        ingest_bars: 50,
        compute_bars: 50,
        nifty_symbol: "BENCH".into(),
        ..Settings::default()
    }
}

struct Harness {
    cache: Arc<dyn Cache>,
    candles: Arc<MemoryCandleStore>,
    snapshots: Arc<MemorySnapshotStore>,
    benchmarks: Arc<MemoryBenchmarkStore>,
    broadcaster: Arc<Broadcaster>,
    ingestion: IngestionService,
    compute: ComputeService,
}

fn harness(stocks: &[&str]) -> Harness {
    let settings = test_settings();
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::default());
    let candles = Arc::new(MemoryCandleStore::default());
    let snapshots = Arc::new(MemorySnapshotStore::default());
    let benchmarks = Arc::new(MemoryBenchmarkStore::default());
    let watchlists: Arc<dyn WatchlistStore> = Arc::new(MemoryWatchlists::new(stocks));
    let broadcaster = Arc::new(Broadcaster::new());

    let ingestion = IngestionService::new(
        settings.clone(),
        Arc::new(FakeProvider),
        candles.clone() as Arc<dyn CandleStore>,
        cache.clone(),
        watchlists.clone(),
        Arc::new(RateLimiter::new(1000, 1000)),
        RetryPolicy::new(1, Duration::from_millis(10), Duration::from_millis(10)),
    );
    let compute = ComputeService::new(
        settings,
        candles.clone() as Arc<dyn CandleStore>,
        snapshots.clone() as Arc<dyn SnapshotStore>,
        benchmarks.clone() as Arc<dyn BenchmarkStore>,
        cache.clone(),
        watchlists,
        broadcaster.clone(),
    );

    Harness {
        cache,
        candles,
        snapshots,
        benchmarks,
        broadcaster,
        ingestion,
        compute,
    }
}

#[tokio::test]
async fn end_to_end_tick_builds_ranked_snapshot() {
    let h = harness(&["A", "B"]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    h.broadcaster.register(Timeframe::M5, Uuid::new_v4(), tx);

    h.ingestion.run_once(Timeframe::M5).await.unwrap();
    h.compute.compute_timeframe(Timeframe::M5).await.unwrap();

    // Hot cache holds the ranked snapshot.
    let payload: ScannerPayload = cache_get_json(h.cache.as_ref(), "scanner:5m")
        .await
        .expect("scanner payload cached");
    assert_eq!(payload.timeframe, Timeframe::M5);
    assert!(!payload.rows.is_empty());
    assert_eq!(payload.rows.len(), 2);

    for row in &payload.rows {
        assert_eq!(row.benchmark_symbol, "BENCH");
        assert!(row.rrs.is_finite());
        assert!(row.rrv.is_finite());
        assert!(row.rve.is_finite());
    }

    // Documented ranking order, with symbol as the final tie-breaker.
    for pair in payload.rows.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(a.signal.rank() <= b.signal.rank());
        if a.signal.rank() == b.signal.rank() && a.rrs.abs() == b.rrs.abs() {
            assert!(a.symbol <= b.symbol);
        }
    }
    assert_eq!(payload.rows[0].symbol, "A");

    // Snapshot row count equals the symbols with enough aligned history.
    let stored = h
        .snapshots
        .latest_snapshot(Timeframe::M5)
        .await
        .unwrap()
        .expect("snapshot persisted");
    assert_eq!(stored.rows.len(), 2);

    // Benchmark states are cached and persisted; the ramp is bullish.
    let bench: BenchmarkPayload = cache_get_json(h.cache.as_ref(), "benchmarks:5m")
        .await
        .expect("benchmark payload cached");
    assert_eq!(bench.states.len(), 1);
    assert_eq!(bench.states[0].benchmark, "BENCH");
    assert_eq!(bench.states[0].regime, Regime::Bullish);
    assert!(h
        .benchmarks
        .latest_states(Timeframe::M5)
        .await
        .unwrap()
        .is_some());

    // Subscribed streaming client received exactly the cached payload.
    let pushed = rx.try_recv().expect("broadcast message");
    let pushed: ScannerPayload = serde_json::from_str(&pushed).unwrap();
    assert_eq!(pushed.rows.len(), payload.rows.len());
}

#[tokio::test]
async fn symbols_without_history_are_omitted_not_fatal() {
    let h = harness(&["A", "GHOST"]);

    // Seed candles for A and the benchmark only; GHOST has no history.
    let end = Utc::now();
    let start = end - chrono::Duration::minutes(50 * 5);
    let bars = FakeProvider
        .fetch_candles("A", Timeframe::M5, start, end)
        .await
        .unwrap();
    h.candles
        .upsert_candles("A", Timeframe::M5, &bars)
        .await
        .unwrap();
    h.candles
        .upsert_candles("BENCH", Timeframe::M5, &bars)
        .await
        .unwrap();

    h.compute.compute_timeframe(Timeframe::M5).await.unwrap();

    let payload: ScannerPayload = cache_get_json(h.cache.as_ref(), "scanner:5m")
        .await
        .unwrap();
    let symbols: Vec<&str> = payload.rows.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["A"]);
}

#[tokio::test]
async fn missing_default_benchmark_still_produces_empty_snapshot() {
    let h = harness(&["A"]);

    // No ingest at all: no candles for anything, benchmark included.
    h.compute.compute_timeframe(Timeframe::M5).await.unwrap();

    let payload: ScannerPayload = cache_get_json(h.cache.as_ref(), "scanner:5m")
        .await
        .expect("well-formed empty snapshot cached");
    assert!(payload.rows.is_empty());

    let bench: BenchmarkPayload = cache_get_json(h.cache.as_ref(), "benchmarks:5m")
        .await
        .unwrap();
    assert_eq!(bench.states[0].regime, Regime::NoData);
}

#[tokio::test]
async fn candle_upsert_is_idempotent() {
    let store = MemoryCandleStore::default();
    let batch: Vec<Candle> = (0..10)
        .map(|i| Candle {
            ts: Utc::now() + chrono::Duration::minutes(i * 5),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 1000.0,
            source: "fake".into(),
        })
        .collect();

    store
        .upsert_candles("A", Timeframe::M5, &batch)
        .await
        .unwrap();
    store
        .upsert_candles("A", Timeframe::M5, &batch)
        .await
        .unwrap();

    let window = store.latest_window("A", Timeframe::M5, 100).await.unwrap();
    assert_eq!(window.len(), 10);
}

#[tokio::test]
async fn classify_is_reachable_from_snapshot_rows() {
    let h = harness(&["A"]);
    h.ingestion.run_once(Timeframe::M5).await.unwrap();
    h.compute.compute_timeframe(Timeframe::M5).await.unwrap();

    let payload: ScannerPayload = cache_get_json(h.cache.as_ref(), "scanner:5m")
        .await
        .unwrap();
    // A ramp identical to its benchmark carries no relative edge.
    assert_eq!(payload.rows[0].signal, Signal::Neutral);
}
