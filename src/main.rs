use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware::Logger, web, App, HttpServer};
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use relscan_backend::{
    config::settings::Settings,
    db::{
        queries::{PgBenchmarkStore, PgCandleStore, PgSnapshotStore, PgWatchlistStore},
        redis::RedisCache,
        stores::{BenchmarkStore, Cache, CandleStore, SnapshotStore, WatchlistStore},
    },
    routes::{
        health::health_scope,
        scanner::{benchmarks, relative_metrics, scanner, symbol_detail},
        ws::ws_scanner,
    },
    services::{
        broadcaster::Broadcaster,
        candles::CandlesLoader,
        compute::ComputeService,
        groww::{GrowwClient, MarketDataClient},
        ingestion::IngestionService,
        rate_limit::RateLimiter,
        reads::ScannerReads,
        relative::RelativeMetricsService,
        retries::RetryPolicy,
        scheduler::Scheduler,
    },
};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = Settings::from_env()?;
    info!(port = settings.server_port, "starting relscan backend");

    if let Err(e) = PrometheusBuilder::new().install() {
        warn!(error = %e, "prometheus exporter not started");
    }

    let pg_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await?;

    let cache: Arc<dyn Cache> = Arc::new(RedisCache::new(&settings.redis_url).await?);

    let candle_store: Arc<dyn CandleStore> = Arc::new(PgCandleStore::new(pg_pool.clone()));
    let snapshot_store: Arc<dyn SnapshotStore> = Arc::new(PgSnapshotStore::new(pg_pool.clone()));
    let benchmark_store: Arc<dyn BenchmarkStore> = Arc::new(PgBenchmarkStore::new(pg_pool.clone()));
    let watchlists: Arc<dyn WatchlistStore> = Arc::new(PgWatchlistStore::new(pg_pool.clone()));

    // The default market index must exist before the first tick resolves
    // benchmark mappings.
    watchlists.ensure_default_index(&settings.nifty_symbol).await?;

    let provider: Arc<dyn MarketDataClient> = Arc::new(GrowwClient::new(&settings));
    let rate_limiter = Arc::new(RateLimiter::new(
        settings.rate_limit_per_sec,
        settings.rate_limit_per_min,
    ));
    let retry_policy = RetryPolicy::new(4, Duration::from_millis(500), Duration::from_secs(6));
    let broadcaster = Arc::new(Broadcaster::new());

    let ingestion = Arc::new(IngestionService::new(
        settings.clone(),
        provider,
        candle_store.clone(),
        cache.clone(),
        watchlists.clone(),
        rate_limiter,
        retry_policy,
    ));
    let compute = Arc::new(ComputeService::new(
        settings.clone(),
        candle_store.clone(),
        snapshot_store.clone(),
        benchmark_store.clone(),
        cache.clone(),
        watchlists.clone(),
        broadcaster.clone(),
    ));

    let scheduler = Arc::new(Scheduler::new(settings.clone(), ingestion, compute));
    scheduler.start()?;

    let reads = web::Data::new(ScannerReads::new(
        cache.clone(),
        snapshot_store.clone(),
        benchmark_store.clone(),
    ));
    let relative = web::Data::new(RelativeMetricsService::new(
        settings.clone(),
        watchlists.clone(),
        cache.clone(),
        CandlesLoader::new(candle_store.clone(), cache.clone()),
    ));
    let broadcaster_data = web::Data::from(broadcaster.clone());

    let port = settings.server_port;
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(reads.clone())
            .app_data(relative.clone())
            .app_data(broadcaster_data.clone())
            .service(health_scope())
            .service(scanner)
            .service(symbol_detail)
            .service(benchmarks)
            .service(relative_metrics)
            .service(ws_scanner)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    scheduler.stop();
    Ok(())
}
