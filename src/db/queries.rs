// src/db/queries.rs

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::db::models::{
    BenchmarkPayload, BenchmarkStateRow, Candle, ScannerPayload, ScannerRow, WatchIndex,
};
use crate::db::stores::{BenchmarkStore, CandleStore, SnapshotStore, WatchlistStore};
use crate::utils::errors::ScanError;
use crate::utils::types::{Regime, Signal, Timeframe};

/* ----------------------- CANDLES ----------------------- */

pub struct PgCandleStore {
    pool: PgPool,
}

impl PgCandleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct SymbolCandle {
    symbol: String,
    ts: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    source: String,
}

#[async_trait]
impl CandleStore for PgCandleStore {
    async fn upsert_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<(), ScanError> {
        if candles.is_empty() {
            return Ok(());
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO candles (symbol, timeframe, ts, open, high, low, close, volume, source) ",
        );
        qb.push_values(candles, |mut b, c| {
            b.push_bind(symbol)
                .push_bind(timeframe.as_str())
                .push_bind(c.ts)
                .push_bind(c.open)
                .push_bind(c.high)
                .push_bind(c.low)
                .push_bind(c.close)
                .push_bind(c.volume)
                .push_bind(&c.source);
        });
        qb.push(
            " ON CONFLICT (symbol, timeframe, ts) DO UPDATE SET \
             open = EXCLUDED.open, high = EXCLUDED.high, low = EXCLUDED.low, \
             close = EXCLUDED.close, volume = EXCLUDED.volume, source = EXCLUDED.source",
        );
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn latest_window(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, ScanError> {
        let mut rows = sqlx::query_as::<_, Candle>(
            r#"
            SELECT ts, open, high, low, close, volume, source
            FROM   candles
            WHERE  symbol = $1
              AND  timeframe = $2
            ORDER  BY ts DESC
            LIMIT  $3
            "#,
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.reverse();
        Ok(rows)
    }

    async fn latest_batch(
        &self,
        symbols: &[String],
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<HashMap<String, Vec<Candle>>, ScanError> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, SymbolCandle>(
            r#"
            SELECT symbol, ts, open, high, low, close, volume, source
            FROM (
                SELECT symbol, ts, open, high, low, close, volume, source,
                       row_number() OVER (PARTITION BY symbol ORDER BY ts DESC) AS rn
                FROM   candles
                WHERE  symbol = ANY($1)
                  AND  timeframe = $2
            ) windowed
            WHERE  rn <= $3
            ORDER  BY symbol ASC, ts ASC
            "#,
        )
        .bind(symbols)
        .bind(timeframe.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<String, Vec<Candle>> = HashMap::new();
        for row in rows {
            grouped.entry(row.symbol).or_default().push(Candle {
                ts: row.ts,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
                source: row.source,
            });
        }
        Ok(grouped)
    }
}

/* ---------------------- SNAPSHOTS ---------------------- */

pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct SnapshotRecord {
    symbol: String,
    benchmark_symbol: String,
    rrs: f64,
    rrv: f64,
    rve: f64,
    signal: String,
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn save_snapshot(
        &self,
        timeframe: Timeframe,
        ts: DateTime<Utc>,
        rows: &[ScannerRow],
    ) -> Result<(), ScanError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO scanner_snapshot (ts, timeframe, symbol, benchmark_symbol, rrs, rrv, rve, signal) ",
        );
        qb.push_values(rows, |mut b, r| {
            b.push_bind(ts)
                .push_bind(timeframe.as_str())
                .push_bind(&r.symbol)
                .push_bind(&r.benchmark_symbol)
                .push_bind(r.rrs)
                .push_bind(r.rrv)
                .push_bind(r.rve)
                .push_bind(r.signal.as_str());
        });
        qb.push(
            " ON CONFLICT (ts, timeframe, symbol) DO UPDATE SET \
             benchmark_symbol = EXCLUDED.benchmark_symbol, rrs = EXCLUDED.rrs, \
             rrv = EXCLUDED.rrv, rve = EXCLUDED.rve, signal = EXCLUDED.signal",
        );
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn latest_snapshot(
        &self,
        timeframe: Timeframe,
    ) -> Result<Option<ScannerPayload>, ScanError> {
        // One transaction so max(ts) and its rows are a consistent view.
        let mut tx = self.pool.begin().await?;

        let ts: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT max(ts) FROM scanner_snapshot WHERE timeframe = $1",
        )
        .bind(timeframe.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let Some(ts) = ts else {
            tx.commit().await?;
            return Ok(None);
        };

        let records = sqlx::query_as::<_, SnapshotRecord>(
            r#"
            SELECT symbol, benchmark_symbol, rrs, rrv, rve, signal
            FROM   scanner_snapshot
            WHERE  timeframe = $1
              AND  ts = $2
            ORDER  BY symbol ASC
            "#,
        )
        .bind(timeframe.as_str())
        .bind(ts)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let rows = records
            .into_iter()
            .map(|r| ScannerRow {
                symbol: r.symbol,
                timeframe,
                benchmark_symbol: r.benchmark_symbol,
                rrs: r.rrs,
                rrv: r.rrv,
                rve: r.rve,
                signal: Signal::from_str(&r.signal).unwrap_or(Signal::NoData),
            })
            .collect();

        Ok(Some(ScannerPayload {
            timeframe,
            ts,
            rows,
        }))
    }
}

/* ------------------- BENCHMARK STATES ------------------ */

pub struct PgBenchmarkStore {
    pool: PgPool,
}

impl PgBenchmarkStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct BenchmarkRecord {
    benchmark: String,
    regime: String,
    trend: f64,
    vol_expansion: f64,
    participation: f64,
}

#[async_trait]
impl BenchmarkStore for PgBenchmarkStore {
    async fn save_states(
        &self,
        timeframe: Timeframe,
        ts: DateTime<Utc>,
        states: &[BenchmarkStateRow],
    ) -> Result<(), ScanError> {
        if states.is_empty() {
            return Ok(());
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO benchmark_state (ts, timeframe, benchmark, regime, trend, vol_expansion, participation) ",
        );
        qb.push_values(states, |mut b, s| {
            b.push_bind(ts)
                .push_bind(timeframe.as_str())
                .push_bind(&s.benchmark)
                .push_bind(s.regime.as_str())
                .push_bind(s.trend)
                .push_bind(s.vol_expansion)
                .push_bind(s.participation);
        });
        qb.push(
            " ON CONFLICT (ts, timeframe, benchmark) DO UPDATE SET \
             regime = EXCLUDED.regime, trend = EXCLUDED.trend, \
             vol_expansion = EXCLUDED.vol_expansion, participation = EXCLUDED.participation",
        );
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn latest_states(
        &self,
        timeframe: Timeframe,
    ) -> Result<Option<BenchmarkPayload>, ScanError> {
        let mut tx = self.pool.begin().await?;

        let ts: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT max(ts) FROM benchmark_state WHERE timeframe = $1",
        )
        .bind(timeframe.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let Some(ts) = ts else {
            tx.commit().await?;
            return Ok(None);
        };

        let records = sqlx::query_as::<_, BenchmarkRecord>(
            r#"
            SELECT benchmark, regime, trend, vol_expansion, participation
            FROM   benchmark_state
            WHERE  timeframe = $1
              AND  ts = $2
            ORDER  BY benchmark ASC
            "#,
        )
        .bind(timeframe.as_str())
        .bind(ts)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let states = records
            .into_iter()
            .map(|r| BenchmarkStateRow {
                benchmark: r.benchmark,
                regime: Regime::from_str(&r.regime).unwrap_or(Regime::NoData),
                trend: r.trend,
                vol_expansion: r.vol_expansion,
                participation: r.participation,
            })
            .collect();

        Ok(Some(BenchmarkPayload {
            timeframe,
            ts,
            states,
        }))
    }
}

/* ---------------------- WATCHLISTS --------------------- */

pub struct PgWatchlistStore {
    pool: PgPool,
}

impl PgWatchlistStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WatchlistStore for PgWatchlistStore {
    async fn active_stock_symbols(&self) -> Result<Vec<String>, ScanError> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT symbol FROM watch_stocks WHERE active = TRUE ORDER BY symbol ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn active_index_map(&self) -> Result<HashMap<String, String>, ScanError> {
        let rows: Vec<WatchIndex> = sqlx::query_as(
            r#"
            SELECT id, symbol, data_symbol, name, active
            FROM   watch_indices
            WHERE  active = TRUE
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|index| {
                let data = index.data_symbol.unwrap_or_else(|| index.symbol.clone());
                (index.symbol, data)
            })
            .collect())
    }

    async fn active_index_data_symbols(&self) -> Result<Vec<String>, ScanError> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT COALESCE(data_symbol, symbol) FROM watch_indices WHERE active = TRUE",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn mapped_index_symbols(&self) -> Result<Vec<String>, ScanError> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT index_symbol FROM ticker_index ORDER BY index_symbol ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn stock_index_mapping(&self) -> Result<HashMap<String, Vec<String>>, ScanError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT stock_symbol, index_symbol
            FROM   ticker_index
            ORDER  BY stock_symbol ASC, index_symbol ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut mapping: HashMap<String, Vec<String>> = HashMap::new();
        for (stock, index) in rows {
            mapping.entry(stock).or_default().push(index);
        }
        Ok(mapping)
    }

    async fn indices_for_stock(&self, stock_symbol: &str) -> Result<Vec<String>, ScanError> {
        let rows: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT index_symbol
            FROM   ticker_index
            WHERE  stock_symbol = $1
            ORDER  BY index_symbol ASC
            "#,
        )
        .bind(stock_symbol)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn ensure_default_index(&self, symbol: &str) -> Result<(), ScanError> {
        sqlx::query(
            r#"
            INSERT INTO watch_indices (symbol, data_symbol, active)
            VALUES ($1, $1, TRUE)
            ON CONFLICT (symbol) DO NOTHING
            "#,
        )
        .bind(symbol)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
