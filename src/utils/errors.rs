// src/utils/errors.rs

use thiserror::Error;

/// Data-plane errors for the ingest/compute pipeline and the read path.
///
/// Store and cache failures convert via `?`; upstream payload problems carry
/// a message since the provider response is untyped at that point.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("unsupported timeframe: {0}")]
    UnknownTimeframe(String),
}
