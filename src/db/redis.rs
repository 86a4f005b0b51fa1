//  src/db/redis.rs

use std::sync::Arc;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};

use crate::db::stores::Cache;

/// Thin, cheap-to-clone Redis handle around a shared connection manager.
#[derive(Clone)]
pub struct RedisCache {
    manager: Arc<ConnectionManager>,
}

impl RedisCache {
    /// Build once at start-up and share via `.data()` in Actix.
    pub async fn new(url: &str) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self {
            manager: Arc::new(manager),
        })
    }

    fn connection(&self) -> ConnectionManager {
        self.manager.as_ref().clone()
    }

    async fn set_with_ttl<V>(&self, key: &str, value: V, ttl_secs: Option<u64>)
    where
        V: redis::ToRedisArgs + Send + Sync,
    {
        let mut con = self.connection();
        let outcome: Result<(), RedisError> = match ttl_secs {
            None => redis::cmd("SET")
                .arg(key)
                .arg(value)
                .query_async(&mut con)
                .await,
            Some(ttl) => redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl)
                .query_async(&mut con)
                .await,
        };
        if let Err(e) = outcome {
            tracing::warn!(key, error = %e, "redis SET failed");
        }
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get_raw(&self, key: &str) -> Option<String> {
        let mut con = self.connection();
        match con.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "redis GET failed, treating as miss");
                None
            }
        }
    }

    async fn set_raw(&self, key: &str, value: String, ttl_secs: Option<u64>) {
        self.set_with_ttl(key, value, ttl_secs).await;
    }

    async fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        let mut con = self.connection();
        match con.get::<_, Option<Vec<u8>>>(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "redis GET failed, treating as miss");
                None
            }
        }
    }

    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) {
        self.set_with_ttl(key, value, ttl_secs).await;
    }
}
