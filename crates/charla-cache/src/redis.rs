// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redis-backed [`KeyValueStore`].
//!
//! Holds one multiplexed connection manager for the whole process; the
//! manager reconnects on its own, so individual command failures surface as
//! `CharlaError::Cache` and the callers decide whether to fail open.

use async_trait::async_trait;
use charla_core::{CharlaError, KeyValueStore};
use ::redis::aio::ConnectionManager;
use ::redis::AsyncCommands;
use tracing::debug;

/// Redis implementation of the key-value seam.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connects to the Redis instance at `url`.
    pub async fn connect(url: &str) -> Result<Self, CharlaError> {
        let client = ::redis::Client::open(url).map_err(|e| CharlaError::Cache {
            message: format!("invalid redis url: {e}"),
            source: Some(Box::new(e)),
        })?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| CharlaError::Cache {
                message: format!("redis connection failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        debug!("redis connection manager established");
        Ok(Self { manager })
    }
}

fn map_redis_err(op: &str, e: ::redis::RedisError) -> CharlaError {
    CharlaError::Cache {
        message: format!("redis {op} failed: {e}"),
        source: Some(Box::new(e)),
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn incr(&self, key: &str) -> Result<i64, CharlaError> {
        let mut conn = self.manager.clone();
        let value: i64 = conn
            .incr(key, 1)
            .await
            .map_err(|e| map_redis_err("INCR", e))?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), CharlaError> {
        let mut conn = self.manager.clone();
        let _: bool = conn
            .expire(key, ttl_secs as i64)
            .await
            .map_err(|e| map_redis_err("EXPIRE", e))?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, CharlaError> {
        let mut conn = self.manager.clone();
        let ttl: i64 = conn.ttl(key).await.map_err(|e| map_redis_err("TTL", e))?;
        // -2 = missing key, -1 = no expiry attached.
        Ok(if ttl >= 0 { Some(ttl as u64) } else { None })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CharlaError> {
        let mut conn = self.manager.clone();
        let value: Option<String> =
            conn.get(key).await.map_err(|e| map_redis_err("GET", e))?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CharlaError> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .set_ex(key, value, ttl_secs)
            .await
            .map_err(|e| map_redis_err("SETEX", e))?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CharlaError> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.del(key).await.map_err(|e| map_redis_err("DEL", e))?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CharlaError> {
        let mut conn = self.manager.clone();
        let _: String = ::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_err("PING", e))?;
        Ok(())
    }
}
