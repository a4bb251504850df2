//! Redis-backed session store

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, RedisResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{normalize_prefix, KeyValueStore};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::StorageError;

/// Redis store with connection management and circuit breaker protection
#[derive(Clone)]
pub struct RedisStorage {
    conn: ConnectionManager,
    prefix: String,
    breaker: Arc<CircuitBreaker>,
}

impl RedisStorage {
    /// Connect to `redis_url`; keys are written as `"{prefix}:{key}"`
    pub async fn connect(redis_url: &str, prefix: Option<&str>) -> Result<Self, StorageError> {
        let client = ::redis::Client::open(redis_url)
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Ok(Self::from_manager(conn, prefix))
    }

    pub fn from_manager(conn: ConnectionManager, prefix: Option<&str>) -> Self {
        Self {
            conn,
            prefix: normalize_prefix(prefix),
            breaker: Arc::new(CircuitBreaker::for_session_store()),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn guarded<T, F>(&self, command: &str, key: &str, fut: F) -> Result<T, StorageError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        if !self.breaker.allow_request() {
            return Err(StorageError::CircuitOpen);
        }
        match fut.await {
            Ok(value) => {
                self.breaker.record_success();
                debug!("Redis {} {}", command, key);
                Ok(value)
            }
            Err(e) => {
                self.breaker.record_failure();
                warn!("Redis {} error for key {}: {}", command, key, e);
                Err(StorageError::CommandError(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        self.guarded("GET", &key, conn.get(&key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        self.guarded("SET", &key, conn.set(&key, value)).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        self.guarded("DEL", &key, conn.del(&key)).await
    }

    async fn setex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), StorageError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        self.guarded("SETEX", &key, conn.set_ex(&key, value, ttl_seconds))
            .await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StorageError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        self.guarded("HGET", &key, conn.hget(&key, field)).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        self.guarded("HSET", &key, conn.hset(&key, field, value)).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        self.guarded("HGETALL", &key, conn.hgetall(&key)).await
    }
}
