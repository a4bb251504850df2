//! Key-value storage used for sessions
//!
//! Backends implement [`KeyValueStore`]; every key is namespaced with the
//! configured prefix as `"{prefix}:{key}"`.

mod memory;
mod redis_store;

pub use self::memory::MemoryStorage;
pub use self::redis_store::RedisStorage;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::StorageError;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Set a value that expires after `ttl_seconds`
    async fn setex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), StorageError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StorageError>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StorageError>;
}

/// Normalised key prefix: empty, or `"{prefix}:"`
pub(crate) fn normalize_prefix(prefix: Option<&str>) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{}:", p),
        _ => String::new(),
    }
}
