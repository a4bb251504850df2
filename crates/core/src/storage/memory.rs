//! In-process store for development and tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::{normalize_prefix, KeyValueStore};
use crate::error::StorageError;

#[derive(Debug, Clone)]
enum Slot {
    Value(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Process-local key-value store. TTLs are honoured lazily: expired keys
/// read as absent and are dropped on the next write.
#[derive(Default)]
pub struct MemoryStorage {
    prefix: String,
    data: RwLock<HashMap<String, Entry>>,
}

impl MemoryStorage {
    pub fn new(prefix: Option<&str>) -> Self {
        Self {
            prefix: normalize_prefix(prefix),
            data: RwLock::new(HashMap::new()),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn live_entry(&self, key: &str) -> Option<Entry> {
        let data = self.data.read().await;
        data.get(&self.key(key))
            .filter(|entry| entry.is_live(Instant::now()))
            .cloned()
    }

    async fn insert(&self, key: &str, slot: Slot, expires_at: Option<Instant>) {
        let mut data = self.data.write().await;
        let now = Instant::now();
        data.retain(|_, entry| entry.is_live(now));
        data.insert(self.key(key), Entry { slot, expires_at });
    }
}

#[async_trait]
impl KeyValueStore for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.live_entry(key).await.map(|e| e.slot) {
            Some(Slot::Value(v)) => Ok(Some(v)),
            Some(Slot::Hash(_)) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.insert(key, Slot::Value(value.to_string()), None).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.data.write().await.remove(&self.key(key));
        Ok(())
    }

    async fn setex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), StorageError> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_seconds);
        self.insert(key, Slot::Value(value.to_string()), Some(expires_at))
            .await;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StorageError> {
        match self.live_entry(key).await.map(|e| e.slot) {
            Some(Slot::Hash(map)) => Ok(map.get(field).cloned()),
            Some(Slot::Value(_)) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError> {
        let (mut map, expires_at) = match self.live_entry(key).await {
            Some(Entry { slot: Slot::Hash(map), expires_at }) => (map, expires_at),
            Some(Entry { slot: Slot::Value(_), .. }) => return Err(wrong_type(key)),
            None => (HashMap::new(), None),
        };
        map.insert(field.to_string(), value.to_string());
        self.insert(key, Slot::Hash(map), expires_at).await;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        match self.live_entry(key).await.map(|e| e.slot) {
            Some(Slot::Hash(map)) => Ok(map),
            Some(Slot::Value(_)) => Err(wrong_type(key)),
            None => Ok(HashMap::new()),
        }
    }
}

fn wrong_type(key: &str) -> StorageError {
    StorageError::CommandError(format!(
        "WRONGTYPE operation against key '{}' holding the wrong kind of value",
        key
    ))
}
