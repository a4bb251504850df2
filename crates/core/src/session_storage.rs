//! Session persistence over a pluggable key-value store

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::error::FdkError;
use crate::session::Session;
use crate::storage::KeyValueStore;

#[derive(Clone)]
pub struct SessionStorage {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStorage {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Sessions with an expiry are written with a TTL matching it, so the
    /// store drops them on its own. Already-expired sessions get the
    /// minimum TTL of one second.
    pub async fn save_session(&self, session: &Session) -> Result<(), FdkError> {
        let json = serde_json::to_string(session)?;
        match session.seconds_until_expiry(Utc::now()) {
            Some(remaining) => {
                let ttl = remaining.max(1) as u64;
                debug!("Saving session {} with ttl {}s", session.session_id, ttl);
                self.store.setex(&session.session_id, &json, ttl).await?;
            }
            None => {
                debug!("Saving session {} without expiry", session.session_id);
                self.store.set(&session.session_id, &json).await?;
            }
        }
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>, FdkError> {
        match self.store.get(session_id).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), FdkError> {
        self.store.delete(session_id).await?;
        Ok(())
    }
}
