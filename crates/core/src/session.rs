//! OAuth session records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::TOKEN_RENEWAL_THRESHOLD_SECS;

/// Whether a session outlives the browser redirect that created it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Online,
    Offline,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Online => "online",
            AccessMode::Offline => "offline",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "online" => Some(AccessMode::Online),
            "offline" => Some(AccessMode::Offline),
            _ => None,
        }
    }
}

/// Token material returned by the platform OAuth endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub current_user: Option<serde_json::Value>,
    #[serde(default)]
    pub access_mode: Option<AccessMode>,
    /// Unix milliseconds at which `access_token` stops being accepted
    #[serde(default)]
    pub access_token_validity: Option<i64>,
}

impl TokenGrant {
    /// Stamp the validity from `expires_in`, relative to `now_ms`
    pub fn with_validity_from(mut self, now_ms: i64) -> Self {
        if let Some(expires_in) = self.expires_in {
            self.access_token_validity = Some(now_ms + expires_in * 1000);
        }
        self
    }

    pub fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = Some(mode);
        self
    }
}

/// Per-company (offline) or per-user (online) auth session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub session_id: String,
    pub company_id: Option<i64>,
    /// OAuth `state` issued with the authorization redirect
    pub state: Option<String>,
    #[serde(default)]
    pub scope: Vec<String>,
    pub expires: Option<DateTime<Utc>>,
    pub expires_in: Option<i64>,
    /// Unix milliseconds
    pub access_token_validity: Option<i64>,
    pub access_mode: AccessMode,
    pub access_token: Option<String>,
    pub current_user: Option<serde_json::Value>,
    pub refresh_token: Option<String>,
    pub is_new: bool,
    pub extension_id: Option<String>,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            company_id: None,
            state: None,
            scope: Vec::new(),
            expires: None,
            expires_in: None,
            access_token_validity: None,
            access_mode: AccessMode::Online,
            access_token: None,
            current_user: None,
            refresh_token: None,
            is_new: true,
            extension_id: None,
        }
    }

    /// Online sessions get a random id; offline sessions hash
    /// `cluster:company_id` so every install for a tenant lands on one key.
    pub fn generate_session_id(is_online: bool, cluster: &str, company_id: i64) -> String {
        if is_online {
            uuid::Uuid::new_v4().to_string()
        } else {
            let mut hasher = Sha256::new();
            hasher.update(format!("{}:{}", cluster, company_id).as_bytes());
            hex::encode(hasher.finalize())
        }
    }

    pub fn update_token(&mut self, grant: &TokenGrant) {
        if let Some(mode) = grant.access_mode {
            self.access_mode = mode;
        }
        self.access_token = Some(grant.access_token.clone());
        self.current_user = grant.current_user.clone();
        self.refresh_token = grant.refresh_token.clone();
        self.expires_in = grant.expires_in;
        self.access_token_validity = grant.access_token_validity;
    }

    /// Seconds left before `expires`, if the session expires at all
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires.map(|expires| (expires - now).num_seconds())
    }

    /// True when a refresh token is held and the access token has at most
    /// [`TOKEN_RENEWAL_THRESHOLD_SECS`] left.
    pub fn needs_token_renewal(&self, now_ms: i64) -> bool {
        match (self.access_token_validity, self.refresh_token.as_ref()) {
            (Some(validity), Some(_)) => validity - now_ms <= TOKEN_RENEWAL_THRESHOLD_SECS * 1000,
            _ => false,
        }
    }
}
