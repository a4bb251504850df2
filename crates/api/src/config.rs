//! Environment-driven settings for the demo server

use fdk_core::AccessMode;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_WEBHOOK_API_PATH: &str = "/api/v1/webhooks";
const DEFAULT_STORAGE_PREFIX: &str = "fdk-demo";

#[derive(Debug, Clone, PartialEq)]
pub struct DemoSettings {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub base_url: Option<String>,
    pub cluster: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub access_mode: Option<AccessMode>,
    /// In-memory storage is used when unset
    pub redis_url: Option<String>,
    pub storage_prefix: String,
    pub bind_addr: String,
    /// Webhooks are only configured when a notification email is given
    pub webhook_notification_email: Option<String>,
    pub webhook_api_path: String,
    pub debug: bool,
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Comma-separated list, blanks dropped
pub fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl DemoSettings {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            api_key: non_empty_var("EXTENSION_API_KEY"),
            api_secret: non_empty_var("EXTENSION_API_SECRET"),
            base_url: non_empty_var("EXTENSION_BASE_URL"),
            cluster: non_empty_var("EXTENSION_CLUSTER"),
            scopes: non_empty_var("EXTENSION_SCOPES").map(|raw| parse_scopes(&raw)),
            access_mode: non_empty_var("EXTENSION_ACCESS_MODE")
                .and_then(|mode| AccessMode::from_str(&mode.to_lowercase())),
            redis_url: non_empty_var("REDIS_URL"),
            storage_prefix: non_empty_var("STORAGE_PREFIX")
                .unwrap_or_else(|| DEFAULT_STORAGE_PREFIX.to_string()),
            bind_addr: non_empty_var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            webhook_notification_email: non_empty_var("WEBHOOK_NOTIFICATION_EMAIL"),
            webhook_api_path: non_empty_var("WEBHOOK_API_PATH")
                .unwrap_or_else(|| DEFAULT_WEBHOOK_API_PATH.to_string()),
            debug: non_empty_var("FDK_DEBUG")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}
