//! Error types shared across the extension crates

use thiserror::Error;

/// Failures surfaced by installation, session and webhook flows.
///
/// Configuration problems are reported before any network call is made.
/// Remote failures are wrapped with the step that produced them.
#[derive(Debug, Error)]
pub enum FdkError {
    #[error("{0}")]
    InvalidConfig(String),
    #[error("{0}")]
    ClusterMetaMissing(String),
    #[error("{0}")]
    SessionNotFound(String),
    #[error("{0}")]
    InvalidOAuth(String),
    #[error("{0}")]
    InvalidWebhookConfig(String),
    #[error("{0}")]
    WebhookRegistration(String),
    #[error("{0}")]
    InvalidHmac(String),
    #[error("{0}")]
    WebhookHandlerNotFound(String),
    #[error("{0}")]
    WebhookProcess(String),
    #[error("Platform request failed: {0}")]
    Platform(#[from] PlatformError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Extension callback failed: {0}")]
    Callback(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for FdkError {
    fn from(e: serde_json::Error) -> Self {
        FdkError::Serialization(e.to_string())
    }
}

/// Outbound calls to the platform API
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("HTTP request failed: {0}")]
    Request(String),
    #[error("Platform returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid response: {0}")]
    Decode(String),
}

/// Key-value store failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),
    #[error("Redis command error: {0}")]
    CommandError(String),
    #[error("Circuit breaker open - store unavailable")]
    CircuitOpen,
}
