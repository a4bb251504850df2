//! Webhook data models

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// How a subscriber is associated with the company's sales channels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssociationCriteria {
    #[serde(rename = "ALL")]
    All,
    #[serde(rename = "SPECIFIC-EVENTS")]
    SpecificEvents,
    #[serde(rename = "EMPTY")]
    Empty,
    #[serde(other, rename = "UNKNOWN")]
    Unknown,
}

impl AssociationCriteria {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationCriteria::All => "ALL",
            AssociationCriteria::SpecificEvents => "SPECIFIC-EVENTS",
            AssociationCriteria::Empty => "EMPTY",
            AssociationCriteria::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    #[default]
    Active,
    Inactive,
    /// Any status this crate does not manage
    #[serde(other)]
    Unknown,
}

impl SubscriberStatus {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            SubscriberStatus::Active
        } else {
            SubscriberStatus::Inactive
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Association {
    #[serde(default)]
    pub company_id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub application_id: Vec<String>,
    #[serde(default)]
    pub criteria: Option<AssociationCriteria>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthMeta {
    #[serde(rename = "type")]
    pub kind: String,
    pub secret: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthMeta {
    pub fn hmac(secret: impl Into<String>) -> Self {
        Self {
            kind: "hmac".to_string(),
            secret: secret.into(),
            extra: Map::new(),
        }
    }
}

/// An event already attached to a remote subscriber
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscribedEvent {
    pub id: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Subscriber record owned by the platform. Fields this crate does not
/// manage are kept in `extra` and sent back untouched on update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SubscriberConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub association: Association,
    #[serde(default)]
    pub status: SubscriberStatus,
    #[serde(default)]
    pub auth_meta: Option<AuthMeta>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub event_id: Vec<i64>,
    #[serde(default)]
    pub email_id: Option<String>,
    /// Read-only view of the subscribed events
    #[serde(default, skip_serializing, deserialize_with = "null_as_default")]
    pub event_configs: Vec<SubscribedEvent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SubscriberConfig {
    pub fn subscribed_event_ids(&self) -> Vec<i64> {
        self.event_configs.iter().map(|e| e.id).collect()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SubscriberList {
    #[serde(default)]
    pub items: Vec<SubscriberConfig>,
}

/// Platform event catalog entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventConfig {
    pub id: i64,
    pub event_category: String,
    pub event_name: String,
    pub event_type: String,
    #[serde(deserialize_with = "string_or_number")]
    pub version: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventConfig {
    /// `category/name/type/version`
    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.event_category, self.event_name, self.event_type, self.version
        )
    }
}

/// One entry of an event details query
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EventQuery {
    pub event_category: String,
    pub event_name: String,
    pub event_type: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EventConfigList {
    #[serde(default)]
    pub event_configs: Vec<EventConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of an inbound webhook delivery
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub event: WebhookEvent,
    #[serde(default, deserialize_with = "optional_company_id")]
    pub company_id: Option<i64>,
    #[serde(default)]
    pub application_id: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// Company ids arrive as numbers or numeric strings
fn optional_company_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("company_id out of range")),
        Some(Value::String(s)) => s
            .parse::<i64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid company_id: {}", s))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid company_id: {}",
            other
        ))),
    }
}
