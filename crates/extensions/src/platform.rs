//! Platform endpoints used by the webhook registry

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use fdk_auth::http::execute;
use fdk_auth::{ClusterClient, PlatformClient};
use fdk_core::PlatformError;

use crate::models::{EventConfig, EventConfigList, EventQuery, SubscriberConfig, SubscriberList};

const EVENT_DETAILS_PATH: &str = "/service/common/webhook/v1.0/events/query-event-details";

/// Resolves event names to platform event ids
#[async_trait]
pub trait EventCatalog: Send + Sync {
    async fn query_event_details(
        &self,
        events: &[EventQuery],
    ) -> Result<Vec<EventConfig>, PlatformError>;
}

/// Company-scoped subscriber management
#[async_trait]
pub trait WebhookApi: EventCatalog {
    fn company_id(&self) -> i64;

    /// First subscriber registered for `extension_id`, if any
    async fn get_subscriber_config(
        &self,
        extension_id: &str,
    ) -> Result<Option<SubscriberConfig>, PlatformError>;

    async fn register_subscriber(&self, config: &SubscriberConfig) -> Result<(), PlatformError>;

    async fn update_subscriber(&self, config: &SubscriberConfig) -> Result<(), PlatformError>;
}

fn query_body(events: &[EventQuery]) -> Result<Value, PlatformError> {
    serde_json::to_value(events).map_err(|e| PlatformError::Request(e.to_string()))
}

fn subscriber_body(config: &SubscriberConfig) -> Result<Value, PlatformError> {
    serde_json::to_value(config).map_err(|e| PlatformError::Request(e.to_string()))
}

fn subscriber_path(company_id: i64) -> String {
    format!("/service/platform/webhook/v1.0/company/{}/subscriber/", company_id)
}

#[async_trait]
impl EventCatalog for ClusterClient {
    async fn query_event_details(
        &self,
        events: &[EventQuery],
    ) -> Result<Vec<EventConfig>, PlatformError> {
        let body = query_body(events)?;
        let request = self
            .http()
            .request(Method::POST, &self.url(EVENT_DETAILS_PATH), Some(&body))?;
        let list: EventConfigList = execute(request).await?;
        Ok(list.event_configs)
    }
}

#[async_trait]
impl EventCatalog for PlatformClient {
    async fn query_event_details(
        &self,
        events: &[EventQuery],
    ) -> Result<Vec<EventConfig>, PlatformError> {
        let body = query_body(events)?;
        let list: EventConfigList = self
            .request(Method::POST, EVENT_DETAILS_PATH, Some(&body))
            .await?;
        Ok(list.event_configs)
    }
}

#[async_trait]
impl WebhookApi for PlatformClient {
    fn company_id(&self) -> i64 {
        PlatformClient::company_id(self)
    }

    async fn get_subscriber_config(
        &self,
        extension_id: &str,
    ) -> Result<Option<SubscriberConfig>, PlatformError> {
        let path = format!(
            "/service/platform/webhook/v1.0/company/{}/extension/{}/subscriber",
            self.company_id(),
            extension_id
        );
        let list: SubscriberList = self.request(Method::GET, &path, None).await?;
        Ok(list.items.into_iter().next())
    }

    async fn register_subscriber(&self, config: &SubscriberConfig) -> Result<(), PlatformError> {
        let body = subscriber_body(config)?;
        let _: Value = self
            .request(Method::POST, &subscriber_path(self.company_id()), Some(&body))
            .await?;
        Ok(())
    }

    async fn update_subscriber(&self, config: &SubscriberConfig) -> Result<(), PlatformError> {
        let body = subscriber_body(config)?;
        let _: Value = self
            .request(Method::PUT, &subscriber_path(self.company_id()), Some(&body))
            .await?;
        Ok(())
    }
}
