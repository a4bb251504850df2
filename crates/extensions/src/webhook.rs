//! Webhook subscription reconciliation, signature verification and dispatch

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use regex::Regex;
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;
use tracing::debug;

use fdk_auth::{CallbackError, Extension};
use fdk_core::constants::TEST_WEBHOOK_EVENT_NAME;
use fdk_core::utils::join_url;
use fdk_core::FdkError;

use crate::models::{
    AssociationCriteria, AuthMeta, EventQuery, SubscriberConfig, SubscriberStatus, WebhookPayload,
};
use crate::platform::{EventCatalog, WebhookApi};

static EMAIL_PATTERN: OnceLock<Regex> = OnceLock::new();

fn is_valid_email(value: &str) -> bool {
    EMAIL_PATTERN
        .get_or_init(|| Regex::new(r"^\S+@\S+\.\S+$").expect("email pattern is valid"))
        .is_match(value)
}

/// Which sales channels the subscriber receives events for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SalesChannelScope {
    #[default]
    All,
    Specific,
}

impl SalesChannelScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SalesChannelScope::All => "all",
            SalesChannelScope::Specific => "specific",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "all" => Some(SalesChannelScope::All),
            "specific" => Some(SalesChannelScope::Specific),
            _ => None,
        }
    }

    fn criteria(&self, application_ids: &[String]) -> AssociationCriteria {
        match self {
            SalesChannelScope::All => AssociationCriteria::All,
            SalesChannelScope::Specific if application_ids.is_empty() => AssociationCriteria::Empty,
            SalesChannelScope::Specific => AssociationCriteria::SpecificEvents,
        }
    }
}

/// One delivered event, as handed to a [`WebhookHandler`]
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    /// `name/type`
    pub event_name: String,
    pub payload: Value,
    pub company_id: Option<i64>,
    pub application_id: Option<String>,
}

#[async_trait]
pub trait WebhookHandler: Send + Sync {
    async fn handle(&self, delivery: WebhookDelivery) -> Result<(), CallbackError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> WebhookHandler for FnHandler<F>
where
    F: Fn(WebhookDelivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
{
    async fn handle(&self, delivery: WebhookDelivery) -> Result<(), CallbackError> {
        (self.0)(delivery).await
    }
}

/// Wrap an async closure as a [`WebhookHandler`]
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn WebhookHandler>
where
    F: Fn(WebhookDelivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[derive(Clone)]
pub struct EventMapEntry {
    pub version: String,
    pub handler: Arc<dyn WebhookHandler>,
}

/// Webhook settings of an extension
#[derive(Clone)]
pub struct WebhookConfig {
    /// Route the platform posts events to, relative to the base URL
    pub api_path: String,
    pub notification_email: String,
    pub subscribe_on_install: Option<bool>,
    pub subscribed_saleschannel: Option<SalesChannelScope>,
    /// `category/name/type` → handler
    pub event_map: HashMap<String, EventMapEntry>,
}

impl WebhookConfig {
    pub fn new(api_path: impl Into<String>, notification_email: impl Into<String>) -> Self {
        Self {
            api_path: api_path.into(),
            notification_email: notification_email.into(),
            subscribe_on_install: None,
            subscribed_saleschannel: None,
            event_map: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_event(
        mut self,
        event: impl Into<String>,
        version: impl Into<String>,
        handler: Arc<dyn WebhookHandler>,
    ) -> Self {
        self.event_map.insert(
            event.into(),
            EventMapEntry {
                version: version.into(),
                handler,
            },
        );
        self
    }

    #[must_use]
    pub fn with_subscribe_on_install(mut self, subscribe: bool) -> Self {
        self.subscribe_on_install = Some(subscribe);
        self
    }

    #[must_use]
    pub fn with_saleschannel_scope(mut self, scope: SalesChannelScope) -> Self {
        self.subscribed_saleschannel = Some(scope);
        self
    }
}

/// Extension-level values the registry needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryContext {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
    pub cluster: String,
    pub debug: bool,
}

impl RegistryContext {
    pub fn from_extension(extension: &Extension) -> Self {
        Self {
            api_key: extension.api_key().to_string(),
            api_secret: extension.api_secret().to_string(),
            base_url: extension.base_url().to_string(),
            cluster: extension.cluster().to_string(),
            debug: extension.debug(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Registered,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDispatch {
    /// Platform connectivity test; acknowledged without dispatch
    Ping,
    Handled { event_name: String },
}

struct RegistryState {
    api_path: String,
    notification_email: String,
    subscribe_on_install: bool,
    saleschannel: SalesChannelScope,
    handlers: HashMap<String, EventMapEntry>,
    /// `category/name/type/version` → event id
    event_ids: HashMap<String, i64>,
    context: RegistryContext,
    source: WebhookConfig,
}

impl RegistryState {
    fn webhook_url(&self) -> String {
        join_url(&self.context.base_url, &self.api_path)
    }

    fn desired_event_ids(&self) -> Vec<i64> {
        let ids: BTreeSet<i64> = self
            .handlers
            .iter()
            .filter_map(|(key, entry)| {
                self.event_ids
                    .get(&format!("{}/{}", key, entry.version))
                    .copied()
            })
            .collect();
        ids.into_iter().collect()
    }

    fn event_names(&self, ids: &[i64]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| {
                self.event_ids
                    .iter()
                    .find(|(_, v)| *v == id)
                    .map(|(k, _)| k.clone())
            })
            .collect()
    }

    fn new_subscriber(&self, company_id: i64, enable_webhooks: Option<bool>) -> SubscriberConfig {
        let mut config = SubscriberConfig {
            name: self.context.api_key.clone(),
            webhook_url: self.webhook_url(),
            status: SubscriberStatus::from_enabled(enable_webhooks.unwrap_or(true)),
            auth_meta: Some(AuthMeta::hmac(self.context.api_secret.clone())),
            event_id: self.desired_event_ids(),
            email_id: Some(self.notification_email.clone()),
            ..Default::default()
        };
        config.association.company_id = Some(company_id);
        config.association.criteria = Some(self.saleschannel.criteria(&[]));
        config
    }

    /// Bring the tracked fields of a remote config in line; true if any changed
    fn reconcile(&self, remote: &mut SubscriberConfig, enable_webhooks: Option<bool>) -> bool {
        let mut changed = false;

        let secret_matches = remote
            .auth_meta
            .as_ref()
            .is_some_and(|meta| meta.secret == self.context.api_secret);
        if !secret_matches {
            match remote.auth_meta.as_mut() {
                Some(meta) => meta.secret = self.context.api_secret.clone(),
                None => remote.auth_meta = Some(AuthMeta::hmac(self.context.api_secret.clone())),
            }
            changed = true;
        }

        let desired_status = match enable_webhooks {
            Some(enabled) => Some(SubscriberStatus::from_enabled(enabled)),
            None if remote.status == SubscriberStatus::Unknown => Some(SubscriberStatus::Active),
            None => None,
        };
        if let Some(status) = desired_status {
            if remote.status != status {
                debug!("Webhook status updated from {:?} to {:?}", remote.status, status);
                remote.status = status;
                changed = true;
            }
        }

        let criteria = self.saleschannel.criteria(&remote.association.application_id);
        if remote.association.criteria != Some(criteria) {
            if criteria == AssociationCriteria::All {
                remote.association.application_id.clear();
            }
            debug!(
                "Webhook association criteria updated from {:?} to {}",
                remote.association.criteria,
                criteria.as_str()
            );
            remote.association.criteria = Some(criteria);
            changed = true;
        }

        if remote.email_id.as_deref() != Some(self.notification_email.as_str()) {
            debug!(
                "Webhook notification email updated from {:?} to {}",
                remote.email_id, self.notification_email
            );
            remote.email_id = Some(self.notification_email.clone());
            changed = true;
        }

        let url = self.webhook_url();
        if remote.webhook_url != url {
            debug!("Webhook url updated from {} to {}", remote.webhook_url, url);
            remote.webhook_url = url;
            changed = true;
        }

        changed
    }
}

fn parse_event_key(key: &str) -> Option<(&str, &str, &str)> {
    let mut parts = key.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(category), Some(name), Some(kind), None) => Some((category, name, kind)),
        _ => None,
    }
}

/// `hex(HMAC-SHA256(secret, body))`
pub fn compute_signature(secret: &str, body: &[u8]) -> Result<String, FdkError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| FdkError::InvalidHmac(e.to_string()))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Holds the webhook configuration of one extension and reconciles it with
/// the platform, per company.
#[derive(Default)]
pub struct WebhookRegistry {
    state: RwLock<Option<Arc<RegistryState>>>,
}

impl WebhookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `config` and resolve its events. State is only replaced once
    /// everything checks out.
    pub async fn initialize<C>(
        &self,
        config: WebhookConfig,
        context: RegistryContext,
        catalog: &C,
    ) -> Result<(), FdkError>
    where
        C: EventCatalog + ?Sized,
    {
        if !is_valid_email(&config.notification_email) {
            return Err(FdkError::InvalidWebhookConfig(
                "Invalid or missing notification_email".to_string(),
            ));
        }
        if !config.api_path.starts_with('/') {
            return Err(FdkError::InvalidWebhookConfig(
                "Invalid or missing api_path".to_string(),
            ));
        }
        if config.event_map.is_empty() {
            return Err(FdkError::InvalidWebhookConfig(
                "Invalid or missing event_map".to_string(),
            ));
        }

        let mut keys: Vec<&String> = config.event_map.keys().collect();
        keys.sort();

        let mut queries = Vec::with_capacity(keys.len());
        for key in &keys {
            let (category, name, kind) = parse_event_key(key).ok_or_else(|| {
                FdkError::InvalidWebhookConfig(format!(
                    "Invalid webhook event map key. Invalid key: {}",
                    key
                ))
            })?;
            queries.push(EventQuery {
                event_category: category.to_string(),
                event_name: name.to_string(),
                event_type: kind.to_string(),
                version: config.event_map[*key].version.clone(),
            });
        }

        let events = catalog.query_event_details(&queries).await.map_err(|e| {
            FdkError::InvalidWebhookConfig(format!(
                "Error while fetching webhook events configuration, Reason: {}",
                e
            ))
        })?;
        debug!("Webhook events config received: {} events", events.len());

        let event_ids: HashMap<String, i64> =
            events.iter().map(|event| (event.key(), event.id)).collect();

        let missing: Vec<String> = keys
            .iter()
            .filter(|key| {
                let version = &config.event_map[**key].version;
                !event_ids.contains_key(&format!("{}/{}", key, version))
            })
            .map(|key| json!({"name": key, "version": config.event_map[*key].version}).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(FdkError::InvalidWebhookConfig(format!(
                "Webhooks events {} not found",
                missing.join(", ")
            )));
        }

        let state = RegistryState {
            api_path: config.api_path.clone(),
            notification_email: config.notification_email.clone(),
            subscribe_on_install: config.subscribe_on_install.unwrap_or(true),
            saleschannel: config.subscribed_saleschannel.unwrap_or_default(),
            handlers: config.event_map.clone(),
            event_ids,
            context,
            source: config,
        };
        *self.state.write().await = Some(Arc::new(state));

        debug!("Webhook registry initialized");
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// True when initialized and configured to subscribe during install
    pub async fn should_sync_on_install(&self) -> bool {
        self.state
            .read()
            .await
            .as_ref()
            .is_some_and(|state| state.subscribe_on_install)
    }

    /// Route the webhook endpoint is mounted on, once initialized
    pub async fn api_path(&self) -> Option<String> {
        self.state.read().await.as_ref().map(|s| s.api_path.clone())
    }

    pub async fn config(&self) -> Option<WebhookConfig> {
        self.state.read().await.as_ref().map(|s| s.source.clone())
    }

    async fn current(&self) -> Result<Arc<RegistryState>, FdkError> {
        self.state.read().await.clone().ok_or_else(|| {
            FdkError::InvalidWebhookConfig("Webhook registry not initialized".to_string())
        })
    }

    /// Register or update the company's subscriber so it matches the local config
    pub async fn sync_events(
        &self,
        client: &dyn WebhookApi,
        config: Option<WebhookConfig>,
        enable_webhooks: Option<bool>,
    ) -> Result<SyncOutcome, FdkError> {
        let mut state = self.current().await?;
        debug!("Webhook sync events started");

        if let Some(config) = config {
            self.initialize(config, state.context.clone(), client).await?;
            state = self.current().await?;
        }

        let company_id = client.company_id();
        let existing = client
            .get_subscriber_config(&state.context.api_key)
            .await
            .map_err(|e| {
                FdkError::InvalidWebhookConfig(format!(
                    "Error while fetching webhook subscriber configuration, Reason: {}",
                    e
                ))
            })?;

        let sync_error = |e: fdk_core::PlatformError| {
            FdkError::WebhookRegistration(format!("Failed to sync webhook events. Reason: {}", e))
        };

        match existing {
            None => {
                let subscriber = state.new_subscriber(company_id, enable_webhooks);
                client
                    .register_subscriber(&subscriber)
                    .await
                    .map_err(sync_error)?;
                if state.context.debug {
                    debug!(
                        "Webhook config registered for company: {}, events: {:?}",
                        company_id,
                        state.event_names(&subscriber.event_id)
                    );
                }
                Ok(SyncOutcome::Registered)
            }
            Some(mut remote) => {
                debug!("Webhook config on platform side for company id {}", company_id);

                let existing_ids: BTreeSet<i64> = remote.subscribed_event_ids().into_iter().collect();
                let config_updated = state.reconcile(&mut remote, enable_webhooks);

                let desired = state.desired_event_ids();
                let desired_ids: BTreeSet<i64> = desired.iter().copied().collect();
                remote.event_id = desired;

                let events_changed = existing_ids.symmetric_difference(&desired_ids).next().is_some();
                if !events_changed && !config_updated {
                    return Ok(SyncOutcome::Unchanged);
                }

                client.update_subscriber(&remote).await.map_err(sync_error)?;
                if state.context.debug {
                    debug!(
                        "Webhook config updated for company: {}, events: {:?}",
                        company_id,
                        state.event_names(&remote.event_id)
                    );
                }
                Ok(SyncOutcome::Updated)
            }
        }
    }

    async fn specific_scope_state(&self) -> Result<Arc<RegistryState>, FdkError> {
        let state = self.current().await?;
        if state.saleschannel != SalesChannelScope::Specific {
            return Err(FdkError::WebhookRegistration(
                "`subscribed_saleschannel` is not set to `specific` in webhook config".to_string(),
            ));
        }
        Ok(state)
    }

    async fn remote_subscriber(
        state: &RegistryState,
        client: &dyn WebhookApi,
        action: &str,
    ) -> Result<SubscriberConfig, FdkError> {
        let mut remote = client
            .get_subscriber_config(&state.context.api_key)
            .await
            .map_err(|e| {
                FdkError::WebhookRegistration(format!(
                    "Failed to {} saleschannel webhook. Reason: {}",
                    action, e
                ))
            })?
            .ok_or_else(|| {
                FdkError::WebhookRegistration("Subscriber config not found".to_string())
            })?;
        remote.event_id = remote.subscribed_event_ids();
        Ok(remote)
    }

    /// Add `application_id` to the subscriber; returns whether an update was sent
    pub async fn enable_sales_channel_webhook(
        &self,
        client: &dyn WebhookApi,
        application_id: &str,
    ) -> Result<bool, FdkError> {
        let state = self.specific_scope_state().await?;
        let mut remote = Self::remote_subscriber(&state, client, "add").await?;

        if remote
            .association
            .application_id
            .iter()
            .any(|id| id == application_id)
        {
            return Ok(false);
        }

        remote.association.application_id.push(application_id.to_string());
        remote.association.criteria = Some(state.saleschannel.criteria(&remote.association.application_id));
        client.update_subscriber(&remote).await.map_err(|e| {
            FdkError::WebhookRegistration(format!(
                "Failed to add saleschannel webhook. Reason: {}",
                e
            ))
        })?;

        debug!("Webhook enabled for saleschannel: {}", application_id);
        Ok(true)
    }

    /// Remove `application_id` from the subscriber; returns whether an update was sent
    pub async fn disable_sales_channel_webhook(
        &self,
        client: &dyn WebhookApi,
        application_id: &str,
    ) -> Result<bool, FdkError> {
        let state = self.specific_scope_state().await?;
        let mut remote = Self::remote_subscriber(&state, client, "disable").await?;

        let before = remote.association.application_id.len();
        remote
            .association
            .application_id
            .retain(|id| id != application_id);
        if remote.association.application_id.len() == before {
            return Ok(false);
        }

        remote.association.criteria = Some(state.saleschannel.criteria(&remote.association.application_id));
        client.update_subscriber(&remote).await.map_err(|e| {
            FdkError::WebhookRegistration(format!(
                "Failed to disable saleschannel webhook. Reason: {}",
                e
            ))
        })?;

        debug!("Webhook disabled for saleschannel: {}", application_id);
        Ok(true)
    }

    /// Check `signature` against the HMAC of `body` keyed with the api secret
    pub async fn verify_signature(&self, body: &[u8], signature: Option<&str>) -> Result<(), FdkError> {
        let state = self.current().await?;
        verify_with_secret(&state.context.api_secret, body, signature)
    }

    /// Verify and route an inbound delivery to its handler
    pub async fn process_webhook(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookDispatch, FdkError> {
        let state = self.current().await?;

        let raw: Value =
            serde_json::from_slice(body).map_err(|e| FdkError::WebhookProcess(e.to_string()))?;
        let payload: WebhookPayload = serde_json::from_value(raw.clone())
            .map_err(|e| FdkError::WebhookProcess(e.to_string()))?;

        if payload.event.name == TEST_WEBHOOK_EVENT_NAME {
            return Ok(WebhookDispatch::Ping);
        }

        verify_with_secret(&state.context.api_secret, body, signature)?;

        let event_name = format!(
            "{}/{}",
            payload.event.name,
            payload.event.kind.as_deref().unwrap_or_default()
        );
        let category_event_name = match payload.event.category.as_deref() {
            Some(category) if !category.is_empty() => format!("{}/{}", category, event_name),
            _ => event_name.clone(),
        };

        let entry = state
            .handlers
            .get(&category_event_name)
            .or_else(|| state.handlers.get(&event_name))
            .ok_or_else(|| {
                FdkError::WebhookHandlerNotFound(format!(
                    "Webhook handler not assigned: {}",
                    category_event_name
                ))
            })?;

        debug!(
            "Webhook event received for company: {:?}, application: {}, event name: {}",
            payload.company_id,
            payload.application_id.as_deref().unwrap_or(""),
            event_name
        );

        entry
            .handler
            .handle(WebhookDelivery {
                event_name: event_name.clone(),
                payload: raw,
                company_id: payload.company_id,
                application_id: payload.application_id,
            })
            .await
            .map_err(|e| FdkError::WebhookProcess(e.to_string()))?;

        Ok(WebhookDispatch::Handled { event_name })
    }
}

fn verify_with_secret(secret: &str, body: &[u8], signature: Option<&str>) -> Result<(), FdkError> {
    let mismatch =
        || FdkError::InvalidHmac("Signature passed does not match calculated body signature".to_string());

    let provided = signature
        .and_then(|s| hex::decode(s.trim()).ok())
        .ok_or_else(mismatch)?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| FdkError::InvalidHmac(e.to_string()))?;
    mac.update(body);
    mac.verify_slice(&provided).map_err(|_| mismatch())
}
