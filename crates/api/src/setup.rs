//! One-call wiring of extension, webhook registry and routes

use axum::Router;
use std::sync::Arc;

use fdk_auth::{ApplicationClient, ClusterClient, Extension, ExtensionConfig, PlatformClient};
use fdk_core::FdkError;
use fdk_extensions::{EventCatalog, RegistryContext, WebhookConfig, WebhookRegistry};

use crate::routes;
use crate::state::FdkState;

#[derive(Clone, Default)]
pub struct FdkConfig {
    pub extension: ExtensionConfig,
    pub webhook_config: Option<WebhookConfig>,
}

/// Everything an extension needs after setup
#[derive(Clone)]
pub struct FdkClient {
    state: FdkState,
    webhook_path: Option<String>,
}

impl FdkClient {
    pub fn new(state: FdkState, webhook_path: Option<String>) -> Self {
        Self {
            state,
            webhook_path,
        }
    }

    pub fn state(&self) -> &FdkState {
        &self.state
    }

    pub fn extension(&self) -> &Arc<Extension> {
        &self.state.extension
    }

    pub fn webhook_registry(&self) -> &Arc<WebhookRegistry> {
        &self.state.webhook_registry
    }

    /// Install flow and webhook routes
    pub fn fdk_handler(&self) -> Router {
        routes::fdk_routes(self.state.clone(), self.webhook_path.as_deref())
    }

    pub fn platform_api_routes(&self, routes: Router<FdkState>) -> Router {
        routes::platform_api_routes(self.state.clone(), routes)
    }

    pub fn application_proxy_routes(&self, routes: Router<FdkState>) -> Router {
        routes::application_proxy_routes(self.state.clone(), routes)
    }

    /// Platform client backed by the company's offline session.
    /// Only available in offline access mode.
    pub async fn get_platform_client(&self, company_id: i64) -> Result<PlatformClient, FdkError> {
        let extension = &self.state.extension;
        if extension.is_online_access_mode() {
            return Err(FdkError::SessionNotFound(
                "Offline session is not available in online access mode".to_string(),
            ));
        }

        let session_id = extension.offline_session_id(company_id);
        let mut session = extension
            .session_storage()
            .get_session(&session_id)
            .await?
            .ok_or_else(|| {
                FdkError::SessionNotFound(format!(
                    "No offline session found for company {}",
                    company_id
                ))
            })?;
        self.state.platform_client(company_id, &mut session).await
    }

    pub fn get_application_client(
        &self,
        application_id: &str,
        application_token: &str,
    ) -> ApplicationClient {
        self.state
            .extension
            .application_client(application_id, application_token)
    }
}

/// Initialize the extension (and its webhook registry when configured)
pub async fn setup_fdk(config: FdkConfig) -> Result<FdkClient, FdkError> {
    let extension = Extension::initialize(config.extension).await?;
    let catalog = ClusterClient::new(extension.http().clone(), extension.cluster());
    setup_with_catalog(extension, config.webhook_config, &catalog).await
}

/// Finish setup from an already initialized extension
pub async fn setup_with_catalog(
    extension: Extension,
    webhook_config: Option<WebhookConfig>,
    catalog: &dyn EventCatalog,
) -> Result<FdkClient, FdkError> {
    let registry = WebhookRegistry::new();
    let mut webhook_path = None;

    if let Some(webhook_config) = webhook_config {
        webhook_path = Some(webhook_config.api_path.clone());
        registry
            .initialize(webhook_config, RegistryContext::from_extension(&extension), catalog)
            .await?;
    }

    let state = FdkState::new(Arc::new(extension), Arc::new(registry));
    Ok(FdkClient::new(state, webhook_path))
}
