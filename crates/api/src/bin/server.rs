//! Demo extension server
//!
//! Usage: `EXTENSION_API_KEY=.. EXTENSION_API_SECRET=.. fdk-demo`

use async_trait::async_trait;
use axum::{http::request::Parts, routing::get, Extension, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use fdk_api::config::DemoSettings;
use fdk_api::{setup_fdk, ApplicationData, FdkConfig, FdkSession, FdkState};
use fdk_auth::{AuthContext, CallbackError, ExtensionCallbacks, ExtensionConfig, PlatformClient};
use fdk_core::{KeyValueStore, MemoryStorage, RedisStorage};
use fdk_extensions::{handler_fn, WebhookConfig, WebhookDelivery};

struct DemoCallbacks;

#[async_trait]
impl ExtensionCallbacks for DemoCallbacks {
    async fn auth(&self, ctx: &AuthContext) -> Result<String, CallbackError> {
        let mut url = format!("{}?company_id={}", ctx.base_url, ctx.company_id);
        if let Some(application_id) = &ctx.application_id {
            url.push_str(&format!("&application_id={}", application_id));
        }
        Ok(url)
    }

    async fn uninstall(&self, company_id: i64, _body: &Value) -> Result<(), CallbackError> {
        tracing::info!("Extension uninstalled for company {}", company_id);
        Ok(())
    }

    async fn auto_install(&self, company_id: i64, _body: &Value) -> Result<(), CallbackError> {
        tracing::info!("Extension auto-installed for company {}", company_id);
        Ok(())
    }
}

async fn log_event(delivery: WebhookDelivery) -> Result<(), CallbackError> {
    tracing::info!(
        "Received {} for company {:?} (application {:?})",
        delivery.event_name,
        delivery.company_id,
        delivery.application_id
    );
    Ok(())
}

async fn company_info(
    Extension(client): Extension<PlatformClient>,
    Extension(FdkSession(session)): Extension<FdkSession>,
) -> Json<Value> {
    Json(json!({
        "company_id": client.company_id(),
        "scope": session.map(|s| s.scope).unwrap_or_default(),
    }))
}

async fn application_info(parts: Parts) -> Json<Value> {
    let application = parts
        .extensions
        .get::<ApplicationData>()
        .map(|ApplicationData(data)| data.clone());
    Json(json!({ "application": application }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fdk_api=debug,fdk_extensions=debug")),
        )
        .init();

    let settings = DemoSettings::from_env();

    let storage: Arc<dyn KeyValueStore> = match &settings.redis_url {
        Some(url) => {
            Arc::new(RedisStorage::connect(url, Some(settings.storage_prefix.as_str())).await?)
        }
        None => {
            tracing::warn!("REDIS_URL not set, sessions are kept in memory");
            Arc::new(MemoryStorage::new(Some(settings.storage_prefix.as_str())))
        }
    };

    let extension = ExtensionConfig {
        api_key: settings.api_key.clone(),
        api_secret: settings.api_secret.clone(),
        base_url: settings.base_url.clone(),
        cluster: settings.cluster.clone(),
        scopes: settings.scopes.clone(),
        access_mode: settings.access_mode,
        ..Default::default()
    }
    .with_callbacks(Arc::new(DemoCallbacks))
    .with_storage(storage)
    .with_debug(settings.debug);

    let webhook_config = settings.webhook_notification_email.as_ref().map(|email| {
        WebhookConfig::new(settings.webhook_api_path.clone(), email.clone())
            .with_event("company/product/create", "1", handler_fn(log_event))
            .with_event("company/product/update", "1", handler_fn(log_event))
    });

    let fdk = setup_fdk(FdkConfig {
        extension,
        webhook_config,
    })
    .await?;

    let platform_routes: Router<FdkState> =
        Router::new().route("/api/v1/company/info", get(company_info));
    let proxy_routes: Router<FdkState> =
        Router::new().route("/app/v1/application", get(application_info));

    let app = Router::new()
        .merge(fdk.fdk_handler())
        .merge(fdk.platform_api_routes(platform_routes))
        .merge(fdk.application_proxy_routes(proxy_routes))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("Extension server listening on {}", settings.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
