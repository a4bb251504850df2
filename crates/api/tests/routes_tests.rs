use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    routing::get,
    Extension as AxumExtension, Json, Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use fdk_api::{setup_with_catalog, FdkClient, FdkState};
use fdk_auth::{
    AuthContext, AuthorizeRequest, CallbackError, ClusterApi, Extension, ExtensionCallbacks,
    ExtensionConfig, ExtensionDetails, PlatformClient, PlatformOAuth,
};
use fdk_core::constants::WEBHOOK_SIGNATURE_HEADER;
use fdk_core::{AccessMode, MemoryStorage, PlatformError, Session, TokenGrant};
use fdk_extensions::{
    compute_signature, handler_fn, EventCatalog, EventConfig, EventQuery, WebhookConfig,
    WebhookDelivery,
};

const API_SECRET: &str = "api-secret";

#[derive(Default)]
struct RecordingCallbacks {
    uninstalled: Mutex<Vec<i64>>,
}

#[async_trait]
impl ExtensionCallbacks for RecordingCallbacks {
    async fn auth(&self, ctx: &AuthContext) -> Result<String, CallbackError> {
        Ok(format!("{}/company/{}", ctx.base_url, ctx.company_id))
    }

    async fn uninstall(&self, company_id: i64, _body: &Value) -> Result<(), CallbackError> {
        self.uninstalled.lock().unwrap().push(company_id);
        Ok(())
    }
}

struct StaticCluster;

#[async_trait]
impl ClusterApi for StaticCluster {
    async fn extension_details(
        &self,
        _api_key: &str,
        _api_secret: &str,
    ) -> Result<ExtensionDetails, PlatformError> {
        Ok(ExtensionDetails {
            name: Some("demo".to_string()),
            base_url: Some("https://ext.example.com".to_string()),
            scope: Some(vec!["company/products".to_string()]),
            extra: Default::default(),
        })
    }
}

struct StaticCatalog;

#[async_trait]
impl EventCatalog for StaticCatalog {
    async fn query_event_details(
        &self,
        _events: &[EventQuery],
    ) -> Result<Vec<EventConfig>, PlatformError> {
        Ok(vec![EventConfig {
            id: 10,
            event_category: "company".to_string(),
            event_name: "product".to_string(),
            event_type: "create".to_string(),
            version: "1".to_string(),
            extra: Default::default(),
        }])
    }
}

struct FakeOAuth;

fn grant(token: &str) -> TokenGrant {
    TokenGrant {
        access_token: token.to_string(),
        refresh_token: Some("refresh".to_string()),
        expires_in: Some(3600),
        current_user: None,
        access_mode: None,
        access_token_validity: None,
    }
}

#[async_trait]
impl PlatformOAuth for FakeOAuth {
    fn authorization_url(&self, request: &AuthorizeRequest) -> Result<String, PlatformError> {
        Ok(format!(
            "https://platform.example.com/oauth/authorize?state={}",
            request.state
        ))
    }

    async fn exchange_code(&self, _code: &str) -> Result<TokenGrant, PlatformError> {
        Ok(grant("online-token"))
    }

    async fn offline_token(
        &self,
        _scopes: &[String],
        _code: Option<&str>,
    ) -> Result<TokenGrant, PlatformError> {
        Ok(grant("offline-token"))
    }

    async fn refresh_access_token(&self, _refresh: &str) -> Result<TokenGrant, PlatformError> {
        Ok(grant("refreshed-token"))
    }
}

struct TestApp {
    client: FdkClient,
    callbacks: Arc<RecordingCallbacks>,
}

impl TestApp {
    async fn new(webhook_config: Option<WebhookConfig>) -> Self {
        let callbacks = Arc::new(RecordingCallbacks::default());
        let config = ExtensionConfig::new("api-key", API_SECRET)
            .with_access_mode(AccessMode::Offline)
            .with_callbacks(callbacks.clone())
            .with_storage(Arc::new(MemoryStorage::new(Some("test"))));
        let extension = Extension::initialize_with(config, &StaticCluster)
            .await
            .unwrap();

        let setup = setup_with_catalog(extension, webhook_config, &StaticCatalog)
            .await
            .unwrap();
        let state = setup
            .state()
            .clone()
            .with_oauth_factory(Arc::new(|_, _| Arc::new(FakeOAuth) as Arc<dyn PlatformOAuth>));
        let webhook_path = setup.webhook_registry().api_path().await;

        Self {
            client: FdkClient::new(state, webhook_path),
            callbacks,
        }
    }

    fn router(&self) -> Router {
        self.client.fdk_handler()
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn cookie_value(response: &axum::response::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| {
            let pair = v.split(';').next()?;
            let (key, value) = pair.split_once('=')?;
            (key.trim() == name).then(|| value.trim().to_string())
        })
}

async fn install(app: &TestApp, company_id: i64) -> (String, Session) {
    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri(format!("/fp/install?company_id={}", company_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);

    let session_id = cookie_value(&response, &format!("ext_session_{}", company_id)).unwrap();
    let session = app
        .client
        .extension()
        .session_storage()
        .get_session(&session_id)
        .await
        .unwrap()
        .unwrap();
    (session_id, session)
}

#[tokio::test]
async fn test_install_redirects_to_consent() {
    let app = TestApp::new(None).await;

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/fp/install?company_id=1&application_id=app-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()["x-company-id"], "1");
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://platform.example.com/oauth/authorize"));
    assert!(cookie_value(&response, "ext_session_1").is_some());
}

#[tokio::test]
async fn test_install_stores_online_session() {
    let app = TestApp::new(None).await;
    let (session_id, session) = install(&app, 2).await;

    assert_eq!(session.session_id, session_id);
    assert_eq!(session.company_id, Some(2));
    assert_eq!(session.access_mode, AccessMode::Online);
    assert_eq!(session.extension_id.as_deref(), Some("api-key"));
    assert_eq!(session.scope, vec!["company/products".to_string()]);
    assert!(session.state.is_some());
}

#[tokio::test]
async fn test_install_rejects_bad_company_id() {
    let app = TestApp::new(None).await;

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/fp/install?company_id=abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_auth_without_session() {
    let app = TestApp::new(None).await;

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/fp/auth?company_id=1&code=abc&state=xyz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert!(body["error_message"].as_str().unwrap().contains("session not found"));
}

#[tokio::test]
async fn test_auth_with_wrong_state() {
    let app = TestApp::new(None).await;
    let (session_id, _) = install(&app, 3).await;

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/fp/auth?company_id=3&code=abc&state=not-the-state")
                .header(header::COOKIE, format!("ext_session_3={}", session_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error_message"], "Invalid oauth call");
}

#[tokio::test]
async fn test_auth_completes_install() {
    let app = TestApp::new(None).await;
    let (session_id, session) = install(&app, 4).await;
    let state = session.state.unwrap();

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri(format!("/fp/auth?company_id=4&code=abc&state={}", state))
                .header(header::COOKIE, format!("ext_session_4={}", session_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://ext.example.com/company/4"
    );
    assert_eq!(response.headers()["x-company-id"], "4");

    let storage = app.client.extension().session_storage();
    let online = storage.get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(online.access_token.as_deref(), Some("online-token"));
    assert!(online.access_token_validity.is_some());

    let offline_id = app.client.extension().offline_session_id(4);
    let offline = storage.get_session(&offline_id).await.unwrap().unwrap();
    assert_eq!(offline.access_mode, AccessMode::Offline);
    assert_eq!(offline.access_token.as_deref(), Some("offline-token"));
    assert_eq!(offline.company_id, Some(4));

    let client = app.client.get_platform_client(4).await.unwrap();
    assert_eq!(client.company_id(), 4);
}

#[tokio::test]
async fn test_auto_install_creates_offline_session() {
    let app = TestApp::new(None).await;

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/fp/auto_install")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"company_id": "5", "code": "abc"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"message": "success"}));

    let offline_id = app.client.extension().offline_session_id(5);
    let offline = app
        .client
        .extension()
        .session_storage()
        .get_session(&offline_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(offline.access_token.as_deref(), Some("offline-token"));
}

#[tokio::test]
async fn test_uninstall_removes_offline_session() {
    let app = TestApp::new(None).await;
    let storage = app.client.extension().session_storage();
    let offline_id = app.client.extension().offline_session_id(6);
    storage.save_session(&Session::new(offline_id.clone())).await.unwrap();

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/fp/uninstall")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"company_id": 6}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"success": true}));
    assert!(storage.get_session(&offline_id).await.unwrap().is_none());
    assert_eq!(*app.callbacks.uninstalled.lock().unwrap(), vec![6]);
}

#[tokio::test]
async fn test_missing_offline_session() {
    let app = TestApp::new(None).await;
    assert!(app.client.get_platform_client(99).await.is_err());
}

async fn company_info(
    AxumExtension(client): AxumExtension<PlatformClient>,
) -> Json<Value> {
    Json(json!({ "company_id": client.company_id() }))
}

fn platform_router(app: &TestApp) -> Router {
    app.client.platform_api_routes(
        Router::<FdkState>::new().route("/api/company", get(company_info)),
    )
}

#[tokio::test]
async fn test_platform_route_requires_session() {
    let app = TestApp::new(None).await;

    let response = platform_router(&app)
        .oneshot(
            Request::builder()
                .uri("/api/company")
                .header("x-company-id", "7")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await, json!({"message": "unauthorized"}));
}

#[tokio::test]
async fn test_platform_route_with_session() {
    let app = TestApp::new(None).await;
    let mut session = Session::new("session-7");
    session.company_id = Some(7);
    session.access_token = Some("token".to_string());
    app.client
        .extension()
        .session_storage()
        .save_session(&session)
        .await
        .unwrap();

    let response = platform_router(&app)
        .oneshot(
            Request::builder()
                .uri("/api/company")
                .header("x-company-id", "7")
                .header(header::COOKIE, "ext_session_7=session-7")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"company_id": 7}));
}

#[tokio::test]
async fn test_application_proxy_headers() {
    let app = TestApp::new(None).await;
    let router = app.client.application_proxy_routes(Router::<FdkState>::new().route(
        "/app/info",
        get(
            |AxumExtension(fdk_api::ApplicationData(data)): AxumExtension<
                fdk_api::ApplicationData,
            >| async move { Json(data) },
        ),
    ));

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/app/info")
                .header("x-application-data", r#"{"_id":"app-1","token":"tok"}"#)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["_id"], "app-1");

    let response = router
        .oneshot(
            Request::builder()
                .uri("/app/info")
                .header("x-application-data", "not json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

async fn noop(_delivery: WebhookDelivery) -> Result<(), CallbackError> {
    Ok(())
}

fn webhook_config() -> WebhookConfig {
    WebhookConfig::new("/webhooks", "dev@example.com")
        .with_event("company/product/create", "1", handler_fn(noop))
        .with_subscribe_on_install(false)
}

fn webhook_request(body: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(signature) = signature {
        builder = builder.header(WEBHOOK_SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_webhook_with_valid_signature() {
    let app = TestApp::new(Some(webhook_config())).await;
    let body = json!({
        "event": {"name": "product", "type": "create", "category": "company"},
        "company_id": 1
    })
    .to_string();
    let signature = compute_signature(API_SECRET, body.as_bytes()).unwrap();

    let response = app
        .router()
        .oneshot(webhook_request(&body, Some(&signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"success": true}));
}

#[tokio::test]
async fn test_webhook_with_bad_signature() {
    let app = TestApp::new(Some(webhook_config())).await;
    let body = json!({
        "event": {"name": "product", "type": "create", "category": "company"},
        "company_id": 1
    })
    .to_string();

    let response = app
        .router()
        .oneshot(webhook_request(&body, Some("deadbeef")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error_message"].is_string());
}

#[tokio::test]
async fn test_webhook_without_handler() {
    let app = TestApp::new(Some(webhook_config())).await;
    let body = json!({
        "event": {"name": "order", "type": "placed", "category": "application"},
        "company_id": 1
    })
    .to_string();
    let signature = compute_signature(API_SECRET, body.as_bytes()).unwrap();

    let response = app
        .router()
        .oneshot(webhook_request(&body, Some(&signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_ping() {
    let app = TestApp::new(Some(webhook_config())).await;
    let body = json!({"event": {"name": "ping"}, "company_id": 1}).to_string();

    let response = app
        .router()
        .oneshot(webhook_request(&body, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
