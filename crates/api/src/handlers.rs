//! Install, auth, uninstall and webhook route handlers

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use fdk_auth::{AuthContext, AuthorizeRequest};
use fdk_core::constants::{COMPANY_ID_HEADER, SESSION_EXPIRY_IN_SECONDS, WEBHOOK_SIGNATURE_HEADER};
use fdk_core::utils::company_cookie_name;
use fdk_core::{AccessMode, FdkError, Session};
use fdk_extensions::WebhookDispatch;

use crate::error::ApiError;
use crate::middleware::FdkSession;
use crate::state::FdkState;

#[derive(Debug, Deserialize)]
pub struct InstallParams {
    pub company_id: Option<String>,
    pub application_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub application_id: Option<String>,
}

fn parse_company_id(raw: Option<&str>) -> Result<i64, ApiError> {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .ok_or_else(|| ApiError::BadRequest("Invalid or missing company_id".to_string()))
}

/// Company id from a JSON body, given as a number or a numeric string
fn body_company_id(body: &Value) -> Result<i64, ApiError> {
    match body.get("company_id") {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| ApiError::BadRequest("Invalid company_id".to_string())),
        Some(Value::String(s)) => parse_company_id(Some(s)),
        _ => Err(ApiError::BadRequest("Invalid or missing company_id".to_string())),
    }
}

fn session_cookie(company_id: i64, session_id: &str, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((company_cookie_name(company_id), session_id.to_string()))
        .secure(true)
        .http_only(false)
        .same_site(SameSite::None)
        .path("/")
        .max_age(time::Duration::seconds(max_age_secs.max(0)))
        .build()
}

fn company_header(company_id: i64) -> [(HeaderName, HeaderValue); 1] {
    [(
        HeaderName::from_static(COMPANY_ID_HEADER),
        HeaderValue::from(company_id),
    )]
}

/// `302 Found` to `url`
fn found(url: &str) -> Result<(StatusCode, [(HeaderName, HeaderValue); 1]), ApiError> {
    let location = HeaderValue::try_from(url)
        .map_err(|_| ApiError::BadRequest(format!("Invalid redirect url: {}", url)))?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]))
}

/// Start the install flow: create an online session and send the merchant to consent
pub async fn install_handler(
    State(state): State<FdkState>,
    Query(params): Query<InstallParams>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let extension = &state.extension;
    let company_id = parse_company_id(params.company_id.as_deref())?;

    let mut session = Session::new(Session::generate_session_id(
        true,
        extension.cluster(),
        company_id,
    ));
    session.company_id = Some(company_id);
    session.scope = extension.scopes().to_vec();
    session.expires = Some(Utc::now() + Duration::seconds(SESSION_EXPIRY_IN_SECONDS));
    session.access_mode = AccessMode::Online;
    session.extension_id = Some(extension.api_key().to_string());
    session.state = Some(uuid::Uuid::new_v4().to_string());

    let mut redirect_uri = extension.auth_callback();
    if let Some(application_id) = params.application_id.as_deref().filter(|id| !id.is_empty()) {
        redirect_uri = format!(
            "{}?application_id={}",
            redirect_uri,
            urlencoding::encode(application_id)
        );
    }

    let redirect_url = state.oauth(company_id).authorization_url(&AuthorizeRequest {
        scope: session.scope.clone(),
        redirect_uri,
        state: session.state.clone().unwrap_or_default(),
        access_mode: AccessMode::Online,
    })?;

    extension.session_storage().save_session(&session).await?;

    debug!("Redirecting after install callback to url: {}", redirect_url);

    let jar = jar.add(session_cookie(
        company_id,
        &session.session_id,
        SESSION_EXPIRY_IN_SECONDS,
    ));
    Ok((jar, company_header(company_id), found(&redirect_url)?).into_response())
}

/// Load the company's offline session, starting over if it belongs to another extension
async fn offline_session(state: &FdkState, company_id: i64) -> Result<Session, FdkError> {
    let extension = &state.extension;
    let session_id = extension.offline_session_id(company_id);
    let session = extension
        .session_storage()
        .get_session(&session_id)
        .await?
        .filter(|s| s.extension_id.as_deref() == Some(extension.api_key()));
    Ok(session.unwrap_or_else(|| Session::new(session_id)))
}

async fn sync_webhooks(
    state: &FdkState,
    company_id: i64,
    session: &mut Session,
) -> Result<(), FdkError> {
    if !state.webhook_registry.should_sync_on_install().await {
        return Ok(());
    }
    let client = state.platform_client(company_id, session).await?;
    let outcome = state
        .webhook_registry
        .sync_events(&client, None, Some(true))
        .await?;
    debug!("Webhook sync for company {}: {:?}", company_id, outcome);
    Ok(())
}

/// OAuth callback: exchange the code, persist sessions and hand over to the `auth` callback
pub async fn auth_handler(
    State(state): State<FdkState>,
    Extension(FdkSession(session)): Extension<FdkSession>,
    Query(params): Query<AuthParams>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let extension = &state.extension;

    let mut session = session.ok_or_else(|| {
        FdkError::SessionNotFound("Can not complete oauth process as session not found".to_string())
    })?;
    if session.state.is_none() || session.state != params.state {
        return Err(FdkError::InvalidOAuth("Invalid oauth call".to_string()).into());
    }
    let company_id = session.company_id.ok_or_else(|| {
        FdkError::SessionNotFound("Session is not bound to a company".to_string())
    })?;
    let code = params
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| FdkError::InvalidOAuth("Missing authorization code".to_string()))?;

    let oauth = state.oauth(company_id);
    let mut grant = oauth.exchange_code(code).await?;

    let expires_in = grant.expires_in.unwrap_or(SESSION_EXPIRY_IN_SECONDS);
    let expires = Utc::now() + Duration::seconds(expires_in);
    grant.access_token_validity = Some(expires.timestamp_millis());
    session.expires = Some(expires);
    session.update_token(&grant);
    extension.session_storage().save_session(&session).await?;

    if !extension.is_online_access_mode() {
        let mut offline = offline_session(&state, company_id).await?;
        let offline_grant = oauth.offline_token(extension.scopes(), Some(code)).await?;
        offline.company_id = Some(company_id);
        offline.scope = extension.scopes().to_vec();
        offline.state = session.state.clone();
        offline.extension_id = Some(extension.api_key().to_string());
        offline.access_mode = AccessMode::Offline;
        offline.update_token(&offline_grant.with_access_mode(AccessMode::Offline));
        extension.session_storage().save_session(&offline).await?;
    }

    sync_webhooks(&state, company_id, &mut session).await?;

    let redirect_url = extension
        .callbacks()
        .auth(&AuthContext {
            company_id,
            application_id: params.application_id.clone(),
            base_url: extension.base_url().to_string(),
            session: session.clone(),
        })
        .await
        .map_err(|e| FdkError::Callback(e.to_string()))?;

    debug!("Redirecting after auth callback to url: {}", redirect_url);

    let jar = jar.add(session_cookie(company_id, &session.session_id, expires_in));
    Ok((jar, company_header(company_id), found(&redirect_url)?).into_response())
}

/// Install without a browser, triggered by the platform when a company is created
pub async fn auto_install_handler(
    State(state): State<FdkState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let extension = &state.extension;
    let company_id = body_company_id(&body)?;
    let code = body.get("code").and_then(Value::as_str);

    debug!("Extension auto install started for company: {}", company_id);

    let mut session = offline_session(&state, company_id).await?;
    let grant = state
        .oauth(company_id)
        .offline_token(extension.scopes(), code)
        .await?;
    session.company_id = Some(company_id);
    session.scope = extension.scopes().to_vec();
    session.state = Some(uuid::Uuid::new_v4().to_string());
    session.extension_id = Some(extension.api_key().to_string());
    session.access_mode = AccessMode::Offline;
    session.update_token(&grant.with_access_mode(AccessMode::Offline));

    if !extension.is_online_access_mode() {
        extension.session_storage().save_session(&session).await?;
    }

    sync_webhooks(&state, company_id, &mut session).await?;

    extension
        .callbacks()
        .auto_install(company_id, &body)
        .await
        .map_err(|e| FdkError::Callback(e.to_string()))?;

    debug!("Extension installed for company: {} on company creation", company_id);
    Ok(Json(json!({ "message": "success" })))
}

pub async fn uninstall_handler(
    State(state): State<FdkState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let extension = &state.extension;
    let company_id = body_company_id(&body)?;

    if !extension.is_online_access_mode() {
        let session_id = extension.offline_session_id(company_id);
        extension.session_storage().delete_session(&session_id).await?;
    }

    extension
        .callbacks()
        .uninstall(company_id, &body)
        .await
        .map_err(|e| FdkError::Callback(e.to_string()))?;

    debug!("Extension uninstalled for company: {}", company_id);
    Ok(Json(json!({ "success": true })))
}

/// Inbound webhook deliveries
pub async fn webhook_handler(
    State(state): State<FdkState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    match state.webhook_registry.process_webhook(signature, &body).await {
        Ok(WebhookDispatch::Ping) => {
            debug!("Webhook ping received");
            Json(json!({ "success": true })).into_response()
        }
        Ok(WebhookDispatch::Handled { event_name }) => {
            debug!("Webhook {} processed", event_name);
            Json(json!({ "success": true })).into_response()
        }
        Err(e) => {
            let status = crate::error::status_for(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!("Webhook processing failed: {}", e);
            } else {
                tracing::warn!("Webhook rejected: {}", e);
            }
            (
                status,
                Json(json!({ "success": false, "error_message": e.to_string() })),
            )
                .into_response()
        }
    }
}
