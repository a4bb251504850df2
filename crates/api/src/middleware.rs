//! Request middleware for extension routes

use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use serde_json::{json, Value};
use std::collections::HashMap;

use fdk_core::constants::COMPANY_ID_HEADER;
use fdk_core::utils::company_cookie_name;
use fdk_core::Session;

use crate::error::ApiError;
use crate::state::FdkState;

/// Session resolved from the company cookie, if any
#[derive(Debug, Clone, Default)]
pub struct FdkSession(pub Option<Session>);

/// Parsed `x-user-data` header
#[derive(Debug, Clone)]
pub struct UserData(pub Value);

/// Parsed `x-application-data` header
#[derive(Debug, Clone)]
pub struct ApplicationData(pub Value);

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Company id from the `x-company-id` header, else the `company_id` query parameter
pub fn company_id_from_request(req: &Request) -> Option<String> {
    if let Some(id) = header_str(req.headers(), COMPANY_ID_HEADER) {
        return Some(id.to_string());
    }
    Query::<HashMap<String, String>>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(params)| params.get("company_id").cloned())
        .filter(|id| !id.is_empty())
}

/// Load the company's session from its cookie and attach it as [`FdkSession`]
pub async fn session_middleware(
    State(state): State<FdkState>,
    mut req: Request,
    next: Next,
) -> Response {
    let session_id = company_id_from_request(&req).and_then(|company_id| {
        CookieJar::from_headers(req.headers())
            .get(&company_cookie_name(&company_id))
            .map(|cookie| cookie.value().to_string())
    });

    let session = match session_id {
        Some(id) => match state.extension.session_storage().get_session(&id).await {
            Ok(session) => session,
            Err(e) => return ApiError::from(e).into_response(),
        },
        None => None,
    };

    req.extensions_mut().insert(FdkSession(session));
    next.run(req).await
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "unauthorized" })),
    )
        .into_response()
}

/// Requires a session and attaches a ready-to-use `PlatformClient`.
/// Must run after [`session_middleware`].
pub async fn platform_api_middleware(
    State(state): State<FdkState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(FdkSession(Some(mut session))) = req.extensions().get::<FdkSession>().cloned() else {
        return unauthorized();
    };
    let Some(company_id) = session.company_id else {
        return unauthorized();
    };

    let client = match state.platform_client(company_id, &mut session).await {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to build platform client for company {}: {}", company_id, e);
            return ApiError::from(e).into_response();
        }
    };

    req.extensions_mut().insert(client);
    req.extensions_mut().insert(FdkSession(Some(session)));
    next.run(req).await
}

fn json_header(headers: &HeaderMap, name: &str) -> Result<Option<Value>, ApiError> {
    match header_str(headers, name) {
        Some(raw) => serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| ApiError::BadRequest(format!("Invalid {} header: {}", name, e))),
        None => Ok(None),
    }
}

/// Parse storefront proxy headers and attach an `ApplicationClient`
pub async fn application_proxy_middleware(
    State(state): State<FdkState>,
    mut req: Request,
    next: Next,
) -> Response {
    let user = match json_header(req.headers(), "x-user-data") {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };
    let application = match json_header(req.headers(), "x-application-data") {
        Ok(application) => application,
        Err(e) => return e.into_response(),
    };

    if let Some(user) = user {
        req.extensions_mut().insert(UserData(user));
    }

    if let Some(application) = application {
        let id = application.get("_id").and_then(Value::as_str);
        let token = application.get("token").and_then(Value::as_str);
        if let (Some(id), Some(token)) = (id, token) {
            let client = state.extension.application_client(id, token);
            req.extensions_mut().insert(client);
        }
        req.extensions_mut().insert(ApplicationData(application));
    }

    next.run(req).await
}
