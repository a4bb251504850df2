//! JSON error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use fdk_core::{FdkError, PlatformError};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Fdk(FdkError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Fdk(e) => status_for(e),
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::BadRequest(message) => message.clone(),
            ApiError::Fdk(e) => e.to_string(),
        }
    }
}

pub fn status_for(error: &FdkError) -> StatusCode {
    match error {
        FdkError::SessionNotFound(_) | FdkError::InvalidOAuth(_) | FdkError::InvalidHmac(_) => {
            StatusCode::UNAUTHORIZED
        }
        FdkError::WebhookHandlerNotFound(_) => StatusCode::NOT_FOUND,
        FdkError::Platform(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<FdkError> for ApiError {
    fn from(e: FdkError) -> Self {
        ApiError::Fdk(e)
    }
}

impl From<PlatformError> for ApiError {
    fn from(e: PlatformError) -> Self {
        ApiError::Fdk(FdkError::Platform(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.message());
        } else {
            tracing::warn!("Request rejected: {}", self.message());
        }
        (status, Json(json!({ "error_message": self.message() }))).into_response()
    }
}
