//! Signed HTTP transport shared by the platform clients

use chrono::Utc;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use fdk_core::PlatformError;

use crate::signer::{sign_request, DATE_HEADER, SIGNATURE_HEADER};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct PlatformHttp {
    client: reqwest::Client,
}

impl PlatformHttp {
    pub fn new() -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("fdk-extension-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::Request(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a signed request. A JSON body, when given, is serialized once so
    /// the signed bytes and the sent bytes are identical.
    pub fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<RequestBuilder, PlatformError> {
        let parsed = Url::parse(url).map_err(|e| PlatformError::Request(format!("{}: {}", url, e)))?;
        let payload = match body {
            Some(value) => serde_json::to_vec(value).map_err(|e| PlatformError::Request(e.to_string()))?,
            None => Vec::new(),
        };

        let signature = sign_request(method.as_str(), &parsed, &payload, Utc::now())
            .map_err(|e| PlatformError::Request(format!("signing failed: {}", e)))?;

        let mut builder = self
            .client
            .request(method, parsed)
            .header(DATE_HEADER, signature.date)
            .header(SIGNATURE_HEADER, signature.signature);

        if body.is_some() {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(payload);
        }
        Ok(builder)
    }
}

/// Send a request and decode a JSON body, mapping non-2xx to [`PlatformError::Status`]
pub async fn execute<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, PlatformError> {
    let response = request
        .send()
        .await
        .map_err(|e| PlatformError::Request(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PlatformError::Status {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| PlatformError::Decode(e.to_string()))
}
