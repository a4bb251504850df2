//! Storefront (sales channel) API access

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Method;
use serde::de::DeserializeOwned;

use fdk_core::constants::DEFAULT_CLUSTER;
use fdk_core::utils::join_url;
use fdk_core::PlatformError;

use crate::http::{execute, PlatformHttp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationConfig {
    pub application_id: String,
    pub application_token: String,
    pub cluster: String,
}

impl ApplicationConfig {
    pub fn new(application_id: impl Into<String>, application_token: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            application_token: application_token.into(),
            cluster: DEFAULT_CLUSTER.to_string(),
        }
    }

    #[must_use]
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    /// `base64("{application_id}:{application_token}")`
    pub fn bearer_token(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.application_id, self.application_token))
    }
}

#[derive(Clone)]
pub struct ApplicationClient {
    http: PlatformHttp,
    config: ApplicationConfig,
}

impl ApplicationClient {
    pub fn new(http: PlatformHttp, config: ApplicationConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, PlatformError> {
        let url = join_url(&self.config.cluster, path);
        let request = self
            .http
            .request(method, &url, body)?
            .bearer_auth(self.config.bearer_token());
        execute(request).await
    }
}
