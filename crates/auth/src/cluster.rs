//! Partner-level calls made with the extension's own credentials

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use fdk_core::utils::join_url;
use fdk_core::PlatformError;

use crate::http::{execute, PlatformHttp};

/// Extension metadata held by the platform
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtensionDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Scopes granted to the extension
    #[serde(default)]
    pub scope: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn extension_details(
        &self,
        api_key: &str,
        api_secret: &str,
    ) -> Result<ExtensionDetails, PlatformError>;
}

/// Unauthenticated (or partner-authenticated) access to a cluster
#[derive(Clone)]
pub struct ClusterClient {
    http: PlatformHttp,
    cluster: String,
}

impl ClusterClient {
    pub fn new(http: PlatformHttp, cluster: impl Into<String>) -> Self {
        Self {
            http,
            cluster: cluster.into(),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn http(&self) -> &PlatformHttp {
        &self.http
    }

    pub fn url(&self, path: &str) -> String {
        join_url(&self.cluster, path)
    }
}

#[async_trait]
impl ClusterApi for ClusterClient {
    async fn extension_details(
        &self,
        api_key: &str,
        api_secret: &str,
    ) -> Result<ExtensionDetails, PlatformError> {
        let url = self.url(&format!(
            "/service/panel/partners/v1.0/extensions/details/{}",
            api_key
        ));
        let request = self
            .http
            .request(Method::GET, &url, None)?
            .basic_auth(api_key, Some(api_secret));
        execute(request).await
    }
}
