//! Company-scoped platform API access

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use fdk_core::utils::join_url;
use fdk_core::PlatformError;

use crate::http::{execute, PlatformHttp};

/// Everything needed to address one company on one cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformConfig {
    pub company_id: i64,
    pub cluster: String,
    pub api_key: String,
    #[serde(skip_serializing)]
    pub api_secret: String,
}

/// Bearer-authenticated client for the platform API of a single company
#[derive(Clone)]
pub struct PlatformClient {
    http: PlatformHttp,
    config: PlatformConfig,
    access_token: String,
}

impl PlatformClient {
    pub fn new(http: PlatformHttp, config: PlatformConfig, access_token: impl Into<String>) -> Self {
        Self {
            http,
            config,
            access_token: access_token.into(),
        }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn company_id(&self) -> i64 {
        self.config.company_id
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn url(&self, path: &str) -> String {
        join_url(&self.config.cluster, path)
    }

    /// Signed call to `{cluster}{path}` with the session's bearer token
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, PlatformError> {
        let url = self.url(path);
        tracing::debug!("Platform {} {}", method, url);
        let request = self
            .http
            .request(method, &url, body)?
            .bearer_auth(&self.access_token);
        execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization_hides_secret() {
        let config = PlatformConfig {
            company_id: 1,
            cluster: "https://api.fynd.com".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"api_key\":\"key\""));
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_url() {
        let client = PlatformClient::new(
            PlatformHttp::new().unwrap(),
            PlatformConfig {
                company_id: 1,
                cluster: "https://api.fynd.com/".to_string(),
                api_key: "key".to_string(),
                api_secret: "secret".to_string(),
            },
            "token",
        );
        assert_eq!(
            client.url("/service/platform/webhook/v1.0/company/1/subscriber/"),
            "https://api.fynd.com/service/platform/webhook/v1.0/company/1/subscriber/"
        );
        assert_eq!(client.company_id(), 1);
    }
}
