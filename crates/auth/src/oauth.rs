//! Company-scoped OAuth endpoints

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use url::Url;

use fdk_core::utils::{current_timestamp_ms, join_url};
use fdk_core::{AccessMode, PlatformError, TokenGrant};

use crate::http::{execute, PlatformHttp};

/// Parameters of the authorization redirect
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub scope: Vec<String>,
    pub redirect_uri: String,
    pub state: String,
    pub access_mode: AccessMode,
}

#[async_trait]
pub trait PlatformOAuth: Send + Sync {
    /// URL the merchant's browser is sent to for consent
    fn authorization_url(&self, request: &AuthorizeRequest) -> Result<String, PlatformError>;

    /// Exchange an authorization code for an online token
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, PlatformError>;

    /// Obtain an offline (company-level) token. `code` is present during
    /// installation and absent when re-minting an expired offline token.
    async fn offline_token(
        &self,
        scopes: &[String],
        code: Option<&str>,
    ) -> Result<TokenGrant, PlatformError>;

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant, PlatformError>;
}

#[derive(Clone)]
pub struct OAuthClient {
    http: PlatformHttp,
    base: String,
    api_key: String,
    api_secret: String,
}

impl OAuthClient {
    pub fn new(
        http: PlatformHttp,
        cluster: &str,
        company_id: i64,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base: join_url(
                cluster,
                &format!(
                    "/service/panel/authentication/v1.0/company/{}/oauth",
                    company_id
                ),
            ),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    async fn token_request(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<TokenGrant, PlatformError> {
        let url = format!("{}/{}", self.base, path);
        let request = self
            .http
            .request(Method::POST, &url, Some(&body))?
            .basic_auth(&self.api_key, Some(&self.api_secret));
        let grant: TokenGrant = execute(request).await?;
        Ok(grant.with_validity_from(current_timestamp_ms()))
    }
}

#[async_trait]
impl PlatformOAuth for OAuthClient {
    fn authorization_url(&self, request: &AuthorizeRequest) -> Result<String, PlatformError> {
        let mut url = Url::parse(&format!("{}/authorize", self.base))
            .map_err(|e| PlatformError::Request(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.api_key)
            .append_pair("scope", &request.scope.join(","))
            .append_pair("redirect_uri", &request.redirect_uri)
            .append_pair("state", &request.state)
            .append_pair("access_mode", request.access_mode.as_str())
            .append_pair("response_type", "code");
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, PlatformError> {
        let grant = self
            .token_request(
                "token",
                json!({
                    "grant_type": "authorization_code",
                    "code": code,
                }),
            )
            .await?;
        Ok(grant.with_access_mode(AccessMode::Online))
    }

    async fn offline_token(
        &self,
        scopes: &[String],
        code: Option<&str>,
    ) -> Result<TokenGrant, PlatformError> {
        let mut body = json!({
            "client_id": self.api_key,
            "client_secret": self.api_secret,
            "grant_type": "client_credentials",
            "scope": scopes,
        });
        if let Some(code) = code {
            body["code"] = json!(code);
        }
        let grant = self.token_request("offline-token", body).await?;
        Ok(grant.with_access_mode(AccessMode::Offline))
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant, PlatformError> {
        let grant = self
            .token_request(
                "token",
                json!({
                    "grant_type": "refresh_token",
                    "refresh_token": refresh_token,
                }),
            )
            .await?;
        Ok(grant.with_access_mode(AccessMode::Online))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OAuthClient {
        OAuthClient::new(
            PlatformHttp::new().unwrap(),
            "https://api.fynd.com/",
            42,
            "key",
            "secret",
        )
    }

    #[test]
    fn test_base_url() {
        assert_eq!(
            client().base_url(),
            "https://api.fynd.com/service/panel/authentication/v1.0/company/42/oauth"
        );
    }

    #[test]
    fn test_authorization_url() {
        let url = client()
            .authorization_url(&AuthorizeRequest {
                scope: vec!["company/products".to_string(), "company/orders".to_string()],
                redirect_uri: "https://ext.example.com/fp/auth".to_string(),
                state: "abc".to_string(),
                access_mode: AccessMode::Online,
            })
            .unwrap();

        let parsed = Url::parse(&url).unwrap();
        assert_eq!(
            parsed.path(),
            "/service/panel/authentication/v1.0/company/42/oauth/authorize"
        );
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "key");
        assert_eq!(pairs["scope"], "company/products,company/orders");
        assert_eq!(pairs["redirect_uri"], "https://ext.example.com/fp/auth");
        assert_eq!(pairs["state"], "abc");
        assert_eq!(pairs["access_mode"], "online");
        assert_eq!(pairs["response_type"], "code");
    }
}
