//! Extension configuration and platform client construction

use std::sync::Arc;
use tracing::debug;

use fdk_core::constants::{routes, DEFAULT_CLUSTER};
use fdk_core::utils::{current_timestamp_ms, is_valid_url, join_url};
use fdk_core::{AccessMode, FdkError, KeyValueStore, Session, SessionStorage};

use crate::application::{ApplicationClient, ApplicationConfig};
use crate::callbacks::ExtensionCallbacks;
use crate::cluster::{ClusterApi, ClusterClient, ExtensionDetails};
use crate::http::PlatformHttp;
use crate::oauth::{OAuthClient, PlatformOAuth};
use crate::platform::{PlatformClient, PlatformConfig};

/// Raw extension settings; every field is checked by [`Extension::initialize`]
#[derive(Clone, Default)]
pub struct ExtensionConfig {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub base_url: Option<String>,
    pub cluster: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub access_mode: Option<AccessMode>,
    pub callbacks: Option<Arc<dyn ExtensionCallbacks>>,
    pub storage: Option<Arc<dyn KeyValueStore>>,
    pub debug: bool,
}

impl ExtensionConfig {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            api_secret: Some(api_secret.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = Some(scopes);
        self
    }

    #[must_use]
    pub fn with_access_mode(mut self, access_mode: AccessMode) -> Self {
        self.access_mode = Some(access_mode);
        self
    }

    #[must_use]
    pub fn with_callbacks(mut self, callbacks: Arc<dyn ExtensionCallbacks>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Settings that passed the offline checks, before extension details are known
struct CheckedConfig {
    api_key: String,
    api_secret: String,
    base_url: Option<String>,
    cluster: String,
    scopes: Vec<String>,
    access_mode: AccessMode,
    callbacks: Arc<dyn ExtensionCallbacks>,
    storage: Arc<dyn KeyValueStore>,
    debug: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn check_config(config: ExtensionConfig) -> Result<CheckedConfig, FdkError> {
    let api_key = non_empty(config.api_key)
        .ok_or_else(|| FdkError::InvalidConfig("Invalid api_key".to_string()))?;
    let api_secret = non_empty(config.api_secret)
        .ok_or_else(|| FdkError::InvalidConfig("Invalid api_secret".to_string()))?;
    let callbacks = config.callbacks.ok_or_else(|| {
        FdkError::InvalidConfig(
            "Missing some of callbacks. Please add all `auth` and `uninstall` callbacks."
                .to_string(),
        )
    })?;
    let storage = config
        .storage
        .ok_or_else(|| FdkError::InvalidConfig("Missing storage".to_string()))?;

    let cluster = match config.cluster {
        Some(cluster) if is_valid_url(&cluster) => cluster.trim_end_matches('/').to_string(),
        Some(_) => return Err(FdkError::InvalidConfig("Invalid cluster".to_string())),
        None => DEFAULT_CLUSTER.to_string(),
    };

    let base_url = match non_empty(config.base_url) {
        Some(url) if !is_valid_url(&url) => {
            return Err(FdkError::InvalidConfig(format!(
                "Invalid base_url value. Invalid value: {}",
                url
            )))
        }
        other => other,
    };

    Ok(CheckedConfig {
        api_key,
        api_secret,
        base_url,
        cluster,
        scopes: config.scopes.unwrap_or_default(),
        access_mode: config.access_mode.unwrap_or(AccessMode::Offline),
        callbacks,
        storage,
        debug: config.debug,
    })
}

/// Configured scopes must all be granted; none configured means all granted ones
pub fn verify_scopes(configured: &[String], granted: &[String]) -> Result<Vec<String>, FdkError> {
    if configured.is_empty() {
        return Ok(granted.to_vec());
    }
    let missing: Vec<&str> = configured
        .iter()
        .filter(|scope| !granted.contains(scope))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(FdkError::InvalidConfig(format!(
            "Invalid scopes in extension config. Invalid scopes: {}",
            missing.join(", ")
        )));
    }
    Ok(configured.to_vec())
}

/// A validated extension, ready to serve installs for any company
pub struct Extension {
    api_key: String,
    api_secret: String,
    base_url: String,
    cluster: String,
    scopes: Vec<String>,
    access_mode: AccessMode,
    callbacks: Arc<dyn ExtensionCallbacks>,
    session_storage: SessionStorage,
    http: PlatformHttp,
    details: ExtensionDetails,
    debug: bool,
}

impl Extension {
    /// Validate `config`, then fetch the extension details from the cluster
    pub async fn initialize(config: ExtensionConfig) -> Result<Self, FdkError> {
        let checked = check_config(config)?;
        let http = PlatformHttp::new()?;
        let cluster_client = ClusterClient::new(http.clone(), checked.cluster.clone());
        Self::complete(checked, http, &cluster_client).await
    }

    /// Same as [`Extension::initialize`] with a caller-provided details source
    pub async fn initialize_with(
        config: ExtensionConfig,
        cluster_api: &dyn ClusterApi,
    ) -> Result<Self, FdkError> {
        let checked = check_config(config)?;
        let http = PlatformHttp::new()?;
        Self::complete(checked, http, cluster_api).await
    }

    async fn complete(
        checked: CheckedConfig,
        http: PlatformHttp,
        cluster_api: &dyn ClusterApi,
    ) -> Result<Self, FdkError> {
        let details = cluster_api
            .extension_details(&checked.api_key, &checked.api_secret)
            .await
            .map_err(|e| {
                FdkError::InvalidConfig(format!("Invalid api_key or api_secret. Reason: {}", e))
            })?;

        let granted = details.scope.clone().ok_or_else(|| {
            FdkError::ClusterMetaMissing("Extension details do not contain scope".to_string())
        })?;

        let base_url = checked
            .base_url
            .or_else(|| details.base_url.clone())
            .ok_or_else(|| {
                FdkError::ClusterMetaMissing("Extension base_url is not configured".to_string())
            })?;

        let scopes = verify_scopes(&checked.scopes, &granted)?;

        debug!("Extension initialized");

        Ok(Self {
            api_key: checked.api_key,
            api_secret: checked.api_secret,
            base_url,
            cluster: checked.cluster,
            scopes,
            access_mode: checked.access_mode,
            callbacks: checked.callbacks,
            session_storage: SessionStorage::new(checked.storage),
            http,
            details,
            debug: checked.debug,
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    pub fn callbacks(&self) -> &Arc<dyn ExtensionCallbacks> {
        &self.callbacks
    }

    pub fn session_storage(&self) -> &SessionStorage {
        &self.session_storage
    }

    pub fn http(&self) -> &PlatformHttp {
        &self.http
    }

    pub fn details(&self) -> &ExtensionDetails {
        &self.details
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn auth_callback(&self) -> String {
        join_url(&self.base_url, routes::AUTH)
    }

    pub fn is_online_access_mode(&self) -> bool {
        self.access_mode == AccessMode::Online
    }

    pub fn platform_config(&self, company_id: i64) -> PlatformConfig {
        PlatformConfig {
            company_id,
            cluster: self.cluster.clone(),
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
        }
    }

    pub fn oauth_client(&self, company_id: i64) -> OAuthClient {
        OAuthClient::new(
            self.http.clone(),
            &self.cluster,
            company_id,
            self.api_key.clone(),
            self.api_secret.clone(),
        )
    }

    pub fn offline_session_id(&self, company_id: i64) -> String {
        Session::generate_session_id(false, &self.cluster, company_id)
    }

    /// Renew the session's access token when it has at most two minutes left.
    /// Returns whether a renewal happened; a renewed session is persisted.
    pub async fn renew_session_if_expiring(
        &self,
        oauth: &dyn PlatformOAuth,
        session: &mut Session,
    ) -> Result<bool, FdkError> {
        let now = current_timestamp_ms();
        if !session.needs_token_renewal(now) {
            return Ok(false);
        }

        debug!(
            "Renewing {} access token for company {:?}",
            session.access_mode.as_str(),
            session.company_id
        );

        let mut grant = match (session.access_mode, session.refresh_token.as_deref()) {
            (AccessMode::Offline, _) => oauth.offline_token(&self.scopes, None).await?,
            (AccessMode::Online, Some(refresh_token)) => {
                oauth.refresh_access_token(refresh_token).await?
            }
            (AccessMode::Online, None) => return Ok(false),
        };

        if grant.access_token_validity.is_none() {
            grant = grant.with_validity_from(now);
        }
        if grant.refresh_token.is_none() {
            grant.refresh_token = session.refresh_token.clone();
        }
        if grant.access_mode.is_none() {
            grant.access_mode = Some(session.access_mode);
        }

        session.update_token(&grant);
        self.session_storage.save_session(session).await?;

        debug!("Access token renewed for company {:?}", session.company_id);
        Ok(true)
    }

    /// Build a platform client for `company_id`, renewing the session first if needed
    pub async fn get_platform_client(
        &self,
        company_id: i64,
        session: &mut Session,
    ) -> Result<PlatformClient, FdkError> {
        let oauth = self.oauth_client(company_id);
        self.platform_client_with(&oauth, company_id, session).await
    }

    pub async fn platform_client_with(
        &self,
        oauth: &dyn PlatformOAuth,
        company_id: i64,
        session: &mut Session,
    ) -> Result<PlatformClient, FdkError> {
        self.renew_session_if_expiring(oauth, session).await?;
        let access_token = session.access_token.clone().ok_or_else(|| {
            FdkError::SessionNotFound(format!(
                "Session {} has no access token",
                session.session_id
            ))
        })?;
        Ok(PlatformClient::new(
            self.http.clone(),
            self.platform_config(company_id),
            access_token,
        ))
    }

    pub fn application_client(
        &self,
        application_id: impl Into<String>,
        application_token: impl Into<String>,
    ) -> ApplicationClient {
        let config = ApplicationConfig::new(application_id, application_token)
            .with_cluster(self.cluster.clone());
        ApplicationClient::new(self.http.clone(), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{AuthContext, CallbackError};
    use crate::oauth::AuthorizeRequest;
    use async_trait::async_trait;
    use fdk_core::{MemoryStorage, PlatformError, TokenGrant};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopCallbacks;

    #[async_trait]
    impl ExtensionCallbacks for NoopCallbacks {
        async fn auth(&self, ctx: &AuthContext) -> Result<String, CallbackError> {
            Ok(ctx.base_url.clone())
        }

        async fn uninstall(&self, _: i64, _: &serde_json::Value) -> Result<(), CallbackError> {
            Ok(())
        }
    }

    struct StaticCluster {
        details: Option<ExtensionDetails>,
    }

    #[async_trait]
    impl ClusterApi for StaticCluster {
        async fn extension_details(
            &self,
            _api_key: &str,
            _api_secret: &str,
        ) -> Result<ExtensionDetails, PlatformError> {
            self.details.clone().ok_or(PlatformError::Status {
                status: 401,
                body: "unauthorized".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct CountingOAuth {
        offline: AtomicUsize,
        refresh: AtomicUsize,
    }

    #[async_trait]
    impl PlatformOAuth for CountingOAuth {
        fn authorization_url(&self, _: &AuthorizeRequest) -> Result<String, PlatformError> {
            Ok(String::new())
        }

        async fn exchange_code(&self, _: &str) -> Result<TokenGrant, PlatformError> {
            unreachable!()
        }

        async fn offline_token(
            &self,
            _: &[String],
            _: Option<&str>,
        ) -> Result<TokenGrant, PlatformError> {
            self.offline.fetch_add(1, Ordering::SeqCst);
            Ok(new_grant("offline-token", None))
        }

        async fn refresh_access_token(&self, _: &str) -> Result<TokenGrant, PlatformError> {
            self.refresh.fetch_add(1, Ordering::SeqCst);
            Ok(new_grant("refreshed-token", Some("rt-2")))
        }
    }

    fn new_grant(token: &str, refresh: Option<&str>) -> TokenGrant {
        TokenGrant {
            access_token: token.to_string(),
            refresh_token: refresh.map(String::from),
            expires_in: Some(3600),
            current_user: None,
            access_mode: None,
            access_token_validity: None,
        }
    }

    fn details() -> ExtensionDetails {
        ExtensionDetails {
            name: Some("demo".to_string()),
            base_url: Some("https://ext.example.com".to_string()),
            scope: Some(vec![
                "company/products".to_string(),
                "company/orders".to_string(),
            ]),
            extra: Default::default(),
        }
    }

    fn config() -> ExtensionConfig {
        ExtensionConfig::new("api-key", "api-secret")
            .with_callbacks(Arc::new(NoopCallbacks))
            .with_storage(Arc::new(MemoryStorage::new(None)))
    }

    async fn init(config: ExtensionConfig) -> Result<Extension, FdkError> {
        let cluster = StaticCluster {
            details: Some(details()),
        };
        Extension::initialize_with(config, &cluster).await
    }

    fn config_error(result: Result<Extension, FdkError>) -> String {
        match result {
            Err(FdkError::InvalidConfig(message)) => message,
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let mut cfg = config();
        cfg.api_key = None;
        assert_eq!(config_error(init(cfg).await), "Invalid api_key");

        let mut cfg = config();
        cfg.api_key = Some(String::new());
        assert_eq!(config_error(init(cfg).await), "Invalid api_key");
    }

    #[tokio::test]
    async fn test_missing_api_secret() {
        let mut cfg = config();
        cfg.api_secret = None;
        assert_eq!(config_error(init(cfg).await), "Invalid api_secret");
    }

    #[tokio::test]
    async fn test_missing_callbacks() {
        let mut cfg = config();
        cfg.callbacks = None;
        assert!(config_error(init(cfg).await).starts_with("Missing some of callbacks"));
    }

    #[tokio::test]
    async fn test_missing_storage() {
        let mut cfg = config();
        cfg.storage = None;
        assert_eq!(config_error(init(cfg).await), "Missing storage");
    }

    #[tokio::test]
    async fn test_invalid_cluster() {
        assert_eq!(
            config_error(init(config().with_cluster("invalid_url")).await),
            "Invalid cluster"
        );
        assert_eq!(
            config_error(init(config().with_cluster("")).await),
            "Invalid cluster"
        );
    }

    #[tokio::test]
    async fn test_invalid_base_url() {
        assert_eq!(
            config_error(init(config().with_base_url("not a url")).await),
            "Invalid base_url value. Invalid value: not a url"
        );
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let cluster = StaticCluster { details: None };
        let message = config_error(Extension::initialize_with(config(), &cluster).await);
        assert!(message.starts_with("Invalid api_key or api_secret. Reason:"));
    }

    #[tokio::test]
    async fn test_details_without_scope() {
        let mut d = details();
        d.scope = None;
        let cluster = StaticCluster { details: Some(d) };
        let result = Extension::initialize_with(config(), &cluster).await;
        assert!(matches!(result, Err(FdkError::ClusterMetaMissing(_))));
    }

    #[tokio::test]
    async fn test_defaults_from_details() {
        let ext = init(config()).await.unwrap();
        assert_eq!(ext.cluster(), DEFAULT_CLUSTER);
        assert_eq!(ext.base_url(), "https://ext.example.com");
        assert_eq!(ext.scopes(), details().scope.unwrap().as_slice());
        assert_eq!(ext.access_mode(), AccessMode::Offline);
        assert!(!ext.is_online_access_mode());
        assert_eq!(ext.auth_callback(), "https://ext.example.com/fp/auth");
    }

    #[tokio::test]
    async fn test_configured_scopes_must_be_granted() {
        let message = config_error(
            init(config().with_scopes(vec![
                "company/products".to_string(),
                "company/payments".to_string(),
            ]))
            .await,
        );
        assert_eq!(
            message,
            "Invalid scopes in extension config. Invalid scopes: company/payments"
        );

        let ext = init(config().with_scopes(vec!["company/orders".to_string()]))
            .await
            .unwrap();
        assert_eq!(ext.scopes(), ["company/orders".to_string()]);
    }

    #[tokio::test]
    async fn test_offline_session_id() {
        let ext = init(config().with_cluster("https://api.fyndx1.de")).await.unwrap();
        assert_eq!(
            ext.offline_session_id(5),
            Session::generate_session_id(false, "https://api.fyndx1.de", 5)
        );
    }

    fn session_with_validity(validity_from_now_ms: i64, mode: AccessMode) -> Session {
        let mut session = Session::new("sid");
        session.company_id = Some(1);
        session.access_mode = mode;
        session.access_token = Some("old-token".to_string());
        session.refresh_token = Some("rt-1".to_string());
        session.access_token_validity = Some(current_timestamp_ms() + validity_from_now_ms);
        session
    }

    #[tokio::test]
    async fn test_no_renewal_when_token_is_fresh() {
        let ext = init(config()).await.unwrap();
        let oauth = CountingOAuth::default();
        let mut session = session_with_validity(600_000, AccessMode::Online);

        let client = ext.platform_client_with(&oauth, 1, &mut session).await.unwrap();
        assert_eq!(client.access_token(), "old-token");
        assert_eq!(oauth.refresh.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_online_renewal_uses_refresh_token() {
        let ext = init(config()).await.unwrap();
        let oauth = CountingOAuth::default();
        let mut session = session_with_validity(60_000, AccessMode::Online);

        let client = ext.platform_client_with(&oauth, 1, &mut session).await.unwrap();
        assert_eq!(client.access_token(), "refreshed-token");
        assert_eq!(oauth.refresh.load(Ordering::SeqCst), 1);
        assert_eq!(session.refresh_token.as_deref(), Some("rt-2"));
        assert!(session.access_token_validity.unwrap() > current_timestamp_ms() + 3_000_000);

        let stored = ext.session_storage().get_session("sid").await.unwrap().unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("refreshed-token"));
    }

    #[tokio::test]
    async fn test_offline_renewal_keeps_refresh_token() {
        let ext = init(config()).await.unwrap();
        let oauth = CountingOAuth::default();
        let mut session = session_with_validity(-1_000, AccessMode::Offline);

        let renewed = ext.renew_session_if_expiring(&oauth, &mut session).await.unwrap();
        assert!(renewed);
        assert_eq!(oauth.offline.load(Ordering::SeqCst), 1);
        assert_eq!(session.access_token.as_deref(), Some("offline-token"));
        assert_eq!(session.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(session.access_mode, AccessMode::Offline);
    }

    #[tokio::test]
    async fn test_no_renewal_without_refresh_token() {
        let ext = init(config()).await.unwrap();
        let oauth = CountingOAuth::default();
        let mut session = session_with_validity(0, AccessMode::Online);
        session.refresh_token = None;

        assert!(!ext.renew_session_if_expiring(&oauth, &mut session).await.unwrap());
        assert_eq!(oauth.refresh.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_platform_client_requires_token() {
        let ext = init(config()).await.unwrap();
        let oauth = CountingOAuth::default();
        let mut session = Session::new("empty");

        let result = ext.platform_client_with(&oauth, 1, &mut session).await;
        assert!(matches!(result, Err(FdkError::SessionNotFound(_))));
    }

    #[test]
    fn test_verify_scopes_empty_falls_back() {
        let granted = vec!["a".to_string()];
        assert_eq!(verify_scopes(&[], &granted).unwrap(), granted);
    }
}
