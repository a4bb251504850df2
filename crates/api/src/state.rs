use std::sync::Arc;

use fdk_auth::{Extension, PlatformClient, PlatformOAuth};
use fdk_core::{FdkError, Session};
use fdk_extensions::WebhookRegistry;

/// Builds the OAuth client used for a company
pub type OAuthFactory = Arc<dyn Fn(&Extension, i64) -> Arc<dyn PlatformOAuth> + Send + Sync>;

/// Shared state of the extension routes
#[derive(Clone)]
pub struct FdkState {
    pub extension: Arc<Extension>,
    pub webhook_registry: Arc<WebhookRegistry>,
    oauth_factory: OAuthFactory,
}

impl FdkState {
    pub fn new(extension: Arc<Extension>, webhook_registry: Arc<WebhookRegistry>) -> Self {
        Self {
            extension,
            webhook_registry,
            oauth_factory: Arc::new(|extension: &Extension, company_id: i64| {
                Arc::new(extension.oauth_client(company_id)) as Arc<dyn PlatformOAuth>
            }),
        }
    }

    #[must_use]
    pub fn with_oauth_factory(mut self, factory: OAuthFactory) -> Self {
        self.oauth_factory = factory;
        self
    }

    pub fn oauth(&self, company_id: i64) -> Arc<dyn PlatformOAuth> {
        (self.oauth_factory)(&self.extension, company_id)
    }

    /// Platform client for `company_id`, renewing `session` when its token is about to expire
    pub async fn platform_client(
        &self,
        company_id: i64,
        session: &mut Session,
    ) -> Result<PlatformClient, FdkError> {
        let oauth = self.oauth(company_id);
        self.extension
            .platform_client_with(oauth.as_ref(), company_id, session)
            .await
    }
}
