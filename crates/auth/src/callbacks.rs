//! Hooks the extension author implements

use async_trait::async_trait;

use fdk_core::Session;

pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// What the `auth` callback gets to see once OAuth completed
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub company_id: i64,
    pub application_id: Option<String>,
    /// The extension's public base URL
    pub base_url: String,
    pub session: Session,
}

/// Lifecycle callbacks for an installed extension.
///
/// # Example
///
/// ```rust,ignore
/// struct MyCallbacks;
///
/// #[async_trait]
/// impl ExtensionCallbacks for MyCallbacks {
///     async fn auth(&self, ctx: &AuthContext) -> Result<String, CallbackError> {
///         Ok(format!("{}?company_id={}", ctx.base_url, ctx.company_id))
///     }
///
///     async fn uninstall(&self, _company_id: i64, _body: &Value) -> Result<(), CallbackError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ExtensionCallbacks: Send + Sync {
    /// Returns the URL the merchant lands on after a successful launch
    async fn auth(&self, ctx: &AuthContext) -> Result<String, CallbackError>;

    async fn uninstall(
        &self,
        company_id: i64,
        body: &serde_json::Value,
    ) -> Result<(), CallbackError>;

    /// Called when the platform installs the extension for a newly created company
    async fn auto_install(
        &self,
        _company_id: i64,
        _body: &serde_json::Value,
    ) -> Result<(), CallbackError> {
        Ok(())
    }
}
