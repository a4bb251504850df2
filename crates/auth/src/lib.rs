//! Platform authentication for extensions
//!
//! Provides:
//! - `Extension`: validated extension config, token renewal and client construction
//! - OAuth, platform and storefront clients over a signed HTTP transport
//! - `ExtensionCallbacks`: hooks invoked on launch, install and uninstall

pub mod application;
pub mod callbacks;
pub mod cluster;
pub mod extension;
pub mod http;
pub mod oauth;
pub mod platform;
pub mod signer;

pub use application::{ApplicationClient, ApplicationConfig};
pub use callbacks::{AuthContext, CallbackError, ExtensionCallbacks};
pub use cluster::{ClusterApi, ClusterClient, ExtensionDetails};
pub use extension::{verify_scopes, Extension, ExtensionConfig};
pub use http::PlatformHttp;
pub use oauth::{AuthorizeRequest, OAuthClient, PlatformOAuth};
pub use platform::{PlatformClient, PlatformConfig};
