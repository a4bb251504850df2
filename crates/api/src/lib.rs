//! HTTP surface for platform extensions
//!
//! Provides the install / auth / uninstall / auto-install routes, the webhook
//! route, middleware for platform and storefront proxy routes, and
//! [`setup_fdk`] to wire them together.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod setup;
pub mod state;

pub use error::ApiError;
pub use middleware::{ApplicationData, FdkSession, UserData};
pub use setup::{setup_fdk, setup_with_catalog, FdkClient, FdkConfig};
pub use state::{FdkState, OAuthFactory};
