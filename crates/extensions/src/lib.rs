//! Webhook integration for platform extensions
//!
//! This crate keeps an extension's webhook subscriptions in line with its
//! configuration and routes inbound deliveries:
//! - Subscriber reconciliation: register or update per company
//! - Sales channel scoping: enable or disable delivery per application
//! - Inbound events: HMAC verification and handler dispatch

pub mod models;
pub mod platform;
pub mod webhook;

pub use models::*;
pub use platform::{EventCatalog, WebhookApi};
pub use webhook::{
    compute_signature, handler_fn, EventMapEntry, RegistryContext, SalesChannelScope, SyncOutcome,
    WebhookConfig, WebhookDelivery, WebhookDispatch, WebhookHandler, WebhookRegistry,
};
