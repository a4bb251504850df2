//! Core building blocks for platform extensions
//!
//! This crate holds everything the other extension crates share:
//! - Sessions: per-company / per-user OAuth session records
//! - Storage: the key-value store abstraction with Redis and in-memory backends
//! - Errors: the typed failures reported by installation and webhook flows

pub mod circuit_breaker;
pub mod constants;
pub mod error;
pub mod session;
pub mod session_storage;
pub mod storage;
pub mod utils;

pub use error::{FdkError, PlatformError, StorageError};
pub use session::{AccessMode, Session, TokenGrant};
pub use session_storage::SessionStorage;
pub use storage::{KeyValueStore, MemoryStorage, RedisStorage};
