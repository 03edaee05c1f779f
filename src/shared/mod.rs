//! Shared Module
//!
//! Types used by every other module: the domain model, the error taxonomy
//! and runtime configuration.

/// Profiles, sessions and activity records
pub mod model;

/// Shared error types
pub mod error;

/// Sync configuration
pub mod config;

pub use config::{ConfigError, SyncConfig, SyncConfigBuilder};
pub use error::{RemoteError, SyncError};
