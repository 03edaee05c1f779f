//! Kennelsync - Offline-First Sync Core
//!
//! Kennelsync keeps a local, transactionally consistent cache of dog
//! profiles and boarding sessions and reconciles it with one authoritative
//! remote store shared by several front-desk clients.
//!
//! # Overview
//!
//! This library provides:
//! - An in-memory entity cache with snapshot reads that never wait on the network
//! - Optimistic writes with rollback when the remote store rejects them
//! - Field-level conflict resolution driven by precedence and actor roles
//! - Loss-free merging of append-only activity logs
//! - A single-flight, rate-limited sync scheduler with lifecycle hooks
//!
//! # Module Structure
//!
//! - **`shared`** - Types used across the crate
//!   - Domain model, error types, configuration
//!
//! - **`cache`** - The entity store
//!
//! - **`offline`** - Local writes
//!   - Pending operations, transaction coordinator, integrity validation
//!
//! - **`sync`** - Reconciliation
//!   - Scheduler, conflict resolver, record merge, metrics, `SyncEngine`
//!
//! - **`remote`** - The remote store contract and an in-memory implementation
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use kennelsync::remote::InMemoryRemoteStore;
//! use kennelsync::shared::config::SyncConfig;
//! use kennelsync::shared::model::{Profile, Session};
//! use kennelsync::sync::SyncEngine;
//!
//! # async fn example() -> Result<(), kennelsync::shared::error::SyncError> {
//! let engine = SyncEngine::new(Arc::new(InMemoryRemoteStore::new()), SyncConfig::default());
//! engine.initial_load().await?;
//!
//! let rex = Profile::new("Rex", "Jordan");
//! let stay = Session::new(rex.id, Utc::now());
//! engine.add_profile_with_session(rex, stay).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod offline;
pub mod remote;
pub mod shared;
pub mod sync;

pub use shared::config::SyncConfig;
pub use shared::error::{RemoteError, SyncError};
pub use sync::SyncEngine;
