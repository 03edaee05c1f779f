//! Shared Error Types
//!
//! This module defines the errors surfaced by the cache, transaction and
//! sync layers, and the errors reported by the remote store collaborator.
//!
//! # Error Categories
//!
//! - `ConflictDetected` - a business-rule conflict caught before or during
//!   confirmation; the transaction was rolled back
//! - `RemoteSyncFailed` - transport or server failure during confirmation;
//!   the transaction was rolled back
//! - `DataInconsistency` - reported by integrity validation only, never fatal
//! - `NotFound` / `InvalidEntity` - rejected before anything was applied
//!
//! # Usage
//!
//! ```rust
//! use kennelsync::shared::error::SyncError;
//!
//! let error = SyncError::conflict("profile already has an active session");
//! assert!(error.is_conflict());
//! ```
//!
//! # Thread Safety
//!
//! All error types are `Send + Sync + Clone` so a single failure can be
//! reported to the caller and recorded in sync status at the same time.
use thiserror::Error;
use uuid::Uuid;

use crate::shared::model::EntityKind;

/// Errors returned by a [`RemoteStore`](crate::remote::RemoteStore)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The server holds a newer version than the one the write was based on
    #[error("stale version: the record was changed by another writer")]
    StaleVersion,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("permission denied")]
    PermissionDenied,

    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("record not found")]
    RecordNotFound,

    #[error("remote error: {0}")]
    Unknown(String),
}

impl RemoteError {
    /// Whether the server rejected the write as conflicting.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RemoteError::StaleVersion)
    }
}

/// Errors surfaced to callers of the sync core
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// Business-rule conflict; always rolled back
    #[error("Conflict detected: {reason}")]
    ConflictDetected {
        /// Human-readable reason
        reason: String,
    },

    /// Remote write failed; always rolled back
    #[error("Remote sync failed: {cause}")]
    RemoteSyncFailed {
        /// Underlying remote failure
        #[source]
        cause: RemoteError,
    },

    /// Integrity validation found an inconsistency
    #[error("Data inconsistency: {detail}")]
    DataInconsistency {
        /// What was inconsistent
        detail: String,
    },

    /// The entity an operation targets does not exist locally
    #[error("{entity} {id} not found")]
    NotFound {
        entity: EntityKind,
        id: Uuid,
    },

    /// The new value breaks an entity invariant
    #[error("Invalid entity: {message}")]
    InvalidEntity {
        message: String,
    },
}

impl SyncError {
    /// Create a new conflict error
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::ConflictDetected {
            reason: reason.into(),
        }
    }

    /// Wrap a remote failure
    pub fn remote(cause: RemoteError) -> Self {
        Self::RemoteSyncFailed { cause }
    }

    /// Create a new inconsistency error
    pub fn inconsistency(detail: impl Into<String>) -> Self {
        Self::DataInconsistency {
            detail: detail.into(),
        }
    }

    pub fn not_found(entity: EntityKind, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidEntity {
            message: message.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::ConflictDetected { .. })
    }

    /// Short message suitable for showing to a person instead of the raw error.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::ConflictDetected { reason } => reason.clone(),
            SyncError::RemoteSyncFailed { cause } => match cause {
                RemoteError::NotAuthenticated => "Please sign in again to save changes.".to_string(),
                RemoteError::PermissionDenied => "You do not have permission to make this change.".to_string(),
                RemoteError::QuotaExceeded => "Storage is full; the change was not saved.".to_string(),
                RemoteError::RecordNotFound => "This record no longer exists.".to_string(),
                RemoteError::StaleVersion => "Someone else changed this record. Please try again.".to_string(),
                RemoteError::Unknown(_) => "Could not reach the server; the change was undone.".to_string(),
            },
            SyncError::DataInconsistency { detail } => detail.clone(),
            SyncError::NotFound { entity, .. } => format!("This {} no longer exists.", entity),
            SyncError::InvalidEntity { message } => message.clone(),
        }
    }
}

impl From<RemoteError> for SyncError {
    fn from(cause: RemoteError) -> Self {
        if cause.is_conflict() {
            Self::conflict("record was changed by another user")
        } else {
            Self::remote(cause)
        }
    }
}
