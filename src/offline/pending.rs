//! # Pending Operations
//!
//! Tracks local transactions that have been applied optimistically but not
//! yet confirmed or rolled back by the remote store.
//!
//! ## Features
//!
//! - **Rollback Support**: each entry keeps the store snapshot taken before
//!   the optimistic apply
//! - **Sync Precedence**: the sync pass skips every entity covered here
//! - **Staleness**: entries that stay unresolved for too long are reported
//!   by integrity validation
//!
//! Entries are ephemeral and never sent to the remote store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::cache::StoreSnapshot;

/// Logical write being performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    AddProfileWithSession,
    AddSession,
    UpdateProfile,
    UpdateSession,
    DeleteSession,
    CheckOutSession,
    AppendActivity,
    PurgeSession,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::AddProfileWithSession => "add_profile_with_session",
            OperationKind::AddSession => "add_session",
            OperationKind::UpdateProfile => "update_profile",
            OperationKind::UpdateSession => "update_session",
            OperationKind::DeleteSession => "delete_session",
            OperationKind::CheckOutSession => "check_out_session",
            OperationKind::AppendActivity => "append_activity",
            OperationKind::PurgeSession => "purge_session",
        };
        f.write_str(name)
    }
}

/// An in-flight local transaction
#[derive(Debug, Clone)]
pub struct PendingOperation {
    /// Unique operation ID
    pub id: Uuid,
    pub kind: OperationKind,
    /// Entities written by the optimistic apply
    pub entity_ids: Vec<Uuid>,
    /// Cache contents before the optimistic apply
    pub original_state: StoreSnapshot,
    pub started_at: DateTime<Utc>,
}

impl PendingOperation {
    pub fn covers(&self, entity_id: &Uuid) -> bool {
        self.entity_ids.contains(entity_id)
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.started_at
    }

    pub fn summary(&self) -> PendingSummary {
        PendingSummary {
            id: self.id,
            kind: self.kind,
            entity_ids: self.entity_ids.clone(),
            started_at: self.started_at,
        }
    }
}

/// Snapshot-free view of a pending operation for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSummary {
    pub id: Uuid,
    pub kind: OperationKind,
    pub entity_ids: Vec<Uuid>,
    pub started_at: DateTime<Utc>,
}

/// Index of pending operations keyed by operation id.
///
/// Lock order: when both are needed, the cache lock is taken first and this
/// index second.
#[derive(Debug, Default)]
pub struct PendingIndex {
    operations: Mutex<HashMap<Uuid, PendingOperation>>,
}

impl PendingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, PendingOperation>> {
        self.operations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, operation: PendingOperation) {
        self.lock().insert(operation.id, operation);
    }

    pub fn remove(&self, operation_id: &Uuid) -> Option<PendingOperation> {
        self.lock().remove(operation_id)
    }

    /// Whether any pending operation covers `entity_id`.
    pub fn covers(&self, entity_id: &Uuid) -> bool {
        self.lock().values().any(|op| op.covers(entity_id))
    }

    /// Every entity id covered by some pending operation.
    pub fn entity_ids(&self) -> HashSet<Uuid> {
        self.lock()
            .values()
            .flat_map(|op| op.entity_ids.iter().copied())
            .collect()
    }

    /// Pending operations started more than `threshold` before `now`, oldest first.
    pub fn stale(&self, threshold: chrono::Duration, now: DateTime<Utc>) -> Vec<PendingSummary> {
        let mut stale: Vec<_> = self
            .lock()
            .values()
            .filter(|op| op.age(now) > threshold)
            .map(PendingOperation::summary)
            .collect();
        stale.sort_by_key(|op| op.started_at);
        stale
    }

    pub fn summaries(&self) -> Vec<PendingSummary> {
        let mut all: Vec<_> = self.lock().values().map(PendingOperation::summary).collect();
        all.sort_by_key(|op| op.started_at);
        all
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
