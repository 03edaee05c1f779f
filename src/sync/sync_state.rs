//! # Sync State
//!
//! What callers see of the scheduler: whether a pass is running, when the
//! last one succeeded, and what went wrong most recently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metrics::MetricsSnapshot;

/// Scheduler state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Syncing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub syncing: bool,
    /// When the last pass completed successfully
    pub last_sync: Option<DateTime<Utc>>,
    /// Lower bound of the next incremental fetch; `None` means fetch everything
    pub checkpoint: Option<DateTime<Utc>>,
    /// When the last pass was started, successful or not
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub pending_operations: usize,
    /// Whether the periodic timer is running
    pub periodic_running: bool,
    pub metrics: MetricsSnapshot,
}

impl SyncStatus {
    pub fn phase(&self) -> SyncPhase {
        if self.syncing {
            SyncPhase::Syncing
        } else {
            SyncPhase::Idle
        }
    }
}
