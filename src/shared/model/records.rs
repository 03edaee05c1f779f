//! # Append-Only Activity Records
//!
//! Timestamped sub-records carried by a [`Session`](super::Session): feedings,
//! medications, eliminations and scheduled medication entries.
//!
//! ## Duplicate Detection
//!
//! The same real-world event is often logged on two devices a few seconds
//! apart. Two records are near-duplicates when:
//!
//! - they share an id, or
//! - they are of the same kind and their timestamps are within the general
//!   window (5 seconds by default), or
//! - they reference the same medication and are within the medication
//!   window (60 seconds by default).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tolerances used when matching records logged on different devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateWindows {
    /// Same-kind records closer than this are one event
    pub general: Duration,
    /// Same-medication records closer than this are one event
    pub medication: Duration,
}

impl Default for DuplicateWindows {
    fn default() -> Self {
        Self {
            general: Duration::seconds(5),
            medication: Duration::seconds(60),
        }
    }
}

fn within(a: DateTime<Utc>, b: DateTime<Utc>, window: Duration) -> bool {
    (a - b).abs() <= window
}

/// A record that is only ever appended, never edited away by a merge.
pub trait AppendOnlyRecord: Clone + PartialEq {
    fn record_id(&self) -> Uuid;

    fn timestamp(&self) -> DateTime<Utc>;

    /// Whether `other` describes the same event as `self`.
    fn is_near_duplicate(&self, other: &Self, windows: &DuplicateWindows) -> bool;
}

/// A meal given to the dog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedingRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub notes: Option<String>,
    pub recorded_by: Option<String>,
}

impl FeedingRecord {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            notes: None,
            recorded_by: None,
        }
    }
}

impl AppendOnlyRecord for FeedingRecord {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn is_near_duplicate(&self, other: &Self, windows: &DuplicateWindows) -> bool {
        self.id == other.id || within(self.timestamp, other.timestamp, windows.general)
    }
}

/// A dose of medication actually administered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Links the dose to a scheduled medication when known
    pub medication_id: Option<Uuid>,
    pub name: String,
    pub notes: Option<String>,
    pub recorded_by: Option<String>,
}

impl MedicationRecord {
    pub fn new(name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            medication_id: None,
            name: name.into(),
            notes: None,
            recorded_by: None,
        }
    }
}

impl AppendOnlyRecord for MedicationRecord {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn is_near_duplicate(&self, other: &Self, windows: &DuplicateWindows) -> bool {
        if self.id == other.id {
            return true;
        }
        match (self.medication_id, other.medication_id) {
            // Two different medications given together are two events.
            (Some(a), Some(b)) => a == b && within(self.timestamp, other.timestamp, windows.medication),
            _ => within(self.timestamp, other.timestamp, windows.general),
        }
    }
}

/// Kind of bathroom break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EliminationKind {
    Pee,
    Poop,
}

/// A bathroom break.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EliminationRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EliminationKind,
    pub notes: Option<String>,
    pub recorded_by: Option<String>,
}

impl EliminationRecord {
    pub fn new(kind: EliminationKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            kind,
            notes: None,
            recorded_by: None,
        }
    }
}

impl AppendOnlyRecord for EliminationRecord {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn is_near_duplicate(&self, other: &Self, windows: &DuplicateWindows) -> bool {
        self.id == other.id
            || (self.kind == other.kind && within(self.timestamp, other.timestamp, windows.general))
    }
}

/// A planned dose on the session's medication schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledMedication {
    pub id: Uuid,
    pub medication_id: Uuid,
    pub name: String,
    pub scheduled_for: DateTime<Utc>,
    pub administered_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl ScheduledMedication {
    pub fn new(medication_id: Uuid, name: impl Into<String>, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            medication_id,
            name: name.into(),
            scheduled_for,
            administered_at: None,
            notes: None,
        }
    }
}

impl AppendOnlyRecord for ScheduledMedication {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.scheduled_for
    }

    fn is_near_duplicate(&self, other: &Self, windows: &DuplicateWindows) -> bool {
        self.id == other.id
            || (self.medication_id == other.medication_id
                && within(self.scheduled_for, other.scheduled_for, windows.medication))
    }
}
