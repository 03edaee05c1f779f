//! Stay session: one bounded visit of a dog, with its activity logs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::actor::Actor;
use super::records::{
    AppendOnlyRecord, EliminationRecord, FeedingRecord, MedicationRecord, ScheduledMedication,
};

/// A single visit tied to one [`Profile`](super::Profile).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    /// Owning profile
    pub profile_id: Uuid,
    /// Check-in time
    pub arrived_at: DateTime<Utc>,
    /// Check-out time; `None` while the session is open
    pub departed_at: Option<DateTime<Utc>>,
    /// Extended (overnight) stay
    pub is_boarding: bool,
    /// Planned last day of an extended stay
    pub boarding_end_date: Option<NaiveDate>,
    pub kennel: Option<String>,
    pub notes: String,
    pub feeding_records: Vec<FeedingRecord>,
    pub medication_records: Vec<MedicationRecord>,
    pub elimination_records: Vec<EliminationRecord>,
    pub scheduled_medications: Vec<ScheduledMedication>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revision: u64,
    pub last_modified_by: Option<Actor>,
    /// Fields hold merged local values the remote has not seen yet.
    /// Local bookkeeping only; never sent to the remote.
    #[serde(skip)]
    pub needs_sync: bool,
}

/// One entry appended to a session log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEntry {
    Feeding(FeedingRecord),
    Medication(MedicationRecord),
    Elimination(EliminationRecord),
    ScheduledMedication(ScheduledMedication),
}

impl Session {
    /// Open a new session for `profile_id` starting at `arrived_at`
    pub fn new(profile_id: Uuid, arrived_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            profile_id,
            arrived_at,
            departed_at: None,
            is_boarding: false,
            boarding_end_date: None,
            kennel: None,
            notes: String::new(),
            feeding_records: Vec::new(),
            medication_records: Vec::new(),
            elimination_records: Vec::new(),
            scheduled_medications: Vec::new(),
            is_deleted: false,
            created_at: now,
            updated_at: now,
            revision: 0,
            last_modified_by: None,
            needs_sync: false,
        }
    }

    /// No end timestamp set.
    pub fn is_open(&self) -> bool {
        self.departed_at.is_none()
    }

    /// Open and not soft-deleted.
    pub fn is_active(&self) -> bool {
        self.is_open() && !self.is_deleted
    }

    /// An end timestamp, once set, must not precede the start.
    pub fn has_valid_times(&self) -> bool {
        self.departed_at.map_or(true, |end| end >= self.arrived_at)
    }

    pub fn touch(&mut self, actor: Option<&Actor>) {
        self.updated_at = Utc::now();
        self.needs_sync = false;
        if let Some(actor) = actor {
            self.last_modified_by = Some(actor.clone());
        }
    }

    /// Append to the matching log, keeping it ordered by time.
    pub fn append(&mut self, entry: ActivityEntry) {
        match entry {
            ActivityEntry::Feeding(record) => push_ordered(&mut self.feeding_records, record),
            ActivityEntry::Medication(record) => push_ordered(&mut self.medication_records, record),
            ActivityEntry::Elimination(record) => push_ordered(&mut self.elimination_records, record),
            ActivityEntry::ScheduledMedication(record) => {
                push_ordered(&mut self.scheduled_medications, record)
            }
        }
    }

    /// Total number of append-only records across all logs.
    pub fn record_count(&self) -> usize {
        self.feeding_records.len()
            + self.medication_records.len()
            + self.elimination_records.len()
            + self.scheduled_medications.len()
    }
}

pub(crate) fn push_ordered<T: AppendOnlyRecord>(records: &mut Vec<T>, record: T) {
    records.push(record);
    sort_records(records);
}

pub(crate) fn sort_records<T: AppendOnlyRecord>(records: &mut [T]) {
    records.sort_by(|a, b| {
        a.timestamp()
            .cmp(&b.timestamp())
            .then_with(|| a.record_id().cmp(&b.record_id()))
    });
}
