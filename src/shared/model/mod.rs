//! Domain model
//!
//! Two entity kinds are synchronized: the long-lived [`Profile`] and the
//! bounded [`Session`], which carries append-only activity logs.

pub mod actor;
pub mod profile;
pub mod records;
pub mod session;

pub use actor::{Actor, ActorRole};
pub use profile::{MedicalCondition, Profile, Vaccination};
pub use records::{
    AppendOnlyRecord, DuplicateWindows, EliminationKind, EliminationRecord, FeedingRecord,
    MedicationRecord, ScheduledMedication,
};
pub use session::{ActivityEntry, Session};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which kind of entity an identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Profile,
    Session,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Profile => f.write_str("profile"),
            EntityKind::Session => f.write_str("session"),
        }
    }
}

/// Either entity, as written to or read from the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Profile(Profile),
    Session(Session),
}

impl Record {
    pub fn id(&self) -> Uuid {
        match self {
            Record::Profile(profile) => profile.id,
            Record::Session(session) => session.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Profile(_) => EntityKind::Profile,
            Record::Session(_) => EntityKind::Session,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Record::Profile(profile) => profile.updated_at,
            Record::Session(session) => session.updated_at,
        }
    }
}

impl From<Profile> for Record {
    fn from(profile: Profile) -> Self {
        Record::Profile(profile)
    }
}

impl From<Session> for Record {
    fn from(session: Session) -> Self {
        Record::Session(session)
    }
}
