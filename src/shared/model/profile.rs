//! Dog profile: the long-lived identity, contact and medical facts.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::actor::Actor;

/// A named medical condition, optionally time-limited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalCondition {
    pub name: String,
    pub notes: Option<String>,
    pub expires_on: Option<NaiveDate>,
}

impl MedicalCondition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            notes: None,
            expires_on: None,
        }
    }

    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.expires_on.map_or(true, |expiry| expiry >= day)
    }
}

/// A vaccination and the day it lapses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vaccination {
    pub name: String,
    pub expires_on: NaiveDate,
}

/// Persistent profile of a dog and its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Stable, globally unique identifier
    pub id: Uuid,
    /// Dog's name
    pub name: String,
    pub owner_name: String,
    pub owner_phone: Option<String>,
    pub owner_email: Option<String>,
    pub emergency_contact: Option<String>,
    pub allergies: Vec<String>,
    pub medical_conditions: Vec<MedicalCondition>,
    pub vaccinations: Vec<Vaccination>,
    /// Standing handling instructions for staff
    pub special_instructions: Option<String>,
    /// Free-text notes
    pub notes: String,
    /// Soft-delete flag; deleted profiles stay for audit history
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Server change tag, used to reject writes based on a stale copy
    pub revision: u64,
    pub last_modified_by: Option<Actor>,
    /// Fields hold merged local values the remote has not seen yet.
    /// Local bookkeeping only; never sent to the remote.
    #[serde(skip)]
    pub needs_sync: bool,
}

impl Profile {
    /// Create a fresh profile that has never been saved remotely
    pub fn new(name: impl Into<String>, owner_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner_name: owner_name.into(),
            owner_phone: None,
            owner_email: None,
            emergency_contact: None,
            allergies: Vec::new(),
            medical_conditions: Vec::new(),
            vaccinations: Vec::new(),
            special_instructions: None,
            notes: String::new(),
            is_deleted: false,
            created_at: now,
            updated_at: now,
            revision: 0,
            last_modified_by: None,
            needs_sync: false,
        }
    }

    /// Mark the profile as written now by `actor`. The write carries every
    /// local value, so nothing is left waiting for sync.
    pub fn touch(&mut self, actor: Option<&Actor>) {
        self.updated_at = Utc::now();
        self.needs_sync = false;
        if let Some(actor) = actor {
            self.last_modified_by = Some(actor.clone());
        }
    }

    /// Conditions still in effect on `day`.
    pub fn active_conditions(&self, day: NaiveDate) -> impl Iterator<Item = &MedicalCondition> {
        self.medical_conditions.iter().filter(move |c| c.is_active_on(day))
    }

    /// Vaccinations that have lapsed by `day`.
    pub fn expired_vaccinations(&self, day: NaiveDate) -> impl Iterator<Item = &Vaccination> {
        self.vaccinations.iter().filter(move |v| v.expires_on < day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_profile_is_unsaved() {
        let profile = Profile::new("Rex", "Jordan");
        assert_eq!(profile.revision, 0);
        assert!(!profile.is_deleted);
        assert_eq!(profile.created_at, profile.updated_at);
    }

    #[test]
    fn test_condition_expiry() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let mut profile = Profile::new("Rex", "Jordan");
        let mut healed = MedicalCondition::new("Ear infection");
        healed.expires_on = NaiveDate::from_ymd_opt(2025, 3, 1);
        profile.medical_conditions = vec![healed, MedicalCondition::new("Hip dysplasia")];
        profile.vaccinations = vec![Vaccination {
            name: "Rabies".to_string(),
            expires_on: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        }];

        let active: Vec<_> = profile.active_conditions(day).map(|c| c.name.as_str()).collect();
        assert_eq!(active, vec!["Hip dysplasia"]);
        assert_eq!(profile.expired_vaccinations(day).count(), 1);
    }
}
