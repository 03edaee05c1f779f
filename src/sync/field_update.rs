//! # Field Updates
//!
//! Named scalar fields of profiles and sessions, their precedence, and the
//! [`FieldUpdate`] tagged union used to patch a single field of an entity.
//!
//! Each variant carries the new value and knows how to apply itself, so the
//! resolver never needs to look fields up by name at runtime.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::shared::model::{MedicalCondition, Profile, Session, Vaccination};

/// A scalar field that can be resolved independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    ProfileName,
    OwnerName,
    OwnerPhone,
    OwnerEmail,
    EmergencyContact,
    Allergies,
    MedicalConditions,
    Vaccinations,
    SpecialInstructions,
    ProfileNotes,
    Arrival,
    Departure,
    Kennel,
    SessionNotes,
    ExtendedStay,
    ActivityLog,
}

impl Field {
    pub const ALL: [Field; 16] = [
        Field::ProfileName,
        Field::OwnerName,
        Field::OwnerPhone,
        Field::OwnerEmail,
        Field::EmergencyContact,
        Field::Allergies,
        Field::MedicalConditions,
        Field::Vaccinations,
        Field::SpecialInstructions,
        Field::ProfileNotes,
        Field::Arrival,
        Field::Departure,
        Field::Kennel,
        Field::SessionNotes,
        Field::ExtendedStay,
        Field::ActivityLog,
    ];

    /// Name used in configuration files and log output
    pub fn name(&self) -> &'static str {
        match self {
            Field::ProfileName => "profile_name",
            Field::OwnerName => "owner_name",
            Field::OwnerPhone => "owner_phone",
            Field::OwnerEmail => "owner_email",
            Field::EmergencyContact => "emergency_contact",
            Field::Allergies => "allergies",
            Field::MedicalConditions => "medical_conditions",
            Field::Vaccinations => "vaccinations",
            Field::SpecialInstructions => "special_instructions",
            Field::ProfileNotes => "profile_notes",
            Field::Arrival => "arrival",
            Field::Departure => "departure",
            Field::Kennel => "kennel",
            Field::SessionNotes => "session_notes",
            Field::ExtendedStay => "extended_stay",
            Field::ActivityLog => "activity_log",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|field| field.name() == name)
    }

    /// Built-in precedence on the 0-100 scale.
    ///
    /// Owner-editable identity and contact fields rank highest, then medical
    /// facts, staff-editable operational fields, free text and finally the
    /// append-only logs.
    pub fn default_precedence(&self) -> u8 {
        match self {
            Field::ProfileName
            | Field::OwnerName
            | Field::OwnerPhone
            | Field::OwnerEmail
            | Field::EmergencyContact => 100,
            Field::Allergies | Field::MedicalConditions | Field::Vaccinations => 80,
            Field::SpecialInstructions
            | Field::Arrival
            | Field::Departure
            | Field::Kennel
            | Field::ExtendedStay => 50,
            Field::ProfileNotes | Field::SessionNotes => 40,
            Field::ActivityLog => 10,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Field precedence with configured overrides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrecedenceTable {
    overrides: HashMap<Field, u8>,
}

impl PrecedenceTable {
    pub fn new(overrides: HashMap<Field, u8>) -> Self {
        Self { overrides }
    }

    pub fn get(&self, field: Field) -> u8 {
        self.overrides
            .get(&field)
            .copied()
            .unwrap_or_else(|| field.default_precedence())
    }
}

/// New value for exactly one field of a profile or session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldUpdate {
    ProfileName(String),
    ProfileOwnerName(String),
    ProfileOwnerPhone(Option<String>),
    ProfileOwnerEmail(Option<String>),
    ProfileEmergencyContact(Option<String>),
    ProfileAllergies(Vec<String>),
    ProfileMedicalConditions(Vec<MedicalCondition>),
    ProfileVaccinations(Vec<Vaccination>),
    ProfileSpecialInstructions(Option<String>),
    ProfileNotes(String),
    SessionArrival(DateTime<Utc>),
    SessionDeparture(Option<DateTime<Utc>>),
    SessionKennel(Option<String>),
    SessionNotes(String),
    SessionExtendedStay {
        is_boarding: bool,
        end_date: Option<NaiveDate>,
    },
}

impl FieldUpdate {
    pub fn field(&self) -> Field {
        match self {
            FieldUpdate::ProfileName(_) => Field::ProfileName,
            FieldUpdate::ProfileOwnerName(_) => Field::OwnerName,
            FieldUpdate::ProfileOwnerPhone(_) => Field::OwnerPhone,
            FieldUpdate::ProfileOwnerEmail(_) => Field::OwnerEmail,
            FieldUpdate::ProfileEmergencyContact(_) => Field::EmergencyContact,
            FieldUpdate::ProfileAllergies(_) => Field::Allergies,
            FieldUpdate::ProfileMedicalConditions(_) => Field::MedicalConditions,
            FieldUpdate::ProfileVaccinations(_) => Field::Vaccinations,
            FieldUpdate::ProfileSpecialInstructions(_) => Field::SpecialInstructions,
            FieldUpdate::ProfileNotes(_) => Field::ProfileNotes,
            FieldUpdate::SessionArrival(_) => Field::Arrival,
            FieldUpdate::SessionDeparture(_) => Field::Departure,
            FieldUpdate::SessionKennel(_) => Field::Kennel,
            FieldUpdate::SessionNotes(_) => Field::SessionNotes,
            FieldUpdate::SessionExtendedStay { .. } => Field::ExtendedStay,
        }
    }

    /// Every resolvable field of `profile`, in a fixed order.
    pub fn profile_fields(profile: &Profile) -> Vec<FieldUpdate> {
        vec![
            FieldUpdate::ProfileName(profile.name.clone()),
            FieldUpdate::ProfileOwnerName(profile.owner_name.clone()),
            FieldUpdate::ProfileOwnerPhone(profile.owner_phone.clone()),
            FieldUpdate::ProfileOwnerEmail(profile.owner_email.clone()),
            FieldUpdate::ProfileEmergencyContact(profile.emergency_contact.clone()),
            FieldUpdate::ProfileAllergies(profile.allergies.clone()),
            FieldUpdate::ProfileMedicalConditions(profile.medical_conditions.clone()),
            FieldUpdate::ProfileVaccinations(profile.vaccinations.clone()),
            FieldUpdate::ProfileSpecialInstructions(profile.special_instructions.clone()),
            FieldUpdate::ProfileNotes(profile.notes.clone()),
        ]
    }

    /// Every resolvable field of `session`, in a fixed order.
    pub fn session_fields(session: &Session) -> Vec<FieldUpdate> {
        vec![
            FieldUpdate::SessionArrival(session.arrived_at),
            FieldUpdate::SessionDeparture(session.departed_at),
            FieldUpdate::SessionKennel(session.kennel.clone()),
            FieldUpdate::SessionNotes(session.notes.clone()),
            FieldUpdate::SessionExtendedStay {
                is_boarding: session.is_boarding,
                end_date: session.boarding_end_date,
            },
        ]
    }

    /// Write the value into `profile`; returns `false` for session fields.
    pub fn apply_to_profile(&self, profile: &mut Profile) -> bool {
        match self {
            FieldUpdate::ProfileName(value) => profile.name = value.clone(),
            FieldUpdate::ProfileOwnerName(value) => profile.owner_name = value.clone(),
            FieldUpdate::ProfileOwnerPhone(value) => profile.owner_phone = value.clone(),
            FieldUpdate::ProfileOwnerEmail(value) => profile.owner_email = value.clone(),
            FieldUpdate::ProfileEmergencyContact(value) => profile.emergency_contact = value.clone(),
            FieldUpdate::ProfileAllergies(value) => profile.allergies = value.clone(),
            FieldUpdate::ProfileMedicalConditions(value) => profile.medical_conditions = value.clone(),
            FieldUpdate::ProfileVaccinations(value) => profile.vaccinations = value.clone(),
            FieldUpdate::ProfileSpecialInstructions(value) => {
                profile.special_instructions = value.clone()
            }
            FieldUpdate::ProfileNotes(value) => profile.notes = value.clone(),
            _ => return false,
        }
        true
    }

    /// Write the value into `session`; returns `false` for profile fields.
    pub fn apply_to_session(&self, session: &mut Session) -> bool {
        match self {
            FieldUpdate::SessionArrival(value) => session.arrived_at = *value,
            FieldUpdate::SessionDeparture(value) => session.departed_at = *value,
            FieldUpdate::SessionKennel(value) => session.kennel = value.clone(),
            FieldUpdate::SessionNotes(value) => session.notes = value.clone(),
            FieldUpdate::SessionExtendedStay {
                is_boarding,
                end_date,
            } => {
                session.is_boarding = *is_boarding;
                session.boarding_end_date = *end_date;
            }
            _ => return false,
        }
        true
    }

    /// Combine two values of the same field without losing either side.
    ///
    /// Text is joined, lists are unioned (remote order first) and the
    /// extended stay takes the later end date. Fields with no meaningful
    /// merge keep the remote value.
    pub fn merged(local: &FieldUpdate, remote: &FieldUpdate) -> FieldUpdate {
        use FieldUpdate::*;

        match (local, remote) {
            (ProfileNotes(l), ProfileNotes(r)) => ProfileNotes(merge_text(l, r)),
            (SessionNotes(l), SessionNotes(r)) => SessionNotes(merge_text(l, r)),
            (ProfileSpecialInstructions(l), ProfileSpecialInstructions(r)) => {
                ProfileSpecialInstructions(merge_optional_text(l, r))
            }
            (SessionKennel(l), SessionKennel(r)) => SessionKennel(merge_optional_text(l, r)),
            (ProfileOwnerPhone(l), ProfileOwnerPhone(r)) => ProfileOwnerPhone(r.clone().or_else(|| l.clone())),
            (ProfileOwnerEmail(l), ProfileOwnerEmail(r)) => ProfileOwnerEmail(r.clone().or_else(|| l.clone())),
            (ProfileEmergencyContact(l), ProfileEmergencyContact(r)) => {
                ProfileEmergencyContact(r.clone().or_else(|| l.clone()))
            }
            (ProfileAllergies(l), ProfileAllergies(r)) => ProfileAllergies(union_by(r, l, |a| a.to_lowercase())),
            (ProfileMedicalConditions(l), ProfileMedicalConditions(r)) => {
                ProfileMedicalConditions(union_by(r, l, |c| c.name.to_lowercase()))
            }
            (ProfileVaccinations(l), ProfileVaccinations(r)) => {
                ProfileVaccinations(union_by(r, l, |v| v.name.to_lowercase()))
            }
            (SessionExtendedStay { .. }, SessionExtendedStay { .. }) => FieldUpdate::later_stay(local, remote),
            _ => remote.clone(),
        }
    }

    /// The extended stay reaching further into the future.
    ///
    /// A missing end date counts as earlier than any date; on equal dates the
    /// boarding flags are combined.
    pub fn later_stay(local: &FieldUpdate, remote: &FieldUpdate) -> FieldUpdate {
        match (local, remote) {
            (
                FieldUpdate::SessionExtendedStay {
                    is_boarding: local_boarding,
                    end_date: local_end,
                },
                FieldUpdate::SessionExtendedStay {
                    is_boarding: remote_boarding,
                    end_date: remote_end,
                },
            ) => match local_end.cmp(remote_end) {
                std::cmp::Ordering::Greater => local.clone(),
                std::cmp::Ordering::Less => remote.clone(),
                std::cmp::Ordering::Equal => FieldUpdate::SessionExtendedStay {
                    is_boarding: *local_boarding || *remote_boarding,
                    end_date: *remote_end,
                },
            },
            _ => remote.clone(),
        }
    }

    /// Short human-readable rendering of the value
    pub fn describe(&self) -> String {
        fn optional(value: &Option<String>) -> String {
            value.clone().unwrap_or_else(|| "(none)".to_string())
        }

        match self {
            FieldUpdate::ProfileName(v) | FieldUpdate::ProfileOwnerName(v) => v.clone(),
            FieldUpdate::ProfileNotes(v) | FieldUpdate::SessionNotes(v) => v.clone(),
            FieldUpdate::ProfileOwnerPhone(v)
            | FieldUpdate::ProfileOwnerEmail(v)
            | FieldUpdate::ProfileEmergencyContact(v)
            | FieldUpdate::ProfileSpecialInstructions(v)
            | FieldUpdate::SessionKennel(v) => optional(v),
            FieldUpdate::ProfileAllergies(v) => v.join(", "),
            FieldUpdate::ProfileMedicalConditions(v) => v
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            FieldUpdate::ProfileVaccinations(v) => v
                .iter()
                .map(|vac| format!("{} (until {})", vac.name, vac.expires_on))
                .collect::<Vec<_>>()
                .join(", "),
            FieldUpdate::SessionArrival(at) => at.to_rfc3339(),
            FieldUpdate::SessionDeparture(at) => at.map_or_else(|| "(open)".to_string(), |at| at.to_rfc3339()),
            FieldUpdate::SessionExtendedStay {
                is_boarding,
                end_date,
            } => match (is_boarding, end_date) {
                (false, _) => "not boarding".to_string(),
                (true, None) => "boarding, no end date".to_string(),
                (true, Some(day)) => format!("boarding until {}", day),
            },
        }
    }
}

/// Join two texts so neither loses content.
///
/// If one side already contains the other the longer one is kept, which makes
/// merging a merged result with either input a no-op.
pub fn merge_text(local: &str, remote: &str) -> String {
    if local.is_empty() || remote.contains(local) {
        remote.to_string()
    } else if remote.is_empty() || local.contains(remote) {
        local.to_string()
    } else {
        format!("{}\n{}", remote, local)
    }
}

fn merge_optional_text(local: &Option<String>, remote: &Option<String>) -> Option<String> {
    match (local, remote) {
        (Some(l), Some(r)) => Some(merge_text(l, r)),
        (Some(l), None) => Some(l.clone()),
        (None, r) => r.clone(),
    }
}

/// `first` followed by the items of `second` whose key is not already present.
fn union_by<T: Clone, K: PartialEq>(first: &[T], second: &[T], key: impl Fn(&T) -> K) -> Vec<T> {
    let mut merged = first.to_vec();
    for item in second {
        let item_key = key(item);
        if !merged.iter().any(|existing| key(existing) == item_key) {
            merged.push(item.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stay(end_day: Option<u32>) -> FieldUpdate {
        FieldUpdate::SessionExtendedStay {
            is_boarding: true,
            end_date: end_day.and_then(|d| NaiveDate::from_ymd_opt(2025, 6, d)),
        }
    }

    #[test]
    fn test_field_names_round_trip() {
        for field in Field::ALL {
            assert_eq!(Field::from_name(field.name()), Some(field));
        }
        assert_eq!(Field::from_name("colour"), None);
    }

    #[test]
    fn test_precedence_overrides() {
        let table = PrecedenceTable::new(HashMap::from([(Field::SessionNotes, 90)]));
        assert_eq!(table.get(Field::SessionNotes), 90);
        assert_eq!(table.get(Field::OwnerName), 100);
        assert_eq!(table.get(Field::Allergies), 80);
        assert_eq!(table.get(Field::ActivityLog), 10);
    }

    #[test]
    fn test_merge_text() {
        assert_eq!(merge_text("A", "B"), "B\nA");
        assert_eq!(merge_text("", "B"), "B");
        assert_eq!(merge_text("Shy dog. Bites.", "Shy dog."), "Shy dog. Bites.");

        let once = merge_text("A", "B");
        assert_eq!(merge_text(&once, "B"), once);
    }

    #[test]
    fn test_later_stay_wins() {
        assert_eq!(FieldUpdate::later_stay(&stay(Some(5)), &stay(Some(7))), stay(Some(7)));
        assert_eq!(FieldUpdate::later_stay(&stay(Some(9)), &stay(Some(7))), stay(Some(9)));
        assert_eq!(FieldUpdate::later_stay(&stay(None), &stay(Some(1))), stay(Some(1)));
    }

    #[test]
    fn test_merged_allergies_union() {
        let local = FieldUpdate::ProfileAllergies(vec!["Chicken".into(), "Wheat".into()]);
        let remote = FieldUpdate::ProfileAllergies(vec!["wheat".into(), "Beef".into()]);
        assert_eq!(
            FieldUpdate::merged(&local, &remote),
            FieldUpdate::ProfileAllergies(vec!["wheat".into(), "Beef".into(), "Chicken".into()])
        );
    }

    #[test]
    fn test_apply_to_wrong_entity_is_ignored() {
        let mut profile = Profile::new("Rex", "Jordan");
        assert!(!FieldUpdate::SessionNotes("x".into()).apply_to_profile(&mut profile));
        assert!(FieldUpdate::ProfileNotes("x".into()).apply_to_profile(&mut profile));
        assert_eq!(profile.notes, "x");
    }
}
