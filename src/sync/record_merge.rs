//! Append-only record reconciliation.
//!
//! Activity logs are never overwritten by a merge. Local records with no
//! near-duplicate on the remote side are returned as records to add, so the
//! merged log is the remote log plus everything only this client has seen.

use serde::{Deserialize, Serialize};

use crate::shared::model::session::sort_records;
use crate::shared::model::{
    AppendOnlyRecord, DuplicateWindows, EliminationRecord, FeedingRecord, MedicationRecord,
    ScheduledMedication, Session,
};

/// Local records with no near-duplicate in `remote`.
pub fn local_only<T: AppendOnlyRecord>(local: &[T], remote: &[T], windows: &DuplicateWindows) -> Vec<T> {
    local
        .iter()
        .filter(|record| !remote.iter().any(|other| record.is_near_duplicate(other, windows)))
        .cloned()
        .collect()
}

/// Records to add to one activity log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "log", content = "records", rename_all = "snake_case")]
pub enum RecordMerge {
    Feeding(Vec<FeedingRecord>),
    Medication(Vec<MedicationRecord>),
    Elimination(Vec<EliminationRecord>),
    ScheduledMedication(Vec<ScheduledMedication>),
}

impl RecordMerge {
    pub fn len(&self) -> usize {
        match self {
            RecordMerge::Feeding(records) => records.len(),
            RecordMerge::Medication(records) => records.len(),
            RecordMerge::Elimination(records) => records.len(),
            RecordMerge::ScheduledMedication(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn log_name(&self) -> &'static str {
        match self {
            RecordMerge::Feeding(_) => "feeding",
            RecordMerge::Medication(_) => "medication",
            RecordMerge::Elimination(_) => "elimination",
            RecordMerge::ScheduledMedication(_) => "scheduled medication",
        }
    }

    /// Add the records to `session`, skipping ids it already holds.
    pub fn apply_to(&self, session: &mut Session) {
        match self {
            RecordMerge::Feeding(records) => extend_log(&mut session.feeding_records, records),
            RecordMerge::Medication(records) => extend_log(&mut session.medication_records, records),
            RecordMerge::Elimination(records) => extend_log(&mut session.elimination_records, records),
            RecordMerge::ScheduledMedication(records) => {
                extend_log(&mut session.scheduled_medications, records)
            }
        }
    }
}

fn extend_log<T: AppendOnlyRecord>(log: &mut Vec<T>, records: &[T]) {
    for record in records {
        if !log.iter().any(|existing| existing.record_id() == record.record_id()) {
            log.push(record.clone());
        }
    }
    sort_records(log);
}

/// Non-empty merges needed to bring every local-only record into `remote`.
pub fn session_merges(local: &Session, remote: &Session, windows: &DuplicateWindows) -> Vec<RecordMerge> {
    let merges = [
        RecordMerge::Feeding(local_only(&local.feeding_records, &remote.feeding_records, windows)),
        RecordMerge::Medication(local_only(
            &local.medication_records,
            &remote.medication_records,
            windows,
        )),
        RecordMerge::Elimination(local_only(
            &local.elimination_records,
            &remote.elimination_records,
            windows,
        )),
        RecordMerge::ScheduledMedication(local_only(
            &local.scheduled_medications,
            &remote.scheduled_medications,
            windows,
        )),
    ];
    merges.into_iter().filter(|merge| !merge.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_near_duplicates_collapse() {
        let windows = DuplicateWindows::default();
        let t1 = FeedingRecord::new(at(0));
        let t2 = FeedingRecord::new(at(3600));
        let remote = vec![FeedingRecord::new(at(2)), FeedingRecord::new(at(7200))];

        let only = local_only(&[t1, t2.clone()], &remote, &windows);
        assert_eq!(only, vec![t2]);
    }

    #[test]
    fn test_merge_into_session_keeps_order() {
        let windows = DuplicateWindows::default();
        let profile_id = Uuid::new_v4();
        let mut local = Session::new(profile_id, at(0));
        let mut remote = local.clone();
        local.feeding_records = vec![FeedingRecord::new(at(0)), FeedingRecord::new(at(3600))];
        remote.feeding_records = vec![FeedingRecord::new(at(2)), FeedingRecord::new(at(7200))];

        let merges = session_merges(&local, &remote, &windows);
        assert_eq!(merges.len(), 1);

        let mut merged = remote.clone();
        for merge in &merges {
            merge.apply_to(&mut merged);
        }
        let times: Vec<_> = merged.feeding_records.iter().map(|r| r.timestamp).collect();
        assert_eq!(times, vec![at(2), at(3600), at(7200)]);

        // Applying again changes nothing.
        for merge in &merges {
            merge.apply_to(&mut merged);
        }
        assert_eq!(merged.feeding_records.len(), 3);
    }

    #[test]
    fn test_medication_window_uses_medication_id() {
        let windows = DuplicateWindows::default();
        let medication_id = Uuid::new_v4();
        let mut local = MedicationRecord::new("Carprofen", at(0));
        local.medication_id = Some(medication_id);
        let mut remote = MedicationRecord::new("Carprofen", at(45));
        remote.medication_id = Some(medication_id);

        assert!(local_only(&[local.clone()], &[remote], &windows).is_empty());

        // Without a medication id on both sides only the general window applies.
        let other = MedicationRecord::new("Carprofen", at(45));
        assert_eq!(local_only(&[local.clone()], &[other], &windows), vec![local]);
    }
}
