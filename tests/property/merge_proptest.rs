//! Property-based tests for conflict resolution and log merging

use proptest::prelude::*;
use uuid::Uuid;

use crate::common::at;
use kennelsync::shared::model::{ActorRole, DuplicateWindows, FeedingRecord, Session};
use kennelsync::sync::ConflictResolver;

/// Sorted, as activity logs are kept in time order.
fn offsets() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..20_000, 0..12).prop_map(|mut offsets| {
        offsets.sort_unstable();
        offsets
    })
}

fn notes() -> impl Strategy<Value = String> {
    prop_oneof![Just(String::new()), "[a-z ]{1,12}"]
}

fn session_pair(
    local_offsets: &[i64],
    remote_offsets: &[i64],
    local_notes: String,
    remote_notes: String,
) -> (Session, Session) {
    let mut local = Session::new(Uuid::new_v4(), at(-3600));
    let mut remote = local.clone();
    local.feeding_records = local_offsets.iter().map(|s| FeedingRecord::new(at(*s))).collect();
    remote.feeding_records = remote_offsets.iter().map(|s| FeedingRecord::new(at(*s))).collect();
    local.notes = local_notes;
    remote.notes = remote_notes;
    (local, remote)
}

proptest! {
    #[test]
    fn test_merge_never_drops_local_records(
        local_offsets in offsets(),
        remote_offsets in offsets(),
    ) {
        let windows = DuplicateWindows::default();
        let resolver = ConflictResolver::default();
        let (local, remote) = session_pair(&local_offsets, &remote_offsets, String::new(), String::new());

        let resolution = resolver.resolve(&local, &remote, ActorRole::Staff, ActorRole::Staff);
        let merged = resolution.merge(&local, &remote);

        for record in &local.feeding_records {
            let kept = merged.feeding_records.iter().any(|r| r.id == record.id);
            let duplicate = remote
                .feeding_records
                .iter()
                .any(|r| (r.timestamp - record.timestamp).abs() <= windows.general);
            prop_assert!(kept || duplicate);
        }
        for record in &remote.feeding_records {
            prop_assert!(merged.feeding_records.iter().any(|r| r.id == record.id));
        }
    }

    #[test]
    fn test_merge_is_idempotent(
        local_offsets in offsets(),
        remote_offsets in offsets(),
        local_notes in notes(),
        remote_notes in notes(),
    ) {
        let resolver = ConflictResolver::default();
        let (local, remote) = session_pair(&local_offsets, &remote_offsets, local_notes, remote_notes);

        let once = resolver
            .resolve(&local, &remote, ActorRole::Staff, ActorRole::Staff)
            .merge(&local, &remote);
        let twice = resolver
            .resolve(&once, &remote, ActorRole::Staff, ActorRole::Staff)
            .merge(&once, &remote);

        prop_assert_eq!(once, twice);
    }

    #[test]
    fn test_merged_log_is_chronological(
        local_offsets in offsets(),
        remote_offsets in offsets(),
    ) {
        let resolver = ConflictResolver::default();
        let (local, remote) = session_pair(&local_offsets, &remote_offsets, String::new(), String::new());

        let merged = resolver
            .resolve(&local, &remote, ActorRole::Staff, ActorRole::Staff)
            .merge(&local, &remote);

        prop_assert!(merged
            .feeding_records
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp));
    }
}
