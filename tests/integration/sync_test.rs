//! Sync passes: merging, pending-write precedence and idempotence

use assert_matches::assert_matches;
use chrono::{NaiveDate, Utc};
use pretty_assertions::assert_eq;
use std::sync::Arc;

use crate::common::*;
use crate::{assert_err, assert_ok};
use kennelsync::shared::config::SyncConfig;
use kennelsync::shared::error::SyncError;
use kennelsync::shared::model::{ActorRole, Profile, Session};
use kennelsync::sync::{ConflictKind, SkipReason, SyncOutcome, SyncTrigger};

fn completed(outcome: SyncOutcome) -> kennelsync::sync::SyncReport {
    match outcome {
        SyncOutcome::Completed(report) => report,
        SyncOutcome::Skipped(reason) => panic!("Expected a completed pass, got {:?}", reason),
    }
}

/// A session known to both sides with diverging feeding logs.
fn diverged_feedings(local_offsets: &[i64], remote_offsets: &[i64]) -> (Profile, Session, Session) {
    let writer = staff("desk-1");
    let mut profile = Profile::new("Rex", "Jordan Lee");
    profile.last_modified_by = Some(writer.clone());

    let mut local = Session::new(profile.id, at(-3600));
    local.last_modified_by = Some(writer);
    local.revision = 3;
    let mut remote = local.clone();

    local.feeding_records = feedings(local_offsets);
    remote.feeding_records = feedings(remote_offsets);
    remote.revision = 4;
    (profile, local, remote)
}

#[tokio::test]
async fn test_near_duplicate_feedings_collapse() {
    let (remote, engine) = setup();
    let (profile, local, remote_session) = diverged_feedings(&[0, 3600], &[2, 7200]);
    engine.store().put(profile.clone());
    engine.store().put(local.clone());
    remote.seed_profile(profile);
    remote.seed_session(remote_session);

    let report = completed(assert_ok!(engine.trigger_manual_sync().await));
    assert_eq!(report.updated, 1);

    let merged = engine.get_session(local.id).unwrap();
    let times: Vec<_> = merged.feeding_records.iter().map(|r| r.timestamp).collect();
    assert_eq!(times, vec![at(2), at(3600), at(7200)]);
    assert_eq!(merged.revision, 4);
}

#[tokio::test]
async fn test_same_fetch_twice_changes_nothing() {
    let (remote, engine) = setup();
    let (mut profile, local, mut remote_session) = diverged_feedings(&[0, 3600], &[2, 7200]);
    profile.notes = "Local note".to_string();
    engine.store().put(profile.clone());
    engine.store().put(local.clone());

    let mut remote_profile = profile.clone();
    remote_profile.notes = "Remote note".to_string();
    remote_profile.last_modified_by = Some(staff("desk-2"));
    remote_session.kennel = Some("Run 4".to_string());
    remote.seed_profile(remote_profile);
    remote.seed_session(remote_session);

    completed(assert_ok!(engine.scheduler().sync(SyncTrigger::InitialLoad).await));
    let profile_once = engine.get_profile(profile.id).unwrap();
    let session_once = engine.get_session(local.id).unwrap();
    let version_once = engine.store().version();

    let report = completed(assert_ok!(engine.scheduler().sync(SyncTrigger::InitialLoad).await));
    assert_eq!(report.updated, 0);
    assert_eq!(report.unchanged, 2);
    assert_eq!(*engine.get_profile(profile.id).unwrap(), *profile_once);
    assert_eq!(*engine.get_session(local.id).unwrap(), *session_once);
    assert_eq!(engine.store().version(), version_once);
}

#[tokio::test]
async fn test_pending_update_survives_sync() {
    let (remote, engine) = setup();
    let (rex, stay) = check_in("Rex");
    assert_ok!(engine.add_profile_with_session(rex.clone(), stay).await);
    assert_ok!(engine.trigger_manual_sync().await);

    let mut edited = (*engine.get_profile(rex.id).unwrap()).clone();
    edited.notes = "Anxious during storms".to_string();

    remote.pause_saves();
    let coordinator = Arc::clone(engine.coordinator());
    let write = tokio::spawn(async move { coordinator.update_profile(edited).await });
    wait_until(|| engine.coordinator().pending_count() == 1).await;
    let optimistic = engine.get_profile(rex.id).unwrap();
    assert_eq!(optimistic.notes, "Anxious during storms");

    remote.modify_profile(rex.id, |p| {
        p.notes = "Remote edit".to_string();
        p.last_modified_by = Some(staff("desk-2"));
    });

    let report = completed(assert_ok!(engine.trigger_manual_sync().await));
    assert_eq!(report.skipped_pending, vec![rex.id]);
    assert_eq!(*engine.get_profile(rex.id).unwrap(), *optimistic);

    // The held write was based on an older revision and is rolled back.
    remote.resume_saves();
    let result = write.await.unwrap();
    assert_err!(result, SyncError::ConflictDetected { .. });
    assert_eq!(engine.get_profile(rex.id).unwrap().notes, "");

    // The checkpoint was held, so the next pass picks up the remote edit.
    let report = completed(assert_ok!(engine.trigger_manual_sync().await));
    assert!(report.skipped_pending.is_empty());
    assert_eq!(engine.get_profile(rex.id).unwrap().notes, "Remote edit");
}

#[tokio::test]
async fn test_pending_session_is_left_alone() {
    let (remote, engine) = setup();
    let (rex, stay) = check_in("Rex");
    assert_ok!(engine.add_profile_with_session(rex, stay.clone()).await);

    remote.pause_saves();
    let coordinator = Arc::clone(engine.coordinator());
    let stay_id = stay.id;
    let write = tokio::spawn(async move { coordinator.check_out_session(stay_id, Utc::now()).await });
    wait_until(|| engine.coordinator().has_pending(&stay.id)).await;
    let optimistic = engine.get_session(stay.id).unwrap();

    remote.modify_session(stay.id, |s| s.kennel = Some("Run 9".to_string()));
    assert_ok!(engine.trigger_manual_sync().await);
    assert_eq!(*engine.get_session(stay.id).unwrap(), *optimistic);

    remote.resume_saves();
    assert_err!(write.await.unwrap(), SyncError::ConflictDetected { .. });
}

#[tokio::test]
async fn test_later_boarding_end_date_wins() {
    let (remote, engine) = setup();
    let (profile, mut local, mut remote_session) = diverged_feedings(&[], &[]);
    local.is_boarding = true;
    local.boarding_end_date = NaiveDate::from_ymd_opt(2024, 6, 5);
    remote_session.is_boarding = true;
    remote_session.boarding_end_date = NaiveDate::from_ymd_opt(2024, 6, 7);
    engine.store().put(profile.clone());
    engine.store().put(local.clone());
    remote.seed_profile(profile);
    remote.seed_session(remote_session);

    assert_ok!(engine.trigger_manual_sync().await);
    assert_eq!(
        engine.get_session(local.id).unwrap().boarding_end_date,
        NaiveDate::from_ymd_opt(2024, 6, 7)
    );
}

#[tokio::test]
async fn test_remote_check_out_is_reported() {
    let (remote, engine) = setup();
    let (rex, stay) = check_in("Rex");
    assert_ok!(engine.add_profile_with_session(rex, stay.clone()).await);
    assert_ok!(engine.trigger_manual_sync().await);

    remote.modify_session(stay.id, |s| {
        s.departed_at = Some(Utc::now());
        s.last_modified_by = Some(staff("desk-2"));
    });

    let report = completed(assert_ok!(engine.trigger_manual_sync().await));
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].entity_id, stay.id);
    assert_matches!(report.conflicts[0].conflicts[0].kind, ConflictKind::NoLongerActive);
    assert!(report.conflicts[0].user_message.is_some());

    assert!(!engine.get_session(stay.id).unwrap().is_open());
    assert!(engine.current_sessions_with_profiles().is_empty());
}

#[tokio::test]
async fn test_owner_edit_beats_staff_edit() {
    let (remote, engine) = setup();
    let mut profile = Profile::new("Luna", "Sam Carter");
    profile.last_modified_by = Some(owner("sam"));
    profile.owner_phone = Some("555-0101".to_string());
    let mut stale = profile.clone();
    stale.owner_phone = Some("555-0199".to_string());
    stale.last_modified_by = Some(staff("desk-1"));
    engine.store().put(stale);

    profile.revision = 2;
    remote.seed_profile(profile.clone());

    assert_ok!(engine.trigger_manual_sync().await);
    let merged = engine.get_profile(profile.id).unwrap();
    assert_eq!(merged.owner_phone.as_deref(), Some("555-0101"));
}

#[tokio::test]
async fn test_cache_follows_successive_remote_edits() {
    let (remote, engine) = setup();
    let (rex, stay) = check_in("Rex");
    assert_ok!(engine.add_profile_with_session(rex.clone(), stay).await);

    let mut edited = (*engine.get_profile(rex.id).unwrap()).clone();
    edited.notes = "A".to_string();
    assert_ok!(engine.update_profile(edited).await);
    assert_profile_synced(&engine, &remote, rex.id);

    // Each remote edit replaces the confirmed local text instead of
    // stacking on top of it.
    for notes in ["B", "C"] {
        remote.modify_profile(rex.id, |p| {
            p.notes = notes.to_string();
            p.last_modified_by = Some(staff("desk-2"));
        });
        let report = completed(assert_ok!(engine.trigger_manual_sync().await));
        assert!(report.conflicts.is_empty());
        assert_profile_synced(&engine, &remote, rex.id);
    }

    let cached = engine.get_profile(rex.id).unwrap();
    assert_eq!(cached.notes, "C");
    assert!(!cached.needs_sync);
    let report = assert_ok!(engine.validate_against_remote().await);
    assert!(report.is_healthy());
}

#[tokio::test]
async fn test_owner_device_does_not_claim_unattributed_copies() {
    let config = SyncConfig::builder().local_role(ActorRole::Owner).build().unwrap();
    let (remote, engine) = setup_with(config);

    let mut luna = Profile::new("Luna", "Sam Carter");
    luna.owner_phone = Some("555-0101".to_string());
    remote.seed_profile(luna.clone());
    completed(assert_ok!(engine.trigger_manual_sync().await));
    assert!(engine.get_profile(luna.id).unwrap().last_modified_by.is_none());

    // A newer unattributed remote edit is adopted.
    remote.modify_profile(luna.id, |p| p.owner_phone = Some("555-0142".to_string()));
    assert_ok!(engine.trigger_manual_sync().await);
    assert_profile_synced(&engine, &remote, luna.id);

    // Same revision on both sides, neither attributed: both count as
    // staff, so the owner field goes to review and the remote value stays.
    let mut bella = Profile::new("Bella", "Chris Park");
    bella.owner_phone = Some("555-0300".to_string());
    let mut other = bella.clone();
    other.owner_phone = Some("555-0301".to_string());
    engine.store().put(bella.clone());
    remote.seed_profile(other);

    let report = completed(assert_ok!(engine.trigger_manual_sync().await));
    let merged = engine.get_profile(bella.id).unwrap();
    assert_eq!(merged.owner_phone.as_deref(), Some("555-0301"));
    assert_eq!(report.conflicts.len(), 1);
    assert_matches!(report.conflicts[0].conflicts[0].kind, ConflictKind::NeedsReview);
}

#[tokio::test]
async fn test_incremental_fetch_and_untouched_locals() {
    let (remote, engine) = setup();
    remote.seed_profile(Profile::new("Milo", "Alex"));
    let first = completed(assert_ok!(engine.trigger_manual_sync().await));
    assert_eq!(first.inserted, 1);
    let checkpoint = engine.scheduler().checkpoint();
    assert!(checkpoint.is_some());

    let local_only = Profile::new("Bella", "Chris");
    engine.store().put(local_only.clone());

    let second = completed(assert_ok!(engine.trigger_manual_sync().await));
    assert_eq!(second.fetched(), 0);
    assert!(engine.get_profile(local_only.id).is_some());
    assert!(engine.scheduler().checkpoint() >= checkpoint);
}

#[tokio::test]
async fn test_periodic_pass_respects_minimum_interval() {
    let (_remote, engine) = setup();
    assert_ok!(engine.scheduler().sync(SyncTrigger::Periodic).await);

    let outcome = assert_ok!(engine.scheduler().sync(SyncTrigger::Periodic).await);
    assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::TooSoon));

    // Manual refreshes are forced.
    let outcome = assert_ok!(engine.trigger_manual_sync().await);
    assert_matches!(outcome, SyncOutcome::Completed(_));
    assert_eq!(engine.get_sync_status().metrics.skipped_syncs, 1);
}
