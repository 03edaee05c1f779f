//! Integrity validation over the live cache and against the remote store

use chrono::{Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::common::*;
use crate::{assert_contains, assert_err, assert_ok};
use kennelsync::offline::IssueKind;
use kennelsync::shared::config::SyncConfig;
use kennelsync::shared::error::SyncError;
use kennelsync::shared::model::{Profile, Session};

#[tokio::test]
async fn test_healthy_after_sync() {
    let (_remote, engine) = setup();
    let (rex, stay) = check_in("Rex");
    assert_ok!(engine.add_profile_with_session(rex, stay).await);
    assert_ok!(engine.trigger_manual_sync().await);

    let report = engine.validate_integrity();
    assert!(report.is_healthy());
    assert!(report.warnings.is_empty());

    let report = assert_ok!(engine.validate_against_remote().await);
    assert!(report.is_healthy());
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn test_broken_invariants_are_errors() {
    let (_remote, engine) = setup();

    let orphan = Session::new(uuid::Uuid::new_v4(), Utc::now());
    engine.store().put(orphan.clone());

    let luna = Profile::new("Luna", "Sam");
    engine.store().put(luna.clone());
    engine.store().put(Session::new(luna.id, Utc::now() - Duration::hours(2)));
    engine.store().put(Session::new(luna.id, Utc::now()));

    let mut backwards = Session::new(luna.id, Utc::now());
    backwards.departed_at = Some(Utc::now() - Duration::days(1));
    engine.store().put(backwards.clone());

    let report = engine.validate_integrity();
    assert!(!report.is_healthy());
    assert!(report.has_issue(IssueKind::OrphanedSession));
    assert!(report.has_issue(IssueKind::MultipleOpenSessions));
    assert!(report.has_issue(IssueKind::EndBeforeStart));
    assert!(report.errors.iter().any(|issue| issue.entity_id == Some(orphan.id)));
    assert!(report.errors.iter().any(|issue| issue.entity_id == Some(backwards.id)));

    assert_err!(report.clone().into_result(), SyncError::DataInconsistency { .. });
    let error = report.into_result().unwrap_err();
    assert_contains!(error.to_string(), "ends before it starts");
}

#[tokio::test]
async fn test_stuck_write_is_a_warning() {
    let config = SyncConfig::builder()
        .stale_pending_threshold(StdDuration::ZERO)
        .build()
        .unwrap();
    let (remote, engine) = setup_with(config);
    let (rex, stay) = check_in("Rex");
    assert_ok!(engine.add_profile_with_session(rex.clone(), stay).await);

    remote.pause_saves();
    let mut edited = (*engine.get_profile(rex.id).unwrap()).clone();
    edited.notes = "Needs a blanket".to_string();
    let coordinator = Arc::clone(engine.coordinator());
    let write = tokio::spawn(async move { coordinator.update_profile(edited).await });
    wait_until(|| engine.coordinator().pending_count() == 1).await;
    tokio::time::sleep(StdDuration::from_millis(5)).await;

    let report = engine.validate_integrity();
    assert!(report.is_healthy());
    assert!(report.has_issue(IssueKind::StalePendingOperation));

    remote.resume_saves();
    assert_ok!(write.await.unwrap());
    assert!(!engine.validate_integrity().has_issue(IssueKind::StalePendingOperation));
}

#[tokio::test]
async fn test_remote_comparison_skips_pending_entities() {
    let (remote, engine) = setup();
    assert_ok!(engine.trigger_manual_sync().await);

    // Present only locally, and not covered by any write.
    let stray = Profile::new("Stray", "Unknown");
    engine.store().put(stray.clone());
    // Present only remotely.
    let newcomer = Profile::new("Milo", "Alex");
    remote.seed_profile(newcomer.clone());

    let report = assert_ok!(engine.validate_against_remote().await);
    assert!(report.has_issue(IssueKind::MissingRemotely));
    assert!(report.has_issue(IssueKind::MissingLocally));
    assert!(!report.has_issue(IssueKind::CountMismatch));

    // A check-in held in flight is expected to differ.
    let (rex, stay) = check_in("Rex");
    remote.pause_saves();
    let coordinator = Arc::clone(engine.coordinator());
    let write = tokio::spawn(async move { coordinator.add_profile_with_session(rex, stay).await });
    wait_until(|| engine.coordinator().pending_count() == 1).await;

    let report = assert_ok!(engine.validate_against_remote().await);
    let flagged: Vec<_> = report.errors.iter().filter_map(|issue| issue.entity_id).collect();
    assert_eq!(flagged.len(), 2);
    assert!(flagged.contains(&stray.id));
    assert!(flagged.contains(&newcomer.id));

    remote.resume_saves();
    assert_ok!(write.await.unwrap());
}
