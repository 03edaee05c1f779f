//! Optimistic writes: prechecks, confirmation and rollback

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;

use crate::common::*;
use crate::{assert_contains, assert_err, assert_ok};
use kennelsync::remote::RemoteError;
use kennelsync::shared::error::SyncError;
use kennelsync::shared::model::{ActivityEntry, FeedingRecord, Session};

#[tokio::test]
async fn test_second_check_in_for_same_dog_is_refused() {
    let (remote, engine) = setup();
    let (rex, first) = check_in("Rex");
    assert_ok!(engine.add_profile_with_session(rex.clone(), first.clone()).await);

    let second = Session::new(rex.id, Utc::now());
    let result = engine.add_profile_with_session(rex.clone(), second.clone()).await;
    assert_err!(result, SyncError::ConflictDetected { .. });

    let open: Vec<_> = engine
        .current_sessions_with_profiles()
        .into_iter()
        .filter(|view| view.profile.id == rex.id)
        .collect();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].session.id, first.id);
    assert!(engine.get_session(second.id).is_none());
    assert!(remote.session(second.id).is_none());
}

#[tokio::test]
async fn test_add_session_for_checked_in_dog_is_refused() {
    let (_remote, engine) = setup();
    let (rex, first) = check_in("Rex");
    assert_ok!(engine.add_profile_with_session(rex.clone(), first).await);

    let error = engine
        .add_session_for_profile(Session::new(rex.id, Utc::now()))
        .await
        .unwrap_err();
    assert!(error.is_conflict());
    assert_contains!(error.user_message(), "Rex");
}

#[tokio::test]
async fn test_failed_confirmation_restores_entities() {
    let (remote, engine) = setup();
    let (rex, stay) = check_in("Rex");
    assert_ok!(engine.add_profile_with_session(rex.clone(), stay.clone()).await);

    let profile_before = engine.get_profile(rex.id).unwrap();
    let session_before = engine.get_session(stay.id).unwrap();

    let mut edited = (*profile_before).clone();
    edited.notes = "Barks at the mail carrier".to_string();
    remote.fail_next_save(RemoteError::QuotaExceeded);

    let result = engine.update_profile(edited).await;
    assert_err!(result, SyncError::RemoteSyncFailed { cause: RemoteError::QuotaExceeded });

    assert_eq!(*engine.get_profile(rex.id).unwrap(), *profile_before);
    assert_eq!(*engine.get_session(stay.id).unwrap(), *session_before);
    assert_eq!(engine.coordinator().pending_count(), 0);
}

#[tokio::test]
async fn test_failed_check_in_leaves_nothing_behind() {
    let (remote, engine) = setup();
    let (rex, stay) = check_in("Rex");
    remote.fail_next_save(RemoteError::NotAuthenticated);

    let result = engine.add_profile_with_session(rex.clone(), stay.clone()).await;
    assert_err!(result, SyncError::RemoteSyncFailed { .. });

    assert!(engine.get_profile(rex.id).is_none());
    assert!(engine.get_session(stay.id).is_none());
    assert_eq!(remote.profile_count(), 0);
}

#[tokio::test]
async fn test_stale_write_surfaces_as_conflict() {
    let (remote, engine) = setup();
    let (rex, stay) = check_in("Rex");
    assert_ok!(engine.add_profile_with_session(rex.clone(), stay).await);

    remote.modify_profile(rex.id, |p| p.owner_phone = Some("555-0100".to_string()));

    let mut edited = (*engine.get_profile(rex.id).unwrap()).clone();
    edited.notes = "Prefers the corner run".to_string();
    let result = engine.update_profile(edited).await;

    assert_err!(result, SyncError::ConflictDetected { .. });
    assert_eq!(engine.get_profile(rex.id).unwrap().notes, "");
}

#[tokio::test]
async fn test_confirmed_write_adopts_server_revision() {
    let (remote, engine) = setup();
    let (rex, stay) = check_in("Rex");
    assert_ok!(engine.add_profile_with_session(rex.clone(), stay.clone()).await);
    assert_eq!(engine.get_profile(rex.id).unwrap().revision, 1);

    let entry = ActivityEntry::Feeding(FeedingRecord::new(Utc::now()));
    assert_ok!(engine.append_activity(stay.id, entry).await);

    let local = engine.get_session(stay.id).unwrap();
    let stored = remote.session(stay.id).unwrap();
    assert_eq!(local.revision, 2);
    assert_eq!(*local, stored);
}

#[tokio::test]
async fn test_check_out_before_check_in_is_invalid() {
    let (_remote, engine) = setup();
    let (rex, stay) = check_in("Rex");
    assert_ok!(engine.add_profile_with_session(rex, stay.clone()).await);

    let result = engine
        .check_out_session(stay.id, stay.arrived_at - Duration::minutes(5))
        .await;
    assert_err!(result, SyncError::InvalidEntity { .. });
    assert!(engine.get_session(stay.id).unwrap().is_open());

    assert_ok!(engine.check_out_session(stay.id, Utc::now()).await);
    let result = engine.check_out_session(stay.id, Utc::now()).await;
    assert_err!(result, SyncError::ConflictDetected { .. });
}

#[tokio::test]
async fn test_soft_delete_and_purge() {
    let (remote, engine) = setup();
    let (rex, stay) = check_in("Rex");
    assert_ok!(engine.add_profile_with_session(rex, stay.clone()).await);

    assert_ok!(engine.delete_session(stay.id).await);
    assert!(engine.get_session(stay.id).unwrap().is_deleted);
    assert!(remote.session(stay.id).unwrap().is_deleted);
    assert!(engine.current_sessions_with_profiles().is_empty());

    assert_ok!(engine.purge_session(stay.id).await);
    assert!(engine.get_session(stay.id).is_none());
    assert!(remote.session(stay.id).is_none());
}
