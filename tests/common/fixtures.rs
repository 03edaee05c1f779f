//! Engine and entity fixtures

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use kennelsync::remote::InMemoryRemoteStore;
use kennelsync::shared::config::SyncConfig;
use kennelsync::shared::model::{Actor, ActorRole, FeedingRecord, Profile, Session};
use kennelsync::sync::SyncEngine;

/// Engine with default configuration over a fresh in-memory remote.
pub fn setup() -> (Arc<InMemoryRemoteStore>, SyncEngine) {
    setup_with(SyncConfig::default())
}

pub fn setup_with(config: SyncConfig) -> (Arc<InMemoryRemoteStore>, SyncEngine) {
    let remote = Arc::new(InMemoryRemoteStore::new());
    let engine = SyncEngine::new(remote.clone(), config);
    (remote, engine)
}

/// Fixed reference instant plus `secs`.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap() + Duration::seconds(secs)
}

pub fn staff(id: &str) -> Actor {
    Actor::new(id, ActorRole::Staff)
}

pub fn owner(id: &str) -> Actor {
    Actor::new(id, ActorRole::Owner)
}

/// A profile and an open session for it.
pub fn check_in(name: &str) -> (Profile, Session) {
    let profile = Profile::new(name, "Jordan Lee");
    let session = Session::new(profile.id, Utc::now() - Duration::hours(1));
    (profile, session)
}

pub fn feedings(offsets: &[i64]) -> Vec<FeedingRecord> {
    offsets.iter().map(|secs| FeedingRecord::new(at(*secs))).collect()
}

/// Let spawned tasks run until `done` holds.
pub async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
