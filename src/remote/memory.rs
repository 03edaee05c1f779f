//! # In-Memory Remote Store
//!
//! A complete [`RemoteStore`] kept in process memory. It behaves like the
//! real server where the sync core can tell the difference:
//!
//! - **Revision checks**: a save based on an older revision than the stored
//!   one fails with [`RemoteError::StaleVersion`]
//! - **Server timestamps**: every accepted save gets a fresh `updated_at`
//!   and the next revision
//! - **Incremental fetch**: `modified_after` filters on `updated_at`
//!
//! It also lets tests and the demo play the part of other clients and of a
//! misbehaving network:
//!
//! - `modify_profile` / `modify_session` / `seed_*` write as another client
//! - `fail_next_save` / `fail_next_fetch` queue one-shot failures
//! - `pause_saves` / `resume_saves` hold confirmations in flight

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use uuid::Uuid;

use super::{RemoteError, RemoteStore};
use crate::shared::model::{Profile, Record, Session};

#[derive(Debug, Default)]
struct RemoteState {
    profiles: HashMap<Uuid, Profile>,
    sessions: HashMap<Uuid, Session>,
    save_failures: VecDeque<RemoteError>,
    fetch_failures: VecDeque<RemoteError>,
    saves: usize,
    fetches: usize,
}

/// In-process remote store
#[derive(Debug)]
pub struct InMemoryRemoteStore {
    state: Mutex<RemoteState>,
    /// `true` while saves may proceed
    save_gate: watch::Sender<bool>,
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        let (save_gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(RemoteState::default()),
            save_gate,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a profile exactly as given, as if another client wrote it.
    pub fn seed_profile(&self, profile: Profile) {
        self.lock().profiles.insert(profile.id, profile);
    }

    /// Store a session exactly as given, as if another client wrote it.
    pub fn seed_session(&self, session: Session) {
        self.lock().sessions.insert(session.id, session);
    }

    /// Edit a stored profile as another client; bumps revision and `updated_at`.
    pub fn modify_profile(&self, id: Uuid, edit: impl FnOnce(&mut Profile)) -> Option<Profile> {
        let mut state = self.lock();
        let profile = state.profiles.get_mut(&id)?;
        edit(profile);
        profile.revision += 1;
        profile.updated_at = Utc::now();
        Some(profile.clone())
    }

    /// Edit a stored session as another client; bumps revision and `updated_at`.
    pub fn modify_session(&self, id: Uuid, edit: impl FnOnce(&mut Session)) -> Option<Session> {
        let mut state = self.lock();
        let session = state.sessions.get_mut(&id)?;
        edit(session);
        session.revision += 1;
        session.updated_at = Utc::now();
        Some(session.clone())
    }

    pub fn profile(&self, id: Uuid) -> Option<Profile> {
        self.lock().profiles.get(&id).cloned()
    }

    pub fn session(&self, id: Uuid) -> Option<Session> {
        self.lock().sessions.get(&id).cloned()
    }

    pub fn profile_count(&self) -> usize {
        self.lock().profiles.len()
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Make the next save fail with `error`.
    pub fn fail_next_save(&self, error: RemoteError) {
        self.lock().save_failures.push_back(error);
    }

    /// Make the next fetch fail with `error`.
    pub fn fail_next_fetch(&self, error: RemoteError) {
        self.lock().fetch_failures.push_back(error);
    }

    /// Hold every save until [`resume_saves`](Self::resume_saves).
    pub fn pause_saves(&self) {
        self.save_gate.send_replace(false);
    }

    pub fn resume_saves(&self) {
        self.save_gate.send_replace(true);
    }

    /// Number of save attempts that reached the store
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    async fn wait_for_gate(&self) -> Result<(), RemoteError> {
        let mut gate = self.save_gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map(|_| ())
            .map_err(|_| RemoteError::Unknown("remote store shut down".to_string()))
    }

    fn take_fetch_failure(&self) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.fetches += 1;
        match state.fetch_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn modified_since(updated_at: DateTime<Utc>, modified_after: Option<DateTime<Utc>>) -> bool {
    modified_after.map_or(true, |checkpoint| updated_at > checkpoint)
}

/// Accept `incoming` if it was based on the stored revision.
fn check_revision(stored: Option<u64>, incoming: u64) -> Result<u64, RemoteError> {
    match stored {
        Some(current) if current != incoming => Err(RemoteError::StaleVersion),
        Some(current) => Ok(current + 1),
        None => Ok(incoming + 1),
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn fetch_profiles(
        &self,
        modified_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Profile>, RemoteError> {
        self.take_fetch_failure()?;
        let state = self.lock();
        Ok(state
            .profiles
            .values()
            .filter(|p| modified_since(p.updated_at, modified_after))
            .cloned()
            .collect())
    }

    async fn fetch_sessions(
        &self,
        modified_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Session>, RemoteError> {
        self.take_fetch_failure()?;
        let state = self.lock();
        Ok(state
            .sessions
            .values()
            .filter(|s| modified_since(s.updated_at, modified_after))
            .cloned()
            .collect())
    }

    async fn save(&self, record: Record) -> Result<Record, RemoteError> {
        self.wait_for_gate().await?;

        let mut state = self.lock();
        state.saves += 1;
        if let Some(error) = state.save_failures.pop_front() {
            return Err(error);
        }

        match record {
            Record::Profile(mut profile) => {
                let stored = state.profiles.get(&profile.id).map(|p| p.revision);
                profile.revision = check_revision(stored, profile.revision)?;
                profile.updated_at = Utc::now();
                state.profiles.insert(profile.id, profile.clone());
                Ok(Record::Profile(profile))
            }
            Record::Session(mut session) => {
                let stored = state.sessions.get(&session.id).map(|s| s.revision);
                session.revision = check_revision(stored, session.revision)?;
                session.updated_at = Utc::now();
                state.sessions.insert(session.id, session.clone());
                Ok(Record::Session(session))
            }
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), RemoteError> {
        self.wait_for_gate().await?;

        let mut state = self.lock();
        state.saves += 1;
        if let Some(error) = state.save_failures.pop_front() {
            return Err(error);
        }
        let removed = state.profiles.remove(&id).is_some() | state.sessions.remove(&id).is_some();
        if removed {
            Ok(())
        } else {
            Err(RemoteError::RecordNotFound)
        }
    }
}
