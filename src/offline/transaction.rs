//! # Transaction Coordinator
//!
//! Wraps every local write in an atomic unit:
//!
//! 1. **Precheck** business rules against the live cache
//! 2. **Snapshot** the cache
//! 3. **Register** a [`PendingOperation`]
//! 4. **Apply** the change optimistically
//! 5. **Confirm** with the remote store, then commit or roll back
//!
//! Steps 1 to 4 run in one cache critical section, so two writers can never
//! both pass the same precheck. Step 5 runs outside it; the critical section
//! is re-entered only to commit or roll back.
//!
//! ## Rollback
//!
//! On failure every entity the operation wrote is put back to its snapshot
//! value, unless something else replaced it in the meantime. Entities the
//! operation never touched are left alone.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kennelsync::cache::EntityStore;
//! use kennelsync::offline::TransactionCoordinator;
//! use kennelsync::remote::InMemoryRemoteStore;
//! use kennelsync::shared::model::{Actor, ActorRole, Profile, Session};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), kennelsync::shared::error::SyncError> {
//! let coordinator = TransactionCoordinator::new(
//!     Arc::new(EntityStore::new()),
//!     Arc::new(InMemoryRemoteStore::new()),
//!     Actor::new("front-desk", ActorRole::Staff),
//! );
//!
//! let profile = Profile::new("Rex", "Jordan");
//! let session = Session::new(profile.id, chrono::Utc::now());
//! coordinator.add_profile_with_session(profile, session).await?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use super::pending::{OperationKind, PendingIndex, PendingOperation, PendingSummary};
use crate::cache::{EntityStore, EntryRef, StoreMaps};
use crate::remote::{RemoteError, RemoteStore};
use crate::shared::error::SyncError;
use crate::shared::model::{ActivityEntry, Actor, EntityKind, Profile, Record, Session};

/// One write an operation performs
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Insert or replace an entity
    Put(Record),
    /// Permanently remove an entity
    Remove(Uuid),
}

impl Change {
    pub fn entity_id(&self) -> Uuid {
        match self {
            Change::Put(record) => record.id(),
            Change::Remove(id) => *id,
        }
    }
}

/// Coordinates optimistic local writes with remote confirmation
pub struct TransactionCoordinator {
    store: Arc<EntityStore>,
    remote: Arc<dyn RemoteStore>,
    pending: PendingIndex,
    actor: Actor,
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("actor", &self.actor)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

struct Begun {
    op_id: Uuid,
    changes: Vec<Change>,
    applied: Vec<(Uuid, Option<EntryRef>)>,
}

impl TransactionCoordinator {
    pub fn new(store: Arc<EntityStore>, remote: Arc<dyn RemoteStore>, actor: Actor) -> Self {
        Self {
            store,
            remote,
            pending: PendingIndex::new(),
            actor,
        }
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Index of in-flight operations.
    ///
    /// Only consult it while holding the cache lock if the answer must agree
    /// with the cache contents.
    pub fn pending(&self) -> &PendingIndex {
        &self.pending
    }

    pub fn has_pending(&self, entity_id: &Uuid) -> bool {
        self.pending.covers(entity_id)
    }

    pub fn pending_entity_ids(&self) -> HashSet<Uuid> {
        self.pending.entity_ids()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_operations(&self) -> Vec<PendingSummary> {
        self.pending.summaries()
    }

    /// Create a profile and open its first session.
    ///
    /// Fails with `ConflictDetected` if the profile already has an open session.
    pub async fn add_profile_with_session(
        &self,
        mut profile: Profile,
        mut session: Session,
    ) -> Result<(), SyncError> {
        if session.profile_id != profile.id {
            return Err(SyncError::invalid("session does not belong to the new profile"));
        }
        if !session.has_valid_times() {
            return Err(SyncError::invalid("check-out time is before check-in time"));
        }
        profile.touch(Some(&self.actor));
        session.touch(Some(&self.actor));

        self.execute(OperationKind::AddProfileWithSession, move |maps| {
            ensure_no_open_session(maps, profile.id, &profile.name)?;
            Ok(vec![Change::Put(profile.into()), Change::Put(session.into())])
        })
        .await
    }

    /// Open a new session for an existing profile.
    pub async fn add_session_for_profile(&self, mut session: Session) -> Result<(), SyncError> {
        if !session.has_valid_times() {
            return Err(SyncError::invalid("check-out time is before check-in time"));
        }
        session.touch(Some(&self.actor));

        self.execute(OperationKind::AddSession, move |maps| {
            let profile = maps
                .profile(&session.profile_id)
                .filter(|p| !p.is_deleted)
                .ok_or_else(|| SyncError::not_found(EntityKind::Profile, session.profile_id))?;
            if session.is_open() {
                ensure_no_open_session(maps, profile.id, &profile.name)?;
            }
            Ok(vec![Change::Put(session.into())])
        })
        .await
    }

    pub async fn update_profile(&self, mut profile: Profile) -> Result<(), SyncError> {
        profile.touch(Some(&self.actor));

        self.execute(OperationKind::UpdateProfile, move |maps| {
            if maps.profile(&profile.id).is_none() {
                return Err(SyncError::not_found(EntityKind::Profile, profile.id));
            }
            Ok(vec![Change::Put(profile.into())])
        })
        .await
    }

    /// Replace a session; the end timestamp may not precede the start.
    pub async fn update_session(&self, mut session: Session) -> Result<(), SyncError> {
        if !session.has_valid_times() {
            return Err(SyncError::invalid("check-out time is before check-in time"));
        }
        session.touch(Some(&self.actor));

        self.execute(OperationKind::UpdateSession, move |maps| {
            if maps.session(&session.id).is_none() {
                return Err(SyncError::not_found(EntityKind::Session, session.id));
            }
            if session.is_active() {
                let other_open = maps
                    .open_sessions_for(session.profile_id)
                    .any(|other| other.id != session.id);
                if other_open {
                    return Err(SyncError::conflict("this dog already has another active session"));
                }
            }
            Ok(vec![Change::Put(session.into())])
        })
        .await
    }

    /// Soft-delete a session; it stays in the store flagged as deleted.
    pub async fn delete_session(&self, session_id: Uuid) -> Result<(), SyncError> {
        let actor = self.actor.clone();
        self.execute(OperationKind::DeleteSession, move |maps| {
            let mut session = existing_session(maps, session_id)?;
            session.is_deleted = true;
            session.touch(Some(&actor));
            Ok(vec![Change::Put(session.into())])
        })
        .await
    }

    /// Close an open session at `departed_at`.
    pub async fn check_out_session(
        &self,
        session_id: Uuid,
        departed_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let actor = self.actor.clone();
        self.execute(OperationKind::CheckOutSession, move |maps| {
            let mut session = existing_session(maps, session_id)?;
            if session.is_deleted {
                return Err(SyncError::not_found(EntityKind::Session, session_id));
            }
            if !session.is_open() {
                return Err(SyncError::conflict("this session was already checked out"));
            }
            if departed_at < session.arrived_at {
                return Err(SyncError::invalid("check-out time is before check-in time"));
            }
            session.departed_at = Some(departed_at);
            session.touch(Some(&actor));
            Ok(vec![Change::Put(session.into())])
        })
        .await
    }

    /// Append one activity record to a session log.
    pub async fn append_activity(&self, session_id: Uuid, entry: ActivityEntry) -> Result<(), SyncError> {
        let actor = self.actor.clone();
        self.execute(OperationKind::AppendActivity, move |maps| {
            let mut session = existing_session(maps, session_id)?;
            if session.is_deleted {
                return Err(SyncError::not_found(EntityKind::Session, session_id));
            }
            session.append(entry);
            session.touch(Some(&actor));
            Ok(vec![Change::Put(session.into())])
        })
        .await
    }

    /// Permanently remove a session, locally and remotely.
    pub async fn purge_session(&self, session_id: Uuid) -> Result<(), SyncError> {
        self.execute(OperationKind::PurgeSession, move |maps| {
            existing_session(maps, session_id)?;
            Ok(vec![Change::Remove(session_id)])
        })
        .await
    }

    /// Run an operation whose confirmation writes through the remote store.
    pub async fn execute<P>(&self, kind: OperationKind, prepare: P) -> Result<(), SyncError>
    where
        P: FnOnce(&StoreMaps) -> Result<Vec<Change>, SyncError>,
    {
        self.execute_with(kind, prepare, |changes| self.write_through(changes))
            .await
    }

    /// Run an operation with a caller-supplied confirmation.
    ///
    /// `prepare` checks business rules and returns the writes to apply; it
    /// runs inside the cache critical section. `confirm` receives the same
    /// writes and returns the values the server stored, which replace the
    /// optimistic ones on commit.
    pub async fn execute_with<P, C, Fut>(
        &self,
        kind: OperationKind,
        prepare: P,
        confirm: C,
    ) -> Result<(), SyncError>
    where
        P: FnOnce(&StoreMaps) -> Result<Vec<Change>, SyncError>,
        C: FnOnce(Vec<Change>) -> Fut,
        Fut: Future<Output = Result<Vec<Record>, RemoteError>>,
    {
        let begun = self.begin(kind, prepare).inspect_err(|e| {
            tracing::debug!(kind = %kind, error = %e, "[TXN] Rejected before apply");
        })?;

        match confirm(begun.changes.clone()).await {
            Ok(saved) => {
                self.commit(&begun, saved);
                tracing::info!(op_id = %begun.op_id, kind = %kind, "[TXN] Committed");
                Ok(())
            }
            Err(cause) => {
                self.rollback(&begun);
                tracing::warn!(op_id = %begun.op_id, kind = %kind, error = %cause, "[TXN] Rolled back");
                Err(SyncError::from(cause))
            }
        }
    }

    fn begin<P>(&self, kind: OperationKind, prepare: P) -> Result<Begun, SyncError>
    where
        P: FnOnce(&StoreMaps) -> Result<Vec<Change>, SyncError>,
    {
        self.store.write_with(|maps| {
            let changes = prepare(maps)?;
            let original_state = maps.snapshot();

            let op_id = Uuid::new_v4();
            self.pending.insert(PendingOperation {
                id: op_id,
                kind,
                entity_ids: changes.iter().map(Change::entity_id).collect(),
                original_state,
                started_at: Utc::now(),
            });

            let applied = changes
                .iter()
                .map(|change| match change {
                    Change::Put(record) => (record.id(), Some(maps.put(record.clone()))),
                    Change::Remove(id) => {
                        maps.remove(id);
                        (*id, None)
                    }
                })
                .collect();

            tracing::debug!(op_id = %op_id, kind = %kind, version = maps.version(), "[TXN] Applied optimistically");
            Ok(Begun {
                op_id,
                changes,
                applied,
            })
        })
    }

    fn commit(&self, begun: &Begun, saved: Vec<Record>) {
        self.store.write_with(|maps| {
            for record in saved {
                let id = record.id();
                let untouched = begun
                    .applied
                    .iter()
                    .any(|(applied_id, applied)| *applied_id == id && still_applied(maps, &id, applied));
                if untouched {
                    maps.put(record);
                }
            }
            self.pending.remove(&begun.op_id);
        });
    }

    fn rollback(&self, begun: &Begun) {
        self.store.write_with(|maps| {
            let Some(operation) = self.pending.remove(&begun.op_id) else {
                return;
            };
            for (id, applied) in &begun.applied {
                if still_applied(maps, id, applied) {
                    maps.restore_entities(&operation.original_state, std::slice::from_ref(id));
                } else {
                    tracing::warn!(op_id = %begun.op_id, entity_id = %id, "[TXN] Superseded before rollback; keeping newer value");
                }
            }
        });
    }

    async fn write_through(&self, changes: Vec<Change>) -> Result<Vec<Record>, RemoteError> {
        let mut saved = Vec::with_capacity(changes.len());
        for change in changes {
            match change {
                Change::Put(record) => saved.push(self.remote.save(record).await?),
                Change::Remove(id) => self.remote.delete(id).await?,
            }
        }
        Ok(saved)
    }
}

/// Whether the cache still holds exactly what the operation applied.
fn still_applied(maps: &StoreMaps, id: &Uuid, applied: &Option<EntryRef>) -> bool {
    match (maps.entry(id), applied) {
        (Some(current), Some(applied)) => current.same_as(applied),
        (None, None) => true,
        _ => false,
    }
}

fn ensure_no_open_session(maps: &StoreMaps, profile_id: Uuid, name: &str) -> Result<(), SyncError> {
    if maps.open_sessions_for(profile_id).next().is_some() {
        return Err(SyncError::conflict(format!("{} already has an active session", name)));
    }
    Ok(())
}

fn existing_session(maps: &StoreMaps, session_id: Uuid) -> Result<Session, SyncError> {
    maps.session(&session_id)
        .map(|session| Session::clone(session))
        .ok_or_else(|| SyncError::not_found(EntityKind::Session, session_id))
}
