//! # Entity Cache
//!
//! In-memory, transactionally consistent copy of the dataset.
//!
//! ## Architecture
//!
//! Both entity maps and the version counter live in one [`StoreMaps`] value
//! guarded by a single `RwLock`, so no reader can observe a half-updated
//! pair of maps. Entities are held behind `Arc`, which makes a full
//! [`StoreSnapshot`] a structural copy: cloning the maps only bumps
//! reference counts.
//!
//! Compound operations (the transaction coordinator's begin/commit/rollback
//! steps and the sync merge) run inside [`EntityStore::write_with`], so they
//! share the same serialization point as the plain accessors. Nothing in this
//! module performs I/O and no lock is ever held across an `.await`.
//!
//! ## Usage
//!
//! ```rust
//! use kennelsync::cache::EntityStore;
//! use kennelsync::shared::model::Profile;
//!
//! let store = EntityStore::new();
//! let profile = Profile::new("Rex", "Jordan");
//! let id = profile.id;
//! store.put(profile);
//!
//! assert_eq!(store.get_profile(id).unwrap().name, "Rex");
//! assert_eq!(store.version(), 1);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::shared::model::{Profile, Record, Session};

pub type ProfileMap = HashMap<Uuid, Arc<Profile>>;
pub type SessionMap = HashMap<Uuid, Arc<Session>>;

/// Full structural copy of the cache at one version
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub profiles: ProfileMap,
    pub sessions: SessionMap,
    pub version: u64,
}

impl StoreSnapshot {
    pub fn profile(&self, id: &Uuid) -> Option<&Arc<Profile>> {
        self.profiles.get(id)
    }

    pub fn session(&self, id: &Uuid) -> Option<&Arc<Session>> {
        self.sessions.get(id)
    }
}

/// An open session joined with its profile
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeView {
    pub session: Arc<Session>,
    pub profile: Arc<Profile>,
}

/// Identity of the exact value currently stored under an id.
///
/// Two `EntryRef`s are equal only if they point at the same allocation,
/// i.e. nothing replaced the entry in between.
#[derive(Debug, Clone)]
pub enum EntryRef {
    Profile(Arc<Profile>),
    Session(Arc<Session>),
}

impl EntryRef {
    pub fn same_as(&self, other: &EntryRef) -> bool {
        match (self, other) {
            (EntryRef::Profile(a), EntryRef::Profile(b)) => Arc::ptr_eq(a, b),
            (EntryRef::Session(a), EntryRef::Session(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// The guarded interior of the [`EntityStore`]
#[derive(Debug, Default)]
pub struct StoreMaps {
    profiles: ProfileMap,
    sessions: SessionMap,
    version: u64,
}

impl StoreMaps {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn profile(&self, id: &Uuid) -> Option<&Arc<Profile>> {
        self.profiles.get(id)
    }

    pub fn session(&self, id: &Uuid) -> Option<&Arc<Session>> {
        self.sessions.get(id)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Arc<Profile>> {
        self.profiles.values()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Arc<Session>> {
        self.sessions.values()
    }

    /// Non-deleted, open sessions belonging to `profile_id`.
    pub fn open_sessions_for(&self, profile_id: Uuid) -> impl Iterator<Item = &Arc<Session>> {
        self.sessions
            .values()
            .filter(move |s| s.profile_id == profile_id && s.is_active())
    }

    pub fn put_profile(&mut self, profile: Profile) -> Arc<Profile> {
        let profile = Arc::new(profile);
        self.profiles.insert(profile.id, Arc::clone(&profile));
        self.version += 1;
        profile
    }

    pub fn put_session(&mut self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.sessions.insert(session.id, Arc::clone(&session));
        self.version += 1;
        session
    }

    pub fn put(&mut self, record: Record) -> EntryRef {
        match record {
            Record::Profile(profile) => EntryRef::Profile(self.put_profile(profile)),
            Record::Session(session) => EntryRef::Session(self.put_session(session)),
        }
    }

    /// Remove an entity of either kind; returns whether anything was removed.
    pub fn remove(&mut self, id: &Uuid) -> bool {
        let removed = self.profiles.remove(id).is_some() | self.sessions.remove(id).is_some();
        if removed {
            self.version += 1;
        }
        removed
    }

    pub fn entry(&self, id: &Uuid) -> Option<EntryRef> {
        if let Some(profile) = self.profiles.get(id) {
            return Some(EntryRef::Profile(Arc::clone(profile)));
        }
        self.sessions
            .get(id)
            .map(|session| EntryRef::Session(Arc::clone(session)))
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            profiles: self.profiles.clone(),
            sessions: self.sessions.clone(),
            version: self.version,
        }
    }

    /// Put `ids` back to exactly what `snapshot` held for them.
    pub fn restore_entities(&mut self, snapshot: &StoreSnapshot, ids: &[Uuid]) {
        for id in ids {
            self.profiles.remove(id);
            self.sessions.remove(id);
            if let Some(profile) = snapshot.profiles.get(id) {
                self.profiles.insert(*id, Arc::clone(profile));
            }
            if let Some(session) = snapshot.sessions.get(id) {
                self.sessions.insert(*id, Arc::clone(session));
            }
        }
        self.version += 1;
    }
}

/// Entity kinds the cache can look up and store generically.
pub trait CachedEntity: Sized {
    fn cache_id(&self) -> Uuid;

    fn lookup(maps: &StoreMaps, id: &Uuid) -> Option<Arc<Self>>;

    fn store(maps: &mut StoreMaps, value: Self);
}

impl CachedEntity for Profile {
    fn cache_id(&self) -> Uuid {
        self.id
    }

    fn lookup(maps: &StoreMaps, id: &Uuid) -> Option<Arc<Self>> {
        maps.profile(id).cloned()
    }

    fn store(maps: &mut StoreMaps, value: Self) {
        maps.put_profile(value);
    }
}

impl CachedEntity for Session {
    fn cache_id(&self) -> Uuid {
        self.id
    }

    fn lookup(maps: &StoreMaps, id: &Uuid) -> Option<Arc<Self>> {
        maps.session(id).cloned()
    }

    fn store(maps: &mut StoreMaps, value: Self) {
        maps.put_session(value);
    }
}

/// Thread-safe entity cache
#[derive(Debug, Default)]
pub struct EntityStore {
    inner: RwLock<StoreMaps>,
}

impl EntityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with shared access to the maps.
    pub fn read_with<R>(&self, f: impl FnOnce(&StoreMaps) -> R) -> R {
        // Every critical section leaves the maps consistent, so a poisoned
        // lock still guards valid data.
        let maps = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&maps)
    }

    /// Run `f` with exclusive access to the maps.
    pub fn write_with<R>(&self, f: impl FnOnce(&mut StoreMaps) -> R) -> R {
        let mut maps = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut maps)
    }

    pub fn get_profile(&self, id: Uuid) -> Option<Arc<Profile>> {
        self.read_with(|maps| maps.profile(&id).cloned())
    }

    pub fn get_session(&self, id: Uuid) -> Option<Arc<Session>> {
        self.read_with(|maps| maps.session(&id).cloned())
    }

    /// All profiles, deleted ones included, sorted by name
    pub fn all_profiles(&self) -> Vec<Arc<Profile>> {
        let mut profiles: Vec<_> = self.read_with(|maps| maps.profiles().cloned().collect());
        profiles.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        profiles
    }

    /// All sessions, deleted ones included, newest arrival first
    pub fn all_sessions(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<_> = self.read_with(|maps| maps.sessions().cloned().collect());
        sessions.sort_by(|a, b| b.arrived_at.cmp(&a.arrived_at).then(a.id.cmp(&b.id)));
        sessions
    }

    /// Every open, non-deleted session joined with its live profile.
    ///
    /// Sessions whose profile is missing or deleted are left out; integrity
    /// validation reports them.
    pub fn current_sessions_with_profiles(&self) -> Vec<CompositeView> {
        let mut views: Vec<CompositeView> = self.read_with(|maps| {
            maps.sessions()
                .filter(|session| session.is_active())
                .filter_map(|session| {
                    let profile = maps.profile(&session.profile_id)?;
                    (!profile.is_deleted).then(|| CompositeView {
                        session: Arc::clone(session),
                        profile: Arc::clone(profile),
                    })
                })
                .collect()
        });
        views.sort_by(|a, b| {
            a.session
                .arrived_at
                .cmp(&b.session.arrived_at)
                .then(a.session.id.cmp(&b.session.id))
        });
        views
    }

    /// Insert or replace a profile or session
    pub fn put(&self, record: impl Into<Record>) {
        let record = record.into();
        self.write_with(|maps| {
            maps.put(record);
        });
    }

    /// Remove an entity of either kind
    pub fn delete(&self, id: Uuid) -> bool {
        self.write_with(|maps| maps.remove(&id))
    }

    /// Monotonic mutation counter
    pub fn version(&self) -> u64 {
        self.read_with(|maps| maps.version())
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.read_with(|maps| maps.snapshot())
    }
}
