//! # Synchronization
//!
//! Reconciles the local cache with the authoritative remote store and
//! exposes the whole core to callers through [`SyncEngine`].
//!
//! ## Architecture
//!
//! - **Scheduler**: single-flight, rate-limited sync passes driven by a
//!   foreground timer, lifecycle events and manual refreshes
//! - **Conflict Resolver**: pure decisions over a local and a remote version
//!   of one entity
//! - **Field Updates**: one variant per mergeable scalar field, each applying
//!   itself
//! - **Record Merge**: loss-free union of append-only activity logs
//! - **Sync State** and **Metrics**: what callers see of the scheduler
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kennelsync::remote::InMemoryRemoteStore;
//! use kennelsync::shared::config::SyncConfig;
//! use kennelsync::sync::SyncEngine;
//!
//! # async fn run() -> Result<(), kennelsync::shared::error::SyncError> {
//! let engine = SyncEngine::new(Arc::new(InMemoryRemoteStore::new()), SyncConfig::default());
//!
//! // Full fetch, then the periodic timer takes over
//! engine.initial_load().await?;
//!
//! for view in engine.current_sessions_with_profiles() {
//!     println!("{} is checked in", view.profile.name);
//! }
//!
//! engine.trigger_manual_sync().await?;
//! println!("{:?}", engine.get_sync_status());
//! # Ok(())
//! # }
//! ```

pub mod conflict_resolver;
pub mod field_update;
pub mod metrics;
pub mod record_merge;
pub mod scheduler;
pub mod sync_state;

pub use conflict_resolver::{
    Conflict, ConflictKind, ConflictResolver, Resolution, ResolutionStrategy, Resolvable, Severity,
};
pub use field_update::{Field, FieldUpdate, PrecedenceTable};
pub use metrics::{MetricsSnapshot, SyncMetrics};
pub use record_merge::RecordMerge;
pub use scheduler::{SkipReason, SyncOutcome, SyncReport, SyncScheduler, SyncTrigger};
pub use sync_state::{SyncPhase, SyncStatus};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::{CompositeView, EntityStore};
use crate::offline::{IntegrityReport, IntegrityValidator, PendingSummary, TransactionCoordinator};
use crate::remote::{ActiveWindow, RemoteStore};
use crate::shared::config::SyncConfig;
use crate::shared::error::SyncError;
use crate::shared::model::{ActivityEntry, Actor, Profile, Session};

/// Caller-facing entry point of the sync core
///
/// Reads go straight to the cache and never wait on the network. Writes go
/// through the transaction coordinator and resolve once the remote store
/// has confirmed or rejected them.
#[derive(Debug)]
pub struct SyncEngine {
    store: Arc<EntityStore>,
    coordinator: Arc<TransactionCoordinator>,
    scheduler: Arc<SyncScheduler>,
    validator: IntegrityValidator,
    config: SyncConfig,
}

impl SyncEngine {
    /// Wire up a fresh cache, coordinator and scheduler around `remote`.
    pub fn new(remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        let store = Arc::new(EntityStore::new());
        let actor = Actor::new(config.actor_id.clone(), config.local_role);
        let coordinator = Arc::new(TransactionCoordinator::new(Arc::clone(&store), remote, actor));
        let scheduler = Arc::new(SyncScheduler::new(Arc::clone(&coordinator), config.clone()));

        tracing::info!(
            actor = %config.actor_id,
            role = %config.local_role,
            interval = ?config.sync_interval,
            "[SYNC] Engine initialized"
        );

        Self {
            store,
            coordinator,
            scheduler,
            validator: IntegrityValidator::new(&config),
            config,
        }
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<TransactionCoordinator> {
        &self.coordinator
    }

    pub fn scheduler(&self) -> &Arc<SyncScheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // Reads

    pub fn get_profile(&self, id: Uuid) -> Option<Arc<Profile>> {
        self.store.get_profile(id)
    }

    pub fn get_session(&self, id: Uuid) -> Option<Arc<Session>> {
        self.store.get_session(id)
    }

    pub fn all_profiles(&self) -> Vec<Arc<Profile>> {
        self.store.all_profiles()
    }

    pub fn all_sessions(&self) -> Vec<Arc<Session>> {
        self.store.all_sessions()
    }

    /// Every open, non-deleted session joined with its profile.
    pub fn current_sessions_with_profiles(&self) -> Vec<CompositeView> {
        self.store.current_sessions_with_profiles()
    }

    // Writes

    pub async fn add_profile_with_session(&self, profile: Profile, session: Session) -> Result<(), SyncError> {
        self.coordinator.add_profile_with_session(profile, session).await
    }

    pub async fn add_session_for_profile(&self, session: Session) -> Result<(), SyncError> {
        self.coordinator.add_session_for_profile(session).await
    }

    pub async fn update_profile(&self, profile: Profile) -> Result<(), SyncError> {
        self.coordinator.update_profile(profile).await
    }

    pub async fn update_session(&self, session: Session) -> Result<(), SyncError> {
        self.coordinator.update_session(session).await
    }

    pub async fn delete_session(&self, session_id: Uuid) -> Result<(), SyncError> {
        self.coordinator.delete_session(session_id).await
    }

    pub async fn check_out_session(&self, session_id: Uuid, departed_at: DateTime<Utc>) -> Result<(), SyncError> {
        self.coordinator.check_out_session(session_id, departed_at).await
    }

    pub async fn append_activity(&self, session_id: Uuid, entry: ActivityEntry) -> Result<(), SyncError> {
        self.coordinator.append_activity(session_id, entry).await
    }

    pub async fn purge_session(&self, session_id: Uuid) -> Result<(), SyncError> {
        self.coordinator.purge_session(session_id).await
    }

    /// Open, recently closed and upcoming sessions straight from the
    /// remote, using the configured recently-closed window. The cache is
    /// not touched.
    pub async fn fetch_active_sessions(&self) -> Result<Vec<Session>, SyncError> {
        let window = ActiveWindow::from_config(Utc::now(), &self.config);
        self.coordinator
            .remote()
            .fetch_active_sessions(window)
            .await
            .map_err(SyncError::remote)
    }

    pub fn pending_operations(&self) -> Vec<PendingSummary> {
        self.coordinator.pending_operations()
    }

    // Sync

    /// Full fetch, then start the periodic timer.
    pub async fn initial_load(&self) -> Result<SyncOutcome, SyncError> {
        self.scheduler.initial_load().await
    }

    pub async fn trigger_manual_sync(&self) -> Result<SyncOutcome, SyncError> {
        self.scheduler.trigger_manual_sync().await
    }

    pub fn get_sync_status(&self) -> SyncStatus {
        self.scheduler.status()
    }

    pub async fn on_foreground(&self) -> Result<SyncOutcome, SyncError> {
        self.scheduler.on_foreground().await
    }

    pub fn on_background(&self) {
        self.scheduler.on_background();
    }

    /// Stop background work. In-flight writes still complete.
    pub fn shutdown(&self) {
        self.scheduler.stop_periodic();
        tracing::info!(pending = self.coordinator.pending_count(), "[SYNC] Engine shut down");
    }

    // Diagnostics

    pub fn validate_integrity(&self) -> IntegrityReport {
        self.validator
            .validate(&self.store, self.coordinator.pending(), self.scheduler.last_sync())
    }

    pub async fn validate_against_remote(&self) -> Result<IntegrityReport, SyncError> {
        self.validator
            .validate_against_remote(
                &self.store,
                self.coordinator.pending(),
                self.coordinator.remote().as_ref(),
                self.scheduler.last_sync(),
            )
            .await
    }
}
