//! # Sync Scheduler
//!
//! Drives reconciliation of the cache with the remote store, periodically
//! and on demand.
//!
//! ## Features
//!
//! - **Single Flight**: a pass starts only if none is running; concurrent
//!   requests are dropped, not queued
//! - **Rate Limiting**: non-forced passes closer than the minimum interval
//!   are skipped
//! - **Incremental Fetch**: only entities modified after the checkpoint are
//!   fetched; the checkpoint advances only on success
//! - **Pending Precedence**: entities with an in-flight local write are never
//!   touched by a pass
//! - **Lifecycle Aware**: the periodic timer runs in the foreground only
//!
//! ## Pass
//!
//! 1. Fetch profiles and sessions modified after the checkpoint (all of them
//!    on the first pass)
//! 2. In one cache critical section, for every fetched entity: skip it if a
//!    local write is pending, insert it if unknown, keep the local copy if
//!    identical, otherwise resolve and store the merged copy
//! 3. Advance the checkpoint to the time the fetch started, unless an entity
//!    was skipped for a pending write
//!
//! The cache is patched, never replaced: local entities absent from the
//! fetch are left alone.

use chrono::{DateTime, Utc};
use futures_util::future;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use super::conflict_resolver::{Conflict, ConflictResolver, Resolvable};
use super::metrics::SyncMetrics;
use super::sync_state::SyncStatus;
use crate::cache::{CachedEntity, EntityStore, StoreMaps};
use crate::offline::TransactionCoordinator;
use crate::remote::RemoteError;
use crate::shared::config::SyncConfig;
use crate::shared::error::SyncError;
use crate::shared::model::{ActorRole, EntityKind, Profile, Session};

/// Why a pass was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// User asked for a refresh
    Manual,
    /// Periodic foreground timer
    Periodic,
    /// Return to the foreground
    Lifecycle,
    /// First load; ignores the checkpoint
    InitialLoad,
}

impl SyncTrigger {
    /// Forced passes ignore the minimum interval.
    pub fn is_forced(&self) -> bool {
        !matches!(self, SyncTrigger::Periodic)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadySyncing,
    TooSoon,
}

/// Conflicts reported for one entity during a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConflicts {
    pub entity_id: Uuid,
    pub entity: EntityKind,
    pub conflicts: Vec<Conflict>,
    pub user_message: Option<String>,
}

/// What one pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Entities left alone because a local write was pending
    pub skipped_pending: Vec<Uuid>,
    pub conflicts: Vec<EntityConflicts>,
}

impl SyncReport {
    pub fn fetched(&self) -> usize {
        self.inserted + self.updated + self.unchanged + self.skipped_pending.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    Skipped(SkipReason),
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            SyncOutcome::Skipped(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    checkpoint: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
    last_attempt_at: Option<Instant>,
    last_error: Option<String>,
    metrics: SyncMetrics,
}

/// Clears the syncing flag when a pass ends, however it ends.
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Synchronization scheduler
pub struct SyncScheduler {
    store: Arc<EntityStore>,
    coordinator: Arc<TransactionCoordinator>,
    resolver: ConflictResolver,
    config: SyncConfig,
    is_syncing: AtomicBool,
    state: Mutex<SchedulerState>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("is_syncing", &self.is_syncing.load(Ordering::Relaxed))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SyncScheduler {
    /// Create a new sync scheduler
    pub fn new(coordinator: Arc<TransactionCoordinator>, config: SyncConfig) -> Self {
        Self {
            store: Arc::clone(coordinator.store()),
            coordinator,
            resolver: ConflictResolver::new(&config),
            config,
            is_syncing: AtomicBool::new(false),
            state: Mutex::new(SchedulerState::default()),
            timer: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Checkpoint the next pass will fetch from
    pub fn checkpoint(&self) -> Option<DateTime<Utc>> {
        self.state().checkpoint
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.state().last_success
    }

    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::Acquire)
    }

    pub fn status(&self) -> SyncStatus {
        let periodic_running = self.is_periodic_running();
        let state = self.state();
        SyncStatus {
            syncing: self.is_syncing(),
            last_sync: state.last_success,
            checkpoint: state.checkpoint,
            last_attempt: state.last_attempt,
            last_error: state.last_error.clone(),
            pending_operations: self.coordinator.pending_count(),
            periodic_running,
            metrics: state.metrics.snapshot(),
        }
    }

    /// Forced pass requested by the user.
    pub async fn trigger_manual_sync(&self) -> Result<SyncOutcome, SyncError> {
        self.sync(SyncTrigger::Manual).await
    }

    /// Full fetch ignoring the checkpoint, then start the periodic timer.
    ///
    /// The timer is started even if the fetch fails, so the next tick retries.
    pub async fn initial_load(self: &Arc<Self>) -> Result<SyncOutcome, SyncError> {
        let result = self.sync(SyncTrigger::InitialLoad).await;
        self.start_periodic();
        result
    }

    /// Run one pass unless another is running or, for non-forced triggers,
    /// the last one started less than the minimum interval ago.
    pub async fn sync(&self, trigger: SyncTrigger) -> Result<SyncOutcome, SyncError> {
        if self
            .is_syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(?trigger, "[SYNC] Pass already running; request dropped");
            self.state().metrics.record_skipped();
            return Ok(SyncOutcome::Skipped(SkipReason::AlreadySyncing));
        }
        let _guard = SyncingGuard(&self.is_syncing);

        let fetch_from = {
            let mut state = self.state();
            let too_soon = state
                .last_attempt_at
                .is_some_and(|at| at.elapsed() < self.config.min_sync_interval);
            if too_soon && !trigger.is_forced() {
                state.metrics.record_skipped();
                return Ok(SyncOutcome::Skipped(SkipReason::TooSoon));
            }
            state.last_attempt_at = Some(Instant::now());
            state.last_attempt = Some(Utc::now());
            state.metrics.record_sync_start();
            match trigger {
                SyncTrigger::InitialLoad => None,
                _ => state.checkpoint,
            }
        };

        let started = Utc::now();
        tracing::debug!(?trigger, checkpoint = ?fetch_from, "[SYNC] Pass started");

        let fetched = self.fetch(fetch_from).await;
        let (profiles, sessions) = match fetched {
            Ok(fetched) => fetched,
            Err(cause) => {
                tracing::error!(?trigger, error = %cause, "[SYNC] Fetch failed; checkpoint unchanged");
                let mut state = self.state();
                state.metrics.record_sync_failure();
                state.last_error = Some(cause.to_string());
                return Err(SyncError::remote(cause));
            }
        };

        let report = self.merge_fetched(profiles, sessions);

        let success_rate = {
            let mut state = self.state();
            if report.skipped_pending.is_empty() {
                state.checkpoint = Some(started);
            } else {
                tracing::debug!(
                    skipped = report.skipped_pending.len(),
                    "[SYNC] Holding checkpoint until pending writes resolve"
                );
            }
            state.last_success = Some(Utc::now());
            state.last_error = None;
            let conflicts = report.conflicts.iter().map(|c| c.conflicts.len()).sum();
            state.metrics.record_sync_success(conflicts, report.skipped_pending.len());
            state.metrics.success_rate()
        };

        tracing::info!(
            ?trigger,
            success_rate,
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped_pending.len(),
            conflicts = report.conflicts.len(),
            "[SYNC] Pass completed"
        );
        Ok(SyncOutcome::Completed(report))
    }

    async fn fetch(
        &self,
        modified_after: Option<DateTime<Utc>>,
    ) -> Result<(Vec<Profile>, Vec<Session>), RemoteError> {
        let remote = self.coordinator.remote();
        future::try_join(
            remote.fetch_profiles(modified_after),
            remote.fetch_sessions(modified_after),
        )
        .await
    }

    /// Patch the cache with fetched entities in one critical section.
    fn merge_fetched(&self, profiles: Vec<Profile>, sessions: Vec<Session>) -> SyncReport {
        self.store.write_with(|maps| {
            // Read under the cache lock so no transaction can begin or end
            // between this check and the writes below.
            let pending = self.coordinator.pending().entity_ids();
            let mut report = SyncReport::default();
            for profile in profiles {
                self.merge_one(maps, &pending, profile, &mut report);
            }
            for session in sessions {
                self.merge_one(maps, &pending, session, &mut report);
            }
            report
        })
    }

    fn merge_one<T>(&self, maps: &mut StoreMaps, pending: &HashSet<Uuid>, remote: T, report: &mut SyncReport)
    where
        T: CachedEntity + Resolvable + PartialEq,
    {
        let id = remote.cache_id();
        if pending.contains(&id) {
            tracing::trace!(entity_id = %id, "[SYNC] Skipping entity with pending write");
            report.skipped_pending.push(id);
            return;
        }

        let Some(local) = T::lookup(maps, &id) else {
            T::store(maps, remote);
            report.inserted += 1;
            return;
        };
        if *local == remote {
            report.unchanged += 1;
            return;
        }

        // An unattributed version on either side counts as staff.
        let local_role = local.last_writer_role().unwrap_or(ActorRole::Staff);
        let remote_role = remote.last_writer_role().unwrap_or(ActorRole::Staff);
        let resolution = self.resolver.resolve(&*local, &remote, local_role, remote_role);
        let merged = resolution.merge(&*local, &remote);

        if !resolution.conflicts.is_empty() {
            tracing::warn!(
                entity_id = %id,
                conflicts = resolution.conflicts.len(),
                "[SYNC] {}",
                resolution.user_message.as_deref().unwrap_or("conflict")
            );
            report.conflicts.push(EntityConflicts {
                entity_id: id,
                entity: T::KIND,
                conflicts: resolution.conflicts.clone(),
                user_message: resolution.user_message.clone(),
            });
        }

        if merged == *local {
            report.unchanged += 1;
        } else {
            T::store(maps, merged);
            report.updated += 1;
        }
    }

    /// Start the periodic timer; a no-op if it is already running.
    pub fn start_periodic(self: &Arc<Self>) {
        let mut timer = self.timer();
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let scheduler = Arc::downgrade(self);
        let period = self.config.sync_interval;
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(scheduler) = scheduler.upgrade() else {
                    break;
                };
                // Failures are recorded in the status; the next tick retries.
                let _ = scheduler.sync(SyncTrigger::Periodic).await;
            }
        }));
        tracing::info!(interval = ?period, "[SYNC] Periodic sync started");
    }

    pub fn stop_periodic(&self) {
        if let Some(handle) = self.timer().take() {
            handle.abort();
            tracing::info!("[SYNC] Periodic sync stopped");
        }
    }

    pub fn is_periodic_running(&self) -> bool {
        self.timer().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// App returned to the foreground: restart the timer and sync now.
    pub async fn on_foreground(self: &Arc<Self>) -> Result<SyncOutcome, SyncError> {
        self.start_periodic();
        self.sync(SyncTrigger::Lifecycle).await
    }

    /// App entered the background: stop the timer.
    pub fn on_background(&self) {
        self.stop_periodic();
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop_periodic();
    }
}
