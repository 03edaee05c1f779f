//! # Integrity Validation
//!
//! Diagnostic checks over the live cache. Nothing here mutates state;
//! problems are reported for operator visibility and never fatal.
//!
//! ## Checks
//!
//! - **Errors**: orphaned sessions, more than one open session per profile,
//!   sessions ending before they start, and (against the remote) entities
//!   present on only one side
//! - **Warnings**: pending operations stuck longer than the threshold, a
//!   stale or missing last sync, and (against the remote) count mismatches
//!
//! Entities covered by a pending operation are expected to differ from the
//! remote transiently and are left out of the remote comparison.

use chrono::{DateTime, Utc};
use futures_util::future;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::pending::PendingIndex;
use crate::cache::EntityStore;
use crate::remote::RemoteStore;
use crate::shared::config::SyncConfig;
use crate::shared::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    StalePendingOperation,
    OrphanedSession,
    MultipleOpenSessions,
    EndBeforeStart,
    StaleSync,
    CountMismatch,
    MissingRemotely,
    MissingLocally,
}

/// One finding of a validation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub kind: IssueKind,
    /// Entity concerned, when the issue is about one entity
    pub entity_id: Option<Uuid>,
    pub message: String,
}

impl IntegrityIssue {
    fn new(kind: IssueKind, entity_id: Option<Uuid>, message: impl Into<String>) -> Self {
        Self {
            kind,
            entity_id,
            message: message.into(),
        }
    }
}

/// Result of a validation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub errors: Vec<IntegrityIssue>,
    pub warnings: Vec<IntegrityIssue>,
    pub checked_at: DateTime<Utc>,
}

impl IntegrityReport {
    fn new(checked_at: DateTime<Utc>) -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            checked_at,
        }
    }

    /// No errors; warnings are allowed.
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_issue(&self, kind: IssueKind) -> bool {
        self.errors.iter().chain(&self.warnings).any(|issue| issue.kind == kind)
    }

    /// `DataInconsistency` listing every error, if there are any.
    pub fn into_result(self) -> Result<Self, SyncError> {
        if self.is_healthy() {
            return Ok(self);
        }
        let detail = self
            .errors
            .iter()
            .map(|issue| issue.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Err(SyncError::inconsistency(detail))
    }
}

/// Runs integrity checks with the configured thresholds
#[derive(Debug, Clone)]
pub struct IntegrityValidator {
    stale_pending: chrono::Duration,
    stale_sync: chrono::Duration,
}

impl Default for IntegrityValidator {
    fn default() -> Self {
        Self::new(&SyncConfig::default())
    }
}

fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

impl IntegrityValidator {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            stale_pending: to_chrono(config.stale_pending_threshold),
            stale_sync: to_chrono(config.stale_sync_threshold),
        }
    }

    /// Check the live cache.
    pub fn validate(
        &self,
        store: &EntityStore,
        pending: &PendingIndex,
        last_sync: Option<DateTime<Utc>>,
    ) -> IntegrityReport {
        let now = Utc::now();
        let mut report = IntegrityReport::new(now);

        for operation in pending.stale(self.stale_pending, now) {
            report.warnings.push(IntegrityIssue::new(
                IssueKind::StalePendingOperation,
                operation.entity_ids.first().copied(),
                format!(
                    "{} operation {} pending for {}s",
                    operation.kind,
                    operation.id,
                    (now - operation.started_at).num_seconds()
                ),
            ));
        }

        store.read_with(|maps| {
            let mut open_per_profile: HashMap<Uuid, usize> = HashMap::new();

            for session in maps.sessions().filter(|s| !s.is_deleted) {
                let profile_live = maps
                    .profile(&session.profile_id)
                    .is_some_and(|profile| !profile.is_deleted);
                if !profile_live {
                    report.errors.push(IntegrityIssue::new(
                        IssueKind::OrphanedSession,
                        Some(session.id),
                        format!(
                            "session {} references missing profile {}",
                            session.id, session.profile_id
                        ),
                    ));
                }
                if !session.has_valid_times() {
                    report.errors.push(IntegrityIssue::new(
                        IssueKind::EndBeforeStart,
                        Some(session.id),
                        format!("session {} ends before it starts", session.id),
                    ));
                }
                if session.is_open() {
                    *open_per_profile.entry(session.profile_id).or_default() += 1;
                }
            }

            let mut crowded: Vec<_> = open_per_profile.into_iter().filter(|(_, open)| *open > 1).collect();
            crowded.sort();
            for (profile_id, open) in crowded {
                report.errors.push(IntegrityIssue::new(
                    IssueKind::MultipleOpenSessions,
                    Some(profile_id),
                    format!("profile {} has {} open sessions", profile_id, open),
                ));
            }
        });

        match last_sync {
            Some(at) if now - at > self.stale_sync => report.warnings.push(IntegrityIssue::new(
                IssueKind::StaleSync,
                None,
                format!("last successful sync was {}s ago", (now - at).num_seconds()),
            )),
            Some(_) => {}
            None => report.warnings.push(IntegrityIssue::new(
                IssueKind::StaleSync,
                None,
                "no successful sync yet",
            )),
        }

        for issue in &report.errors {
            tracing::warn!(kind = ?issue.kind, "[INTEGRITY] {}", issue.message);
        }
        report
    }

    /// Check the live cache and compare it against a fresh remote fetch.
    pub async fn validate_against_remote(
        &self,
        store: &EntityStore,
        pending: &PendingIndex,
        remote: &dyn RemoteStore,
        last_sync: Option<DateTime<Utc>>,
    ) -> Result<IntegrityReport, SyncError> {
        let (remote_profiles, remote_sessions) =
            future::try_join(remote.fetch_profiles(None), remote.fetch_sessions(None))
                .await
                .map_err(SyncError::remote)?;

        let mut report = self.validate(store, pending, last_sync);

        // Cache contents and pending ids are read in one critical section.
        let (local_profiles, local_sessions, skip) = store.read_with(|maps| {
            (
                maps.profiles().map(|p| p.id).collect::<HashSet<_>>(),
                maps.sessions().map(|s| s.id).collect::<HashSet<_>>(),
                pending.entity_ids(),
            )
        });

        let remote_profiles: HashSet<Uuid> = remote_profiles.iter().map(|p| p.id).collect();
        let remote_sessions: HashSet<Uuid> = remote_sessions.iter().map(|s| s.id).collect();

        compare("profile", &local_profiles, &remote_profiles, &skip, &mut report);
        compare("session", &local_sessions, &remote_sessions, &skip, &mut report);

        Ok(report)
    }
}

fn compare(
    label: &str,
    local: &HashSet<Uuid>,
    remote: &HashSet<Uuid>,
    skip: &HashSet<Uuid>,
    report: &mut IntegrityReport,
) {
    let local: HashSet<Uuid> = local.difference(skip).copied().collect();
    let remote: HashSet<Uuid> = remote.difference(skip).copied().collect();

    if local.len() != remote.len() {
        report.warnings.push(IntegrityIssue::new(
            IssueKind::CountMismatch,
            None,
            format!("{} count differs: {} local, {} remote", label, local.len(), remote.len()),
        ));
    }

    let mut missing_remotely: Vec<_> = local.difference(&remote).copied().collect();
    missing_remotely.sort();
    for id in missing_remotely {
        report.errors.push(IntegrityIssue::new(
            IssueKind::MissingRemotely,
            Some(id),
            format!("{} {} exists locally but not remotely", label, id),
        ));
    }

    let mut missing_locally: Vec<_> = remote.difference(&local).copied().collect();
    missing_locally.sort();
    for id in missing_locally {
        report.errors.push(IntegrityIssue::new(
            IssueKind::MissingLocally,
            Some(id),
            format!("{} {} exists remotely but not locally", label, id),
        ));
    }
}
