//! # Conflict Resolution System
//!
//! Decides, field by field, how a local and a remote version of the same
//! entity are combined. The resolver holds configuration only; `resolve` is a
//! pure function of its inputs.
//!
//! ## Rules
//!
//! 1. **No longer active**: the remote session has ended while the local copy
//!    still shows it open. Remote wins outright.
//! 2. **Deleted while updating**: the remote copy is soft-deleted and the
//!    local one is not. Remote wins outright.
//! 3. **Scalar fields**: a higher-privileged role always wins. Between equal
//!    roles the field precedence picks the strategy: manual adjudication at
//!    or above the ask-user threshold, last writer (remote) at or above the
//!    last-writer-wins threshold, merge below it.
//! 4. **Activity logs**: local-only records are always carried over, minus
//!    near-duplicates. This also holds after rules 1 and 2.
//! 5. **Extended stay**: the later end date wins.
//!
//! ## Usage
//!
//! ```rust
//! use kennelsync::shared::model::{ActorRole, Profile};
//! use kennelsync::sync::conflict_resolver::ConflictResolver;
//!
//! let resolver = ConflictResolver::default();
//! let local = Profile::new("Rex", "Jordan");
//! let mut remote = local.clone();
//! remote.owner_phone = Some("555-0101".to_string());
//!
//! let resolution = resolver.resolve(&local, &remote, ActorRole::Owner, ActorRole::Staff);
//! let merged = resolution.apply_to(&remote);
//! assert_eq!(merged.owner_phone, None);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::field_update::{Field, FieldUpdate, PrecedenceTable};
use super::record_merge::{session_merges, RecordMerge};
use crate::shared::config::SyncConfig;
use crate::shared::model::{Actor, ActorRole, DuplicateWindows, EntityKind, Profile, Session};

/// How one field (or the whole entity) was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Local value kept; the local writer outranks the remote one
    KeepLocal,
    /// Remote value taken; the remote writer outranks the local one
    TakeRemote,
    /// Equal roles, operational field: remote is authoritative once synced
    LastWriterWins,
    /// Equal roles, high-precedence field: remote kept, a person must review
    AskUser,
    /// Both values combined
    Merge,
    /// Extended stay reaching furthest wins
    LaterDateWins,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionStrategy::KeepLocal => "keep_local",
            ResolutionStrategy::TakeRemote => "take_remote",
            ResolutionStrategy::LastWriterWins => "last_writer_wins",
            ResolutionStrategy::AskUser => "ask_user",
            ResolutionStrategy::Merge => "merge",
            ResolutionStrategy::LaterDateWins => "later_date_wins",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Session ended remotely while open locally
    NoLongerActive,
    /// Entity deleted remotely while edited locally
    DeletedWhileUpdating,
    /// Equal-role edits of a field that needs manual review
    NeedsReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
}

/// A disagreement worth telling a person about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub severity: Severity,
    /// Field concerned, if the conflict is about one field
    pub field: Option<Field>,
    pub description: String,
    pub local_value: Option<String>,
    pub remote_value: Option<String>,
}

/// Strategy chosen for one differing field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecision {
    pub field: Field,
    pub strategy: ResolutionStrategy,
}

/// One field whose local and remote values differ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    pub field: Field,
    pub local: FieldUpdate,
    pub remote: FieldUpdate,
}

/// An entity kind the resolver can reconcile.
pub trait Resolvable: Clone {
    const KIND: EntityKind;

    fn entity_id(&self) -> Uuid;

    fn is_soft_deleted(&self) -> bool;

    /// Who wrote this version, if known.
    fn last_writer(&self) -> Option<&Actor>;

    fn set_last_writer(&mut self, writer: Option<Actor>);

    /// Server change tag of this version.
    fn revision(&self) -> u64;

    /// Whether fields hold local values the remote has not seen.
    fn needs_sync(&self) -> bool;

    fn set_needs_sync(&mut self, needs_sync: bool);

    fn last_writer_role(&self) -> Option<ActorRole> {
        self.last_writer().map(|actor| actor.role)
    }

    /// `Some(open)` for entities that can be open or closed.
    fn open_state(&self) -> Option<bool> {
        None
    }

    /// Scalar fields whose values differ between the two versions.
    fn field_diffs(local: &Self, remote: &Self) -> Vec<FieldDiff>;

    /// Append-only records `local` holds that `remote` lacks.
    fn record_merges(_local: &Self, _remote: &Self, _windows: &DuplicateWindows) -> Vec<RecordMerge> {
        Vec::new()
    }

    fn apply_field_update(&mut self, update: &FieldUpdate);

    fn apply_record_merge(&mut self, _merge: &RecordMerge) {}
}

fn diff_fields(local: Vec<FieldUpdate>, remote: Vec<FieldUpdate>) -> Vec<FieldDiff> {
    local
        .into_iter()
        .zip(remote)
        .filter(|(l, r)| l != r)
        .map(|(local, remote)| FieldDiff {
            field: local.field(),
            local,
            remote,
        })
        .collect()
}

impl Resolvable for Profile {
    const KIND: EntityKind = EntityKind::Profile;

    fn entity_id(&self) -> Uuid {
        self.id
    }

    fn is_soft_deleted(&self) -> bool {
        self.is_deleted
    }

    fn last_writer(&self) -> Option<&Actor> {
        self.last_modified_by.as_ref()
    }

    fn set_last_writer(&mut self, writer: Option<Actor>) {
        self.last_modified_by = writer;
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn needs_sync(&self) -> bool {
        self.needs_sync
    }

    fn set_needs_sync(&mut self, needs_sync: bool) {
        self.needs_sync = needs_sync;
    }

    fn field_diffs(local: &Self, remote: &Self) -> Vec<FieldDiff> {
        diff_fields(FieldUpdate::profile_fields(local), FieldUpdate::profile_fields(remote))
    }

    fn apply_field_update(&mut self, update: &FieldUpdate) {
        if !update.apply_to_profile(self) {
            tracing::debug!(field = %update.field(), "[RESOLVER] Ignoring session field on profile");
        }
    }
}

impl Resolvable for Session {
    const KIND: EntityKind = EntityKind::Session;

    fn entity_id(&self) -> Uuid {
        self.id
    }

    fn is_soft_deleted(&self) -> bool {
        self.is_deleted
    }

    fn last_writer(&self) -> Option<&Actor> {
        self.last_modified_by.as_ref()
    }

    fn set_last_writer(&mut self, writer: Option<Actor>) {
        self.last_modified_by = writer;
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn needs_sync(&self) -> bool {
        self.needs_sync
    }

    fn set_needs_sync(&mut self, needs_sync: bool) {
        self.needs_sync = needs_sync;
    }

    fn open_state(&self) -> Option<bool> {
        Some(self.is_open())
    }

    fn field_diffs(local: &Self, remote: &Self) -> Vec<FieldDiff> {
        diff_fields(FieldUpdate::session_fields(local), FieldUpdate::session_fields(remote))
    }

    fn record_merges(local: &Self, remote: &Self, windows: &DuplicateWindows) -> Vec<RecordMerge> {
        session_merges(local, remote, windows)
    }

    fn apply_field_update(&mut self, update: &FieldUpdate) {
        if !update.apply_to_session(self) {
            tracing::debug!(field = %update.field(), "[RESOLVER] Ignoring profile field on session");
        }
    }

    fn apply_record_merge(&mut self, merge: &RecordMerge) {
        tracing::debug!(
            session_id = %self.id,
            count = merge.len(),
            "[RESOLVER] Carrying local {} records",
            merge.log_name()
        );
        merge.apply_to(self);
    }
}

/// Outcome of reconciling one entity
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub entity_id: Uuid,
    pub conflicts: Vec<Conflict>,
    /// Values to write over the remote copy
    pub field_updates: Vec<FieldUpdate>,
    /// Local-only records to add to the remote copy
    pub record_merges: Vec<RecordMerge>,
    /// Strategy chosen for every differing field
    pub decisions: Vec<FieldDecision>,
    pub user_message: Option<String>,
}

impl Resolution {
    /// The merged entity: `remote` patched with the field updates and
    /// record merges.
    pub fn apply_to<T: Resolvable>(&self, remote: &T) -> T {
        let mut merged = remote.clone();
        for update in &self.field_updates {
            merged.apply_field_update(update);
        }
        for merge in &self.record_merges {
            merged.apply_record_merge(merge);
        }
        merged
    }

    /// The merged entity, attributed to the local writer when any local
    /// value survived so that resolving it again gives the same result.
    ///
    /// Surviving local field values are flagged as needing sync. Carried
    /// records are not, since every pass carries them again.
    pub fn merge<T: Resolvable>(&self, local: &T, remote: &T) -> T {
        let mut merged = self.apply_to(remote);
        let kept_local = !self.field_updates.is_empty();
        if kept_local {
            merged.set_last_writer(local.last_writer().cloned());
        }
        merged.set_needs_sync(kept_local);
        merged
    }

    pub fn strategy_for(&self, field: Field) -> Option<ResolutionStrategy> {
        self.decisions
            .iter()
            .find(|decision| decision.field == field)
            .map(|decision| decision.strategy)
    }

    /// Whether a person needs to look at this entity.
    pub fn requires_user(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Whether applying the resolution leaves the remote copy untouched.
    pub fn takes_remote_as_is(&self) -> bool {
        self.field_updates.is_empty() && self.record_merges.is_empty()
    }
}

/// Stateless conflict resolver
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    precedence: PrecedenceTable,
    ask_user_threshold: u8,
    last_writer_wins_threshold: u8,
    windows: DuplicateWindows,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(&SyncConfig::default())
    }
}

impl ConflictResolver {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            precedence: PrecedenceTable::new(config.precedence.clone()),
            ask_user_threshold: config.ask_user_threshold,
            last_writer_wins_threshold: config.last_writer_wins_threshold,
            windows: config.duplicate_windows,
        }
    }

    /// Reconcile `local` with `remote` written by actors of the given roles.
    pub fn resolve<T: Resolvable>(
        &self,
        local: &T,
        remote: &T,
        local_role: ActorRole,
        remote_role: ActorRole,
    ) -> Resolution {
        let entity_id = remote.entity_id();
        let record_merges = T::record_merges(local, remote, &self.windows);
        let diffs = T::field_diffs(local, remote);

        if remote.open_state() == Some(false) && local.open_state() == Some(true) {
            tracing::debug!(entity_id = %entity_id, "[RESOLVER] Remote ended an entity still open locally");
            return Self::remote_wins(
                entity_id,
                &diffs,
                record_merges,
                Conflict {
                    kind: ConflictKind::NoLongerActive,
                    severity: Severity::High,
                    field: None,
                    description: format!("{} no longer active", T::KIND),
                    local_value: Some("open".to_string()),
                    remote_value: Some("closed".to_string()),
                },
                format!("This {} is no longer active; it was checked out by another user.", T::KIND),
            );
        }

        if remote.is_soft_deleted() && !local.is_soft_deleted() {
            tracing::debug!(entity_id = %entity_id, "[RESOLVER] Remote deleted an entity live locally");
            return Self::remote_wins(
                entity_id,
                &diffs,
                record_merges,
                Conflict {
                    kind: ConflictKind::DeletedWhileUpdating,
                    severity: Severity::High,
                    field: None,
                    description: format!("{} deleted while updating", T::KIND),
                    local_value: None,
                    remote_value: None,
                },
                format!("This {} was deleted by another user.", T::KIND),
            );
        }

        if remote.revision() > local.revision() && !local.needs_sync() {
            tracing::trace!(
                entity_id = %entity_id,
                local = local.revision(),
                remote = remote.revision(),
                "[RESOLVER] Remote is newer and nothing local is unsynced"
            );
            let mut decisions = take_remote_decisions(&diffs);
            if !record_merges.is_empty() {
                decisions.push(FieldDecision {
                    field: Field::ActivityLog,
                    strategy: ResolutionStrategy::Merge,
                });
            }
            return Resolution {
                entity_id,
                conflicts: Vec::new(),
                field_updates: Vec::new(),
                record_merges,
                decisions,
                user_message: None,
            };
        }

        let mut resolution = Resolution {
            entity_id,
            conflicts: Vec::new(),
            field_updates: Vec::new(),
            record_merges,
            decisions: Vec::new(),
            user_message: None,
        };

        for diff in diffs {
            let strategy = self.strategy(diff.field, local_role, remote_role);
            resolution.decisions.push(FieldDecision {
                field: diff.field,
                strategy,
            });

            match strategy {
                ResolutionStrategy::KeepLocal => resolution.field_updates.push(diff.local),
                ResolutionStrategy::TakeRemote | ResolutionStrategy::LastWriterWins => {}
                ResolutionStrategy::AskUser => resolution.conflicts.push(Conflict {
                    kind: ConflictKind::NeedsReview,
                    severity: Severity::Medium,
                    field: Some(diff.field),
                    description: format!("{} was changed on two devices", diff.field),
                    local_value: Some(diff.local.describe()),
                    remote_value: Some(diff.remote.describe()),
                }),
                ResolutionStrategy::Merge => {
                    let merged = FieldUpdate::merged(&diff.local, &diff.remote);
                    if merged != diff.remote {
                        resolution.field_updates.push(merged);
                    }
                }
                ResolutionStrategy::LaterDateWins => {
                    let later = FieldUpdate::later_stay(&diff.local, &diff.remote);
                    if later != diff.remote {
                        resolution.field_updates.push(later);
                    }
                }
            }
        }

        if !resolution.record_merges.is_empty() {
            resolution.decisions.push(FieldDecision {
                field: Field::ActivityLog,
                strategy: ResolutionStrategy::Merge,
            });
        }

        if !resolution.conflicts.is_empty() {
            let fields: Vec<_> = resolution
                .conflicts
                .iter()
                .filter_map(|conflict| conflict.field.map(|field| field.name().replace('_', " ")))
                .collect();
            resolution.user_message = Some(format!(
                "Another user also changed {}. Their version was kept; please review.",
                fields.join(", ")
            ));
        }

        tracing::trace!(
            entity_id = %entity_id,
            updates = resolution.field_updates.len(),
            merges = resolution.record_merges.len(),
            conflicts = resolution.conflicts.len(),
            "[RESOLVER] Resolved"
        );
        resolution
    }

    /// Strategy for one differing field.
    pub fn strategy(&self, field: Field, local_role: ActorRole, remote_role: ActorRole) -> ResolutionStrategy {
        if field == Field::ExtendedStay {
            return ResolutionStrategy::LaterDateWins;
        }
        if local_role > remote_role {
            return ResolutionStrategy::KeepLocal;
        }
        if remote_role > local_role {
            return ResolutionStrategy::TakeRemote;
        }

        let precedence = self.precedence.get(field);
        if precedence >= self.ask_user_threshold {
            ResolutionStrategy::AskUser
        } else if precedence >= self.last_writer_wins_threshold {
            ResolutionStrategy::LastWriterWins
        } else {
            ResolutionStrategy::Merge
        }
    }

    fn remote_wins(
        entity_id: Uuid,
        diffs: &[FieldDiff],
        record_merges: Vec<RecordMerge>,
        conflict: Conflict,
        user_message: String,
    ) -> Resolution {
        Resolution {
            entity_id,
            conflicts: vec![conflict],
            field_updates: Vec::new(),
            record_merges,
            decisions: take_remote_decisions(diffs),
            user_message: Some(user_message),
        }
    }
}

fn take_remote_decisions(diffs: &[FieldDiff]) -> Vec<FieldDecision> {
    diffs
        .iter()
        .map(|diff| FieldDecision {
            field: diff.field,
            strategy: ResolutionStrategy::TakeRemote,
        })
        .collect()
}
