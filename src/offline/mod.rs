//! # Offline-First Writes
//!
//! Local mutations are applied to the cache immediately and confirmed with
//! the remote store afterwards, with rollback when the remote rejects them.
//!
//! ## Architecture
//!
//! - **Pending Operations**: in-flight transactions and their snapshots
//! - **Transaction Coordinator**: the precheck, apply, confirm and
//!   commit-or-rollback cycle for every write
//! - **Integrity Validator**: diagnostics over the live cache and against the
//!   remote store
//!
//! The sync scheduler consults the pending index so that it never overwrites
//! a local change that has not been confirmed yet.

pub mod integrity;
pub mod pending;
pub mod transaction;

pub use integrity::{IntegrityIssue, IntegrityReport, IntegrityValidator, IssueKind};
pub use pending::{OperationKind, PendingIndex, PendingOperation, PendingSummary};
pub use transaction::{Change, TransactionCoordinator};
