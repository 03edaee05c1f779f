//! # Remote Store
//!
//! The authoritative external collaborator. The wire protocol is not this
//! crate's concern; anything that can fetch entities modified after a
//! checkpoint and save or delete single records can back the sync core.
//!
//! - `mod.rs`: the [`RemoteStore`] contract
//! - `memory.rs`: [`InMemoryRemoteStore`], an in-process implementation with
//!   revision checking and failure injection

pub mod memory;

pub use crate::shared::error::RemoteError;
pub use memory::InMemoryRemoteStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::shared::config::SyncConfig;
use crate::shared::model::{Profile, Record, Session};
use uuid::Uuid;

/// Which sessions a narrow fetch should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveWindow {
    /// Reference time
    pub now: DateTime<Utc>,
    /// Sessions closed less than this long ago still count
    pub recently_closed: Duration,
}

impl ActiveWindow {
    pub fn new(now: DateTime<Utc>, recently_closed: Duration) -> Self {
        Self { now, recently_closed }
    }

    /// Window ending at `now` using the configured recently-closed span.
    pub fn from_config(now: DateTime<Utc>, config: &SyncConfig) -> Self {
        let recently_closed = Duration::from_std(config.recently_closed_window).unwrap_or(Duration::MAX);
        Self::new(now, recently_closed)
    }

    /// Open, closed within the window, or arriving in the future.
    pub fn includes(&self, session: &Session) -> bool {
        match session.departed_at {
            None => true,
            Some(_) if session.arrived_at > self.now => true,
            Some(end) => self.now - end <= self.recently_closed,
        }
    }
}

/// Contract of the authoritative store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Profiles modified strictly after `modified_after`, or all of them.
    async fn fetch_profiles(
        &self,
        modified_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Profile>, RemoteError>;

    /// Sessions modified strictly after `modified_after`, or all of them.
    async fn fetch_sessions(
        &self,
        modified_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Session>, RemoteError>;

    /// Only open, recently closed or upcoming sessions.
    async fn fetch_active_sessions(&self, window: ActiveWindow) -> Result<Vec<Session>, RemoteError> {
        let sessions = self.fetch_sessions(None).await?;
        Ok(sessions.into_iter().filter(|s| window.includes(s)).collect())
    }

    /// Write one record; returns the value as stored by the server.
    async fn save(&self, record: Record) -> Result<Record, RemoteError>;

    /// Permanently remove a record.
    async fn delete(&self, id: Uuid) -> Result<(), RemoteError>;
}
