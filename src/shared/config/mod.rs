//! Sync configuration
//!
//! Every tunable constant of the cache, transaction and sync layers lives in
//! [`SyncConfig`]. Values come from the defaults, an optional TOML file and a
//! couple of environment overrides, in that order.
//!
//! ```toml
//! sync_interval_secs = 15
//! min_sync_interval_ms = 1000
//! local_role = "owner"
//!
//! [precedence]
//! session_notes = 30
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::shared::model::{ActorRole, DuplicateWindows};
use crate::sync::field_update::Field;

/// Environment variable overriding the periodic sync interval (seconds)
pub const ENV_SYNC_INTERVAL: &str = "KENNELSYNC_SYNC_INTERVAL_SECS";
/// Environment variable overriding the local actor role
pub const ENV_LOCAL_ROLE: &str = "KENNELSYNC_LOCAL_ROLE";

/// Runtime configuration for the sync core
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Periodic sync interval while in the foreground
    pub sync_interval: Duration,
    /// Minimum gap between two non-forced sync passes
    pub min_sync_interval: Duration,
    /// Age after which an unresolved pending operation is reported
    pub stale_pending_threshold: Duration,
    /// Age after which the last successful sync is reported as stale
    pub stale_sync_threshold: Duration,
    /// Windows for collapsing near-duplicate activity records
    pub duplicate_windows: DuplicateWindows,
    /// Field precedence at or above which equal-role edits need a person
    pub ask_user_threshold: u8,
    /// Field precedence at or above which equal-role edits go to the last writer
    pub last_writer_wins_threshold: u8,
    /// Role of the person using this client
    pub local_role: ActorRole,
    /// Identifier stamped on entities written by this client
    pub actor_id: String,
    /// Per-field precedence overrides
    pub precedence: HashMap<Field, u8>,
    /// How long a closed session still counts as active for narrow fetches
    pub recently_closed_window: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(15),
            min_sync_interval: Duration::from_secs(1),
            stale_pending_threshold: Duration::from_secs(30),
            stale_sync_threshold: Duration::from_secs(5 * 60),
            duplicate_windows: DuplicateWindows::default(),
            ask_user_threshold: 80,
            last_writer_wins_threshold: 50,
            local_role: ActorRole::Staff,
            actor_id: "local".to_string(),
            precedence: HashMap::new(),
            recently_closed_window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfigBuilder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(source)?;
        raw.into_builder()?.build()
    }

    /// Load a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Apply `KENNELSYNC_*` environment overrides
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_SYNC_INTERVAL) {
            let secs = value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid(format!("{} must be a number of seconds", ENV_SYNC_INTERVAL)))?;
            self.sync_interval = Duration::from_secs(secs);
        }
        if let Some(value) = lookup(ENV_LOCAL_ROLE) {
            self.local_role = value.parse().map_err(ConfigError::Invalid)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync_interval.is_zero() {
            return Err(ConfigError::Invalid("sync interval must be positive".into()));
        }
        if self.ask_user_threshold > 100 || self.last_writer_wins_threshold > 100 {
            return Err(ConfigError::Invalid("precedence thresholds are on a 0-100 scale".into()));
        }
        if self.last_writer_wins_threshold > self.ask_user_threshold {
            return Err(ConfigError::Invalid(
                "last-writer-wins threshold cannot exceed the ask-user threshold".into(),
            ));
        }
        if self.duplicate_windows.general < chrono::Duration::zero()
            || self.duplicate_windows.medication < chrono::Duration::zero()
        {
            return Err(ConfigError::Invalid("duplicate windows cannot be negative".into()));
        }
        if let Some((field, value)) = self.precedence.iter().find(|(_, value)| **value > 100) {
            return Err(ConfigError::Invalid(format!(
                "precedence for {} is {}, above 100",
                field.name(),
                value
            )));
        }
        Ok(())
    }
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.config.sync_interval = interval;
        self
    }

    pub fn min_sync_interval(mut self, interval: Duration) -> Self {
        self.config.min_sync_interval = interval;
        self
    }

    pub fn stale_pending_threshold(mut self, threshold: Duration) -> Self {
        self.config.stale_pending_threshold = threshold;
        self
    }

    pub fn stale_sync_threshold(mut self, threshold: Duration) -> Self {
        self.config.stale_sync_threshold = threshold;
        self
    }

    pub fn duplicate_windows(mut self, windows: DuplicateWindows) -> Self {
        self.config.duplicate_windows = windows;
        self
    }

    pub fn ask_user_threshold(mut self, threshold: u8) -> Self {
        self.config.ask_user_threshold = threshold;
        self
    }

    pub fn last_writer_wins_threshold(mut self, threshold: u8) -> Self {
        self.config.last_writer_wins_threshold = threshold;
        self
    }

    pub fn local_role(mut self, role: ActorRole) -> Self {
        self.config.local_role = role;
        self
    }

    pub fn actor_id(mut self, id: impl Into<String>) -> Self {
        self.config.actor_id = id.into();
        self
    }

    /// Override the precedence of a single field
    pub fn precedence(mut self, field: Field, value: u8) -> Self {
        self.config.precedence.insert(field, value);
        self
    }

    pub fn recently_closed_window(mut self, window: Duration) -> Self {
        self.config.recently_closed_window = window;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// On-disk shape of the configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    sync_interval_secs: Option<u64>,
    min_sync_interval_ms: Option<u64>,
    stale_pending_secs: Option<u64>,
    stale_sync_secs: Option<u64>,
    duplicate_window_secs: Option<i64>,
    medication_duplicate_window_secs: Option<i64>,
    ask_user_threshold: Option<u8>,
    last_writer_wins_threshold: Option<u8>,
    local_role: Option<ActorRole>,
    actor_id: Option<String>,
    recently_closed_hours: Option<u64>,
    precedence: HashMap<String, u8>,
}

impl RawConfig {
    fn into_builder(self) -> Result<SyncConfigBuilder, ConfigError> {
        let mut builder = SyncConfig::builder();
        if let Some(secs) = self.sync_interval_secs {
            builder = builder.sync_interval(Duration::from_secs(secs));
        }
        if let Some(ms) = self.min_sync_interval_ms {
            builder = builder.min_sync_interval(Duration::from_millis(ms));
        }
        if let Some(secs) = self.stale_pending_secs {
            builder = builder.stale_pending_threshold(Duration::from_secs(secs));
        }
        if let Some(secs) = self.stale_sync_secs {
            builder = builder.stale_sync_threshold(Duration::from_secs(secs));
        }
        let mut windows = DuplicateWindows::default();
        if let Some(secs) = self.duplicate_window_secs {
            windows.general = chrono::Duration::seconds(secs);
        }
        if let Some(secs) = self.medication_duplicate_window_secs {
            windows.medication = chrono::Duration::seconds(secs);
        }
        builder = builder.duplicate_windows(windows);
        if let Some(threshold) = self.ask_user_threshold {
            builder = builder.ask_user_threshold(threshold);
        }
        if let Some(threshold) = self.last_writer_wins_threshold {
            builder = builder.last_writer_wins_threshold(threshold);
        }
        if let Some(role) = self.local_role {
            builder = builder.local_role(role);
        }
        if let Some(id) = self.actor_id {
            builder = builder.actor_id(id);
        }
        if let Some(hours) = self.recently_closed_hours {
            builder = builder.recently_closed_window(Duration::from_secs(hours * 60 * 60));
        }
        for (name, value) in self.precedence {
            let field = Field::from_name(&name)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown field '{}' in [precedence]", name)))?;
            builder = builder.precedence(field, value);
        }
        Ok(builder)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value: {0}")]
    Invalid(String),
}
