//! Actors and their privilege ranking.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of whoever wrote a change.
///
/// Ordering is privilege: an `Owner` write outranks a `Staff` write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// Kennel staff member
    #[default]
    Staff,
    /// Business owner / administrator
    Owner,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Staff => "staff",
            ActorRole::Owner => "owner",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "staff" => Ok(ActorRole::Staff),
            "owner" => Ok(ActorRole::Owner),
            other => Err(format!("unknown actor role '{}'", other)),
        }
    }
}

/// Identity stamped on every locally written entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self { id: id.into(), role }
    }
}
