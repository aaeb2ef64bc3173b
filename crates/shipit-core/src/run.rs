//! Run context for a single pipeline execution.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::trigger::TriggerEvent;

/// Unique identifier for a run. Uses UUIDv7 for time-ordered, sortable IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable context for one run: the event that started it and the identity
/// of the commit being built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub id: RunId,
    /// The event that started the run.
    pub event: TriggerEvent,
    /// Full commit SHA of the source tree.
    pub sha: String,
    /// Version string derived from the commit: the abbreviated (7-char) hash.
    pub version: String,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(event: TriggerEvent, sha: impl Into<String>) -> Self {
        let sha = sha.into();
        let version = short_sha(&sha);
        Self {
            id: RunId::new(),
            event,
            sha,
            version,
            started_at: Utc::now(),
        }
    }
}

/// Abbreviate a commit SHA to the conventional 7 characters.
pub fn short_sha(sha: &str) -> String {
    sha.chars().take(7).collect()
}
