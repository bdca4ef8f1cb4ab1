use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one workflow run.
///
/// A compiled graph holds no per-run state, so many runs with distinct
/// `RunId`s may execute against it concurrently.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status value set on a state while it waits for human review.
pub const STATUS_PAUSED: &str = "PAUSED";

/// Key in `WorkflowState::data` consulted by the quarantine gate.
pub const RISK_LEVEL_KEY: &str = "risk_level";

/// Risk value that blocks privileged nodes.
pub const RISK_HIGH: &str = "high";
