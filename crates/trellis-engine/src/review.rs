use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use trellis_core::error::{Result, TrellisError};
use trellis_core::state::WorkflowState;
use trellis_core::types::RunId;

/// A paused run awaiting external approval or rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub run_id: RunId,
    pub state: WorkflowState,
    /// Where execution continues once the run is approved. `None` means the
    /// breakpoint was the final node.
    pub next_node: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl ReviewEntry {
    pub fn new(run_id: RunId, state: WorkflowState, next_node: Option<String>) -> Self {
        Self {
            run_id,
            state,
            next_node,
            enqueued_at: Utc::now(),
        }
    }
}

/// Holds paused runs. Shared across concurrent runs and approval callers,
/// so implementations must be internally synchronized.
pub trait ReviewQueue: Send + Sync {
    fn enqueue(&self, entry: ReviewEntry) -> Result<()>;

    /// Remove and return the entry for `run_id`. A missing id is a
    /// `ReviewEntryNotFound` error, never a silent no-op — approval APIs
    /// must be able to tell "resumed" apart from "no such run".
    fn pop(&self, run_id: &RunId) -> Result<ReviewEntry>;

    fn pending(&self) -> Vec<RunId>;
}

/// In-memory reference implementation.
#[derive(Debug, Default)]
pub struct MemoryReviewQueue {
    inner: Mutex<HashMap<String, ReviewEntry>>,
}

impl MemoryReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReviewQueue for MemoryReviewQueue {
    fn enqueue(&self, entry: ReviewEntry) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| TrellisError::Database(e.to_string()))?;
        inner.insert(entry.run_id.0.clone(), entry);
        Ok(())
    }

    fn pop(&self, run_id: &RunId) -> Result<ReviewEntry> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| TrellisError::Database(e.to_string()))?;
        inner
            .remove(run_id.as_str())
            .ok_or_else(|| TrellisError::ReviewEntryNotFound(run_id.to_string()))
    }

    fn pending(&self) -> Vec<RunId> {
        self.inner
            .lock()
            .map(|inner| inner.values().map(|e| e.run_id.clone()).collect())
            .unwrap_or_default()
    }
}
