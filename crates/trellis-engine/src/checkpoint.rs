use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use trellis_core::error::{Result, TrellisError};
use trellis_core::state::WorkflowState;
use trellis_core::types::RunId;

/// A persisted `(node, state)` snapshot enabling resume after failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: RunId,
    /// Name of the node that had just finished executing.
    pub node: String,
    pub state: WorkflowState,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(run_id: RunId, node: impl Into<String>, state: WorkflowState) -> Self {
        Self {
            run_id,
            node: node.into(),
            state,
            timestamp: Utc::now(),
        }
    }
}

/// Persists the latest checkpoint per run. Implementations are shared across
/// concurrent runs and must be internally synchronized.
pub trait CheckpointStore: Send + Sync {
    fn save(&self, checkpoint: &Checkpoint) -> Result<()>;
    fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>>;
    fn delete(&self, run_id: &RunId) -> Result<usize>;
}

/// In-memory reference implementation.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    inner: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| TrellisError::Database(e.to_string()))?;
        inner.insert(checkpoint.run_id.0.clone(), checkpoint.clone());
        Ok(())
    }

    fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>> {
        let inner = self
            .inner
            .lock()
            .map_err(|e| TrellisError::Database(e.to_string()))?;
        Ok(inner.get(run_id.as_str()).cloned())
    }

    fn delete(&self, run_id: &RunId) -> Result<usize> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| TrellisError::Database(e.to_string()))?;
        Ok(inner.remove(run_id.as_str()).map_or(0, |_| 1))
    }
}

/// Durable checkpoint store backed by SQLite. Keeps only the latest
/// checkpoint per run.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// Open or create the checkpoint database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| TrellisError::Database(e.to_string()))?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;

             CREATE TABLE IF NOT EXISTS checkpoints (
                 run_id TEXT PRIMARY KEY,
                 node TEXT NOT NULL,
                 state_json TEXT NOT NULL,
                 timestamp TEXT NOT NULL
             );",
        )
        .map_err(|e| TrellisError::Database(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn save(&self, cp: &Checkpoint) -> Result<()> {
        let state_json = serde_json::to_string(&cp.state)?;
        let conn = self
            .conn
            .lock()
            .map_err(|e| TrellisError::Database(e.to_string()))?;
        conn.execute(
            "INSERT INTO checkpoints (run_id, node, state_json, timestamp)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(run_id) DO UPDATE SET
                 node = excluded.node,
                 state_json = excluded.state_json,
                 timestamp = excluded.timestamp",
            params![
                cp.run_id.as_str(),
                cp.node,
                state_json,
                cp.timestamp.to_rfc3339(),
            ],
        )
        .map_err(|e| TrellisError::Database(e.to_string()))?;
        Ok(())
    }

    fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| TrellisError::Database(e.to_string()))?;
        let mut stmt = conn
            .prepare("SELECT node, state_json, timestamp FROM checkpoints WHERE run_id = ?1")
            .map_err(|e| TrellisError::Database(e.to_string()))?;

        let row = stmt
            .query_row(params![run_id.as_str()], |row| {
                let node: String = row.get(0)?;
                let state_json: String = row.get(1)?;
                let ts: String = row.get(2)?;
                Ok((node, state_json, ts))
            })
            .optional()
            .map_err(|e| TrellisError::Database(e.to_string()))?;

        let Some((node, state_json, ts)) = row else {
            return Ok(None);
        };
        let state: WorkflowState = serde_json::from_str(&state_json)?;
        let timestamp = DateTime::parse_from_rfc3339(&ts)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(Checkpoint {
            run_id: run_id.clone(),
            node,
            state,
            timestamp,
        }))
    }

    fn delete(&self, run_id: &RunId) -> Result<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| TrellisError::Database(e.to_string()))?;
        conn.execute(
            "DELETE FROM checkpoints WHERE run_id = ?1",
            params![run_id.as_str()],
        )
        .map_err(|e| TrellisError::Database(e.to_string()))
    }
}
