//! Execution engine for Trellis workflow graphs: the run loop with bounded
//! retry, checkpoint/resume, human-in-the-loop pausing, parallel fan-out,
//! and the risk-based quarantine gate.

pub mod checkpoint;
pub mod executor;
pub mod quarantine;
pub mod review;

pub use checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};
pub use executor::{run_parallel, CompletionHook, Engine};
pub use quarantine::{GateDecision, QuarantineGate};
pub use review::{MemoryReviewQueue, ReviewEntry, ReviewQueue};
