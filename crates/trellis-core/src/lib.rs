pub mod config;
pub mod error;
pub mod runner;
pub mod state;
pub mod telemetry;
pub mod types;

pub use config::{EngineConfig, RetryBackoff};
pub use error::{Result, TrellisError};
pub use runner::WorkflowRunner;
pub use state::{HistoryEntry, Message, WorkflowState};
pub use telemetry::{NoopTelemetry, TelemetryHook, TracingTelemetry};
pub use types::{RunId, RISK_HIGH, RISK_LEVEL_KEY, STATUS_PAUSED};
