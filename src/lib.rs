//! Trellis — a graph workflow orchestration engine.
//!
//! Workflows are explicit directed graphs of retryable nodes connected by
//! static edges and runtime routers. The engine walks the graph, retries
//! failing nodes with bounded backoff, checkpoints after every step, pauses
//! at human-in-the-loop breakpoints, and quarantines privileged nodes when
//! the run's risk level is high.

pub use trellis_core::{
    EngineConfig, HistoryEntry, Message, NoopTelemetry, Result, RetryBackoff, RunId, TelemetryHook,
    TracingTelemetry, TrellisError, WorkflowRunner, WorkflowState, RISK_HIGH, RISK_LEVEL_KEY,
    STATUS_PAUSED,
};
pub use trellis_engine::{
    run_parallel, Checkpoint, CheckpointStore, Engine, GateDecision, MemoryCheckpointStore,
    MemoryReviewQueue, QuarantineGate, ReviewEntry, ReviewQueue, SqliteCheckpointStore,
};
pub use trellis_graph::{
    CompiledGraph, Edge, GraphBuilder, Node, NodeKind, NodeOutput, NodeWork, RouteDecision, Router,
};
