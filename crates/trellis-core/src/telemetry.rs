use tracing::{debug, info};

use crate::state::WorkflowState;
use crate::types::RunId;

/// Receives span/metric events for node, edge, and route decisions.
///
/// Hooks are fire-and-forget: every method is infallible and defaults to a
/// no-op, so a misbehaving hook can never affect run correctness.
pub trait TelemetryHook: Send + Sync {
    /// A node is about to execute, with the state it will see.
    fn on_node_start(&self, run_id: &RunId, node: &str, state: &WorkflowState) {
        let _ = (run_id, node, state);
    }

    /// A node finished executing, with the state it produced.
    fn on_node_end(&self, run_id: &RunId, node: &str, state: &WorkflowState) {
        let _ = (run_id, node, state);
    }

    /// An edge was traversed between two executed nodes.
    fn on_edge(&self, run_id: &RunId, from: &str, to: &str, kind: Option<&str>) {
        let _ = (run_id, from, to, kind);
    }

    /// A router (or the quarantine gate) made a routing decision.
    fn on_route_decision(&self, run_id: &RunId, node: &str, decision: &str) {
        let _ = (run_id, node, decision);
    }
}

/// Hook that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetryHook for NoopTelemetry {}

/// Hook that emits structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetryHook for TracingTelemetry {
    fn on_node_start(&self, run_id: &RunId, node: &str, _state: &WorkflowState) {
        info!(run_id = %run_id, node, "Executing workflow node");
    }

    fn on_node_end(&self, run_id: &RunId, node: &str, state: &WorkflowState) {
        debug!(
            run_id = %run_id,
            node,
            history_len = state.history.len(),
            "Node execution complete"
        );
    }

    fn on_edge(&self, run_id: &RunId, from: &str, to: &str, kind: Option<&str>) {
        debug!(run_id = %run_id, from, to, kind = kind.unwrap_or("-"), "Edge traversed");
    }

    fn on_route_decision(&self, run_id: &RunId, node: &str, decision: &str) {
        debug!(run_id = %run_id, node, decision, "Route decision");
    }
}
