use trellis_core::state::WorkflowState;
use trellis_core::types::{RISK_HIGH, RISK_LEVEL_KEY};
use trellis_graph::node::NodeKind;

/// What to do with a node about to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Execute as planned.
    Proceed,
    /// Divert execution to the named quarantine node.
    Redirect(String),
    /// Abort the run: risk is high and no quarantine route exists.
    Block,
}

/// Risk policy applied before every execution attempt of a privileged node.
#[derive(Debug, Clone, Default)]
pub struct QuarantineGate {
    quarantine_node: Option<String>,
}

impl QuarantineGate {
    pub fn new(quarantine_node: Option<String>) -> Self {
        Self { quarantine_node }
    }

    /// Decide whether `kind` may run against `state`. Only privileged nodes
    /// are gated; everything else proceeds unconditionally.
    pub fn decide(&self, kind: NodeKind, state: &WorkflowState) -> GateDecision {
        if kind != NodeKind::Privileged {
            return GateDecision::Proceed;
        }
        let high_risk = state
            .get(RISK_LEVEL_KEY)
            .and_then(|v| v.as_str())
            .is_some_and(|level| level == RISK_HIGH);
        if !high_risk {
            return GateDecision::Proceed;
        }
        match &self.quarantine_node {
            Some(node) => GateDecision::Redirect(node.clone()),
            None => GateDecision::Block,
        }
    }
}
