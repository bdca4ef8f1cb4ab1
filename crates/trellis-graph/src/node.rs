use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use trellis_core::error::Result;
use trellis_core::runner::WorkflowRunner;
use trellis_core::state::WorkflowState;

/// How the engine treats a node beyond plain execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Ordinary unit of work.
    Default,
    /// Subject to the quarantine gate before every execution attempt.
    Privileged,
    /// Designated fallback destination for blocked privileged nodes.
    Quarantined,
    /// Pauses the run for human review after executing.
    Breakpoint,
    /// Delegates to a nested workflow engine.
    Subgraph,
    /// Group-chat coordinator. Scheduled like `Default`; turn-taking logic
    /// lives in the node's own work.
    GroupChatManager,
}

/// What a node callable hands back to the engine.
#[derive(Debug, Clone)]
pub enum NodeOutput {
    /// Full replacement state.
    State(WorkflowState),
    /// Partial key/value update, merged via `WorkflowState::update`.
    Update(Map<String, Value>),
}

/// Async node callable: consumes a state snapshot, returns its output.
pub type NodeFn =
    Arc<dyn Fn(WorkflowState) -> BoxFuture<'static, Result<NodeOutput>> + Send + Sync>;

/// The work a node performs: a plain function or a nested engine.
/// A tagged union, so the engine never inspects types at runtime.
#[derive(Clone)]
pub enum NodeWork {
    Function(NodeFn),
    Subgraph(Arc<dyn WorkflowRunner>),
}

impl std::fmt::Debug for NodeWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeWork::Function(_) => f.write_str("NodeWork::Function"),
            NodeWork::Subgraph(_) => f.write_str("NodeWork::Subgraph"),
        }
    }
}

/// A named, retryable unit of work in the graph.
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique within a graph.
    pub name: String,
    pub work: NodeWork,
    /// Extra attempts after the first failure; `retries = N` means the
    /// callable runs at most `N + 1` times.
    pub retries: u32,
    pub kind: NodeKind,
}

impl Node {
    /// Create a function node from any async closure.
    pub fn function<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(WorkflowState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NodeOutput>> + Send + 'static,
    {
        Self {
            name: name.into(),
            work: NodeWork::Function(Arc::new(move |state| Box::pin(f(state)))),
            retries: 0,
            kind: NodeKind::Default,
        }
    }

    /// Create a subgraph node. The kind is forced to `Subgraph`.
    pub fn subgraph(name: impl Into<String>, runner: Arc<dyn WorkflowRunner>) -> Self {
        Self {
            name: name.into(),
            work: NodeWork::Subgraph(runner),
            retries: 0,
            kind: NodeKind::Subgraph,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the node kind. Ignored for subgraph nodes, whose kind is fixed.
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        if !matches!(self.work, NodeWork::Subgraph(_)) {
            self.kind = kind;
        }
        self
    }
}
