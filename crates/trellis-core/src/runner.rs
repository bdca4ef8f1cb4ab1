use futures::future::BoxFuture;

use crate::error::Result;
use crate::state::WorkflowState;
use crate::types::RunId;

/// Anything that can run a workflow to completion (or a pause).
///
/// This is the seam between the graph model and the execution engine: a
/// subgraph node holds an `Arc<dyn WorkflowRunner>` rather than a concrete
/// engine, so nested engines compose without a crate cycle.
pub trait WorkflowRunner: Send + Sync + 'static {
    /// Run a workflow from `start_at` (or its entry node) against `state`.
    fn run_workflow<'a>(
        &'a self,
        state: WorkflowState,
        run_id: &'a RunId,
        start_at: Option<&'a str>,
    ) -> BoxFuture<'a, Result<WorkflowState>>;
}
