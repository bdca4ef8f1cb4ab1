use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{try_join_all, BoxFuture};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use trellis_core::config::{EngineConfig, RetryBackoff};
use trellis_core::error::{Result, TrellisError};
use trellis_core::runner::WorkflowRunner;
use trellis_core::state::WorkflowState;
use trellis_core::telemetry::{NoopTelemetry, TelemetryHook};
use trellis_core::types::{RunId, STATUS_PAUSED};
use trellis_graph::builder::CompiledGraph;
use trellis_graph::node::{Node, NodeKind, NodeOutput, NodeWork};
use trellis_graph::router::RouteDecision;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::quarantine::{GateDecision, QuarantineGate};
use crate::review::{ReviewEntry, ReviewQueue};

/// Invoked once per completed run with the final state; may mutate it
/// (e.g. to trigger memory consolidation). Never called for paused runs.
pub type CompletionHook = Arc<dyn Fn(&mut WorkflowState) + Send + Sync>;

/// Resolved continuation after a node finishes.
enum NextStep {
    Node(String),
    FanOut(Vec<String>),
    End,
}

/// How a drive loop ended.
enum Flow {
    Done(WorkflowState),
    Paused(WorkflowState),
}

/// Outcome of one gated execution: either the node ran, or the quarantine
/// gate diverted it before any attempt.
enum Executed {
    State(WorkflowState),
    Redirected(WorkflowState, String),
}

/// Walks a compiled graph: executes nodes with bounded retry, checkpoints
/// after each step, pauses at human-in-the-loop breakpoints, and resolves
/// transitions via routers or static edges.
///
/// The engine holds no per-run state; one instance serves many concurrent
/// runs with distinct [`RunId`]s.
pub struct Engine {
    graph: Arc<CompiledGraph>,
    config: EngineConfig,
    gate: QuarantineGate,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    reviews: Option<Arc<dyn ReviewQueue>>,
    telemetry: Arc<dyn TelemetryHook>,
    on_complete: Option<CompletionHook>,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(graph: CompiledGraph) -> Self {
        Self {
            graph: Arc::new(graph),
            config: EngineConfig::default(),
            gate: QuarantineGate::new(None),
            checkpoints: None,
            reviews: None,
            telemetry: Arc::new(NoopTelemetry),
            on_complete: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.gate = QuarantineGate::new(config.quarantine_node.clone());
        self.config = config;
        self
    }

    pub fn with_checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn with_reviews(mut self, queue: Arc<dyn ReviewQueue>) -> Self {
        self.reviews = Some(queue);
        self
    }

    pub fn with_telemetry(mut self, hook: Arc<dyn TelemetryHook>) -> Self {
        self.telemetry = hook;
        self
    }

    pub fn with_completion_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut WorkflowState) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(hook));
        self
    }

    /// Install a cooperative cancellation token, checked at the top of every
    /// loop iteration.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    /// Run the workflow from `start_at` (or the entry node) to completion or
    /// a breakpoint pause.
    pub async fn run(
        &self,
        state: WorkflowState,
        run_id: &RunId,
        start_at: Option<&str>,
    ) -> Result<WorkflowState> {
        let start = match start_at {
            Some(name) => {
                if !self.graph.contains(name) {
                    return Err(TrellisError::Routing {
                        node: "<start>".to_string(),
                        destination: name.to_string(),
                    });
                }
                name.to_string()
            }
            None => self.graph.entry().to_string(),
        };

        match self.drive(state, run_id, start, true).await? {
            Flow::Done(mut state) => {
                self.complete(&mut state);
                Ok(state)
            }
            Flow::Paused(state) => Ok(state),
        }
    }

    /// Resume a run from its last checkpoint. The checkpointed node is never
    /// re-executed; its successor is re-derived exactly as the run loop
    /// would have derived it.
    pub async fn resume_from_checkpoint(&self, run_id: &RunId) -> Result<WorkflowState> {
        let store = self
            .checkpoints
            .as_ref()
            .ok_or(TrellisError::NoCheckpointStore)?;
        let cp = store
            .load(run_id)?
            .ok_or_else(|| TrellisError::CheckpointNotFound(run_id.to_string()))?;
        info!(run_id = %run_id, node = %cp.node, "Resuming run from checkpoint");

        match self.resolve_next(&cp.node, &cp.state, run_id)? {
            NextStep::Node(next) => self.run(cp.state, run_id, Some(&next)).await,
            NextStep::FanOut(labels) => {
                let mut state = self.fan_out(labels, cp.state, run_id, &cp.node, true).await?;
                self.complete(&mut state);
                Ok(state)
            }
            NextStep::End => {
                // The run had already reached its final node.
                let mut state = cp.state;
                self.complete(&mut state);
                Ok(state)
            }
        }
    }

    /// Resume a run paused at a human-in-the-loop breakpoint: pops its
    /// review entry, clears the paused status, and continues at the stored
    /// next node.
    pub async fn resume_from_queue(&self, run_id: &RunId) -> Result<WorkflowState> {
        let queue = self.reviews.as_ref().ok_or(TrellisError::NoReviewQueue)?;
        let mut entry = queue.pop(run_id)?;
        entry.state.clear_status();
        info!(run_id = %run_id, next = ?entry.next_node, "Resuming run from review queue");

        match entry.next_node {
            Some(next) => self.run(entry.state, run_id, Some(&next)).await,
            None => {
                let mut state = entry.state;
                self.complete(&mut state);
                Ok(state)
            }
        }
    }

    fn complete(&self, state: &mut WorkflowState) {
        if let Some(hook) = &self.on_complete {
            hook(state);
        }
    }

    /// Best-effort checkpoint save; failures are logged, never fatal.
    fn save_checkpoint(&self, run_id: &RunId, node: &str, state: &WorkflowState) {
        if let Some(store) = &self.checkpoints {
            let cp = Checkpoint::new(run_id.clone(), node, state.clone());
            if let Err(e) = store.save(&cp) {
                warn!(run_id = %run_id, node, error = %e, "Checkpoint save failed");
            }
        }
    }

    // Boxed so the recursion through fan_out has a concrete, Send future type.
    fn drive<'a>(
        &'a self,
        state: WorkflowState,
        run_id: &'a RunId,
        start: String,
        persist: bool,
    ) -> BoxFuture<'a, Result<Flow>> {
        Box::pin(self.drive_inner(state, run_id, start, persist))
    }

    async fn drive_inner(
        &self,
        mut state: WorkflowState,
        run_id: &RunId,
        start: String,
        persist: bool,
    ) -> Result<Flow> {
        let mut current = Some(start);
        let mut prev: Option<String> = None;
        let mut visits: HashMap<String, u32> = HashMap::new();

        while let Some(name) = current.take() {
            if self.cancel.is_cancelled() {
                return Err(TrellisError::Cancelled);
            }

            let node = self.graph.node(&name).ok_or_else(|| TrellisError::Routing {
                node: prev.clone().unwrap_or_else(|| "<start>".to_string()),
                destination: name.clone(),
            })?;

            let seen = visits.entry(name.clone()).or_insert(0);
            *seen += 1;
            if *seen > self.config.max_node_visits {
                return Err(TrellisError::LoopLimit {
                    node: name,
                    limit: self.config.max_node_visits,
                });
            }

            self.telemetry.on_node_start(run_id, &name, &state);
            state = match self.execute_with_retry(node, state, run_id).await? {
                Executed::Redirected(state, quarantine) => {
                    warn!(
                        run_id = %run_id,
                        node = %name,
                        quarantine = %quarantine,
                        "Privileged node blocked by risk level, redirecting"
                    );
                    if !self.graph.contains(&quarantine) {
                        return Err(TrellisError::Routing {
                            node: name,
                            destination: quarantine,
                        });
                    }
                    current = Some(quarantine);
                    state
                }
                Executed::State(state) => {
                    if matches!(node.work, NodeWork::Subgraph(_)) && state.is_paused() {
                        // The nested engine already enqueued its review entry;
                        // the parent must not run past an unreviewed child.
                        info!(run_id = %run_id, node = %name, "Nested workflow paused, stopping run");
                        return Ok(Flow::Paused(state));
                    }
                    self.telemetry.on_node_end(run_id, &name, &state);
                    if let Some(p) = &prev {
                        self.telemetry
                            .on_edge(run_id, p, &name, self.graph.edge_kind(p, &name));
                    }

                    // Branches never checkpoint: concurrent saves under the
                    // parent's run id would clobber each other with partial
                    // branch states.
                    if persist {
                        self.save_checkpoint(run_id, &name, &state);
                    }

                    let next = self.resolve_next(&name, &state, run_id)?;

                    if node.kind == NodeKind::Breakpoint {
                        return self.pause(state, run_id, &name, next);
                    }

                    match next {
                        NextStep::Node(n) => {
                            prev = Some(name);
                            current = Some(n);
                            state
                        }
                        NextStep::FanOut(labels) => {
                            debug!(run_id = %run_id, node = %name, branches = labels.len(), "Fanning out");
                            self.fan_out(labels, state, run_id, &name, persist).await?
                        }
                        NextStep::End => {
                            debug!(run_id = %run_id, node = %name, "No next node, run complete");
                            state
                        }
                    }
                }
            };
        }

        Ok(Flow::Done(state))
    }

    fn pause(
        &self,
        mut state: WorkflowState,
        run_id: &RunId,
        node: &str,
        next: NextStep,
    ) -> Result<Flow> {
        let next_node = match next {
            NextStep::Node(n) => Some(n),
            NextStep::End => None,
            NextStep::FanOut(_) => {
                // A paused run needs a single resumption point.
                return Err(TrellisError::Routing {
                    node: node.to_string(),
                    destination: "<fan-out>".to_string(),
                });
            }
        };
        state.set_status(STATUS_PAUSED);
        let queue = self.reviews.as_ref().ok_or(TrellisError::NoReviewQueue)?;
        queue.enqueue(ReviewEntry::new(run_id.clone(), state.clone(), next_node))?;
        info!(run_id = %run_id, node, "Run paused for human review");
        Ok(Flow::Paused(state))
    }

    /// Execute a node's work with up to `retries + 1` attempts and bounded
    /// exponential backoff. A privileged node re-checks the quarantine gate
    /// before every attempt, not only the first. Retries never touch the
    /// state: each attempt runs against a fresh snapshot.
    async fn execute_with_retry(
        &self,
        node: &Node,
        state: WorkflowState,
        run_id: &RunId,
    ) -> Result<Executed> {
        let attempts = node.retries + 1;
        let mut last_err: Option<TrellisError> = None;

        for attempt in 0..attempts {
            match self.gate.decide(node.kind, &state) {
                GateDecision::Redirect(quarantine) => {
                    self.telemetry
                        .on_route_decision(run_id, &node.name, "quarantine");
                    return Ok(Executed::Redirected(state, quarantine));
                }
                GateDecision::Block => {
                    return Err(TrellisError::Permission {
                        node: node.name.clone(),
                    });
                }
                GateDecision::Proceed => {}
            }

            let snapshot = state.clone();
            let result = match &node.work {
                NodeWork::Function(f) => f(snapshot).await,
                NodeWork::Subgraph(runner) => runner
                    .run_workflow(snapshot, run_id, None)
                    .await
                    .map(NodeOutput::State),
            };

            match result {
                Ok(NodeOutput::State(new_state)) => return Ok(Executed::State(new_state)),
                Ok(NodeOutput::Update(partial)) => {
                    let mut state = state;
                    state.update(partial);
                    return Ok(Executed::State(state));
                }
                Err(e) => {
                    if attempt + 1 < attempts {
                        let backoff = backoff_delay(attempt, &self.config.retry);
                        warn!(
                            run_id = %run_id,
                            node = %node.name,
                            attempt = attempt + 1,
                            attempts,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Node failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(TrellisError::NodeExecution {
            node: node.name.clone(),
            attempts,
            source: Box::new(
                last_err.unwrap_or_else(|| TrellisError::Node("node produced no result".into())),
            ),
        })
    }

    /// Resolve the node that follows `name`: a registered router takes
    /// precedence over static edges; with neither, the run terminates here.
    fn resolve_next(&self, name: &str, state: &WorkflowState, run_id: &RunId) -> Result<NextStep> {
        if let Some(router) = self.graph.router(name) {
            let decision = router.decide(state)?;
            let label = match &decision {
                RouteDecision::Next(n) => n.clone(),
                RouteDecision::FanOut(ls) => ls.join(","),
                RouteDecision::End => "end".to_string(),
            };
            self.telemetry.on_route_decision(run_id, name, &label);

            return match decision {
                RouteDecision::Next(dest) => {
                    if !self.graph.contains(&dest) {
                        return Err(TrellisError::Routing {
                            node: name.to_string(),
                            destination: dest,
                        });
                    }
                    Ok(NextStep::Node(dest))
                }
                RouteDecision::FanOut(dests) => {
                    for dest in &dests {
                        if !self.graph.contains(dest) {
                            return Err(TrellisError::Routing {
                                node: name.to_string(),
                                destination: dest.clone(),
                            });
                        }
                    }
                    Ok(NextStep::FanOut(dests))
                }
                RouteDecision::End => Ok(NextStep::End),
            };
        }

        match self.graph.successor(name) {
            Some(next) => Ok(NextStep::Node(next.to_string())),
            None => Ok(NextStep::End),
        }
    }

    /// Run each label as a concurrent branch of this graph on an independent
    /// branch clone, join all, then merge in label order. Fail-fast: the
    /// first branch error aborts the fan-out and drops unfinished siblings.
    /// Only the merged post-join state is checkpointed, under `origin`.
    async fn fan_out(
        &self,
        labels: Vec<String>,
        mut state: WorkflowState,
        run_id: &RunId,
        origin: &str,
        persist: bool,
    ) -> Result<WorkflowState> {
        let branches: Vec<BoxFuture<'_, Result<WorkflowState>>> = labels
            .iter()
            .map(|label| {
                let branch = state.branch_clone();
                let label = label.clone();
                let fut: BoxFuture<'_, Result<WorkflowState>> = Box::pin(async move {
                    match self.drive(branch, run_id, label, false).await? {
                        Flow::Done(s) => Ok(s),
                        Flow::Paused(_) => Err(TrellisError::Graph(
                            "breakpoint reached inside a parallel branch".to_string(),
                        )),
                    }
                });
                fut
            })
            .collect();

        let finished = try_join_all(branches).await?;
        for branch in finished {
            state.absorb_branch(branch);
        }
        if persist {
            self.save_checkpoint(run_id, origin, &state);
        }
        Ok(state)
    }
}

impl WorkflowRunner for Engine {
    fn run_workflow<'a>(
        &'a self,
        state: WorkflowState,
        run_id: &'a RunId,
        start_at: Option<&'a str>,
    ) -> BoxFuture<'a, Result<WorkflowState>> {
        Box::pin(self.run(state, run_id, start_at))
    }
}

/// Run every child workflow concurrently against independent clones of the
/// state's mutable fields, wait for all, then merge back in slice order
/// (later children overwrite earlier on key collision). Fail-fast on the
/// first child error; unfinished siblings are dropped.
pub async fn run_parallel(
    children: &[Arc<dyn WorkflowRunner>],
    mut state: WorkflowState,
    run_id: &RunId,
) -> Result<WorkflowState> {
    let futures: Vec<_> = children
        .iter()
        .map(|child| child.run_workflow(state.branch_clone(), run_id, None))
        .collect();
    let finished = try_join_all(futures).await?;
    for branch in finished {
        state.absorb_branch(branch);
    }
    Ok(state)
}

fn backoff_delay(attempt: u32, config: &RetryBackoff) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}
