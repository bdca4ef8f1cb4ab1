use std::collections::HashMap;
use std::sync::Arc;

use trellis_core::error::Result;
use trellis_core::state::WorkflowState;

/// Outcome of a router predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Continue at the named node (subject to path-map translation).
    Next(String),
    /// Fan out into concurrent branches starting at each label.
    FanOut(Vec<String>),
    /// Terminate the run here.
    End,
}

/// Synchronous routing predicate over the current state. Routing is a pure
/// decision; anything that needs to await belongs in a node.
pub type RouterFn = Arc<dyn Fn(&WorkflowState) -> Result<RouteDecision> + Send + Sync>;

/// A runtime-computed transition. When registered for a node it takes
/// precedence over any static edge from that node.
#[derive(Clone)]
pub struct Router {
    pub start: String,
    pub predicate: RouterFn,
    /// Optional translation from predicate labels to node names. Labels
    /// absent from the map pass through unchanged.
    pub path_map: Option<HashMap<String, String>>,
}

impl Router {
    pub fn new<F>(start: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&WorkflowState) -> Result<RouteDecision> + Send + Sync + 'static,
    {
        Self {
            start: start.into(),
            predicate: Arc::new(predicate),
            path_map: None,
        }
    }

    pub fn with_path_map(mut self, map: HashMap<String, String>) -> Self {
        self.path_map = Some(map);
        self
    }

    /// Run the predicate and apply the path map to its labels.
    pub fn decide(&self, state: &WorkflowState) -> Result<RouteDecision> {
        let decision = (self.predicate)(state)?;
        let Some(map) = &self.path_map else {
            return Ok(decision);
        };
        let translate = |label: String| map.get(&label).cloned().unwrap_or(label);
        Ok(match decision {
            RouteDecision::Next(label) => RouteDecision::Next(translate(label)),
            RouteDecision::FanOut(labels) => {
                RouteDecision::FanOut(labels.into_iter().map(translate).collect())
            }
            RouteDecision::End => RouteDecision::End,
        })
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("start", &self.start)
            .field("path_map", &self.path_map)
            .finish_non_exhaustive()
    }
}
