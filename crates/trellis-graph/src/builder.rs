use std::collections::HashMap;
use std::sync::Arc;

use trellis_core::error::{Result, TrellisError};
use trellis_core::runner::WorkflowRunner;

use crate::edge::Edge;
use crate::node::{Node, NodeKind};
use crate::router::Router;

/// Mutable workflow graph under construction.
///
/// Registration is append-only and cheap; all cross-referencing (edge
/// endpoints, path-map targets, duplicate names) is validated in [`build`],
/// which produces an immutable [`CompiledGraph`].
///
/// [`build`]: GraphBuilder::build
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    routers: Vec<Router>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. A duplicate name is an error; use
    /// [`replace_node`](Self::replace_node) to overwrite deliberately.
    pub fn add_node(mut self, node: Node) -> Result<Self> {
        if self.nodes.iter().any(|n| n.name == node.name) {
            return Err(TrellisError::Graph(format!(
                "node '{}' is already registered",
                node.name
            )));
        }
        self.nodes.push(node);
        Ok(self)
    }

    /// Overwrite an existing node in place, or append if absent.
    pub fn replace_node(mut self, node: Node) -> Self {
        match self.nodes.iter_mut().find(|n| n.name == node.name) {
            Some(slot) => *slot = node,
            None => self.nodes.push(node),
        }
        self
    }

    /// Register a node whose work is a nested workflow engine.
    pub fn add_subgraph(
        self,
        name: impl Into<String>,
        runner: Arc<dyn WorkflowRunner>,
        retries: u32,
    ) -> Result<Self> {
        self.add_node(Node::subgraph(name, runner).with_retries(retries))
    }

    pub fn add_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn add_router(mut self, router: Router) -> Self {
        self.routers.push(router);
        self
    }

    /// Validate and freeze the graph.
    pub fn build(self) -> Result<CompiledGraph> {
        let entry = self
            .nodes
            .first()
            .map(|n| n.name.clone())
            .ok_or_else(|| TrellisError::Graph("graph has no nodes".to_string()))?;

        let mut nodes = HashMap::new();
        for node in self.nodes {
            nodes.insert(node.name.clone(), node);
        }

        for edge in &self.edges {
            for end in [&edge.start, &edge.end] {
                if !nodes.contains_key(end) {
                    return Err(TrellisError::Graph(format!(
                        "edge {} -> {} references unknown node '{}'",
                        edge.start, edge.end, end
                    )));
                }
            }
        }

        // Last edge per start wins as the default successor.
        let mut order = HashMap::new();
        for edge in &self.edges {
            order.insert(edge.start.clone(), edge.end.clone());
        }

        let mut routers: HashMap<String, Router> = HashMap::new();
        for router in self.routers {
            if !nodes.contains_key(&router.start) {
                return Err(TrellisError::Graph(format!(
                    "router registered for unknown node '{}'",
                    router.start
                )));
            }
            if let Some(map) = &router.path_map {
                for target in map.values() {
                    if !nodes.contains_key(target) {
                        return Err(TrellisError::Graph(format!(
                            "router for '{}' maps to unknown node '{}'",
                            router.start, target
                        )));
                    }
                }
            }
            let start = router.start.clone();
            if routers.insert(start.clone(), router).is_some() {
                return Err(TrellisError::Graph(format!(
                    "multiple routers registered for node '{}'",
                    start
                )));
            }
        }

        Ok(CompiledGraph {
            entry,
            nodes,
            edges: self.edges,
            order,
            routers,
        })
    }
}

/// Immutable, validated workflow graph. Holds no per-run state and is freely
/// shared read-only across concurrent runs.
#[derive(Debug)]
pub struct CompiledGraph {
    entry: String,
    nodes: HashMap<String, Node>,
    edges: Vec<Edge>,
    order: HashMap<String, String>,
    routers: HashMap<String, Router>,
}

impl CompiledGraph {
    /// The first node registered.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Default successor of `name` via static edges.
    pub fn successor(&self, name: &str) -> Option<&str> {
        self.order.get(name).map(String::as_str)
    }

    pub fn router(&self, name: &str) -> Option<&Router> {
        self.routers.get(name)
    }

    /// Edges, optionally filtered by start node and/or kind.
    pub fn edges(&self, start: Option<&str>, kind: Option<&str>) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| start.map_or(true, |s| e.start == s))
            .filter(|e| kind.map_or(true, |k| e.kind.as_deref() == Some(k)))
            .collect()
    }

    /// Kind label of the first edge from `from` to `to`, if any.
    pub fn edge_kind(&self, from: &str, to: &str) -> Option<&str> {
        self.edges
            .iter()
            .find(|e| e.start == from && e.end == to)
            .and_then(|e| e.kind.as_deref())
    }

    /// Render the graph in Graphviz DOT format.
    pub fn export_dot(&self) -> String {
        let mut out = String::from("digraph workflow {\n");
        let mut names: Vec<&String> = self.nodes.keys().collect();
        names.sort();
        for name in names {
            let node = &self.nodes[name];
            let shape = match node.kind {
                NodeKind::Breakpoint => "doubleoctagon",
                NodeKind::Subgraph => "box3d",
                NodeKind::Privileged | NodeKind::Quarantined => "diamond",
                _ => "box",
            };
            out.push_str(&format!("    \"{}\" [shape={}];\n", name, shape));
        }
        for edge in &self.edges {
            match &edge.kind {
                Some(kind) => out.push_str(&format!(
                    "    \"{}\" -> \"{}\" [label=\"{}\"];\n",
                    edge.start, edge.end, kind
                )),
                None => out.push_str(&format!("    \"{}\" -> \"{}\";\n", edge.start, edge.end)),
            }
        }
        for router in self.routers.values() {
            if let Some(map) = &router.path_map {
                let mut targets: Vec<&String> = map.values().collect();
                targets.sort();
                targets.dedup();
                for target in targets {
                    out.push_str(&format!(
                        "    \"{}\" -> \"{}\" [style=dashed];\n",
                        router.start, target
                    ));
                }
            }
        }
        out.push_str("}\n");
        out
    }
}
