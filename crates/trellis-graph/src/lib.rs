//! Workflow graph model: nodes, edges, routers, and the two-phase builder
//! that validates them into an immutable [`CompiledGraph`].

pub mod builder;
pub mod edge;
pub mod node;
pub mod router;

pub use builder::{CompiledGraph, GraphBuilder};
pub use edge::Edge;
pub use node::{Node, NodeFn, NodeKind, NodeOutput, NodeWork};
pub use router::{RouteDecision, Router, RouterFn};
