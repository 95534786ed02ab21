//! Core graph data structures
//!
//! A [`Graph`] is a typed directed graph of effectful nodes. Each node is an
//! async function of `(state, context)` returning a [`NodeOutcome`]; edges
//! are either direct or conditional (a router function over the current
//! state picks the branch). The reserved [`START`] and [`END`] sentinels
//! mark the graph boundary.
//!
//! Graphs are built with [`GraphBuilder`](crate::builder::GraphBuilder) and
//! executed by the [`GraphRuntime`](crate::runtime::GraphRuntime), which
//! persists thread state after every node.

use crate::command::NodeOutcome;
use crate::error::{GraphError, Result};
use crate::runtime::RunContext;
use crate::state::StateSchema;
use graph_store::StateMap;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Node identifier, unique within a graph
pub type NodeId = String;

/// Entry sentinel; executes no logic
pub const START: &str = "__start__";

/// Termination sentinel; reaching it completes the run
pub const END: &str = "__end__";

/// Future returned by a node executor
pub type NodeFuture = Pin<Box<dyn Future<Output = Result<NodeOutcome>> + Send>>;

/// Async node executor: `(state snapshot, run context) -> outcome`
pub type NodeFn = Arc<dyn Fn(StateMap, RunContext) -> NodeFuture + Send + Sync>;

/// Conditional edge router: maps the current state to a branch key
pub type RouterFn = Arc<dyn Fn(&StateMap) -> String + Send + Sync>;

/// A processing unit in the graph
#[derive(Clone)]
pub struct NodeSpec {
    pub name: NodeId,

    pub executor: NodeFn,

    /// Nodes this one may `goto` via a Command, for validation
    pub ends: Vec<NodeId>,
}

impl Debug for NodeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("executor", &"<function>")
            .field("ends", &self.ends)
            .finish()
    }
}

/// Transition between nodes
#[derive(Clone)]
pub enum Edge {
    /// Unconditional transition
    Direct(NodeId),

    /// Router-driven transition; `branches` maps branch keys to targets
    Conditional {
        router: RouterFn,
        branches: HashMap<String, NodeId>,
    },
}

impl Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Direct(to) => f.debug_tuple("Direct").field(to).finish(),
            Edge::Conditional { branches, .. } => f
                .debug_struct("Conditional")
                .field("router", &"<function>")
                .field("branches", branches)
                .finish(),
        }
    }
}

/// A compiled, validated graph
#[derive(Clone)]
pub struct Graph {
    /// Stable identifier used by the runtime registry and sub-graph starts
    pub id: String,

    pub schema: StateSchema,

    pub nodes: HashMap<NodeId, NodeSpec>,

    /// Outgoing edge per node (one edge per source in this model)
    pub edges: HashMap<NodeId, Edge>,

    /// Node executed first when no explicit start node is given
    pub entry: NodeId,
}

impl Graph {
    /// Resolve the node following `from` given the current state.
    pub fn next_node(&self, from: &str, state: &StateMap) -> Result<NodeId> {
        match self.edges.get(from) {
            Some(Edge::Direct(to)) => Ok(to.clone()),
            Some(Edge::Conditional { router, branches }) => {
                let key = router(state);
                // Routers may return a node name directly or a branch key.
                if let Some(target) = branches.get(&key) {
                    Ok(target.clone())
                } else if key == END || self.nodes.contains_key(&key) {
                    Ok(key)
                } else {
                    Err(GraphError::NoRoute {
                        node: format!("{from} (branch '{key}')"),
                    })
                }
            }
            None => Err(GraphError::NoRoute { node: from.into() }),
        }
    }

    /// Structural validation; called by the builder before the graph is
    /// handed to the runtime.
    pub fn validate(&self) -> Result<()> {
        let exists = |node: &str| node == END || self.nodes.contains_key(node);

        if !exists(&self.entry) {
            return Err(GraphError::Validation(format!(
                "entry node '{}' does not exist",
                self.entry
            )));
        }

        for (from, edge) in &self.edges {
            if from != START && !self.nodes.contains_key(from) {
                return Err(GraphError::Validation(format!(
                    "edge source '{from}' does not exist"
                )));
            }
            match edge {
                Edge::Direct(to) => {
                    if !exists(to) {
                        return Err(GraphError::Validation(format!(
                            "edge target '{to}' does not exist"
                        )));
                    }
                }
                Edge::Conditional { branches, .. } => {
                    for to in branches.values() {
                        if !exists(to) {
                            return Err(GraphError::Validation(format!(
                                "branch target '{to}' does not exist"
                            )));
                        }
                    }
                }
            }
        }

        for node in self.nodes.values() {
            for end in &node.ends {
                if !exists(end) {
                    return Err(GraphError::Validation(format!(
                        "node '{}' declares unknown end '{end}'",
                        node.name
                    )));
                }
            }
        }

        Ok(())
    }
}

impl Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("id", &self.id)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .finish()
    }
}
