//! High-level graph construction API
//!
//! [`GraphBuilder`] assembles nodes, edges, and a state schema into a
//! validated [`Graph`]. The builder mirrors the shape of the runtime model:
//! one outgoing edge per node (direct or conditional), plus per-node `ends`
//! declarations for Command-driven jumps.
//!
//! ```rust
//! use graph_core::builder::GraphBuilder;
//! use graph_core::command::NodeOutcome;
//! use graph_core::graph::{END, START};
//! use graph_core::state::StateSchema;
//! use serde_json::json;
//!
//! let graph = GraphBuilder::new("counter", StateSchema::new().field("count", json!(0)))
//!     .add_node("bump", |state, _ctx| {
//!         Box::pin(async move {
//!             let count = state["count"].as_i64().unwrap_or(0);
//!             Ok(NodeOutcome::update_json(json!({ "count": count + 1 })))
//!         })
//!     })
//!     .add_edge(START, "bump")
//!     .add_edge("bump", END)
//!     .compile()
//!     .unwrap();
//!
//! assert_eq!(graph.nodes.len(), 1);
//! ```

use crate::error::Result;
use crate::graph::{Edge, Graph, NodeFn, NodeFuture, NodeSpec, RouterFn, START};
use crate::runtime::RunContext;
use crate::state::StateSchema;
use graph_store::StateMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Builder for [`Graph`]
pub struct GraphBuilder {
    id: String,
    schema: StateSchema,
    nodes: HashMap<String, NodeSpec>,
    edges: HashMap<String, Edge>,
    entry: Option<String>,
}

impl GraphBuilder {
    pub fn new(id: impl Into<String>, schema: StateSchema) -> Self {
        Self {
            id: id.into(),
            schema,
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
        }
    }

    /// Add a node with no Command targets
    pub fn add_node<F>(self, name: &str, executor: F) -> Self
    where
        F: Fn(StateMap, RunContext) -> NodeFuture + Send + Sync + 'static,
    {
        self.add_node_with_ends(name, Vec::new(), executor)
    }

    /// Add a node declaring the targets it may jump to via Command
    pub fn add_node_with_ends<F>(mut self, name: &str, ends: Vec<&str>, executor: F) -> Self
    where
        F: Fn(StateMap, RunContext) -> NodeFuture + Send + Sync + 'static,
    {
        let spec = NodeSpec {
            name: name.to_string(),
            executor: Arc::new(executor) as NodeFn,
            ends: ends.into_iter().map(str::to_string).collect(),
        };
        self.nodes.insert(name.to_string(), spec);
        self
    }

    /// Add a direct edge `from -> to`
    pub fn add_edge(mut self, from: &str, to: &str) -> Self {
        if from == START && self.entry.is_none() {
            self.entry = Some(to.to_string());
        }
        self.edges.insert(from.to_string(), Edge::Direct(to.to_string()));
        self
    }

    /// Add a conditional edge; the router's branch key selects the target
    pub fn add_conditional_edge<F>(
        mut self,
        from: &str,
        router: F,
        branches: &[(&str, &str)],
    ) -> Self
    where
        F: Fn(&StateMap) -> String + Send + Sync + 'static,
    {
        self.edges.insert(
            from.to_string(),
            Edge::Conditional {
                router: Arc::new(router) as RouterFn,
                branches: branches
                    .iter()
                    .map(|(key, to)| (key.to_string(), to.to_string()))
                    .collect(),
            },
        );
        self
    }

    /// Override the entry node (defaults to the target of the START edge)
    pub fn set_entry(mut self, node: &str) -> Self {
        self.entry = Some(node.to_string());
        self
    }

    /// Validate and produce the graph
    pub fn compile(self) -> Result<Graph> {
        let entry = self.entry.unwrap_or_else(|| START.to_string());
        let graph = Graph {
            id: self.id,
            schema: self.schema,
            nodes: self.nodes,
            edges: self.edges,
            entry,
        };
        graph.validate()?;
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::NodeOutcome;
    use crate::graph::END;
    use serde_json::json;

    fn noop() -> impl Fn(StateMap, RunContext) -> NodeFuture + Send + Sync {
        |_state, _ctx| Box::pin(async { Ok(NodeOutcome::empty()) })
    }

    #[test]
    fn start_edge_sets_entry() {
        let graph = GraphBuilder::new("g", StateSchema::new())
            .add_node("a", noop())
            .add_edge(START, "a")
            .add_edge("a", END)
            .compile()
            .unwrap();
        assert_eq!(graph.entry, "a");
    }

    #[test]
    fn dangling_edge_fails_validation() {
        let err = GraphBuilder::new("g", StateSchema::new())
            .add_node("a", noop())
            .add_edge(START, "a")
            .add_edge("a", "missing")
            .compile()
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn conditional_branch_targets_are_validated() {
        let err = GraphBuilder::new("g", StateSchema::new())
            .add_node("a", noop())
            .add_edge(START, "a")
            .add_conditional_edge(
                "a",
                |_state| "yes".to_string(),
                &[("yes", "nowhere"), ("no", END)],
            )
            .compile()
            .unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn unknown_ends_fail_validation() {
        let err = GraphBuilder::new("g", StateSchema::new())
            .add_node_with_ends("a", vec!["ghost"], noop())
            .add_edge(START, "a")
            .add_edge("a", END)
            .compile()
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn router_may_return_node_names_directly() {
        let graph = GraphBuilder::new("g", StateSchema::new().field("flag", json!(false)))
            .add_node("a", noop())
            .add_node("b", noop())
            .add_edge(START, "a")
            .add_conditional_edge("a", |_state| "b".to_string(), &[("b", "b")])
            .add_edge("b", END)
            .compile()
            .unwrap();

        let next = graph.next_node("a", &StateMap::new()).unwrap();
        assert_eq!(next, "b");
    }
}
