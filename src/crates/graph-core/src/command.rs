//! Node outcomes and dynamic control flow
//!
//! A node finishes in one of three ways: a plain state [`NodeOutcome::Update`]
//! (the static or conditional edge decides what runs next), a
//! [`Command`] that overrides the edge with an explicit `goto`, or an
//! [`NodeOutcome::Interrupt`] that suspends the run until a human responds.

use crate::graph::{NodeId, END};
use graph_store::StateMap;
use serde_json::Value;

/// Explicit navigation target for a [`Command`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Goto {
    Node(NodeId),
    End,
}

impl Goto {
    pub fn as_node_id(&self) -> NodeId {
        match self {
            Goto::Node(id) => id.clone(),
            Goto::End => END.to_string(),
        }
    }
}

impl From<&str> for Goto {
    fn from(node: &str) -> Self {
        if node == END {
            Goto::End
        } else {
            Goto::Node(node.to_string())
        }
    }
}

/// State update plus an edge override, returned by a node
#[derive(Debug, Clone, Default)]
pub struct Command {
    pub update: Option<StateMap>,
    pub goto: Option<Goto>,
}

impl Command {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_update(mut self, update: StateMap) -> Self {
        self.update = Some(update);
        self
    }

    pub fn with_goto(mut self, goto: impl Into<Goto>) -> Self {
        self.goto = Some(goto.into());
        self
    }

    /// Command that terminates the run after merging `update`
    pub fn end(update: StateMap) -> Self {
        Self {
            update: Some(update),
            goto: Some(Goto::End),
        }
    }
}

/// Result of one node execution
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    /// Merge this update and follow the graph's edges
    Update(StateMap),

    /// Merge the command's update and jump to its `goto` target
    Command(Command),

    /// Suspend the run; `payload` is surfaced to the human and the node is
    /// replayed with the response available once resumed
    Interrupt(Value),
}

impl NodeOutcome {
    /// Empty update: state unchanged, follow edges
    pub fn empty() -> Self {
        NodeOutcome::Update(StateMap::new())
    }

    /// Build an update outcome from a `json!({...})` object literal.
    ///
    /// Non-object values produce an empty update.
    pub fn update_json(value: Value) -> Self {
        NodeOutcome::Update(into_update(value))
    }

    pub fn goto(node: &str, update: Value) -> Self {
        NodeOutcome::Command(Command::new().with_update(into_update(update)).with_goto(node))
    }
}

/// Convert a `json!({...})` literal into a state update map.
pub fn into_update(value: Value) -> StateMap {
    match value {
        Value::Object(map) => map,
        _ => StateMap::new(),
    }
}
