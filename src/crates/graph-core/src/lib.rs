//! # graph-core
//!
//! Typed state graph execution for the patchwork agent orchestrator.
//!
//! A graph is a directed set of effectful nodes over a shared, persisted
//! state. Nodes return updates merged by per-field reducers, `Command`s that
//! override edges, or interrupts that suspend the run for human input.
//!
//! ```text
//!  START ──► node A ──► node B ──?──► node C ──► END
//!              │          │conditional   │
//!              ▼          ▼              ▼
//!        update merged  router(state)  interrupt(payload)
//!        + committed    picks branch   suspends thread
//! ```
//!
//! Core pieces:
//!
//! - [`StateSchema`] / [`Reducer`] - per-field merge semantics (replace,
//!   id-merge for messages, object union)
//! - [`GraphBuilder`] / [`Graph`] - construction and validation
//! - [`GraphRuntime`] - execution: per-node persistence to a
//!   [`ThreadStore`](graph_store::ThreadStore), FIFO serialization per
//!   thread, recursion limit, cancellation at node boundaries,
//!   interrupt/resume, and fire-and-forget sub-graph dispatch
//! - [`llm`] - the narrow chat-model seam agents consume

pub mod builder;
pub mod command;
pub mod error;
pub mod graph;
pub mod llm;
pub mod messages;
pub mod runtime;
pub mod state;

pub use builder::GraphBuilder;
pub use command::{into_update, Command, Goto, NodeOutcome};
pub use error::{GraphError, Result};
pub use graph::{Edge, Graph, NodeFn, NodeFuture, NodeId, NodeSpec, RouterFn, END, START};
pub use llm::{ChatConfig, ChatModel, ChatRequest, ChatResponse, TokenUsage, ToolDefinition};
pub use messages::{
    add_messages, filter_by_role, get_last_message, last_ai_message, messages_from_value, Message,
    MessageRole, RemoveMessage, ToolCall,
};
pub use runtime::{
    GraphRuntime, RunConfig, RunContext, RunDispatcher, RunOutcome, StartRun,
    DEFAULT_RECURSION_LIMIT,
};
pub use state::{
    AddMessagesReducer, FieldSpec, MergeReducer, Reducer, ReplaceReducer, StateSchema,
};

pub use graph_store::{
    InMemoryThreadStore, PendingInterrupt, RunHandle, RunStatus, StateMap, ThreadSnapshot,
    ThreadStore,
};
