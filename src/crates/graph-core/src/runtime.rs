//! Graph runtime: registry, run dispatch, and the execution loop
//!
//! [`GraphRuntime`] owns the registered graphs, the thread store, and the
//! per-thread run queue. A run walks the graph from its entry (or a named
//! start node), invokes each node with a state snapshot, merges the returned
//! update through the schema's reducers, and commits to the store before
//! following edges. Suspension (`interrupt`), resume, cancellation, and the
//! recursion limit all land at node boundaries.
//!
//! Sub-graph invocation is message-passing: a node calls
//! [`RunContext::start_run`] with a [`StartRun`] request, records the
//! returned `(thread_id, run_id)`, and terminates. The child writes its own
//! state to the shared store; the parent never awaits it.

use crate::command::NodeOutcome;
use crate::error::{GraphError, Result};
use crate::graph::{Graph, NodeId, END, START};
use async_trait::async_trait;
use graph_store::{
    PendingInterrupt, RunHandle, RunStatus, StateMap, StoreError, ThreadSnapshot, ThreadStore,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default number of node executions allowed per run
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// Per-run execution settings
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Maximum node executions before the run fails
    pub recursion_limit: usize,

    /// Free-form per-run configuration readable by nodes
    pub configurable: Value,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            configurable: Value::Object(serde_json::Map::new()),
        }
    }
}

impl RunConfig {
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_configurable(mut self, configurable: Value) -> Self {
        self.configurable = configurable;
        self
    }
}

/// Request to start a run, possibly on another graph or thread
#[derive(Debug, Clone)]
pub struct StartRun {
    pub graph_id: String,

    /// Target thread; `None` allocates a fresh one
    pub thread_id: Option<Uuid>,

    /// Named start node; `None` uses the graph entry
    pub start_node: Option<NodeId>,

    /// Initial state update merged before the first node runs
    pub update: StateMap,

    pub config: RunConfig,
}

impl StartRun {
    pub fn new(graph_id: impl Into<String>) -> Self {
        Self {
            graph_id: graph_id.into(),
            thread_id: None,
            start_node: None,
            update: StateMap::new(),
            config: RunConfig::default(),
        }
    }

    pub fn on_thread(mut self, thread_id: Uuid) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn at_node(mut self, node: impl Into<NodeId>) -> Self {
        self.start_node = Some(node.into());
        self
    }

    pub fn with_update(mut self, update: StateMap) -> Self {
        self.update = update;
        self
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }
}

/// Launches runs without awaiting them
///
/// The in-tree implementation dispatches onto detached tokio tasks; external
/// process pools implement the same trait.
#[async_trait]
pub trait RunDispatcher: Send + Sync {
    async fn start_run(&self, request: StartRun) -> Result<RunHandle>;
}

/// Per-node execution context handed to node executors
#[derive(Clone)]
pub struct RunContext {
    pub thread_id: Uuid,
    pub run_id: Uuid,
    pub graph_id: String,
    pub node: NodeId,
    resume: Option<Value>,
    configurable: Arc<Value>,
    dispatcher: Option<Arc<dyn RunDispatcher>>,
}

impl RunContext {
    /// Human response from a resumed interrupt, present only when this node
    /// is being replayed after `resume`.
    pub fn resume_value(&self) -> Option<&Value> {
        self.resume.as_ref()
    }

    /// Per-run configuration value by key.
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.configurable.get(key)
    }

    /// Launch another run (same or different graph/thread) without awaiting
    /// it. Returns the child's handle for record-keeping.
    pub async fn start_run(&self, request: StartRun) -> Result<RunHandle> {
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.start_run(request).await,
            None => Err(GraphError::Custom(
                "no run dispatcher available in this context".into(),
            )),
        }
    }

    /// Build a detached context for tests and standalone node invocations.
    pub fn detached(graph_id: impl Into<String>, node: impl Into<NodeId>) -> Self {
        Self {
            thread_id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            graph_id: graph_id.into(),
            node: node.into(),
            resume: None,
            configurable: Arc::new(Value::Object(serde_json::Map::new())),
            dispatcher: None,
        }
    }

    /// Copy of this context with a resume value, for tests.
    pub fn with_resume(mut self, value: Value) -> Self {
        self.resume = Some(value);
        self
    }
}

/// Final state of a finished (or suspended) run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub handle: RunHandle,
    pub snapshot: ThreadSnapshot,
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        self.snapshot.status
    }
}

struct RuntimeInner {
    graphs: RwLock<HashMap<String, Arc<Graph>>>,
    store: Arc<dyn ThreadStore>,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

/// The graph executor
///
/// Cheap to clone; all clones share the registry, store, and run queue.
#[derive(Clone)]
pub struct GraphRuntime {
    inner: Arc<RuntimeInner>,
}

impl GraphRuntime {
    pub fn new(store: Arc<dyn ThreadStore>) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                graphs: RwLock::new(HashMap::new()),
                store,
                locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a compiled graph under its id.
    pub fn register(&self, graph: Graph) {
        let mut graphs = self.inner.graphs.write().unwrap_or_else(|e| e.into_inner());
        graphs.insert(graph.id.clone(), Arc::new(graph));
    }

    pub fn graph(&self, id: &str) -> Result<Arc<Graph>> {
        let graphs = self.inner.graphs.read().unwrap_or_else(|e| e.into_inner());
        graphs
            .get(id)
            .cloned()
            .ok_or_else(|| GraphError::UnknownGraph(id.to_string()))
    }

    pub fn store(&self) -> Arc<dyn ThreadStore> {
        self.inner.store.clone()
    }

    /// Current run status of a thread; `NotStarted` for unknown threads.
    pub async fn thread_status(&self, thread_id: Uuid) -> RunStatus {
        match self.inner.store.get(thread_id).await {
            Ok(snapshot) => snapshot.status,
            Err(_) => RunStatus::NotStarted,
        }
    }

    /// Run a graph to completion (or first interrupt) and await the result.
    pub async fn invoke(&self, request: StartRun) -> Result<RunOutcome> {
        let graph = self.graph(&request.graph_id)?;
        let thread_id = request.thread_id.unwrap_or_else(Uuid::new_v4);
        let mut handle = RunHandle::new(thread_id, graph.id.clone());

        let snapshot = self
            .run_loop(
                graph,
                thread_id,
                handle.run_id,
                request.start_node,
                request.update,
                request.config,
            )
            .await?;
        handle.status = snapshot.status;
        Ok(RunOutcome { handle, snapshot })
    }

    /// Resume an interrupted thread with a human response.
    ///
    /// A resume racing a cancellation is a no-op.
    pub async fn resume(&self, thread_id: Uuid, response: Value) -> Result<RunOutcome> {
        let snapshot = self.inner.store.get(thread_id).await?;
        if snapshot.cancel_requested || snapshot.status == RunStatus::Cancelled {
            info!(thread = %thread_id, "resume ignored: thread cancelled");
            let mut handle = RunHandle::new(thread_id, "");
            handle.status = snapshot.status;
            return Ok(RunOutcome { handle, snapshot });
        }
        let interrupt = snapshot
            .pending_interrupt
            .clone()
            .ok_or(StoreError::NoPendingInterrupt { thread_id })?;

        self.inner.store.resume(thread_id, response).await?;
        let graph = self.graph(&interrupt.graph_id)?;
        let mut handle = RunHandle::new(thread_id, graph.id.clone());

        let snapshot = self
            .run_loop(
                graph,
                thread_id,
                handle.run_id,
                Some(interrupt.node),
                StateMap::new(),
                RunConfig::default(),
            )
            .await?;
        handle.status = snapshot.status;
        Ok(RunOutcome { handle, snapshot })
    }

    /// Request cancellation of the active run on a thread.
    pub async fn cancel(&self, thread_id: Uuid) -> Result<()> {
        self.inner.store.cancel(thread_id).await?;
        Ok(())
    }

    fn thread_lock(&self, thread_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.inner.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(thread_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Commit a node update with CAS retry.
    ///
    /// On a version conflict (an out-of-band resume or cancel bumped the
    /// thread) the latest snapshot is re-read and the update re-merged, so
    /// out-of-band writes are never lost.
    async fn commit_update(
        &self,
        graph: &Graph,
        base: ThreadSnapshot,
        update: &StateMap,
        status: RunStatus,
    ) -> Result<ThreadSnapshot> {
        let mut base = base;
        loop {
            let merged = graph.schema.apply(base.values.clone(), update.clone())?;
            match self
                .inner
                .store
                .update(base.thread_id, base.version, merged, status)
                .await
            {
                Ok(snapshot) => return Ok(snapshot),
                Err(StoreError::VersionConflict { .. }) => {
                    base = self.inner.store.get(base.thread_id).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn commit_interrupt(
        &self,
        thread_id: Uuid,
        base: ThreadSnapshot,
        interrupt: PendingInterrupt,
    ) -> Result<ThreadSnapshot> {
        let mut base = base;
        loop {
            match self
                .inner
                .store
                .interrupt(thread_id, base.version, base.values.clone(), interrupt.clone())
                .await
            {
                Ok(snapshot) => return Ok(snapshot),
                Err(StoreError::VersionConflict { .. }) => {
                    base = self.inner.store.get(thread_id).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn run_loop(
        &self,
        graph: Arc<Graph>,
        thread_id: Uuid,
        run_id: Uuid,
        start_node: Option<NodeId>,
        initial_update: StateMap,
        config: RunConfig,
    ) -> Result<ThreadSnapshot> {
        // Concurrent runs on one thread serialize FIFO behind this lock;
        // runs on different threads proceed in parallel.
        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().await;

        let mut snapshot = match self.inner.store.get(thread_id).await {
            Ok(snapshot) => snapshot,
            Err(StoreError::ThreadNotFound(_)) => {
                self.inner
                    .store
                    .create(Some(thread_id), graph.schema.defaults())
                    .await?
            }
            Err(e) => return Err(e.into()),
        };

        let mut resume = self.inner.store.take_resume(thread_id).await?;
        let configurable = Arc::new(config.configurable.clone());

        snapshot = self
            .commit_update(&graph, snapshot, &initial_update, RunStatus::Busy)
            .await?;

        let mut current = start_node.unwrap_or_else(|| graph.entry.clone());
        if current == START {
            current = graph.next_node(START, &snapshot.values)?;
        }
        let mut steps: usize = 0;

        info!(graph = %graph.id, thread = %thread_id, run = %run_id, start = %current, "run started");

        loop {
            if current == END {
                snapshot = self
                    .commit_update(&graph, snapshot, &StateMap::new(), RunStatus::Idle)
                    .await?;
                info!(graph = %graph.id, thread = %thread_id, run = %run_id, "run completed");
                return Ok(snapshot);
            }

            steps += 1;
            if steps > config.recursion_limit {
                let _ = self
                    .commit_update(&graph, snapshot, &StateMap::new(), RunStatus::Error)
                    .await;
                return Err(GraphError::RecursionLimit {
                    limit: config.recursion_limit,
                    node: current,
                });
            }

            let node = graph
                .nodes
                .get(&current)
                .ok_or_else(|| GraphError::UnknownNode(current.clone()))?;

            let ctx = RunContext {
                thread_id,
                run_id,
                graph_id: graph.id.clone(),
                node: current.clone(),
                resume: resume.take(),
                configurable: configurable.clone(),
                dispatcher: Some(Arc::new(self.clone())),
            };

            debug!(graph = %graph.id, node = %current, thread = %thread_id, "executing node");
            let outcome = match (node.executor)(snapshot.values.clone(), ctx).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(graph = %graph.id, node = %current, error = %e, "node failed");
                    let _ = self
                        .commit_update(&graph, snapshot, &StateMap::new(), RunStatus::Error)
                        .await;
                    return Err(GraphError::node_execution(current, e.to_string()));
                }
            };

            let (update, goto) = match outcome {
                NodeOutcome::Update(update) => (update, None),
                NodeOutcome::Command(command) => {
                    (command.update.unwrap_or_default(), command.goto)
                }
                NodeOutcome::Interrupt(payload) => {
                    info!(graph = %graph.id, node = %current, thread = %thread_id, "run interrupted");
                    return self
                        .commit_interrupt(
                            thread_id,
                            snapshot,
                            PendingInterrupt::new(graph.id.clone(), current, payload),
                        )
                        .await;
                }
            };

            snapshot = self
                .commit_update(&graph, snapshot, &update, RunStatus::Busy)
                .await?;

            if snapshot.cancel_requested {
                snapshot = self
                    .commit_update(&graph, snapshot, &StateMap::new(), RunStatus::Cancelled)
                    .await?;
                self.inner.store.clear_cancel(thread_id).await?;
                info!(graph = %graph.id, thread = %thread_id, run = %run_id, "run cancelled");
                return Ok(snapshot);
            }

            current = match goto {
                Some(goto) => goto.as_node_id(),
                None => graph.next_node(&current, &snapshot.values)?,
            };
        }
    }
}

#[async_trait]
impl RunDispatcher for GraphRuntime {
    /// Fire-and-forget dispatch onto a detached task.
    ///
    /// The thread is created eagerly so callers can observe it before the
    /// child run commits anything.
    async fn start_run(&self, request: StartRun) -> Result<RunHandle> {
        let graph = self.graph(&request.graph_id)?;
        let thread_id = request.thread_id.unwrap_or_else(Uuid::new_v4);

        if let Err(StoreError::ThreadNotFound(_)) = self.inner.store.get(thread_id).await {
            self.inner
                .store
                .create(Some(thread_id), graph.schema.defaults())
                .await?;
        }

        let handle = RunHandle::new(thread_id, graph.id.clone());
        let runtime = self.clone();
        let run_id = handle.run_id;
        let start_node = request.start_node;
        let update = request.update;
        let config = request.config;

        tokio::spawn(async move {
            if let Err(e) = runtime
                .run_loop(graph, thread_id, run_id, start_node, update, config)
                .await
            {
                warn!(thread = %thread_id, run = %run_id, error = %e, "detached run failed");
            }
        });

        Ok(handle)
    }
}
