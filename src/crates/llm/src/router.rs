//! Task-class model selection with fallback chains
//!
//! Every model call in the system goes through [`ModelRouter`]: the caller
//! names a [`TaskClass`], the router picks that class's primary model, and
//! on failure walks the configured fallback chain. Models whose circuit is
//! open are skipped; models in the known-incompatible list have
//! `parallel_tool_calls` stripped from the request. Tool bindings carry
//! over to every fallback unchanged (each [`ChatModel`] implementation
//! converts the neutral tool spec to its provider's format).
//!
//! Chain exhaustion is fatal to the calling run and reports every attempted
//! model key.

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::error::{LlmError, Result};
use graph_core::{ChatModel, ChatRequest, ChatResponse};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The four model roles agents call with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
    /// Request classification and routing decisions
    Router,
    /// Conversation history compaction
    Summarizer,
    /// Plan generation and context gathering
    Planner,
    /// Code-writing tool loops
    Programmer,
}

impl std::fmt::Display for TaskClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskClass::Router => "router",
            TaskClass::Summarizer => "summarizer",
            TaskClass::Planner => "planner",
            TaskClass::Programmer => "programmer",
        };
        f.write_str(name)
    }
}

/// Primary model plus ordered fallbacks for one task class
#[derive(Clone)]
pub struct ModelChain {
    pub primary: Arc<dyn ChatModel>,
    pub fallbacks: Vec<Arc<dyn ChatModel>>,
}

impl ModelChain {
    pub fn new(primary: Arc<dyn ChatModel>) -> Self {
        Self {
            primary,
            fallbacks: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.fallbacks.push(model);
        self
    }

    fn models(&self) -> impl Iterator<Item = &Arc<dyn ChatModel>> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }
}

/// Routes chat requests to models by task class with fault recovery
pub struct ModelRouter {
    chains: HashMap<TaskClass, ModelChain>,
    breaker: CircuitBreaker,
    /// Model keys that reject the `parallel_tool_calls` parameter
    no_parallel_tool_calls: HashSet<String>,
}

impl ModelRouter {
    pub fn new() -> Self {
        Self {
            chains: HashMap::new(),
            breaker: CircuitBreaker::new(BreakerConfig::default()),
            no_parallel_tool_calls: HashSet::new(),
        }
    }

    pub fn with_breaker_config(mut self, config: BreakerConfig) -> Self {
        self.breaker = CircuitBreaker::new(config);
        self
    }

    /// Register the chain serving a task class.
    pub fn with_chain(mut self, task: TaskClass, chain: ModelChain) -> Self {
        self.chains.insert(task, chain);
        self
    }

    /// Mark a model as incompatible with `parallel_tool_calls`.
    pub fn without_parallel_tool_calls(mut self, model_key: impl Into<String>) -> Self {
        self.no_parallel_tool_calls.insert(model_key.into());
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Issue a chat call, falling back through the chain on failure.
    ///
    /// No partial state is committed on exhaustion: the error carries every
    /// attempted model key and the last failure.
    pub async fn chat(&self, task: TaskClass, request: ChatRequest) -> Result<ChatResponse> {
        let chain = self
            .chains
            .get(&task)
            .ok_or_else(|| LlmError::NoChain(task.to_string()))?;

        let mut attempted = Vec::new();
        let mut last_error = String::from("no model was attempted");

        for model in chain.models() {
            let key = model.model_key().to_string();

            if !self.breaker.allows(&key) {
                debug!(model = %key, task = %task, "skipping model: circuit open");
                attempted.push(format!("{key} (skipped: circuit open)"));
                continue;
            }

            let mut request = request.clone();
            if self.no_parallel_tool_calls.contains(&key) {
                request.config.parallel_tool_calls = None;
            }

            debug!(model = %key, task = %task, "attempting model");
            match model.chat(request).await {
                Ok(mut response) => {
                    self.breaker.record_success(&key);
                    if !attempted.is_empty() {
                        info!(model = %key, task = %task, "fallback model answered");
                    }
                    response.model_key = key;
                    return Ok(response);
                }
                Err(e) => {
                    warn!(model = %key, task = %task, error = %e, "model call failed");
                    self.breaker.record_failure(&key);
                    last_error = e.to_string();
                    attempted.push(key);
                }
            }
        }

        Err(LlmError::FallbackExhausted {
            task: task.to_string(),
            attempted,
            last_error,
        })
    }
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use graph_core::{GraphError, Message, TokenUsage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedModel {
        key: String,
        fail: bool,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn ok(key: &str) -> Arc<Self> {
            Arc::new(Self {
                key: key.into(),
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(key: &str) -> Arc<Self> {
            Arc::new(Self {
                key: key.into(),
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(&self, _request: ChatRequest) -> graph_core::Result<ChatResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(GraphError::Model(format!("{} unavailable", self.key)))
            } else {
                Ok(ChatResponse::new(
                    Message::ai("hello"),
                    TokenUsage::new(10, 2),
                    self.key.clone(),
                ))
            }
        }

        fn model_key(&self) -> &str {
            &self.key
        }
    }

    #[tokio::test]
    async fn primary_answers_without_fallback() {
        let primary = ScriptedModel::ok("primary");
        let fallback = ScriptedModel::ok("fallback");
        let router = ModelRouter::new().with_chain(
            TaskClass::Planner,
            ModelChain::new(primary.clone()).with_fallback(fallback.clone()),
        );

        let response = router
            .chat(TaskClass::Planner, ChatRequest::new(vec![Message::human("hi")]))
            .await
            .unwrap();
        assert_eq!(response.model_key, "primary");
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_back_when_primary_fails() {
        let router = ModelRouter::new().with_chain(
            TaskClass::Programmer,
            ModelChain::new(ScriptedModel::failing("p")).with_fallback(ScriptedModel::ok("f")),
        );

        let response = router
            .chat(
                TaskClass::Programmer,
                ChatRequest::new(vec![Message::human("hi")]),
            )
            .await
            .unwrap();
        assert_eq!(response.model_key, "f");
    }

    #[tokio::test]
    async fn exhaustion_names_every_attempted_model() {
        let router = ModelRouter::new().with_chain(
            TaskClass::Router,
            ModelChain::new(ScriptedModel::failing("a"))
                .with_fallback(ScriptedModel::failing("b"))
                .with_fallback(ScriptedModel::failing("c")),
        );

        let err = router
            .chat(TaskClass::Router, ChatRequest::new(vec![Message::human("hi")]))
            .await
            .unwrap_err();
        let message = err.to_string();
        for key in ["a", "b", "c"] {
            assert!(message.contains(key), "missing {key} in: {message}");
        }
    }

    #[tokio::test]
    async fn parallel_tool_calls_stripped_for_incompatible_models() {
        struct AssertingModel;

        #[async_trait]
        impl ChatModel for AssertingModel {
            async fn chat(&self, request: ChatRequest) -> graph_core::Result<ChatResponse> {
                assert!(request.config.parallel_tool_calls.is_none());
                Ok(ChatResponse::new(
                    Message::ai("ok"),
                    TokenUsage::default(),
                    "strict",
                ))
            }

            fn model_key(&self) -> &str {
                "strict"
            }
        }

        let router = ModelRouter::new()
            .with_chain(TaskClass::Router, ModelChain::new(Arc::new(AssertingModel)))
            .without_parallel_tool_calls("strict");

        let request = ChatRequest::new(vec![Message::human("hi")]).with_parallel_tool_calls(true);
        router.chat(TaskClass::Router, request).await.unwrap();
    }

    #[tokio::test]
    async fn open_circuit_skips_model() {
        let flaky = ScriptedModel::failing("flaky");
        let router = ModelRouter::new()
            .with_breaker_config(BreakerConfig {
                failure_threshold: 0.5,
                min_samples: 2,
                window: 4,
                cooldown: std::time::Duration::from_secs(600),
            })
            .with_chain(
                TaskClass::Summarizer,
                ModelChain::new(flaky.clone()).with_fallback(ScriptedModel::ok("stable")),
            );

        // Two failing calls trip the breaker.
        for _ in 0..2 {
            router
                .chat(
                    TaskClass::Summarizer,
                    ChatRequest::new(vec![Message::human("hi")]),
                )
                .await
                .unwrap();
        }
        let calls_before = flaky.calls.load(Ordering::SeqCst);

        router
            .chat(
                TaskClass::Summarizer,
                ChatRequest::new(vec![Message::human("hi")]),
            )
            .await
            .unwrap();
        // Circuit open: the flaky model was not attempted again.
        assert_eq!(flaky.calls.load(Ordering::SeqCst), calls_before);
    }
}
