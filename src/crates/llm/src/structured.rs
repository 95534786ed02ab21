//! Schema-validated structured output
//!
//! Structured outputs are modeled as forced tool calls: the caller declares
//! a tool whose parameters are the desired output schema, the model is
//! required to call it, and the arguments are validated against the schema
//! before anything trusts them. A mismatch is a recoverable
//! tool-execution error, never a crash.

use crate::error::{LlmError, Result};
use crate::router::{ModelRouter, TaskClass};
use graph_core::{ChatRequest, Message, ToolDefinition};
use jsonschema::JSONSchema;
use serde_json::Value;
use tracing::debug;

/// Declaration of a structured output: a name and its JSON Schema
#[derive(Debug, Clone)]
pub struct StructuredSpec {
    pub name: String,
    pub schema: Value,
}

impl StructuredSpec {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    fn tool_definition(&self) -> ToolDefinition {
        ToolDefinition::new(&self.name, format!("Produce a {} result", self.name))
            .with_parameters(self.schema.clone())
    }
}

/// Validate a value against a schema, collecting the first few violations.
pub fn validate_against_schema(schema: &Value, instance: &Value) -> std::result::Result<(), String> {
    let compiled = JSONSchema::compile(schema).map_err(|e| format!("invalid schema: {e}"))?;
    let result = compiled.validate(instance);
    match result {
        Ok(()) => Ok(()),
        Err(errors) => {
            let details: Vec<String> = errors.take(3).map(|e| e.to_string()).collect();
            Err(details.join("; "))
        }
    }
}

/// Make a chat call that must return a schema-conforming object.
///
/// Binds the spec as the only tool, forces the model to call it, and
/// validates the returned arguments. Invalid or missing calls surface as
/// [`LlmError::StructuredOutput`] / [`LlmError::MissingToolCall`].
pub async fn structured_call(
    router: &ModelRouter,
    task: TaskClass,
    messages: Vec<Message>,
    spec: &StructuredSpec,
) -> Result<Value> {
    let request = ChatRequest::new(messages)
        .with_tools(vec![spec.tool_definition()])
        .with_tool_choice(&spec.name);

    let response = router.chat(task, request).await?;

    let call = response
        .message
        .tool_calls()
        .iter()
        .find(|c| c.name == spec.name)
        .cloned()
        .ok_or_else(|| LlmError::MissingToolCall {
            tool: spec.name.clone(),
        })?;

    validate_against_schema(&spec.schema, &call.args).map_err(|reason| {
        LlmError::StructuredOutput {
            tool: spec.name.clone(),
            reason,
        }
    })?;

    debug!(tool = %spec.name, "structured output validated");
    Ok(call.args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::ModelChain;
    use async_trait::async_trait;
    use graph_core::{ChatModel, ChatResponse, TokenUsage, ToolCall};
    use serde_json::json;
    use std::sync::Arc;

    fn spec() -> StructuredSpec {
        StructuredSpec::new(
            "classify",
            json!({
                "type": "object",
                "properties": {
                    "internal_reasoning": { "type": "string" },
                    "response": { "type": "string" },
                    "route": { "type": "string", "enum": ["start_planner", "no_op"] }
                },
                "required": ["internal_reasoning", "response", "route"]
            }),
        )
    }

    struct CannedModel {
        args: Value,
        skip_call: bool,
    }

    #[async_trait]
    impl ChatModel for CannedModel {
        async fn chat(&self, request: ChatRequest) -> graph_core::Result<ChatResponse> {
            assert_eq!(request.config.tool_choice.as_deref(), Some("classify"));
            let message = if self.skip_call {
                Message::ai("no tool call here")
            } else {
                Message::ai("").with_tool_calls(vec![ToolCall::new("classify", self.args.clone())])
            };
            Ok(ChatResponse::new(message, TokenUsage::default(), "canned"))
        }

        fn model_key(&self) -> &str {
            "canned"
        }
    }

    fn router_with(model: CannedModel) -> ModelRouter {
        ModelRouter::new().with_chain(TaskClass::Router, ModelChain::new(Arc::new(model)))
    }

    #[tokio::test]
    async fn valid_output_is_returned() {
        let router = router_with(CannedModel {
            args: json!({
                "internal_reasoning": "fresh request",
                "response": "Starting the planner.",
                "route": "start_planner"
            }),
            skip_call: false,
        });

        let value = structured_call(&router, TaskClass::Router, vec![Message::human("go")], &spec())
            .await
            .unwrap();
        assert_eq!(value["route"], json!("start_planner"));
    }

    #[tokio::test]
    async fn schema_violation_is_a_recoverable_error() {
        let router = router_with(CannedModel {
            args: json!({ "route": "not_in_enum" }),
            skip_call: false,
        });

        let err = structured_call(&router, TaskClass::Router, vec![Message::human("go")], &spec())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::StructuredOutput { .. }));
    }

    #[tokio::test]
    async fn missing_tool_call_is_reported() {
        let router = router_with(CannedModel {
            args: json!({}),
            skip_call: true,
        });

        let err = structured_call(&router, TaskClass::Router, vec![Message::human("go")], &spec())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MissingToolCall { .. }));
    }
}
