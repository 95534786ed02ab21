//! Tool definitions for function-calling models

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Description of a callable tool: name, purpose, and JSON Schema parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,

    pub description: String,

    /// JSON Schema object describing the arguments
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn definition_roundtrips() {
        let def = ToolDefinition::new("shell", "Run a shell command").with_parameters(json!({
            "type": "object",
            "properties": {
                "command": { "type": "array", "items": { "type": "string" } },
                "cwd": { "type": "string" }
            },
            "required": ["command"]
        }));

        let value = serde_json::to_value(&def).unwrap();
        let back: ToolDefinition = serde_json::from_value(value).unwrap();
        assert_eq!(back, def);
    }
}
