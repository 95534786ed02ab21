//! Scratchpad and technical notes tools

use crate::error::ToolError;
use crate::registry::{Tool, ToolContext, ToolOutcome};
use graph_core::StateMap;
use serde_json::{json, Value};

/// `scratchpad` - append a working note to the thread
pub fn scratchpad_tool() -> Tool {
    Tool::new(
        "scratchpad",
        "Append a note to your scratchpad. Use for observations you will need later in this session.",
        json!({
            "type": "object",
            "properties": {
                "content": { "type": "string" }
            },
            "required": ["content"]
        }),
        |args, ctx| {
            Box::pin(async move {
                let content = args
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::invalid_args("scratchpad", "missing 'content'"))?;

                let mut notes: Vec<Value> = ctx
                    .state_value("scratchpad")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                notes.push(json!(content));

                let count = notes.len();
                let mut updates = StateMap::new();
                updates.insert("scratchpad".into(), Value::Array(notes));
                Ok(
                    ToolOutcome::success(format!("Noted ({count} entries)"))
                        .with_state_updates(updates),
                )
            })
        },
    )
}

/// `write_technical_notes` - store distilled context notes
pub fn write_technical_notes_tool() -> Tool {
    Tool::new(
        "write_technical_notes",
        "Store distilled technical notes about the codebase for later steps. Overwrites previous notes.",
        json!({
            "type": "object",
            "properties": {
                "notes": { "type": "string" }
            },
            "required": ["notes"]
        }),
        |args, _ctx| {
            Box::pin(async move {
                let notes = args
                    .get("notes")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ToolError::invalid_args("write_technical_notes", "missing 'notes'")
                    })?;

                let mut updates = StateMap::new();
                updates.insert("technical_notes".into(), json!(notes));
                Ok(ToolOutcome::success("Notes saved").with_state_updates(updates))
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ExecBackend;

    #[tokio::test]
    async fn scratchpad_appends_to_existing_entries() {
        let mut state = StateMap::new();
        state.insert("scratchpad".into(), json!(["first"]));
        let ctx = ToolContext::new(state, ExecBackend::local("/tmp"));

        let outcome = scratchpad_tool()
            .execute(json!({"content": "second"}), ctx)
            .await
            .unwrap();
        let updates = outcome.state_updates.unwrap();
        assert_eq!(updates["scratchpad"], json!(["first", "second"]));
    }

    #[tokio::test]
    async fn technical_notes_overwrite() {
        let ctx = ToolContext::new(StateMap::new(), ExecBackend::local("/tmp"));
        let outcome = write_technical_notes_tool()
            .execute(json!({"notes": "uses tokio"}), ctx)
            .await
            .unwrap();
        assert_eq!(
            outcome.state_updates.unwrap()["technical_notes"],
            json!("uses tokio")
        );
    }
}
