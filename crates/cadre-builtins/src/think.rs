use async_trait::async_trait;
use cadre_core::{CadreResult, ToolCall, ToolResult};
use cadre_memory::{Memory, MemoryEvent};
use cadre_tools::{ToolCapability, ToolContext, ToolDescriptor};
use tracing::debug;

/// Scratchpad tool: the model writes down a reasoning step before acting.
///
/// The thought is appended to the session event log as a note, so later
/// units see it in their history window.
pub struct ThinkTool {
    descriptor: ToolDescriptor,
    memory: Memory,
}

impl ThinkTool {
    /// A think tool recording into `memory`.
    pub fn new(memory: Memory) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "think",
                "Use this tool to think through a problem step by step before answering \
                 or calling another tool. The thought is recorded but has no other effect.",
            )
            .with_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "thought": {
                        "type": "string",
                        "description": "Your reasoning for this step"
                    }
                },
                "required": ["thought"]
            })),
            memory,
        }
    }
}

#[async_trait]
impl ToolCapability for ThinkTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall, ctx: &ToolContext) -> CadreResult<ToolResult> {
        let thought = call.arguments["thought"].as_str().unwrap_or_default().trim();
        if thought.is_empty() {
            return Ok(ToolResult::error(&call.id, "Thought cannot be empty"));
        }

        debug!(unit = %ctx.unit, session_id = %ctx.session_id, "Recorded thought");
        self.memory
            .record(
                ctx.session_id,
                &ctx.unit,
                MemoryEvent::Note {
                    content: thought.to_string(),
                },
            )
            .await?;

        Ok(ToolResult::success(&call.id, format!("Thought: {thought}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn thought_lands_in_event_log() {
        let memory = Memory::in_memory();
        let tool = ThinkTool::new(memory.clone());
        let ctx = ToolContext::new(Uuid::new_v4(), "Copywriter");

        let result = tool
            .invoke(
                ToolCall {
                    id: "1".into(),
                    name: "think".into(),
                    arguments: serde_json::json!({"thought": "CFOs care about cash flow"}),
                },
                &ctx,
            )
            .await
            .unwrap();
        assert!(!result.is_error);
        assert!(result.content.contains("cash flow"));

        let events = memory.events(ctx.session_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].unit, "Copywriter");
    }

    #[tokio::test]
    async fn blank_thought_is_rejected() {
        let tool = ThinkTool::new(Memory::in_memory());
        let result = tool
            .invoke(
                ToolCall {
                    id: "1".into(),
                    name: "think".into(),
                    arguments: serde_json::json!({"thought": "  "}),
                },
                &ToolContext::new(Uuid::new_v4(), "w"),
            )
            .await
            .unwrap();
        assert!(result.is_error);
    }
}
