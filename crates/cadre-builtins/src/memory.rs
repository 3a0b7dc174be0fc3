use async_trait::async_trait;
use cadre_core::{CadreResult, ToolCall, ToolResult};
use cadre_memory::Memory;
use cadre_tools::{ToolCapability, ToolContext, ToolDescriptor};
use std::collections::HashMap;

const MAX_TOP_K: u64 = 20;

/// Tool that stores text in the session's long-term memory.
pub struct MemoryStoreTool {
    descriptor: ToolDescriptor,
    memory: Memory,
}

impl MemoryStoreTool {
    /// A store tool writing into `memory`.
    pub fn new(memory: Memory) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "memory_store",
                "Store text in long-term memory for later retrieval. \
                 Use this to save important facts, decisions, or context.",
            )
            .with_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "content": {
                        "type": "string",
                        "description": "The text content to store in memory"
                    },
                    "metadata": {
                        "type": "object",
                        "description": "Optional metadata (tags, source, etc.)",
                        "additionalProperties": true
                    }
                },
                "required": ["content"]
            })),
            memory,
        }
    }
}

#[async_trait]
impl ToolCapability for MemoryStoreTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall, ctx: &ToolContext) -> CadreResult<ToolResult> {
        let content = call.arguments["content"].as_str().unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(ToolResult::error(&call.id, "Content cannot be empty"));
        }

        let mut metadata: HashMap<String, serde_json::Value> = call
            .arguments
            .get("metadata")
            .and_then(|m| serde_json::from_value(m.clone()).ok())
            .unwrap_or_default();
        metadata
            .entry("unit".to_string())
            .or_insert_with(|| serde_json::Value::String(ctx.unit.clone()));

        let id = self.memory.remember(ctx.session_id, content, metadata).await?;

        let response = serde_json::json!({
            "stored": true,
            "id": id.to_string(),
            "content_length": content.len(),
        });
        Ok(ToolResult::success(&call.id, response.to_string()))
    }
}

/// Tool that searches the session's long-term memory.
pub struct MemorySearchTool {
    descriptor: ToolDescriptor,
    memory: Memory,
}

impl MemorySearchTool {
    /// A search tool reading from `memory`.
    pub fn new(memory: Memory) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "memory_search",
                "Search long-term memory for relevant past information. \
                 Returns the most similar stored memories.",
            )
            .with_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query text"
                    },
                    "top_k": {
                        "type": "integer",
                        "description": "Number of results to return (default: 5, max: 20)",
                        "default": 5
                    }
                },
                "required": ["query"]
            })),
            memory,
        }
    }
}

#[async_trait]
impl ToolCapability for MemorySearchTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall, ctx: &ToolContext) -> CadreResult<ToolResult> {
        let query = call.arguments["query"].as_str().unwrap_or_default();
        if query.trim().is_empty() {
            return Ok(ToolResult::error(&call.id, "Query cannot be empty"));
        }
        let top_k = call.arguments["top_k"]
            .as_u64()
            .unwrap_or(5)
            .clamp(1, MAX_TOP_K) as usize;

        let results = self.memory.recall(ctx.session_id, query, top_k).await?;

        let results_json: Vec<serde_json::Value> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.entry.id.to_string(),
                    "content": r.entry.content,
                    "score": r.score,
                    "metadata": r.entry.metadata,
                    "created_at": r.entry.created_at.to_rfc3339(),
                })
            })
            .collect();

        let response = serde_json::json!({
            "query": query,
            "results": results_json,
            "total": results_json.len(),
        });
        Ok(ToolResult::success(&call.id, response.to_string()))
    }
}
