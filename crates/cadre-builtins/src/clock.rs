use async_trait::async_trait;
use cadre_core::{CadreResult, ToolCall, ToolResult};
use cadre_tools::{ToolCapability, ToolContext, ToolDescriptor};
use chrono::{Datelike, Utc};

/// Tool returning the current UTC date and time.
pub struct CurrentTimeTool {
    descriptor: ToolDescriptor,
}

impl CurrentTimeTool {
    /// A new clock tool.
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "current_time",
                "Get the current date and time in UTC.",
            ),
        }
    }
}

impl Default for CurrentTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolCapability for CurrentTimeTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall, _ctx: &ToolContext) -> CadreResult<ToolResult> {
        let now = Utc::now();
        let response = serde_json::json!({
            "utc": now.to_rfc3339(),
            "date": now.format("%Y-%m-%d").to_string(),
            "weekday": now.weekday().to_string(),
        });
        Ok(ToolResult::success(&call.id, response.to_string()))
    }
}
