use serde::{Deserialize, Serialize};

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Id the model assigned; echoed back in the [`ToolResult`].
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Arguments object.
    pub arguments: serde_json::Value,
}

/// What a tool returned for one [`ToolCall`].
///
/// `is_error` results go back to the model like any other; the loop does not
/// abort on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the originating call.
    pub call_id: String,
    /// Output text.
    pub content: String,
    /// Set when the tool reported a failure.
    pub is_error: bool,
}

impl ToolResult {
    /// A successful result.
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_flag(call_id, content, false)
    }

    /// A failed result.
    pub fn error(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_flag(call_id, content, true)
    }

    fn with_flag(call_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error,
        }
    }
}
