use cadre_core::{CadreResult, ToolCall, ToolResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata describing a tool's interface, as presented to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Name the model uses to call the tool.
    pub name: String,
    /// What the tool does, in the model's terms.
    pub description: String,
    /// JSON schema of the `arguments` object.
    pub parameters_schema: serde_json::Value,
}

impl ToolDescriptor {
    /// Descriptor with a permissive object schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    /// Replace the parameter schema.
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.parameters_schema = schema;
        self
    }
}

/// Who is calling a tool: the session and the worker that owns it.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Session the invocation belongs to.
    pub session_id: Uuid,
    /// Name of the calling worker.
    pub unit: String,
}

impl ToolContext {
    /// Context for `unit` within `session_id`.
    pub fn new(session_id: Uuid, unit: impl Into<String>) -> Self {
        Self {
            session_id,
            unit: unit.into(),
        }
    }
}

/// Trait that all tools implement.
///
/// `invoke` may return `Ok(ToolResult::error(..))` for failures the model can
/// act on (bad arguments) and `Err(..)` for failures of the tool itself
/// (network, auth). Both are reported back to the model by the worker loop.
#[async_trait]
pub trait ToolCapability: Send + Sync {
    /// The tool's interface.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Execute one model-issued call.
    async fn invoke(&self, call: ToolCall, ctx: &ToolContext) -> CadreResult<ToolResult>;
}
