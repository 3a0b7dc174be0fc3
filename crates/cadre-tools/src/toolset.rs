use crate::capability::{ToolCapability, ToolContext, ToolDescriptor};
use cadre_core::{CadreError, CadreResult, ToolCall, ToolResult};
use tracing::{info, warn};

/// The ordered set of tools owned by one worker.
///
/// Tools are moved into the set, so a tool instance belongs to exactly one
/// worker. Lookup is by name; declaration order is kept for the model.
pub struct ToolSet {
    tools: Vec<Box<dyn ToolCapability>>,
}

impl ToolSet {
    /// An empty tool set.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Add a tool. Names must be unique within a set.
    pub fn add(&mut self, tool: Box<dyn ToolCapability>) -> CadreResult<()> {
        let name = tool.descriptor().name.clone();
        if self.get(&name).is_some() {
            return Err(CadreError::Config(format!(
                "Tool '{name}' declared twice in one tool set"
            )));
        }
        info!(tool = %name, "Registered tool");
        self.tools.push(tool);
        Ok(())
    }

    /// Builder-style [`add`](Self::add).
    pub fn with(mut self, tool: Box<dyn ToolCapability>) -> CadreResult<Self> {
        self.add(tool)?;
        Ok(self)
    }

    /// Look a tool up by name.
    pub fn get(&self, name: &str) -> Option<&dyn ToolCapability> {
        self.tools
            .iter()
            .find(|t| t.descriptor().name == name)
            .map(|t| t.as_ref())
    }

    /// Descriptors in declaration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor().clone()).collect()
    }

    /// Tool names in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|t| t.descriptor().name.clone())
            .collect()
    }

    /// Execute a model-issued call.
    ///
    /// Never fails: an unknown tool or a tool that raises is turned into an
    /// error [`ToolResult`] so the model can retry or give up.
    pub async fn invoke(&self, call: ToolCall, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool = %call.name, "Model called a tool that is not in this set");
            return ToolResult::error(
                &call.id,
                format!(
                    "Unknown tool '{}'. Available tools: {}",
                    call.name,
                    self.names().join(", ")
                ),
            );
        };

        let call_id = call.id.clone();
        let name = call.name.clone();
        match tool.invoke(call, ctx).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool invocation failed");
                ToolResult::error(call_id, format!("Tool '{name}' failed: {e}"))
            }
        }
    }

    /// Number of tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the set holds no tools.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet").field("tools", &self.names()).finish()
    }
}
