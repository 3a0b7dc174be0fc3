//! Built-in tools for Cadre workers.
//!
//! Provides the tools every organization can bind by name: a reasoning
//! scratchpad, explicit long-term memory access, a UTC clock, and outbound
//! webhooks declared in configuration.
//!
//! # Main entry points
//!
//! - [`register_builtins()`]: Register `think`, `memory_store`, `memory_search` and `current_time`.
//! - [`register_webhooks()`]: Register one tool per configured webhook.

/// UTC clock tool.
pub mod clock;
/// Long-term memory store and search tools.
pub mod memory;
/// Reasoning scratchpad tool.
pub mod think;
/// Outbound webhook tool.
pub mod webhook;

pub use clock::CurrentTimeTool;
pub use memory::{MemorySearchTool, MemoryStoreTool};
pub use think::ThinkTool;
pub use webhook::{webhook_client, WebhookConfig, WebhookTool};

use cadre_core::{CadreError, CadreResult};
use cadre_memory::Memory;
use cadre_tools::ToolCatalog;

/// Register the memory-backed and clock tools into `catalog`.
pub fn register_builtins(catalog: &mut ToolCatalog, memory: &Memory) {
    let m = memory.clone();
    catalog.register("think", move || Box::new(ThinkTool::new(m.clone())));
    let m = memory.clone();
    catalog.register("memory_store", move || Box::new(MemoryStoreTool::new(m.clone())));
    let m = memory.clone();
    catalog.register("memory_search", move || {
        Box::new(MemorySearchTool::new(m.clone()))
    });
    catalog.register("current_time", || Box::new(CurrentTimeTool::new()));
}

/// Register one tool per webhook. Names must not collide with existing tools.
pub fn register_webhooks(catalog: &mut ToolCatalog, webhooks: &[WebhookConfig]) -> CadreResult<()> {
    if webhooks.is_empty() {
        return Ok(());
    }
    let client = webhook_client()?;
    for hook in webhooks {
        if catalog.contains(&hook.name) {
            return Err(CadreError::Config(format!(
                "Webhook '{}' collides with an existing tool",
                hook.name
            )));
        }
        let hook = hook.clone();
        let client = client.clone();
        let name = hook.name.clone();
        catalog.register(name, move || {
            Box::new(WebhookTool::new(hook.clone(), client.clone()))
        });
    }
    Ok(())
}
