#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the tool catalog and per-worker tool sets.

use async_trait::async_trait;
use cadre_core::{CadreResult, ToolCall, ToolResult};
use cadre_tools::{ToolCapability, ToolCatalog, ToolContext, ToolDescriptor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts its own invocations so tests can tell instances apart.
struct Counter {
    descriptor: ToolDescriptor,
    hits: AtomicUsize,
}

#[async_trait]
impl ToolCapability for Counter {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall, _ctx: &ToolContext) -> CadreResult<ToolResult> {
        let n = self.hits.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ToolResult::success(call.id, n.to_string()))
    }
}

fn counter(name: &'static str) -> impl Fn() -> Box<dyn ToolCapability> + Send + Sync {
    move || {
        Box::new(Counter {
            descriptor: ToolDescriptor::new(name, "counts calls"),
            hits: AtomicUsize::new(0),
        })
    }
}

fn call(name: &str) -> ToolCall {
    ToolCall {
        id: "call".into(),
        name: name.into(),
        arguments: serde_json::json!({}),
    }
}

#[tokio::test]
async fn each_set_gets_its_own_instances() {
    let mut catalog = ToolCatalog::new();
    catalog.register("count", counter("count"));

    let ctx = ToolContext::new(uuid::Uuid::new_v4(), "worker");
    let first = catalog.build_set(&["count".to_string()]).unwrap();
    let second = catalog.build_set(&["count".to_string()]).unwrap();

    assert_eq!(first.invoke(call("count"), &ctx).await.content, "1");
    assert_eq!(first.invoke(call("count"), &ctx).await.content, "2");
    // The second worker's tool has not been touched.
    assert_eq!(second.invoke(call("count"), &ctx).await.content, "1");
}

#[test]
fn build_set_keeps_declaration_order() {
    let mut catalog = ToolCatalog::new();
    catalog.register("b", counter("b"));
    catalog.register("a", counter("a"));

    let set = catalog
        .build_set(&["b".to_string(), "a".to_string()])
        .unwrap();
    assert_eq!(set.names(), vec!["b", "a"]);
    assert_eq!(catalog.names(), vec!["a", "b"]);
}

#[test]
fn unknown_tool_is_config_error() {
    let catalog = ToolCatalog::new();
    let err = catalog.build_set(&["sap_ibp".to_string()]).unwrap_err();
    assert!(err.to_string().contains("Unknown tool: sap_ibp"));
}

#[test]
fn duplicate_tool_in_one_set_is_rejected() {
    let mut catalog = ToolCatalog::new();
    catalog.register("count", counter("count"));
    let names = vec!["count".to_string(), "count".to_string()];
    assert!(catalog.build_set(&names).is_err());
}

#[test]
fn catalog_is_cheap_to_share() {
    let mut catalog = ToolCatalog::new();
    catalog.register("count", counter("count"));
    let shared = Arc::new(catalog);
    let clone = (*shared).clone();
    assert!(clone.contains("count"));
    assert_eq!(clone.len(), 1);
}
