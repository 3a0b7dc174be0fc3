#![allow(dead_code)]

use async_trait::async_trait;
use cadre_agent::{LlmBackend, LlmClient, LlmProvider, LlmResponse, ModelConfig};
use cadre_core::{CadreError, CadreResult, Message};
use cadre_memory::Memory;
use cadre_orchestrator::{BuildEnv, OrgConfig, Organization};
use cadre_tools::{ToolCatalog, ToolDescriptor};
use std::sync::Arc;

pub const ORG: &str = r#"
root = "Consultancy"

[[units]]
name = "Consultancy"
kind = "coordinator"
role = "B2B growth consultancy"
children = ["Lead-Gen"]
planning = { strategy = "keyword", fallback = ["Lead-Gen"], rules = [
    { keywords = ["lead"], target = "Lead-Gen" },
] }

[[units]]
name = "Lead-Gen"
kind = "router"
role = "Finds qualified prospects"
children = ["Finance-Prospector"]
selection = { strategy = "keyword", fallback = "Finance-Prospector", rules = [] }

[[units]]
name = "Finance-Prospector"
kind = "worker"
role = "Prospects finance leaders"

[[units]]
name = "Broken"
kind = "worker"
role = "Always fails"
"#;

pub const LEADS: &str = "Two leads.\n```json\n{\"leads\": [\
    {\"name\": \"Anna Becker\", \"company\": \"Nordwerk GmbH\"},\
    {\"name\": \"Jonas Keller\", \"company\": \"Rheinlogistik AG\"}\
]}\n```";

/// Answers every worker with the leads reply, except `Broken`.
struct FixedBackend;

#[async_trait]
impl LlmBackend for FixedBackend {
    async fn chat(
        &self,
        system_prompt: Option<&str>,
        _messages: &[Message],
        _tools: &[ToolDescriptor],
    ) -> CadreResult<LlmResponse> {
        if system_prompt.unwrap_or_default().starts_with("You are Broken.") {
            return Err(CadreError::Http("HTTP 400: model not found".into()));
        }
        Ok(LlmResponse::Done(LEADS.to_string()))
    }
}

pub fn organization() -> Arc<Organization> {
    let org: OrgConfig = toml::from_str(ORG).unwrap();
    let catalog = ToolCatalog::new();
    let client = LlmClient::from_backend(Arc::new(FixedBackend));
    let env = BuildEnv::new(
        &catalog,
        Arc::new(Memory::in_memory()),
        ModelConfig::new(LlmProvider::OpenAi, "fixed"),
    )
    .with_clients(move |_| Ok(client.clone()));
    Arc::new(org.build(&env).unwrap())
}
