use crate::config::{CadreConfig, MemoryBackend};
use async_trait::async_trait;
use cadre_agent::{LlmBackend, LlmClient, LlmResponse};
use cadre_builtins::{register_builtins, register_webhooks};
use cadre_core::{CadreError, CadreResult, Message};
use cadre_memory::Memory;
use cadre_orchestrator::{BuildEnv, Organization, Scheduler};
use cadre_tools::{ToolCatalog, ToolDescriptor};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Whether units get real model clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Models {
    /// Provider HTTP clients; API keys must resolve.
    Live,
    /// Clients that refuse every call, for commands that only inspect the tree.
    Offline,
}

struct OfflineBackend;

#[async_trait]
impl LlmBackend for OfflineBackend {
    async fn chat(
        &self,
        _system_prompt: Option<&str>,
        _messages: &[Message],
        _tools: &[ToolDescriptor],
    ) -> CadreResult<LlmResponse> {
        Err(CadreError::Config(
            "Model calls are disabled for this command".into(),
        ))
    }
}

async fn open_memory(config: &CadreConfig) -> CadreResult<Arc<Memory>> {
    let memory = match config.memory.backend {
        MemoryBackend::Memory => Memory::in_memory(),
        MemoryBackend::File => {
            let dir = config.data_dir.join("memory");
            Memory::open(&dir, config.memory.embedding_dimension).await?
        }
    };
    Ok(Arc::new(memory))
}

/// Open memory, register tools, and build the organization described by `config`.
pub async fn assemble(config: &CadreConfig, models: Models) -> CadreResult<Organization> {
    let memory = open_memory(config).await?;

    let mut catalog = ToolCatalog::new();
    register_builtins(&mut catalog, &memory);
    register_webhooks(&mut catalog, &config.tools.webhooks)?;
    info!(tools = catalog.len(), "Tools registered");

    let mut env = BuildEnv::new(&catalog, memory, config.model.clone());
    env.history_window = config.memory.history_window;
    env.recall_k = config.memory.recall_k;
    env.task_timeout = config.task_timeout_secs.map(Duration::from_secs);
    if models == Models::Offline {
        env = env.with_clients(|_| Ok(LlmClient::from_backend(Arc::new(OfflineBackend))));
    }

    let org = config.org.build(&env)?;
    Scheduler::new(config.schedules.clone()).validate()?;
    for job in &config.schedules {
        if let Some(unit) = &job.unit {
            if org.unit(unit).is_none() {
                return Err(CadreError::Config(format!(
                    "Scheduled job '{}' targets unknown unit '{unit}'",
                    job.name
                )));
            }
        }
    }
    Ok(org)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use cadre_gateway::{AuthConfig, GatewayServer};
    use cadre_orchestrator::{ResultStatus, Task};
    use uuid::Uuid;

    const ORG_FILES: [(&str, &str); 4] = [
        ("marketing", include_str!("../../../orgs/marketing.toml")),
        ("consulting", include_str!("../../../orgs/consulting.toml")),
        ("supply_chain", include_str!("../../../orgs/supply_chain.toml")),
        ("utilities", include_str!("../../../orgs/utilities.toml")),
    ];

    fn in_memory(text: &str) -> CadreConfig {
        let mut config = CadreConfig::parse(text).unwrap();
        config.memory.backend = MemoryBackend::Memory;
        config
    }

    #[tokio::test]
    async fn test_shipped_org_files_build() {
        for (name, text) in ORG_FILES {
            let config = in_memory(text);
            let org = assemble(&config, Models::Offline)
                .await
                .unwrap_or_else(|e| panic!("{name}: {e}"));
            assert_eq!(org.root().name(), config.org.root, "{name}");
            assert_eq!(org.descriptors().len(), config.org.units.len(), "{name}");
            GatewayServer::build_with(
                Arc::new(org),
                config.endpoints.clone(),
                AuthConfig::default(),
            )
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        }
    }

    #[tokio::test]
    async fn test_offline_models_fail_as_model_errors() {
        let config = in_memory(ORG_FILES[1].1);
        let org = assemble(&config, Models::Offline).await.unwrap();
        let result = org
            .run(
                Some("Market-Researcher"),
                Task::new("Size the DACH CFO software market", Uuid::new_v4()),
            )
            .await
            .unwrap();
        assert_eq!(result.status(), ResultStatus::Failed);
    }

    #[tokio::test]
    async fn test_file_memory_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CadreConfig::parse(ORG_FILES[0].1).unwrap();
        config.data_dir = dir.path().to_path_buf();
        assemble(&config, Models::Offline).await.unwrap();
        assert!(dir.path().join("memory").join("events").is_dir());
    }

    #[tokio::test]
    async fn test_schedule_with_unknown_unit_is_rejected() {
        let mut config = in_memory(ORG_FILES[2].1);
        config.schedules[0].unit = Some("Nobody".into());
        let err = assemble(&config, Models::Offline).await.unwrap_err();
        assert!(err.to_string().contains("Nobody"));
    }
}
