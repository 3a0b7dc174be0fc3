use anyhow::Context as _;
use cadre_agent::ModelConfig;
use cadre_builtins::WebhookConfig;
use cadre_gateway::{EndpointConfig, ServerConfig};
use cadre_orchestrator::{OrgConfig, ScheduledJob};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// `cadre.toml`.
#[derive(Debug, Deserialize)]
pub struct CadreConfig {
    /// Default model for every unit without an override.
    pub model: ModelConfig,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Caller-side deadline for top-level tasks; none when absent.
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    pub org: OrgConfig,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub schedules: Vec<ScheduledJob>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBackend {
    /// Lost on exit.
    Memory,
    /// JSONL files under `<data_dir>/memory`.
    #[default]
    File,
}

#[derive(Debug, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub backend: MemoryBackend,
    #[serde(default = "default_dimension")]
    pub embedding_dimension: usize,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_recall_k")]
    pub recall_k: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::default(),
            embedding_dimension: default_dimension(),
            history_window: default_history_window(),
            recall_k: default_recall_k(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_dimension() -> usize {
    256
}
fn default_history_window() -> usize {
    10
}
fn default_recall_k() -> usize {
    3
}

impl CadreConfig {
    /// Read and parse a config file.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file '{}'", path.display()))
    }

    /// Parse config text.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use cadre_orchestrator::UnitKind;

    const MINIMAL: &str = r#"
        [model]
        provider = "openai"
        model_id = "gpt-4o-mini"
        api_key_env = "OPENAI_API_KEY"

        [org]
        root = "Solo"

        [[org.units]]
        name = "Solo"
        kind = "worker"
        role = "Does everything"
    "#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = CadreConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.memory.backend, MemoryBackend::File);
        assert_eq!(config.memory.recall_k, 3);
        assert!(config.task_timeout_secs.is_none());
        assert!(config.endpoints.is_empty());
        assert_eq!(config.org.units[0].kind, UnitKind::Worker);
    }

    #[test]
    fn test_missing_org_is_an_error() {
        let text = MINIMAL.split("[org]").next().unwrap();
        assert!(CadreConfig::parse(text).is_err());
    }

    #[tokio::test]
    async fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = CadreConfig::load(&path).await.unwrap_err();
        assert!(format!("{err:#}").contains("missing.toml"));

        let path = dir.path().join("cadre.toml");
        tokio::fs::write(&path, MINIMAL).await.unwrap();
        let config = CadreConfig::load(&path).await.unwrap();
        assert_eq!(config.org.root, "Solo");
    }
}
