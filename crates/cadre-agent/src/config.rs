use crate::failover::RetryPolicy;
use cadre_core::{CadreError, CadreResult};
use serde::{Deserialize, Serialize};

/// Which wire protocol a model speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Anthropic Messages API.
    Claude,
    /// OpenAI chat completions.
    OpenAi,
    /// OpenRouter, OpenAI-compatible.
    OpenRouter,
    /// Groq cloud inference, OpenAI-compatible.
    Groq,
}

/// Model selection and sampling settings for one unit (or the org default).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Wire protocol.
    pub provider: LlmProvider,
    /// Provider model identifier.
    pub model_id: String,
    /// Literal key or `${VAR}` reference. Empty means "use `api_key_env`".
    #[serde(default)]
    pub api_key: String,
    /// Environment variable holding the key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Override of the provider's default base URL.
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion token cap per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Worker tool-loop turn limit.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Models tried in order when this one keeps failing.
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    /// Retry settings; failover is only wired when this or `fallback_models` is set.
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_turns() -> u32 {
    20
}

impl ModelConfig {
    /// A config with default sampling settings and no key.
    pub fn new(provider: LlmProvider, model_id: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            api_key: String::new(),
            api_key_env: None,
            api_base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_turns: default_max_turns(),
            fallback_models: Vec::new(),
            retry_policy: None,
        }
    }

    /// Base URL of the provider API, without a trailing path.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url
        } else {
            match self.provider {
                LlmProvider::Claude => "https://api.anthropic.com",
                LlmProvider::OpenAi => "https://api.openai.com",
                LlmProvider::OpenRouter => "https://openrouter.ai/api",
                LlmProvider::Groq => "https://api.groq.com/openai",
            }
        }
    }

    /// The API key, with `${VAR}` references and `api_key_env` resolved.
    pub fn resolve_api_key(&self) -> CadreResult<String> {
        let key = self.api_key.trim();
        if let Some(var) = key.strip_prefix("${").and_then(|k| k.strip_suffix('}')) {
            return read_env(var);
        }
        if !key.is_empty() {
            return Ok(key.to_string());
        }
        match &self.api_key_env {
            Some(var) => read_env(var),
            None => Err(CadreError::Config(format!(
                "No API key configured for model '{}'",
                self.model_id
            ))),
        }
    }

    /// A copy with every key (including fallbacks) resolved to its literal value.
    pub fn resolved(&self) -> CadreResult<ModelConfig> {
        let mut config = self.clone();
        config.api_key = self.resolve_api_key()?;
        config.api_key_env = None;
        config.fallback_models = self
            .fallback_models
            .iter()
            .map(ModelConfig::resolved)
            .collect::<CadreResult<_>>()?;
        Ok(config)
    }
}

fn read_env(var: &str) -> CadreResult<String> {
    std::env::var(var)
        .map_err(|_| CadreError::Config(format!("Environment variable '{var}' is not set")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn literal_key_is_used_as_is() {
        let mut config = ModelConfig::new(LlmProvider::OpenAi, "gpt-4o");
        config.api_key = "sk-literal".into();
        assert_eq!(config.resolve_api_key().unwrap(), "sk-literal");
    }

    #[test]
    fn missing_env_reference_is_config_error() {
        let mut config = ModelConfig::new(LlmProvider::OpenAi, "gpt-4o");
        config.api_key = "${CADRE_TEST_KEY_THAT_IS_NOT_SET}".into();
        let err = config.resolve_api_key().unwrap_err();
        assert!(err.to_string().contains("CADRE_TEST_KEY_THAT_IS_NOT_SET"));
    }

    #[test]
    fn env_reference_is_read() {
        // PATH is set in every test environment.
        let mut config = ModelConfig::new(LlmProvider::Claude, "claude-sonnet-4");
        config.api_key_env = Some("PATH".into());
        assert_eq!(
            config.resolve_api_key().unwrap(),
            std::env::var("PATH").unwrap()
        );
    }

    #[test]
    fn no_key_at_all_is_error() {
        let config = ModelConfig::new(LlmProvider::Claude, "claude-sonnet-4");
        assert!(config.resolve_api_key().is_err());
    }

    #[test]
    fn resolved_resolves_fallbacks() {
        let mut fallback = ModelConfig::new(LlmProvider::Groq, "llama");
        fallback.api_key = "gk".into();
        let mut config = ModelConfig::new(LlmProvider::OpenAi, "gpt-4o");
        config.api_key = "sk".into();
        config.fallback_models.push(fallback);

        let resolved = config.resolved().unwrap();
        assert_eq!(resolved.fallback_models[0].api_key, "gk");

        config.fallback_models[0].api_key.clear();
        assert!(config.resolved().is_err());
    }
}
