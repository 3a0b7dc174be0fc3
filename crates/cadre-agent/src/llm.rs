use crate::backends::claude::ClaudeBackend;
use crate::backends::openai::OpenAiBackend;
use crate::backends::LlmBackend;
use crate::config::{LlmProvider, ModelConfig};
use crate::failover::FailoverBackend;
use cadre_core::{CadreError, CadreResult, Message, ToolCall};
use cadre_tools::ToolDescriptor;
use std::sync::Arc;
use uuid::Uuid;

/// Response from the model: final text, partial text, or tool call requests.
#[derive(Debug)]
pub enum LlmResponse {
    /// Text cut short (e.g. by the token cap); the loop asks the model to continue.
    Text(String),
    /// The model wants tools run before it answers.
    ToolUse {
        /// Text emitted alongside the calls, if any.
        content: Option<String>,
        /// Requested calls, in order.
        tool_calls: Vec<ToolCall>,
    },
    /// The model's final answer.
    Done(String),
}

/// Model client that dispatches to the configured provider backend.
///
/// Cloning is cheap; clones share the backend and its HTTP connection pool.
#[derive(Clone)]
pub struct LlmClient {
    backend: Arc<dyn LlmBackend>,
}

impl LlmClient {
    /// Build a client for `config`, resolving API keys and wiring failover
    /// when fallbacks or a retry policy are configured.
    pub fn new(config: &ModelConfig) -> CadreResult<Self> {
        let config = config.resolved()?;
        if config.fallback_models.is_empty() && config.retry_policy.is_none() {
            return Ok(Self::from_backend(Arc::from(single_backend(config))));
        }

        let policy = config.retry_policy.clone().unwrap_or_default();
        let mut chain = vec![single_backend(config.clone())];
        chain.extend(config.fallback_models.iter().cloned().map(single_backend));
        Ok(Self::from_backend(Arc::new(FailoverBackend::new(
            chain, policy,
        )?)))
    }

    /// Create from a pre-built backend (custom providers, tests).
    pub fn from_backend(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    /// One chat completion.
    pub async fn chat(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> CadreResult<LlmResponse> {
        self.backend.chat(system_prompt, messages, tools).await
    }

    /// Single-shot prompt with no tools, returning the answer text.
    pub async fn complete(&self, system_prompt: &str, prompt: &str) -> CadreResult<String> {
        let messages = [Message::user(prompt, Uuid::nil())];
        match self.chat(Some(system_prompt), &messages, &[]).await? {
            LlmResponse::Done(text) | LlmResponse::Text(text) => Ok(text),
            LlmResponse::ToolUse { .. } => Err(CadreError::Agent(
                "Model requested tools in a tool-less completion".into(),
            )),
        }
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient").finish_non_exhaustive()
    }
}

fn single_backend(config: ModelConfig) -> Box<dyn LlmBackend> {
    match config.provider {
        LlmProvider::Claude => Box::new(ClaudeBackend::new(config)),
        LlmProvider::OpenAi | LlmProvider::OpenRouter | LlmProvider::Groq => {
            Box::new(OpenAiBackend::new(config))
        }
    }
}
