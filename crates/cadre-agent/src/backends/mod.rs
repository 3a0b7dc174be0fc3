/// Anthropic Messages API backend.
pub mod claude;
/// OpenAI-compatible chat completions backend.
pub mod openai;

use crate::llm::LlmResponse;
use async_trait::async_trait;
use cadre_core::{CadreError, CadreResult, Message};
use cadre_tools::ToolDescriptor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// A model provider.
///
/// Implemented once per wire protocol; tests implement it directly to script
/// model behaviour.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// One chat completion over `messages`, offering `tools`.
    async fn chat(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> CadreResult<LlmResponse>;
}

/// POST `body` and decode a successful reply as `R`.
///
/// A non-2xx status becomes [`CadreError::Http`] carrying the status code and
/// the raw reply, which is what failover classifies on.
async fn post_json<B, R>(request: reqwest::RequestBuilder, api: &str, body: &B) -> CadreResult<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let resp = request
        .json(body)
        .send()
        .await
        .map_err(|e| CadreError::Http(e.to_string()))?;
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| CadreError::Http(e.to_string()))?;
    debug!(api, status = status.as_u16(), bytes = text.len(), "Model reply");

    if !status.is_success() {
        return Err(CadreError::Http(format!("{api} API error {status}: {text}")));
    }
    serde_json::from_str(&text)
        .map_err(|e| CadreError::Agent(format!("Unexpected {api} reply: {e}")))
}

/// `Some(text)` unless the joined text is empty.
fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}
