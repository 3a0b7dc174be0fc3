use super::{non_empty, post_json, LlmBackend};
use crate::config::{LlmProvider, ModelConfig};
use crate::llm::LlmResponse;
use async_trait::async_trait;
use cadre_core::{CadreError, CadreResult, Message, Role, ToolCall};
use cadre_tools::ToolDescriptor;
use serde::{Deserialize, Serialize};

/// Chat completions API, as spoken by OpenAI, OpenRouter and Groq.
pub struct OpenAiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    /// A backend for `config`. The key must already be resolved.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatTurn<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool<'a>>,
}

#[derive(Serialize)]
struct ChatTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct FunctionTool<'a> {
    r#type: &'static str,
    function: FunctionSpec<'a>,
}

#[derive(Serialize)]
struct FunctionSpec<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct CompletionReply {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<FunctionCall>,
}

#[derive(Deserialize)]
struct FunctionCall {
    id: String,
    function: CalledFunction,
}

#[derive(Deserialize)]
struct CalledFunction {
    name: String,
    /// JSON text, as the API encodes it.
    arguments: String,
}

impl<'a> CompletionRequest<'a> {
    fn new(
        config: &'a ModelConfig,
        system: Option<&'a str>,
        messages: &'a [Message],
        tools: &'a [ToolDescriptor],
    ) -> Self {
        let history = messages.iter().filter_map(|m| {
            let role = match m.role {
                Role::System => return None,
                Role::Assistant => "assistant",
                Role::User | Role::Tool => "user",
            };
            Some(ChatTurn {
                role,
                content: &m.content,
            })
        });
        let messages = system
            .map(|content| ChatTurn {
                role: "system",
                content,
            })
            .into_iter()
            .chain(history)
            .collect();
        let tools = tools
            .iter()
            .map(|t| FunctionTool {
                r#type: "function",
                function: FunctionSpec {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.parameters_schema,
                },
            })
            .collect();
        Self {
            model: &config.model_id,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            messages,
            tools,
        }
    }
}

impl TryFrom<CompletionReply> for LlmResponse {
    type Error = CadreError;

    fn try_from(reply: CompletionReply) -> CadreResult<Self> {
        let choice = reply
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CadreError::Agent("Completion reply has no choices".into()))?;
        let text = choice.message.content.unwrap_or_default();

        if !choice.message.tool_calls.is_empty() {
            let tool_calls = choice
                .message
                .tool_calls
                .into_iter()
                .map(|c| ToolCall {
                    id: c.id,
                    // Unparseable arguments reach the tool as a string and fail its schema.
                    arguments: serde_json::from_str(&c.function.arguments)
                        .unwrap_or(serde_json::Value::String(c.function.arguments)),
                    name: c.function.name,
                })
                .collect();
            return Ok(LlmResponse::ToolUse {
                content: non_empty(text),
                tool_calls,
            });
        }

        Ok(match choice.finish_reason.as_deref() {
            None | Some("stop") => LlmResponse::Done(text),
            Some(_) => LlmResponse::Text(text),
        })
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn chat(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> CadreResult<LlmResponse> {
        let mut request = self
            .http
            .post(format!("{}/v1/chat/completions", self.config.base_url()))
            .bearer_auth(&self.config.api_key);
        if self.config.provider == LlmProvider::OpenRouter {
            request = request.header("X-Title", "Cadre");
        }
        let body = CompletionRequest::new(&self.config, system_prompt, messages, tools);
        let reply: CompletionReply = post_json(request, "OpenAI", &body).await?;
        reply.try_into()
    }
}
