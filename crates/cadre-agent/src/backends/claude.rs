use super::{non_empty, post_json, LlmBackend};
use crate::config::ModelConfig;
use crate::llm::LlmResponse;
use async_trait::async_trait;
use cadre_core::{CadreResult, Message, Role, ToolCall};
use cadre_tools::ToolDescriptor;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API.
pub struct ClaudeBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl ClaudeBackend {
    /// A backend for `config`. The key must already be resolved.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Turn<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec<'a>>,
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ToolSpec<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct MessagesReply {
    content: Vec<Block>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

impl<'a> MessagesRequest<'a> {
    fn new(
        config: &'a ModelConfig,
        system: Option<&'a str>,
        messages: &'a [Message],
        tools: &'a [ToolDescriptor],
    ) -> Self {
        // System prompts travel in `system`; tool results go back as user turns.
        let messages = messages
            .iter()
            .filter_map(|m| {
                let role = match m.role {
                    Role::System => return None,
                    Role::Assistant => "assistant",
                    Role::User | Role::Tool => "user",
                };
                Some(Turn {
                    role,
                    content: &m.content,
                })
            })
            .collect();
        let tools = tools
            .iter()
            .map(|t| ToolSpec {
                name: &t.name,
                description: &t.description,
                input_schema: &t.parameters_schema,
            })
            .collect();
        Self {
            model: &config.model_id,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system,
            messages,
            tools,
        }
    }
}

impl From<MessagesReply> for LlmResponse {
    fn from(reply: MessagesReply) -> Self {
        let mut text = Vec::new();
        let mut tool_calls = Vec::new();
        for block in reply.content {
            match block {
                Block::Text { text: t } => text.push(t),
                Block::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input,
                }),
                Block::Other => {}
            }
        }
        let text = text.join("\n");

        if !tool_calls.is_empty() {
            return LlmResponse::ToolUse {
                content: non_empty(text),
                tool_calls,
            };
        }
        match reply.stop_reason.as_deref() {
            None | Some("end_turn") | Some("stop_sequence") => LlmResponse::Done(text),
            Some(_) => LlmResponse::Text(text),
        }
    }
}

#[async_trait]
impl LlmBackend for ClaudeBackend {
    async fn chat(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> CadreResult<LlmResponse> {
        let request = self
            .http
            .post(format!("{}/v1/messages", self.config.base_url()))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        let body = MessagesRequest::new(&self.config, system_prompt, messages, tools);
        let reply: MessagesReply = post_json(request, "Claude", &body).await?;
        Ok(reply.into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;
    use uuid::Uuid;

    fn reply(body: serde_json::Value) -> LlmResponse {
        serde_json::from_value::<MessagesReply>(body).unwrap().into()
    }

    #[test]
    fn system_turns_are_dropped_and_tools_omitted_when_empty() {
        let config = ModelConfig::new(LlmProvider::Claude, "claude-sonnet-4");
        let sid = Uuid::new_v4();
        let messages = [
            Message::new(Role::System, "ignored", sid),
            Message::user("Plan the Q3 campaign", sid),
        ];
        let body =
            serde_json::to_value(MessagesRequest::new(&config, Some("Be terse."), &messages, &[]))
                .unwrap();

        assert_eq!(body["system"], "Be terse.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn max_tokens_stop_is_partial_text() {
        let r = reply(serde_json::json!({
            "stop_reason": "max_tokens",
            "content": [{"type": "text", "text": "The forecast for"}]
        }));
        assert!(matches!(r, LlmResponse::Text(t) if t == "The forecast for"));
    }

    #[test]
    fn unknown_blocks_are_skipped() {
        let r = reply(serde_json::json!({
            "stop_reason": "end_turn",
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "Done."}
            ]
        }));
        assert!(matches!(r, LlmResponse::Done(t) if t == "Done."));
    }

    #[test]
    fn missing_content_fails_to_decode() {
        assert!(serde_json::from_value::<MessagesReply>(serde_json::json!({})).is_err());
    }
}
