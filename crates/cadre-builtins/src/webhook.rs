use async_trait::async_trait;
use cadre_core::{CadreError, CadreResult, ToolCall, ToolResult};
use cadre_tools::{ToolCapability, ToolContext, ToolDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

const MAX_RESPONSE_SIZE: usize = 64 * 1024;

/// A named outbound webhook, as declared under `[[tools.webhooks]]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Tool name exposed to the model, e.g. `slack_post`.
    pub name: String,
    /// Tool description exposed to the model.
    #[serde(default)]
    pub description: Option<String>,
    /// Target URL.
    pub url: String,
    /// Environment variable holding a bearer token, if the hook needs one.
    #[serde(default)]
    pub token_env: Option<String>,
    /// Extra request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Build the HTTP client shared by webhook tools.
pub fn webhook_client() -> CadreResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| CadreError::Http(format!("Failed to create HTTP client: {e}")))
}

/// Posts a JSON message to a fixed URL: channel posts, alerts, notifications.
///
/// The body is `{"text", "unit", "session_id"}` merged with the optional
/// `fields` object supplied by the model.
pub struct WebhookTool {
    descriptor: ToolDescriptor,
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookTool {
    /// A webhook tool for `config`, sending through `client`.
    pub fn new(config: WebhookConfig, client: reqwest::Client) -> Self {
        let description = config
            .description
            .clone()
            .unwrap_or_else(|| format!("Send a message to the '{}' channel.", config.name));
        Self {
            descriptor: ToolDescriptor::new(config.name.clone(), description).with_schema(
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "message": {
                            "type": "string",
                            "description": "The message text to send"
                        },
                        "fields": {
                            "type": "object",
                            "description": "Optional structured fields sent alongside the message",
                            "additionalProperties": true
                        }
                    },
                    "required": ["message"]
                }),
            ),
            config,
            client,
        }
    }
}

#[async_trait]
impl ToolCapability for WebhookTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall, ctx: &ToolContext) -> CadreResult<ToolResult> {
        let message = call.arguments["message"].as_str().unwrap_or_default();
        if message.trim().is_empty() {
            return Ok(ToolResult::error(&call.id, "Message cannot be empty"));
        }

        let mut body = serde_json::Map::new();
        if let Some(fields) = call.arguments["fields"].as_object() {
            body.extend(fields.clone());
        }
        body.insert("text".into(), message.into());
        body.insert("unit".into(), ctx.unit.clone().into());
        body.insert("session_id".into(), ctx.session_id.to_string().into());

        let mut request = self.client.post(&self.config.url).json(&body);
        for (key, value) in &self.config.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(var) = &self.config.token_env {
            let token = std::env::var(var).map_err(|_| {
                CadreError::Tool(format!("Webhook token variable '{var}' is not set"))
            })?;
            request = request.bearer_auth(token);
        }

        info!(tool = %self.config.name, unit = %ctx.unit, "Posting webhook");

        let response = request
            .send()
            .await
            .map_err(|e| CadreError::Http(format!("Webhook '{}' failed: {e}", self.config.name)))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CadreError::Http(format!("Failed to read webhook response: {e}")))?;
        let text = String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_RESPONSE_SIZE)]);

        let result = serde_json::json!({
            "status": status.as_u16(),
            "body": text,
        });
        if status.is_success() {
            Ok(ToolResult::success(&call.id, result.to_string()))
        } else {
            Ok(ToolResult::error(&call.id, result.to_string()))
        }
    }
}
