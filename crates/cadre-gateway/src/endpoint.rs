use serde::{Deserialize, Serialize};

/// A task-shaped HTTP endpoint: `POST <path>` with `{ <input_field>: ... }`
/// runs the rendered template on `unit` and answers `{ <output_field>: markdown }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Route path, e.g. `/api/generate-leads`.
    pub path: String,
    /// Request field holding the input.
    #[serde(default = "default_input_field")]
    pub input_field: String,
    /// Task template; `{{input}}` is replaced with the input value.
    #[serde(default = "default_template")]
    pub template: String,
    /// Target unit; the root when absent.
    #[serde(default)]
    pub unit: Option<String>,
    /// Response field holding the result markdown.
    #[serde(default = "default_output_field")]
    pub output_field: String,
}

fn default_input_field() -> String {
    "message".into()
}

fn default_template() -> String {
    "{{input}}".into()
}

fn default_output_field() -> String {
    "result_markdown".into()
}

impl EndpointConfig {
    /// Replace `{{input}}` in the template with `input`.
    pub fn render(&self, input: &str) -> String {
        self.template.replace("{{input}}", input)
    }

    /// Input from a request body: strings as-is, anything else as JSON text.
    pub fn input_from(&self, body: &serde_json::Value) -> Option<String> {
        match body.get(&self.input_field)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
