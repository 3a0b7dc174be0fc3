use crate::parse::strip_fences;
use crate::task::Task;
use crate::unit::{member_list, resolve_member, UnitDescriptor};
use async_trait::async_trait;
use cadre_agent::LlmClient;
use cadre_core::{CadreError, CadreResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A router's choice: which child, and optionally a rewritten task for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Chosen child name.
    pub child: String,
    /// Task to hand the child. `None` forwards the router's task unchanged.
    pub task: Option<String>,
}

/// Picks exactly one child for a task.
#[async_trait]
pub trait SelectionStrategy: Send + Sync {
    /// Choose among `children` for `task`.
    ///
    /// Returning a name outside `children` is allowed here; the router
    /// rejects it. Returning an error means no choice could be made.
    async fn select(
        &self,
        router: &UnitDescriptor,
        children: &[UnitDescriptor],
        task: &Task,
    ) -> CadreResult<Selection>;
}

/// `keywords → target` rule used by keyword selection and planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    /// Case-insensitive substrings; any one matches.
    pub keywords: Vec<String>,
    /// Child the rule routes to.
    pub target: String,
}

impl KeywordRule {
    /// A rule routing `keywords` to `target`.
    pub fn new<I, S>(keywords: I, target: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            target: target.into(),
        }
    }

    /// Whether any keyword occurs in `text`, ignoring case.
    pub fn matches(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.keywords
            .iter()
            .any(|k| !k.trim().is_empty() && lowered.contains(&k.to_lowercase()))
    }
}

// ---------------------------------------------------------------------------
// KeywordSelector
// ---------------------------------------------------------------------------

/// Routes by the first matching keyword rule, or an explicit fallback.
#[derive(Debug, Clone)]
pub struct KeywordSelector {
    rules: Vec<KeywordRule>,
    fallback: Option<String>,
}

impl KeywordSelector {
    /// Rules are tried in order.
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self {
            rules,
            fallback: None,
        }
    }

    /// Child used when no rule matches.
    pub fn with_fallback(mut self, child: impl Into<String>) -> Self {
        self.fallback = Some(child.into());
        self
    }
}

#[async_trait]
impl SelectionStrategy for KeywordSelector {
    async fn select(
        &self,
        router: &UnitDescriptor,
        _children: &[UnitDescriptor],
        task: &Task,
    ) -> CadreResult<Selection> {
        let target = self
            .rules
            .iter()
            .find(|rule| rule.matches(task.text()))
            .map(|rule| rule.target.clone())
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| {
                CadreError::Selection(format!(
                    "No keyword rule of '{}' matched and no fallback is set",
                    router.name
                ))
            })?;
        Ok(Selection {
            child: target,
            task: None,
        })
    }
}

// ---------------------------------------------------------------------------
// ModelSelector
// ---------------------------------------------------------------------------

/// Asks the model to name one member.
#[derive(Debug, Clone)]
pub struct ModelSelector {
    llm: LlmClient,
}

impl ModelSelector {
    /// Select with `llm`.
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl SelectionStrategy for ModelSelector {
    async fn select(
        &self,
        router: &UnitDescriptor,
        children: &[UnitDescriptor],
        task: &Task,
    ) -> CadreResult<Selection> {
        let system = selection_prompt(router, children);
        let reply = self.llm.complete(&system, task.text()).await?;
        debug!(unit = %router.name, reply = %reply, "Selection reply");
        parse_selection(&reply, children)
    }
}

fn selection_prompt(router: &UnitDescriptor, children: &[UnitDescriptor]) -> String {
    let mut prompt = format!(
        "You are {}, the lead of a team. {}\n\
         Pick exactly ONE team member to handle the task.\n",
        router.name, router.role
    );
    if !router.instructions.trim().is_empty() {
        prompt.push_str(&format!("\n## Instructions\n{}\n", router.instructions.trim()));
    }
    prompt.push_str("\n## Team members\n");
    for child in children {
        prompt.push_str(&format!("- {} ({}): {}", child.name, child.kind, child.role));
        if !child.instructions.trim().is_empty() {
            prompt.push_str(&format!(" Instructions: {}", child.instructions.trim()));
        }
        prompt.push('\n');
    }
    prompt.push_str(
        "\nReply with JSON only: {\"member\": \"<exact member name>\", \
         \"task\": \"<optional rewritten task for that member>\"}",
    );
    prompt
}

/// Turn a model reply into a selection among `children`.
///
/// Accepts `{"member": ..., "task": ...}`, a bare member name, or prose
/// naming exactly one member. Zero or several names is an error.
pub(crate) fn parse_selection(
    reply: &str,
    children: &[UnitDescriptor],
) -> CadreResult<Selection> {
    let body = strip_fences(reply);

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(obj) = value.as_object() {
            let member = match obj.get("member") {
                Some(serde_json::Value::String(name)) => name.clone(),
                Some(serde_json::Value::Array(names)) => {
                    return Err(CadreError::Selection(format!(
                        "Model named {} members, expected one",
                        names.len()
                    )))
                }
                _ => {
                    return Err(CadreError::Selection(
                        "Model reply has no \"member\" field".into(),
                    ))
                }
            };
            let task = obj
                .get("task")
                .and_then(|t| t.as_str())
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            let child = resolve_member(&member, children)?.name.clone();
            return Ok(Selection { child, task });
        }
    }

    let bare = body.trim_matches(|c: char| matches!(c, '"' | '\'' | '.') || c.is_whitespace());
    if let Ok(member) = resolve_member(bare, children) {
        return Ok(Selection {
            child: member.name.clone(),
            task: None,
        });
    }

    let lowered = body.to_lowercase();
    let named: Vec<&UnitDescriptor> = children
        .iter()
        .filter(|c| mentions(&lowered, &c.name.to_lowercase()))
        .collect();
    match named.as_slice() {
        [only] => Ok(Selection {
            child: only.name.clone(),
            task: None,
        }),
        [] => Err(CadreError::Selection(format!(
            "Model reply names no member (members: {})",
            member_list(children)
        ))),
        several => Err(CadreError::Selection(format!(
            "Model reply names {} members, expected one",
            several.len()
        ))),
    }
}

/// Whether `name` occurs in `text` as a whole word, so "ai" is not found
/// inside "email".
fn mentions(text: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    text.match_indices(name).any(|(at, _)| {
        let before = text[..at].chars().next_back();
        let after = text[at + name.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
