use crate::parse::extract_json;
use crate::plan::{Plan, PlanStep};
use crate::selection::KeywordRule;
use crate::task::Task;
use crate::unit::{resolve_member, UnitDescriptor};
use async_trait::async_trait;
use cadre_agent::LlmClient;
use cadre_core::{CadreError, CadreResult};
use serde::Deserialize;
use tracing::debug;

/// Produces a coordinator's plan for a task.
#[async_trait]
pub trait PlanningStrategy: Send + Sync {
    /// Plan `task` over `children`. The coordinator validates the result.
    async fn plan(
        &self,
        coordinator: &UnitDescriptor,
        children: &[UnitDescriptor],
        task: &Task,
    ) -> CadreResult<Plan>;
}

/// Every child in declared order, each consuming the previous one's output.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelinePlanner;

#[async_trait]
impl PlanningStrategy for PipelinePlanner {
    async fn plan(
        &self,
        _coordinator: &UnitDescriptor,
        children: &[UnitDescriptor],
        task: &Task,
    ) -> CadreResult<Plan> {
        let steps = children
            .iter()
            .enumerate()
            .map(|(i, child)| {
                let step = PlanStep::new(step_id(i), &child.name, task.text());
                if i == 0 {
                    step
                } else {
                    step.after(step_id(i - 1))
                }
            })
            .collect();
        Ok(Plan::new(steps))
    }
}

/// Every child gets the same task; all run at once.
#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastPlanner;

#[async_trait]
impl PlanningStrategy for BroadcastPlanner {
    async fn plan(
        &self,
        _coordinator: &UnitDescriptor,
        children: &[UnitDescriptor],
        task: &Task,
    ) -> CadreResult<Plan> {
        Ok(Plan::new(
            children
                .iter()
                .enumerate()
                .map(|(i, child)| PlanStep::new(step_id(i), &child.name, task.text()))
                .collect(),
        ))
    }
}

/// One independent step per child whose keyword rule matches.
#[derive(Debug, Clone)]
pub struct KeywordPlanner {
    rules: Vec<KeywordRule>,
    fallback: Vec<String>,
}

impl KeywordPlanner {
    /// Every matching rule contributes its target, in rule order.
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self {
            rules,
            fallback: Vec::new(),
        }
    }

    /// Children used when no rule matches.
    pub fn with_fallback(mut self, children: Vec<String>) -> Self {
        self.fallback = children;
        self
    }
}

#[async_trait]
impl PlanningStrategy for KeywordPlanner {
    async fn plan(
        &self,
        coordinator: &UnitDescriptor,
        _children: &[UnitDescriptor],
        task: &Task,
    ) -> CadreResult<Plan> {
        let mut targets: Vec<&str> = Vec::new();
        for rule in self.rules.iter().filter(|r| r.matches(task.text())) {
            if !targets.contains(&rule.target.as_str()) {
                targets.push(&rule.target);
            }
        }
        if targets.is_empty() {
            targets = self.fallback.iter().map(String::as_str).collect();
        }
        if targets.is_empty() {
            return Err(CadreError::Plan(format!(
                "No keyword rule of '{}' matched and no fallback is set",
                coordinator.name
            )));
        }
        Ok(Plan::new(
            targets
                .into_iter()
                .enumerate()
                .map(|(i, child)| PlanStep::new(step_id(i), child, task.text()))
                .collect(),
        ))
    }
}

/// Asks the model for a JSON plan.
#[derive(Debug, Clone)]
pub struct ModelPlanner {
    llm: LlmClient,
}

impl ModelPlanner {
    /// Plan with `llm`.
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl PlanningStrategy for ModelPlanner {
    async fn plan(
        &self,
        coordinator: &UnitDescriptor,
        children: &[UnitDescriptor],
        task: &Task,
    ) -> CadreResult<Plan> {
        let system = planning_prompt(coordinator, children);
        let reply = self.llm.complete(&system, task.text()).await?;
        debug!(unit = %coordinator.name, reply = %reply, "Planning reply");
        parse_plan(&reply, children, task.text())
    }
}

fn planning_prompt(coordinator: &UnitDescriptor, children: &[UnitDescriptor]) -> String {
    let mut prompt = format!(
        "You are {}, coordinating a team. {}\n\
         Break the task into steps for your team members. Use only the members \
         you need, each at most once. Steps without dependencies run in parallel; \
         a step listing `depends_on` receives the outputs of those steps.\n",
        coordinator.name, coordinator.role
    );
    if !coordinator.instructions.trim().is_empty() {
        prompt.push_str(&format!(
            "\n## Instructions\n{}\n",
            coordinator.instructions.trim()
        ));
    }
    prompt.push_str("\n## Team members\n");
    for child in children {
        prompt.push_str(&format!("- {} ({}): {}\n", child.name, child.kind, child.role));
    }
    prompt.push_str(
        "\nReply with a JSON array only: \
         [{\"id\": \"s1\", \"child\": \"<member>\", \"task\": \"<sub-task>\", \"depends_on\": []}]",
    );
    prompt
}

#[derive(Deserialize)]
struct RawStep {
    #[serde(default)]
    id: Option<String>,
    #[serde(alias = "member")]
    child: String,
    #[serde(default)]
    task: String,
    #[serde(default)]
    depends_on: Vec<String>,
}

/// Parse a model plan: a JSON array of steps, or `{"steps": [...]}`.
///
/// Member names are resolved case-insensitively, missing ids are numbered,
/// and an empty sub-task falls back to the coordinator's task.
pub(crate) fn parse_plan(
    reply: &str,
    children: &[UnitDescriptor],
    task: &str,
) -> CadreResult<Plan> {
    let value = extract_json(reply)
        .ok_or_else(|| CadreError::Plan("Model reply contains no JSON plan".into()))?;
    let steps = match value {
        serde_json::Value::Object(mut obj) => obj
            .remove("steps")
            .ok_or_else(|| CadreError::Plan("Plan object has no \"steps\"".into()))?,
        array => array,
    };
    let raw: Vec<RawStep> = serde_json::from_value(steps)
        .map_err(|e| CadreError::Plan(format!("Malformed plan: {e}")))?;

    let mut plan = Vec::with_capacity(raw.len());
    for (i, step) in raw.into_iter().enumerate() {
        let child = resolve_member(&step.child, children)
            .map_err(|e| CadreError::Plan(e.to_string()))?
            .name
            .clone();
        plan.push(PlanStep {
            id: step.id.unwrap_or_else(|| step_id(i)),
            child,
            task: if step.task.trim().is_empty() {
                task.to_string()
            } else {
                step.task
            },
            depends_on: step.depends_on,
        });
    }
    Ok(Plan::new(plan))
}

fn step_id(index: usize) -> String {
    format!("s{}", index + 1)
}
