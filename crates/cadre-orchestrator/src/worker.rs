use crate::parse::extract_json;
use crate::result::{UnitKind, UnitResult};
use crate::task::Task;
use crate::unit::{Context, Unit};
use async_trait::async_trait;
use cadre_agent::{AgentRunner, LlmClient, RunRequest};
use cadre_core::{CadreResult, FailureKind, Message};
use cadre_memory::{EventRecord, MemoryEvent};
use cadre_memory::SearchResult;
use cadre_tools::{ToolContext, ToolSet};
use chrono::Utc;
use std::collections::HashMap;
use tracing::{info, warn};

const DEFAULT_MAX_TURNS: u32 = 20;
const DEFAULT_HISTORY_WINDOW: usize = 10;
const DEFAULT_RECALL_K: usize = 3;

/// Leaf unit: runs the model tool loop over its own tools.
pub struct Worker {
    name: String,
    role: String,
    instructions: String,
    llm: LlmClient,
    tools: ToolSet,
    max_turns: u32,
    add_datetime: bool,
    history_window: usize,
    recall_k: usize,
    remember_results: bool,
}

impl Worker {
    /// A worker with no tools and default context settings.
    pub fn new(name: impl Into<String>, role: impl Into<String>, llm: LlmClient) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            instructions: String::new(),
            llm,
            tools: ToolSet::new(),
            max_turns: DEFAULT_MAX_TURNS,
            add_datetime: false,
            history_window: DEFAULT_HISTORY_WINDOW,
            recall_k: DEFAULT_RECALL_K,
            remember_results: false,
        }
    }

    /// Standing instructions appended to the system prompt.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// The worker's tools. The set is owned by this worker alone.
    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    /// Model turn limit per task.
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Put the current UTC date and time in the system prompt.
    pub fn with_datetime(mut self, enabled: bool) -> Self {
        self.add_datetime = enabled;
        self
    }

    /// How many recent session events to show the model.
    pub fn with_history_window(mut self, events: usize) -> Self {
        self.history_window = events;
        self
    }

    /// How many long-term memories to recall per task.
    pub fn with_recall(mut self, k: usize) -> Self {
        self.recall_k = k;
        self
    }

    /// Write every final answer to the long-term store.
    pub fn with_remember_results(mut self, enabled: bool) -> Self {
        self.remember_results = enabled;
        self
    }

    fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {}. {}", self.name, self.role);
        if !self.instructions.trim().is_empty() {
            prompt.push_str("\n\n## Instructions\n");
            prompt.push_str(self.instructions.trim());
        }
        if self.add_datetime {
            prompt.push_str(&format!(
                "\n\nCurrent date and time (UTC): {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S")
            ));
        }
        prompt
    }

    /// Session history and recalled memories, as a leading exchange.
    async fn preamble(&self, task: &Task, ctx: &Context) -> CadreResult<Vec<Message>> {
        let mut history = ctx
            .memory
            .history(ctx.session_id, self.history_window.saturating_add(1))
            .await?;
        // The receipt for this very task is already in the log; the task
        // itself follows the preamble.
        let own_receipt = history.last().is_some_and(|r| {
            r.unit == self.name
                && matches!(&r.event, MemoryEvent::TaskReceived { task: t } if t == task.text())
        });
        if own_receipt {
            history.pop();
        }
        let excess = history.len().saturating_sub(self.history_window);
        history.drain(..excess);
        let recalled = ctx
            .memory
            .recall(ctx.session_id, task.text(), self.recall_k)
            .await?;

        let Some(block) = render_context(&history, &recalled) else {
            return Ok(Vec::new());
        };
        Ok(vec![
            Message::user(block, ctx.session_id),
            Message::assistant("Noted.", ctx.session_id),
        ])
    }

    async fn remember(&self, task: &Task, ctx: &Context, output: &str) {
        let metadata = HashMap::from([
            ("unit".to_string(), serde_json::json!(self.name)),
            ("task_id".to_string(), serde_json::json!(task.id())),
        ]);
        if let Err(e) = ctx.memory.remember(ctx.session_id, output, metadata).await {
            warn!(unit = %self.name, error = %e, "Failed to remember result");
        }
    }
}

fn render_context(history: &[EventRecord], recalled: &[SearchResult]) -> Option<String> {
    if history.is_empty() && recalled.is_empty() {
        return None;
    }
    let mut block = String::new();
    if !history.is_empty() {
        block.push_str("Recent events in this session:\n");
        for record in history {
            block.push_str(&format!("- [{}] {}\n", record.unit, record.event.describe()));
        }
    }
    if !recalled.is_empty() {
        if !block.is_empty() {
            block.push('\n');
        }
        block.push_str("Relevant long-term memories:\n");
        for hit in recalled {
            block.push_str(&format!("- {}\n", hit.entry.content));
        }
    }
    Some(block)
}

#[async_trait]
impl Unit for Worker {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> &str {
        &self.role
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Worker
    }

    fn instructions(&self) -> &str {
        &self.instructions
    }

    fn tools(&self) -> Vec<String> {
        self.tools.names()
    }

    async fn invoke(&self, task: &Task, ctx: &Context) -> UnitResult {
        let started = Utc::now();
        if task.is_blank() {
            return UnitResult::failed(
                &self.name,
                UnitKind::Worker,
                task,
                started,
                FailureKind::InvalidTask,
                "Task text is empty",
            );
        }

        let preamble = match self.preamble(task, ctx).await {
            Ok(p) => p,
            Err(e) => {
                return UnitResult::failed(
                    &self.name,
                    UnitKind::Worker,
                    task,
                    started,
                    FailureKind::from(&e),
                    e.to_string(),
                )
            }
        };

        let system_prompt = self.system_prompt();
        let tool_ctx = ToolContext::new(ctx.session_id, &self.name);
        let runner = AgentRunner::new(self.llm.clone(), self.max_turns);
        let outcome = runner
            .run(RunRequest {
                system_prompt: &system_prompt,
                preamble,
                task: task.text(),
                tools: &self.tools,
                ctx: &tool_ctx,
                memory: ctx.memory.as_ref(),
            })
            .await;

        match outcome.answer {
            Ok(answer) => {
                info!(
                    unit = %self.name,
                    task_id = %task.id(),
                    turns = outcome.turns,
                    tool_calls = outcome.tool_calls.len(),
                    "Worker finished"
                );
                if self.remember_results {
                    self.remember(task, ctx, &answer).await;
                }
                let payload = extract_json(&answer);
                let result =
                    UnitResult::succeeded(&self.name, UnitKind::Worker, task, started, answer)
                        .with_tool_calls(outcome.tool_calls);
                match payload {
                    Some(p) => result.with_payload(p),
                    None => result,
                }
            }
            Err(e) => UnitResult::failed(
                &self.name,
                UnitKind::Worker,
                task,
                started,
                FailureKind::from(&e),
                e.to_string(),
            )
            .with_tool_calls(outcome.tool_calls),
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("tools", &self.tools.names())
            .field("max_turns", &self.max_turns)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::unit::invoke_unit;
    use cadre_agent::{LlmBackend, LlmResponse};
    use cadre_core::{CadreError, ToolCall};
    use cadre_memory::Memory;
    use cadre_tools::ToolDescriptor;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    /// Replays scripted responses and keeps every prompt it was sent.
    struct Scripted {
        responses: Mutex<Vec<CadreResult<LlmResponse>>>,
        prompts: Arc<Mutex<Vec<(Option<String>, Vec<Message>)>>>,
    }

    impl Scripted {
        fn client(
            responses: Vec<CadreResult<LlmResponse>>,
        ) -> (LlmClient, Arc<Mutex<Vec<(Option<String>, Vec<Message>)>>>) {
            let prompts = Arc::new(Mutex::new(Vec::new()));
            let backend = Scripted {
                responses: Mutex::new(responses),
                prompts: prompts.clone(),
            };
            (LlmClient::from_backend(Arc::new(backend)), prompts)
        }
    }

    #[async_trait]
    impl LlmBackend for Scripted {
        async fn chat(
            &self,
            system_prompt: Option<&str>,
            messages: &[Message],
            _tools: &[ToolDescriptor],
        ) -> CadreResult<LlmResponse> {
            self.prompts
                .lock()
                .unwrap()
                .push((system_prompt.map(str::to_string), messages.to_vec()));
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err(CadreError::Agent("script exhausted".into()))
            } else {
                responses.remove(0)
            }
        }
    }

    fn ctx() -> Context {
        Context::new(Uuid::new_v4(), Arc::new(Memory::in_memory()))
    }

    #[tokio::test]
    async fn fenced_json_answer_becomes_payload() {
        let (llm, _) = Scripted::client(vec![Ok(LlmResponse::Done(
            "Found two.\n```json\n{\"leads\": [{\"name\": \"A\"}, {\"name\": \"B\"}]}\n```".into(),
        ))]);
        let worker = Worker::new("Lead Finder", "Finds leads", llm);
        let ctx = ctx();
        let result = worker
            .invoke(&Task::new("Find leads", ctx.session_id), &ctx)
            .await;

        assert!(result.is_success());
        assert_eq!(result.payload().unwrap()["leads"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn system_prompt_has_role_instructions_and_date() {
        let (llm, prompts) = Scripted::client(vec![Ok(LlmResponse::Done("ok".into()))]);
        let worker = Worker::new("Analyst", "Reads financial reports.", llm)
            .with_instructions("Cite every figure.")
            .with_datetime(true);
        let ctx = ctx();
        worker.invoke(&Task::new("Summarize Q3", ctx.session_id), &ctx).await;

        let prompts = prompts.lock().unwrap();
        let system = prompts[0].0.as_deref().unwrap();
        assert!(system.starts_with("You are Analyst. Reads financial reports."));
        assert!(system.contains("Cite every figure."));
        assert!(system.contains("Current date and time (UTC)"));
    }

    #[tokio::test]
    async fn history_and_recall_are_shown_before_the_task() {
        let (llm, prompts) = Scripted::client(vec![Ok(LlmResponse::Done("ok".into()))]);
        let worker = Worker::new("Planner", "Plans", llm).with_recall(1);
        let ctx = ctx();
        ctx.memory
            .record(
                ctx.session_id,
                "Team",
                MemoryEvent::Note {
                    content: "Client prefers rail freight".into(),
                },
            )
            .await
            .unwrap();
        ctx.memory
            .remember(ctx.session_id, "Warehouse B closes in May", HashMap::new())
            .await
            .unwrap();

        worker
            .invoke(&Task::new("Plan warehouse moves", ctx.session_id), &ctx)
            .await;

        let prompts = prompts.lock().unwrap();
        let messages = &prompts[0].1;
        assert_eq!(messages.len(), 3);
        assert!(messages[0].content.contains("Client prefers rail freight"));
        assert!(messages[0].content.contains("Warehouse B closes in May"));
        assert_eq!(messages[2].content, "Plan warehouse moves");
    }

    #[tokio::test]
    async fn history_leaves_out_the_receipt_for_the_current_task() {
        let (llm, prompts) = Scripted::client(vec![Ok(LlmResponse::Done("ok".into()))]);
        let worker = Worker::new("Planner", "Plans", llm).with_history_window(2);
        let ctx = ctx();
        for note in ["Quote sent", "Client prefers rail freight"] {
            ctx.memory
                .record(
                    ctx.session_id,
                    "Team",
                    MemoryEvent::Note {
                        content: note.into(),
                    },
                )
                .await
                .unwrap();
        }

        let result =
            invoke_unit(&worker, &Task::new("Plan warehouse moves", ctx.session_id), &ctx).await;
        assert!(result.is_success());

        let prompts = prompts.lock().unwrap();
        let messages = &prompts[0].1;
        assert_eq!(messages.len(), 3);
        assert!(messages[0].content.contains("Quote sent"));
        assert!(messages[0].content.contains("Client prefers rail freight"));
        assert!(!messages[0].content.contains("Plan warehouse moves"));
        assert_eq!(messages[2].content, "Plan warehouse moves");
    }

    #[tokio::test]
    async fn model_error_is_failed_result_with_model_kind() {
        let (llm, _) = Scripted::client(vec![Err(CadreError::Http("401 Unauthorized".into()))]);
        let worker = Worker::new("W", "r", llm);
        let ctx = ctx();
        let result = worker.invoke(&Task::new("go", ctx.session_id), &ctx).await;
        assert_eq!(result.failure().unwrap().kind, FailureKind::Model);
    }

    #[tokio::test]
    async fn turn_limit_is_iteration_limit_failure() {
        let call = || {
            Ok(LlmResponse::ToolUse {
                content: None,
                tool_calls: vec![ToolCall {
                    id: "c".into(),
                    name: "missing".into(),
                    arguments: serde_json::json!({}),
                }],
            })
        };
        let (llm, _) = Scripted::client(vec![call(), call()]);
        let worker = Worker::new("W", "r", llm).with_max_turns(2);
        let ctx = ctx();
        let result = worker.invoke(&Task::new("loop", ctx.session_id), &ctx).await;

        assert_eq!(result.failure().unwrap().kind, FailureKind::IterationLimit);
        assert_eq!(result.tool_calls().len(), 2);
        assert!(result.tool_calls().iter().all(|c| c.is_error));
    }

    #[tokio::test]
    async fn blank_task_never_reaches_the_model() {
        let (llm, prompts) = Scripted::client(vec![]);
        let worker = Worker::new("W", "r", llm);
        let ctx = ctx();
        let result = worker.invoke(&Task::new("", ctx.session_id), &ctx).await;
        assert_eq!(result.failure().unwrap().kind, FailureKind::InvalidTask);
        assert!(prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn remembered_results_are_recallable() {
        let (llm, _) = Scripted::client(vec![Ok(LlmResponse::Done(
            "Germany CFO shortlist ready".into(),
        ))]);
        let worker = Worker::new("W", "r", llm).with_remember_results(true);
        let ctx = ctx();
        worker
            .invoke(&Task::new("Build the shortlist", ctx.session_id), &ctx)
            .await;

        let hits = ctx
            .memory
            .recall(ctx.session_id, "CFO shortlist", 1)
            .await
            .unwrap();
        assert_eq!(hits[0].entry.content, "Germany CFO shortlist ready");
        assert_eq!(hits[0].entry.metadata["unit"], "W");
    }
}
