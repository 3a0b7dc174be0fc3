use crate::context::ContextWindow;
use crate::llm::{LlmClient, LlmResponse};
use cadre_core::{CadreError, CadreResult, Message, Role, ToolCall};
use cadre_memory::{Memory, MemoryEvent};
use cadre_tools::{ToolContext, ToolSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const DEFAULT_MAX_MESSAGES: usize = 100;

/// One tool invocation made during a worker run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Loop turn (1-based) in which the call was made.
    pub turn: u32,
    /// Model-assigned call id.
    pub call_id: String,
    /// Tool name.
    pub tool: String,
    /// Arguments sent by the model.
    pub arguments: serde_json::Value,
    /// Whether the tool reported an error.
    pub is_error: bool,
    /// Tool output or error text.
    pub output: String,
}

/// Everything a single run needs besides the model.
pub struct RunRequest<'a> {
    /// System prompt for every turn.
    pub system_prompt: &'a str,
    /// Messages placed before the task (session history, recalled memories).
    pub preamble: Vec<Message>,
    /// The task text.
    pub task: &'a str,
    /// The worker's tools.
    pub tools: &'a ToolSet,
    /// Session and worker name passed to tools.
    pub ctx: &'a ToolContext,
    /// Where tool calls are recorded.
    pub memory: &'a Memory,
}

/// How a run ended, plus what it did on the way.
#[derive(Debug)]
pub struct RunOutcome {
    /// The final answer, or why there is none.
    pub answer: CadreResult<String>,
    /// Model turns used.
    pub turns: u32,
    /// Tool calls in the order they were made.
    pub tool_calls: Vec<ToolCallRecord>,
}

/// The worker tool loop.
/// Prompt → model → tool calls → execute → feed results back → repeat.
pub struct AgentRunner {
    llm: LlmClient,
    max_turns: u32,
    max_messages: usize,
}

impl AgentRunner {
    /// A runner allowing at most `max_turns` model calls per run.
    pub fn new(llm: LlmClient, max_turns: u32) -> Self {
        Self {
            llm,
            max_turns: max_turns.max(1),
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }

    /// Turn limit.
    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    /// Run the loop until the model answers, the turn limit is hit, or the model fails.
    ///
    /// Tool failures never end the run: they are fed back to the model as
    /// error results so it can retry or work around them.
    pub async fn run(&self, request: RunRequest<'_>) -> RunOutcome {
        let mut tool_calls = Vec::new();
        let mut turns = 0;
        let answer = self.drive(&request, &mut tool_calls, &mut turns).await;
        RunOutcome {
            answer,
            turns,
            tool_calls,
        }
    }

    async fn drive(
        &self,
        request: &RunRequest<'_>,
        records: &mut Vec<ToolCallRecord>,
        turns: &mut u32,
    ) -> CadreResult<String> {
        let session_id = request.ctx.session_id;
        let unit = request.ctx.unit.as_str();

        let mut context = ContextWindow::new(self.max_messages);
        context.set_system_prompt(request.system_prompt);
        for msg in &request.preamble {
            context.push(msg.clone());
        }
        context.push(Message::user(request.task, session_id));

        let descriptors = request.tools.descriptors();

        info!(unit, session_id = %session_id, tools = descriptors.len(), "Starting tool loop");

        for turn in 1..=self.max_turns {
            *turns = turn;
            debug!(
                unit,
                turn,
                estimated_tokens = context.estimated_tokens(),
                "Tool loop turn"
            );

            let response = self
                .llm
                .chat(context.system_prompt(), context.messages(), &descriptors)
                .await?;

            match response {
                LlmResponse::Done(text) => {
                    info!(unit, session_id = %session_id, turns = turn, "Tool loop completed");
                    return Ok(text);
                }

                LlmResponse::Text(text) => {
                    context.push(Message::assistant(text, session_id));
                    context.push(Message::user("Continue.", session_id));
                }

                LlmResponse::ToolUse {
                    content,
                    tool_calls,
                } => {
                    context.push(Message::assistant(
                        describe_tool_use(content.as_deref(), &tool_calls),
                        session_id,
                    ));

                    for call in tool_calls {
                        let record = self.execute(request, call, turn).await;
                        let result_content = serde_json::json!({
                            "type": "tool_result",
                            "tool_use_id": record.call_id,
                            "content": record.output,
                            "is_error": record.is_error,
                        });
                        context.push(Message::new(
                            Role::Tool,
                            result_content.to_string(),
                            session_id,
                        ));
                        records.push(record);
                    }
                }
            }
        }

        warn!(
            unit,
            session_id = %session_id,
            max_turns = self.max_turns,
            "Tool loop reached max turns"
        );
        Err(CadreError::IterationLimit(self.max_turns))
    }

    async fn execute(
        &self,
        request: &RunRequest<'_>,
        call: ToolCall,
        turn: u32,
    ) -> ToolCallRecord {
        let ctx = request.ctx;
        info!(
            unit = %ctx.unit,
            session_id = %ctx.session_id,
            tool = %call.name,
            call_id = %call.id,
            turn,
            "Executing tool call"
        );

        let called = MemoryEvent::ToolCalled {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            arguments: call.arguments.clone(),
        };
        if let Err(e) = request.memory.record(ctx.session_id, &ctx.unit, called).await {
            warn!(unit = %ctx.unit, tool = %call.name, error = %e, "Failed to record tool call");
        }

        let tool = call.name.clone();
        let arguments = call.arguments.clone();
        let result = request.tools.invoke(call, ctx).await;
        if result.is_error {
            warn!(unit = %ctx.unit, tool = %tool, error = %result.content, "Tool returned an error");
        }

        let returned = MemoryEvent::ToolReturned {
            call_id: result.call_id.clone(),
            tool: tool.clone(),
            content: result.content.clone(),
            is_error: result.is_error,
        };
        if let Err(e) = request.memory.record(ctx.session_id, &ctx.unit, returned).await {
            warn!(unit = %ctx.unit, tool = %tool, error = %e, "Failed to record tool result");
        }

        ToolCallRecord {
            turn,
            call_id: result.call_id,
            tool,
            arguments,
            is_error: result.is_error,
            output: result.content,
        }
    }
}

fn describe_tool_use(content: Option<&str>, calls: &[ToolCall]) -> String {
    let mut text = content.map(str::to_string).unwrap_or_default();
    for call in calls {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&format!("[tool call {}] {}({})", call.id, call.name, call.arguments));
    }
    text
}
