use crate::task::Task;
use cadre_agent::ToolCallRecord;
use cadre_core::FailureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The three kinds of unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Leaf unit running a model tool loop.
    Worker,
    /// Delegates each task to exactly one child.
    Router,
    /// Plans a fan-out over its children and merges the results.
    Coordinator,
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnitKind::Worker => "worker",
            UnitKind::Router => "router",
            UnitKind::Coordinator => "coordinator",
        };
        f.write_str(s)
    }
}

/// Overall outcome of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// Everything that ran succeeded.
    Succeeded,
    /// Some delegated work failed or was skipped; the rest is usable.
    PartiallyFailed,
    /// No usable output.
    Failed,
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResultStatus::Succeeded => "succeeded",
            ResultStatus::PartiallyFailed => "partially_failed",
            ResultStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why an invocation failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    /// Failure class.
    pub kind: FailureKind,
    /// Human-readable detail.
    pub message: String,
}

/// A plan step a coordinator did not run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedStep {
    /// Plan step id.
    pub step_id: String,
    /// Child the step was assigned to.
    pub child: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Advisory judgement of a coordinator's output against its success criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaVerdict {
    /// The criteria text.
    pub criteria: String,
    /// Whether the judge considered the criteria met.
    pub met: bool,
    /// The judge's explanation.
    pub rationale: String,
}

/// What a unit produced for one task, plus how it got there.
///
/// Results are built once and never changed. A parent wraps its children's
/// results as contributions of a new result.
#[derive(Debug, Clone, Serialize)]
pub struct UnitResult {
    unit: String,
    kind: UnitKind,
    task_id: Uuid,
    status: ResultStatus,
    output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<Failure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    contributions: Vec<UnitResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    skipped: Vec<SkippedStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verdict: Option<CriteriaVerdict>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCallRecord>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl UnitResult {
    /// A successful result with `output`.
    pub fn succeeded(
        unit: impl Into<String>,
        kind: UnitKind,
        task: &Task,
        started_at: DateTime<Utc>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            unit: unit.into(),
            kind,
            task_id: task.id(),
            status: ResultStatus::Succeeded,
            output: output.into(),
            payload: None,
            failure: None,
            contributions: Vec::new(),
            skipped: Vec::new(),
            verdict: None,
            tool_calls: Vec::new(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// A failed result carrying `kind` and `message`.
    pub fn failed(
        unit: impl Into<String>,
        unit_kind: UnitKind,
        task: &Task,
        started_at: DateTime<Utc>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            status: ResultStatus::Failed,
            failure: Some(Failure {
                kind,
                message: message.clone(),
            }),
            ..Self::succeeded(unit, unit_kind, task, started_at, message)
        }
    }

    /// Attach a structured payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub(crate) fn with_status(mut self, status: ResultStatus) -> Self {
        self.status = status;
        self
    }

    pub(crate) fn with_contributions(mut self, contributions: Vec<UnitResult>) -> Self {
        self.contributions = contributions;
        self
    }

    pub(crate) fn with_skipped(mut self, skipped: Vec<SkippedStep>) -> Self {
        self.skipped = skipped;
        self
    }

    pub(crate) fn with_verdict(mut self, verdict: Option<CriteriaVerdict>) -> Self {
        self.verdict = verdict;
        self
    }

    pub(crate) fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Name of the unit that produced this result.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Kind of the producing unit.
    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    /// The task this result answers.
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Overall status.
    pub fn status(&self) -> ResultStatus {
        self.status
    }

    /// Whether the status is [`ResultStatus::Succeeded`].
    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Succeeded
    }

    /// Output text. For a failed result, the failure message.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Structured payload, if the output carried one.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.payload.as_ref()
    }

    /// Failure detail when the status is `Failed`.
    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// Child results, in invocation order.
    pub fn contributions(&self) -> &[UnitResult] {
        &self.contributions
    }

    /// Plan steps that were never run.
    pub fn skipped(&self) -> &[SkippedStep] {
        &self.skipped
    }

    /// Success-criteria verdict, if criteria were configured.
    pub fn verdict(&self) -> Option<&CriteriaVerdict> {
        self.verdict.as_ref()
    }

    /// Tool calls made by a worker.
    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }

    /// Invocation start.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Invocation end.
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// Wall-clock duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }

    /// Names of this unit and every unit below it that ran, depth-first.
    pub fn trail(&self) -> Vec<&str> {
        let mut names = vec![self.unit.as_str()];
        for child in &self.contributions {
            names.extend(child.trail());
        }
        names
    }

    /// Markdown rendering: the output, then a provenance section.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        if let Some(failure) = &self.failure {
            md.push_str(&format!("**Failed ({})**: {}\n", failure.kind, failure.message));
        } else {
            md.push_str(self.output.trim_end());
            md.push('\n');
        }

        if let Some(verdict) = &self.verdict {
            let mark = if verdict.met { "met" } else { "not met" };
            md.push_str(&format!(
                "\n_Success criteria {mark}: {}_\n",
                verdict.rationale
            ));
        }

        if !self.contributions.is_empty() || !self.skipped.is_empty() {
            md.push_str("\n---\n**Provenance**\n");
            self.push_provenance(&mut md, 0);
        }
        md
    }

    fn push_provenance(&self, md: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        md.push_str(&format!(
            "{indent}- {} ({}): {}",
            self.unit, self.kind, self.status
        ));
        if !self.tool_calls.is_empty() {
            md.push_str(&format!(", {} tool calls", self.tool_calls.len()));
        }
        md.push('\n');
        for child in &self.contributions {
            child.push_provenance(md, depth + 1);
        }
        for step in &self.skipped {
            md.push_str(&format!(
                "{indent}  - {} (skipped step `{}`): {}\n",
                step.child, step.step_id, step.reason
            ));
        }
    }
}
