use serde::{Deserialize, Serialize};

/// Every error a Cadre crate can return.
#[derive(Debug, thiserror::Error)]
pub enum CadreError {
    /// A worker's model loop went wrong.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An outbound request failed or answered non-2xx.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Bad or missing configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// A tool could not run.
    #[error("Tool error: {0}")]
    Tool(String),

    /// The event log or long-term store failed.
    #[error("Memory error: {0}")]
    Memory(String),

    /// A router's choice did not name exactly one child.
    #[error("Selection error: {0}")]
    Selection(String),

    /// A coordinator's plan was empty, malformed or cyclic.
    #[error("Plan error: {0}")]
    Plan(String),

    /// The worker loop hit its turn limit.
    #[error("Iteration limit exceeded: no final answer after {0} turns")]
    IterationLimit(u32),

    /// Rejected before any work started.
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// A deadline elapsed.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The delegation engine itself failed.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// The HTTP gateway failed.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// JSON encoding or decoding.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem or socket I/O.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// `Result` with [`CadreError`].
pub type CadreResult<T> = Result<T, CadreError>;

/// Why a unit invocation failed, carried on failed results so callers can
/// branch without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A tool call failed. Recoverable inside a worker loop.
    ToolInvocation,
    /// A router's choice was not exactly one of its children.
    Selection,
    /// A worker ran out of turns.
    IterationLimit,
    /// A coordinator got no usable plan.
    Plan,
    /// The model call failed: transport, auth or an unreadable reply.
    Model,
    /// The task was empty or unusable.
    InvalidTask,
    /// The caller's deadline elapsed.
    Timeout,
    /// The only delegated child failed.
    ChildFailed,
    /// Memory could not be read or written.
    Memory,
    /// Anything else.
    Internal,
}

impl FailureKind {
    /// The snake_case name, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToolInvocation => "tool_invocation",
            Self::Selection => "selection",
            Self::IterationLimit => "iteration_limit",
            Self::Plan => "plan",
            Self::Model => "model",
            Self::InvalidTask => "invalid_task",
            Self::Timeout => "timeout",
            Self::ChildFailed => "child_failed",
            Self::Memory => "memory",
            Self::Internal => "internal",
        }
    }
}

impl From<&CadreError> for FailureKind {
    fn from(err: &CadreError) -> Self {
        match err {
            CadreError::Tool(_) => Self::ToolInvocation,
            CadreError::Selection(_) => Self::Selection,
            CadreError::IterationLimit(_) => Self::IterationLimit,
            CadreError::Plan(_) => Self::Plan,
            CadreError::Agent(_) | CadreError::Http(_) => Self::Model,
            CadreError::InvalidTask(_) => Self::InvalidTask,
            CadreError::Timeout(_) => Self::Timeout,
            CadreError::Memory(_) => Self::Memory,
            CadreError::Config(_)
            | CadreError::Orchestrator(_)
            | CadreError::Gateway(_)
            | CadreError::Json(_)
            | CadreError::Io(_) => Self::Internal,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_failure_kinds() {
        let cases = [
            (CadreError::Selection("none".into()), FailureKind::Selection),
            (CadreError::IterationLimit(5), FailureKind::IterationLimit),
            (CadreError::Http("503".into()), FailureKind::Model),
            (CadreError::Tool("crm down".into()), FailureKind::ToolInvocation),
            (CadreError::Config("bad".into()), FailureKind::Internal),
        ];
        for (err, kind) in cases {
            assert_eq!(FailureKind::from(&err), kind, "{err}");
        }
    }

    #[test]
    fn display_matches_serde_name() {
        for kind in [FailureKind::IterationLimit, FailureKind::ChildFailed] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }
}
