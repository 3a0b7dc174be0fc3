use crate::monitor::UnitMonitor;
use crate::result::{UnitKind, UnitResult};
use crate::task::Task;
use async_trait::async_trait;
use cadre_core::{CadreError, CadreResult, FailureKind};
use cadre_memory::{Memory, MemoryEvent};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Per-invocation context handed down the delegation tree.
#[derive(Clone)]
pub struct Context {
    /// Session the task belongs to.
    pub session_id: Uuid,
    /// Shared memory handle.
    pub memory: Arc<Memory>,
    /// Counters updated around every invocation, if attached.
    pub monitor: Option<Arc<UnitMonitor>>,
    /// Where cancelled invocations park their outcome for the caller to
    /// settle. Without one they settle on a spawned task.
    abandoned: Option<Arc<Mutex<Vec<UnitResult>>>>,
}

impl Context {
    /// A context for `session_id` with no monitor attached.
    pub fn new(session_id: Uuid, memory: Arc<Memory>) -> Self {
        Self {
            session_id,
            memory,
            monitor: None,
            abandoned: None,
        }
    }

    /// Attach a monitor.
    pub fn with_monitor(mut self, monitor: Arc<UnitMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Collect the outcomes of cancelled invocations instead of settling
    /// them in the background; drain with [`take_abandoned`](Self::take_abandoned).
    pub(crate) fn collecting_abandoned(mut self) -> Self {
        self.abandoned = Some(Arc::new(Mutex::new(Vec::new())));
        self
    }

    /// Outcomes parked by cancelled invocations since the last call.
    pub(crate) fn take_abandoned(&self) -> Vec<UnitResult> {
        match &self.abandoned {
            Some(list) => std::mem::take(&mut *list.lock().unwrap_or_else(|e| e.into_inner())),
            None => Vec::new(),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("session_id", &self.session_id)
            .field("monitor", &self.monitor.is_some())
            .finish_non_exhaustive()
    }
}

/// What a parent (or its selection and planning strategies) sees of a unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitDescriptor {
    /// Unit name, unique within an organization.
    pub name: String,
    /// One-line role description.
    pub role: String,
    /// Unit kind.
    pub kind: UnitKind,
    /// Standing instructions.
    pub instructions: String,
    /// Tool names (workers only).
    pub tools: Vec<String>,
}

/// A node in the delegation tree.
///
/// Implementations never panic and never return raw errors from
/// [`invoke`](Unit::invoke): every outcome is a [`UnitResult`].
#[async_trait]
pub trait Unit: Send + Sync {
    /// Unit name.
    fn name(&self) -> &str;

    /// One-line role description.
    fn role(&self) -> &str;

    /// Unit kind.
    fn kind(&self) -> UnitKind;

    /// Standing instructions.
    fn instructions(&self) -> &str;

    /// Children in declared order. Empty for workers.
    fn children(&self) -> &[Arc<dyn Unit>] {
        &[]
    }

    /// Tool names. Empty for routers and coordinators.
    fn tools(&self) -> Vec<String> {
        Vec::new()
    }

    /// Handle `task`.
    async fn invoke(&self, task: &Task, ctx: &Context) -> UnitResult;

    /// Descriptor used in prompts and listings.
    fn descriptor(&self) -> UnitDescriptor {
        UnitDescriptor {
            name: self.name().to_string(),
            role: self.role().to_string(),
            kind: self.kind(),
            instructions: self.instructions().to_string(),
            tools: self.tools(),
        }
    }
}

/// Invoke `unit` with the bookkeeping every invocation gets: blank-task
/// rejection, monitor counters, and `TaskReceived` / `Completed` / `Failed`
/// events in the session log.
pub async fn invoke_unit(unit: &dyn Unit, task: &Task, ctx: &Context) -> UnitResult {
    let started = Utc::now();
    let name = unit.name();

    if task.is_blank() {
        warn!(unit = name, task_id = %task.id(), "Rejected blank task");
        return UnitResult::failed(
            name,
            unit.kind(),
            task,
            started,
            FailureKind::InvalidTask,
            "Task text is empty",
        );
    }

    if let Some(monitor) = &ctx.monitor {
        monitor.start(name).await;
    }
    let mut in_flight = InFlight {
        unit: name.to_string(),
        kind: unit.kind(),
        task: task.clone(),
        started,
        ctx: ctx.clone(),
        settled: false,
    };

    let received = ctx
        .memory
        .record(
            ctx.session_id,
            name,
            MemoryEvent::TaskReceived {
                task: task.text().to_string(),
            },
        )
        .await;

    let result = match received {
        Ok(_) => unit.invoke(task, ctx).await,
        Err(e) => UnitResult::failed(
            name,
            unit.kind(),
            task,
            started,
            FailureKind::from(&e),
            e.to_string(),
        ),
    };

    finish_invocation(&result, ctx).await;
    in_flight.settled = true;
    result
}

/// An invocation that has been counted as started. Dropping it unsettled,
/// as a caller's deadline does, still finishes it as a `Timeout` failure.
struct InFlight {
    unit: String,
    kind: UnitKind,
    task: Task,
    started: DateTime<Utc>,
    ctx: Context,
    settled: bool,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!(unit = %self.unit, task_id = %self.task.id(), "Invocation cancelled");
        let result = UnitResult::failed(
            self.unit.as_str(),
            self.kind,
            &self.task,
            self.started,
            FailureKind::Timeout,
            "Cancelled before producing a result",
        );
        if let Some(list) = &self.ctx.abandoned {
            list.lock().unwrap_or_else(|e| e.into_inner()).push(result);
        } else if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let ctx = self.ctx.clone();
            handle.spawn(async move { finish_invocation(&result, &ctx).await });
        }
    }
}

/// Record the outcome of an invocation in memory and the monitor.
pub(crate) async fn finish_invocation(result: &UnitResult, ctx: &Context) {
    let event = match result.failure() {
        Some(failure) => {
            error!(
                unit = result.unit(),
                session_id = %ctx.session_id,
                kind = %failure.kind,
                error = %failure.message,
                "Unit failed"
            );
            MemoryEvent::Failed {
                kind: failure.kind,
                message: failure.message.clone(),
            }
        }
        None => MemoryEvent::Completed {
            status: result.status().to_string(),
            output: result.output().to_string(),
        },
    };

    if let Err(e) = ctx.memory.record(ctx.session_id, result.unit(), event).await {
        warn!(unit = result.unit(), error = %e, "Failed to record invocation outcome");
    }

    if let Some(monitor) = &ctx.monitor {
        monitor.finish(result).await;
    }
}

/// Hand `task` from `parent` to `child`, recording the delegation.
pub(crate) async fn delegate(
    parent: &str,
    child: &Arc<dyn Unit>,
    task: &Task,
    ctx: &Context,
) -> UnitResult {
    info!(
        unit = parent,
        child = child.name(),
        session_id = %ctx.session_id,
        task_id = %task.id(),
        "Delegating task"
    );
    if let Err(e) = ctx
        .memory
        .record(
            ctx.session_id,
            parent,
            MemoryEvent::Delegated {
                child: child.name().to_string(),
                task: task.text().to_string(),
            },
        )
        .await
    {
        warn!(unit = parent, child = child.name(), error = %e, "Failed to record delegation");
    }
    invoke_unit(child.as_ref(), task, ctx).await
}

/// Resolve a name chosen by a model or a rule to a member of `members`.
///
/// An exact match wins; otherwise a single case-insensitive match is
/// accepted. Anything else is a [`CadreError::Selection`].
pub fn resolve_member<'a>(
    name: &str,
    members: &'a [UnitDescriptor],
) -> CadreResult<&'a UnitDescriptor> {
    let name = name.trim();
    if let Some(exact) = members.iter().find(|m| m.name == name) {
        return Ok(exact);
    }
    let folded: Vec<&UnitDescriptor> = members
        .iter()
        .filter(|m| m.name.eq_ignore_ascii_case(name))
        .collect();
    match folded.as_slice() {
        [only] => Ok(*only),
        [] => Err(CadreError::Selection(format!(
            "'{name}' is not a member (members: {})",
            member_list(members)
        ))),
        _ => Err(CadreError::Selection(format!(
            "'{name}' matches several members ignoring case"
        ))),
    }
}

/// Comma-separated member names.
pub(crate) fn member_list(members: &[UnitDescriptor]) -> String {
    members
        .iter()
        .map(|m| m.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Check a parent's child set: non-empty, names unique.
pub(crate) fn check_children(parent: &str, children: &[Arc<dyn Unit>]) -> CadreResult<()> {
    if children.is_empty() {
        return Err(CadreError::Config(format!(
            "Unit '{parent}' must have at least one child"
        )));
    }
    for (i, child) in children.iter().enumerate() {
        if children[..i].iter().any(|c| c.name() == child.name()) {
            return Err(CadreError::Config(format!(
                "Unit '{parent}' lists child '{}' twice",
                child.name()
            )));
        }
    }
    Ok(())
}
