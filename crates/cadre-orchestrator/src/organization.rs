use crate::monitor::UnitMonitor;
use crate::result::UnitResult;
use crate::task::Task;
use crate::unit::{finish_invocation, invoke_unit, Context, Unit, UnitDescriptor};
use cadre_core::{CadreError, CadreResult, FailureKind};
use cadre_memory::Memory;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// A built delegation tree plus the shared services its units run with.
pub struct Organization {
    root: Arc<dyn Unit>,
    units: BTreeMap<String, Arc<dyn Unit>>,
    memory: Arc<Memory>,
    monitor: Arc<UnitMonitor>,
    task_timeout: Option<Duration>,
}

impl Organization {
    /// An organization rooted at `root`. Every unit below it is addressable by name.
    pub fn new(root: Arc<dyn Unit>, memory: Arc<Memory>) -> Self {
        let mut units = BTreeMap::new();
        collect(&root, &mut units);
        Self {
            root,
            units,
            memory,
            monitor: Arc::new(UnitMonitor::new()),
            task_timeout: None,
        }
    }

    /// Stop waiting for a top-level task after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    /// Make a unit outside the root's tree addressable.
    pub(crate) fn add_unit(&mut self, unit: Arc<dyn Unit>) {
        collect(&unit, &mut self.units);
    }

    /// The root unit.
    pub fn root(&self) -> &Arc<dyn Unit> {
        &self.root
    }

    /// A unit by name.
    pub fn unit(&self, name: &str) -> Option<&Arc<dyn Unit>> {
        self.units.get(name)
    }

    /// Descriptors of every unit, sorted by name.
    pub fn descriptors(&self) -> Vec<UnitDescriptor> {
        self.units.values().map(|u| u.descriptor()).collect()
    }

    /// Shared memory.
    pub fn memory(&self) -> &Arc<Memory> {
        &self.memory
    }

    /// Per-unit counters.
    pub fn monitor(&self) -> &Arc<UnitMonitor> {
        &self.monitor
    }

    /// Invocation context for `session_id`.
    pub fn context(&self, session_id: Uuid) -> Context {
        Context::new(session_id, self.memory.clone()).with_monitor(self.monitor.clone())
    }

    /// Run `task` on the named unit, or the root when `unit` is `None`.
    ///
    /// The only error is an unknown unit name; every other outcome,
    /// including a timeout, is a [`UnitResult`].
    pub async fn run(&self, unit: Option<&str>, task: Task) -> CadreResult<UnitResult> {
        let target = match unit {
            Some(name) => self
                .unit(name)
                .ok_or_else(|| CadreError::Orchestrator(format!("Unknown unit '{name}'")))?,
            None => &self.root,
        };
        let ctx = self.context(task.session_id());
        info!(
            unit = target.name(),
            session_id = %ctx.session_id,
            task_id = %task.id(),
            channel = task.metadata().channel.as_deref().unwrap_or("-"),
            "Running task"
        );

        let Some(limit) = self.task_timeout else {
            return Ok(invoke_unit(target.as_ref(), &task, &ctx).await);
        };

        let ctx = ctx.collecting_abandoned();
        let started = Utc::now();
        let outcome = tokio::time::timeout(limit, invoke_unit(target.as_ref(), &task, &ctx)).await;
        match outcome {
            Ok(result) => Ok(result),
            Err(_) => {
                warn!(
                    unit = target.name(),
                    task_id = %task.id(),
                    timeout_secs = limit.as_secs(),
                    "Task timed out"
                );
                let result = UnitResult::failed(
                    target.name(),
                    target.kind(),
                    &task,
                    started,
                    FailureKind::Timeout,
                    format!("No result within {}s", limit.as_secs_f64()),
                );
                // Descendants cut off mid-run; the target itself is settled below.
                for cut in ctx.take_abandoned() {
                    if cut.unit() != target.name() || cut.task_id() != task.id() {
                        finish_invocation(&cut, &ctx).await;
                    }
                }
                finish_invocation(&result, &ctx).await;
                Ok(result)
            }
        }
    }

    /// The delegation tree as an indented list.
    pub fn tree(&self) -> String {
        let mut out = String::new();
        render(&self.root, 0, &mut out);
        out
    }
}

fn collect(unit: &Arc<dyn Unit>, units: &mut BTreeMap<String, Arc<dyn Unit>>) {
    if units.contains_key(unit.name()) {
        return;
    }
    units.insert(unit.name().to_string(), unit.clone());
    for child in unit.children() {
        collect(child, units);
    }
}

fn render(unit: &Arc<dyn Unit>, depth: usize, out: &mut String) {
    out.push_str(&format!(
        "{}- {} [{}] {}",
        "  ".repeat(depth),
        unit.name(),
        unit.kind(),
        unit.role()
    ));
    let tools = unit.tools();
    if !tools.is_empty() {
        out.push_str(&format!(" (tools: {})", tools.join(", ")));
    }
    out.push('\n');
    for child in unit.children() {
        render(child, depth + 1, out);
    }
}

impl std::fmt::Debug for Organization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Organization")
            .field("root", &self.root.name())
            .field("units", &self.units.keys().collect::<Vec<_>>())
            .field("task_timeout", &self.task_timeout)
            .finish_non_exhaustive()
    }
}
