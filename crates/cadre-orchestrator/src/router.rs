use crate::merge::Summarizer;
use crate::result::{ResultStatus, UnitKind, UnitResult};
use crate::selection::SelectionStrategy;
use crate::task::Task;
use crate::unit::{check_children, delegate, resolve_member, Context, Unit, UnitDescriptor};
use async_trait::async_trait;
use cadre_core::{CadreResult, FailureKind};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Delegates each task to exactly one child.
pub struct Router {
    name: String,
    role: String,
    instructions: String,
    children: Vec<Arc<dyn Unit>>,
    selector: Box<dyn SelectionStrategy>,
    summarizer: Option<Summarizer>,
}

impl Router {
    /// A router over `children`, which must be non-empty with unique names.
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        children: Vec<Arc<dyn Unit>>,
        selector: Box<dyn SelectionStrategy>,
    ) -> CadreResult<Self> {
        let name = name.into();
        check_children(&name, &children)?;
        Ok(Self {
            name,
            role: role.into(),
            instructions: String::new(),
            children,
            selector,
            summarizer: None,
        })
    }

    /// Standing instructions shown to the selection model.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Rewrite the child's output before returning it.
    pub fn with_summarizer(mut self, summarizer: Summarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    fn failed(
        &self,
        task: &Task,
        started: DateTime<Utc>,
        kind: FailureKind,
        message: String,
    ) -> UnitResult {
        UnitResult::failed(&self.name, UnitKind::Router, task, started, kind, message)
    }
}

#[async_trait]
impl Unit for Router {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> &str {
        &self.role
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Router
    }

    fn instructions(&self) -> &str {
        &self.instructions
    }

    fn children(&self) -> &[Arc<dyn Unit>] {
        &self.children
    }

    async fn invoke(&self, task: &Task, ctx: &Context) -> UnitResult {
        let started = Utc::now();
        let members: Vec<UnitDescriptor> = self.children.iter().map(|c| c.descriptor()).collect();

        let selection = match self.selector.select(&self.descriptor(), &members, task).await {
            Ok(s) => s,
            Err(e) => return self.failed(task, started, FailureKind::from(&e), e.to_string()),
        };

        // The strategy may return any name; only members are accepted.
        let chosen = match resolve_member(&selection.child, &members) {
            Ok(m) => m.name.clone(),
            Err(e) => return self.failed(task, started, FailureKind::Selection, e.to_string()),
        };
        let Some(child) = self.children.iter().find(|c| c.name() == chosen) else {
            return self.failed(
                task,
                started,
                FailureKind::Selection,
                format!("'{chosen}' is not a member"),
            );
        };

        info!(
            unit = %self.name,
            child = %chosen,
            task_id = %task.id(),
            rewritten = selection.task.is_some(),
            "Router selected child"
        );

        let sub_task = task.derive(selection.task.unwrap_or_else(|| task.text().to_string()));
        let child_result = delegate(&self.name, child, &sub_task, ctx).await;

        if child_result.status() == ResultStatus::Failed {
            let message = child_result
                .failure()
                .map(|f| format!("'{}' failed ({}): {}", chosen, f.kind, f.message))
                .unwrap_or_else(|| format!("'{chosen}' failed"));
            return self
                .failed(task, started, FailureKind::ChildFailed, message)
                .with_contributions(vec![child_result]);
        }

        let output = match &self.summarizer {
            Some(summarizer) => {
                match summarizer
                    .summarize(&self.name, task.text(), child_result.output())
                    .await
                {
                    Ok(summary) => summary,
                    Err(e) => {
                        warn!(
                            unit = %self.name,
                            error = %e,
                            "Summary failed, returning child output"
                        );
                        child_result.output().to_string()
                    }
                }
            }
            None => child_result.output().to_string(),
        };

        let result = UnitResult::succeeded(&self.name, UnitKind::Router, task, started, output)
            .with_status(child_result.status());
        let result = match child_result.payload() {
            Some(payload) => result.with_payload(payload.clone()),
            None => result,
        };
        result.with_contributions(vec![child_result])
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("name", &self.name)
            .field(
                "children",
                &self.children.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("summarizer", &self.summarizer.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::selection::{KeywordRule, KeywordSelector, Selection};
    use cadre_memory::Memory;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    /// Counts invocations; optionally fails.
    struct Canned {
        name: String,
        calls: AtomicU32,
        fail: bool,
    }

    impl Canned {
        fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                calls: AtomicU32::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl Unit for Canned {
        fn name(&self) -> &str {
            &self.name
        }
        fn role(&self) -> &str {
            "canned"
        }
        fn kind(&self) -> UnitKind {
            UnitKind::Worker
        }
        fn instructions(&self) -> &str {
            ""
        }
        async fn invoke(&self, task: &Task, _ctx: &Context) -> UnitResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                UnitResult::failed(
                    &self.name,
                    UnitKind::Worker,
                    task,
                    Utc::now(),
                    FailureKind::Model,
                    "boom",
                )
            } else {
                UnitResult::succeeded(
                    &self.name,
                    UnitKind::Worker,
                    task,
                    Utc::now(),
                    format!("{} did: {}", self.name, task.text()),
                )
            }
        }
    }

    /// Always returns the configured name.
    struct Fixed(&'static str);

    #[async_trait]
    impl SelectionStrategy for Fixed {
        async fn select(
            &self,
            _router: &UnitDescriptor,
            _children: &[UnitDescriptor],
            _task: &Task,
        ) -> CadreResult<Selection> {
            Ok(Selection {
                child: self.0.into(),
                task: Some("rewritten".into()),
            })
        }
    }

    fn ctx() -> Context {
        Context::new(Uuid::new_v4(), Arc::new(Memory::in_memory()))
    }

    #[test]
    fn empty_child_set_is_rejected() {
        assert!(Router::new("R", "r", Vec::new(), Box::new(Fixed("x"))).is_err());
    }

    #[tokio::test]
    async fn exactly_one_child_runs() {
        let a = Canned::new("A", false);
        let b = Canned::new("B", false);
        let router =
            Router::new("R", "r", vec![a.clone(), b.clone()], Box::new(Fixed("B"))).unwrap();
        let ctx = ctx();

        let result = router.invoke(&Task::new("go", ctx.session_id), &ctx).await;
        assert!(result.is_success());
        assert_eq!(result.output(), "B did: rewritten");
        assert_eq!(result.contributions().len(), 1);
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_member_choice_is_selection_failure() {
        let a = Canned::new("A", false);
        let router = Router::new("R", "r", vec![a.clone()], Box::new(Fixed("Z"))).unwrap();
        let ctx = ctx();

        let result = router.invoke(&Task::new("go", ctx.session_id), &ctx).await;
        assert_eq!(result.failure().unwrap().kind, FailureKind::Selection);
        assert!(result.contributions().is_empty());
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_child_is_child_failed() {
        let a = Canned::new("A", true);
        let selector = KeywordSelector::new(vec![KeywordRule::new(["go"], "A")]);
        let router = Router::new("R", "r", vec![a], Box::new(selector)).unwrap();
        let ctx = ctx();

        let result = router.invoke(&Task::new("go", ctx.session_id), &ctx).await;
        assert_eq!(result.failure().unwrap().kind, FailureKind::ChildFailed);
        assert_eq!(result.contributions()[0].unit(), "A");
    }
}
