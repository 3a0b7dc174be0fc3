use crate::merge::{concatenate, CriteriaJudge, MergeStrategy, Section};
use crate::plan::{Plan, PlanStep};
use crate::planning::PlanningStrategy;
use crate::result::{CriteriaVerdict, ResultStatus, SkippedStep, UnitKind, UnitResult};
use crate::task::Task;
use crate::unit::{check_children, delegate, Context, Unit, UnitDescriptor};
use async_trait::async_trait;
use cadre_core::{CadreResult, FailureKind};
use chrono::Utc;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Success criteria and the judge that checks them.
struct Criteria {
    text: String,
    judge: CriteriaJudge,
}

/// What happened to one plan step.
enum StepOutcome {
    Ran(UnitResult),
    Skipped(String),
}

/// Plans a fan-out over its children, runs it, and merges the results.
pub struct Coordinator {
    name: String,
    role: String,
    instructions: String,
    children: Vec<Arc<dyn Unit>>,
    planner: Box<dyn PlanningStrategy>,
    merge: MergeStrategy,
    criteria: Option<Criteria>,
}

impl Coordinator {
    /// A coordinator over `children`, which must be non-empty with unique names.
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        children: Vec<Arc<dyn Unit>>,
        planner: Box<dyn PlanningStrategy>,
    ) -> CadreResult<Self> {
        let name = name.into();
        check_children(&name, &children)?;
        Ok(Self {
            name,
            role: role.into(),
            instructions: String::new(),
            children,
            planner,
            merge: MergeStrategy::default(),
            criteria: None,
        })
    }

    /// Standing instructions shown to the planning model.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// How child outputs become this unit's output.
    pub fn with_merge(mut self, merge: MergeStrategy) -> Self {
        self.merge = merge;
        self
    }

    /// Check every merged output against `criteria`. The verdict is advisory.
    pub fn with_success_criteria(mut self, criteria: impl Into<String>, judge: CriteriaJudge) -> Self {
        self.criteria = Some(Criteria {
            text: criteria.into(),
            judge,
        });
        self
    }

    async fn obtain_plan(&self, task: &Task) -> CadreResult<Plan> {
        let members: Vec<UnitDescriptor> = self.children.iter().map(|c| c.descriptor()).collect();
        let plan = self.planner.plan(&self.descriptor(), &members, task).await?;
        let names: Vec<&str> = self.children.iter().map(|c| c.name()).collect();
        plan.validate(&names)?;
        Ok(plan)
    }

    /// Run ready steps in waves until every step has run or been skipped.
    async fn execute(
        &self,
        plan: &Plan,
        task: &Task,
        ctx: &Context,
    ) -> (HashMap<String, StepOutcome>, Vec<String>) {
        let mut outcomes: HashMap<String, StepOutcome> = HashMap::new();
        let mut invocation_order: Vec<String> = Vec::new();

        while outcomes.len() < plan.steps.len() {
            let ready: Vec<&PlanStep> = plan
                .steps
                .iter()
                .filter(|s| !outcomes.contains_key(&s.id))
                .filter(|s| s.depends_on.iter().all(|d| outcomes.contains_key(d)))
                .collect();
            if ready.is_empty() {
                // Unreachable for a validated plan.
                break;
            }

            let mut runnable = Vec::new();
            for step in ready {
                match blocked_by(step, &outcomes) {
                    Some(dep) => {
                        warn!(
                            unit = %self.name,
                            step = %step.id,
                            child = %step.child,
                            dependency = %dep,
                            "Skipping step after failed dependency"
                        );
                        outcomes.insert(
                            step.id.clone(),
                            StepOutcome::Skipped(format!("dependency '{dep}' did not succeed")),
                        );
                    }
                    None => runnable.push(step),
                }
            }

            let wave = runnable.iter().map(|step| {
                let sub_task = task.derive(with_inputs(step, plan, &outcomes));
                let child = self.children.iter().find(|c| c.name() == step.child);
                async move {
                    match child {
                        Some(child) => delegate(&self.name, child, &sub_task, ctx).await,
                        None => UnitResult::failed(
                            &step.child,
                            UnitKind::Worker,
                            &sub_task,
                            Utc::now(),
                            FailureKind::Internal,
                            "Child vanished after plan validation",
                        ),
                    }
                }
            });
            let results = join_all(wave).await;

            for (step, result) in runnable.into_iter().zip(results) {
                invocation_order.push(step.id.clone());
                outcomes.insert(step.id.clone(), StepOutcome::Ran(result));
            }
        }

        (outcomes, invocation_order)
    }

    async fn check_criteria(&self, task: &Task, output: &str) -> Option<CriteriaVerdict> {
        let criteria = self.criteria.as_ref()?;
        match criteria.judge.judge(&criteria.text, task.text(), output).await {
            Ok(verdict) => {
                if !verdict.met {
                    warn!(unit = %self.name, rationale = %verdict.rationale, "Success criteria not met");
                }
                Some(verdict)
            }
            Err(e) => {
                warn!(unit = %self.name, error = %e, "Success criteria check failed");
                None
            }
        }
    }
}

/// The first dependency of `step` that did not succeed, if any.
fn blocked_by<'a>(step: &'a PlanStep, outcomes: &HashMap<String, StepOutcome>) -> Option<&'a str> {
    step.depends_on
        .iter()
        .find(|dep| match outcomes.get(dep.as_str()) {
            Some(StepOutcome::Ran(result)) => result.status() == ResultStatus::Failed,
            _ => true,
        })
        .map(String::as_str)
}

/// The step's task followed by the outputs of its dependencies.
fn with_inputs(step: &PlanStep, plan: &Plan, outcomes: &HashMap<String, StepOutcome>) -> String {
    let mut text = step.task.clone();
    for dep in &step.depends_on {
        let Some(StepOutcome::Ran(result)) = outcomes.get(dep) else {
            continue;
        };
        let child = plan
            .steps
            .iter()
            .find(|s| &s.id == dep)
            .map_or(result.unit(), |s| s.child.as_str());
        text.push_str(&format!(
            "\n\n## Input from {child} (step {dep})\n{}",
            result.output().trim()
        ));
    }
    text
}

#[async_trait]
impl Unit for Coordinator {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> &str {
        &self.role
    }

    fn kind(&self) -> UnitKind {
        UnitKind::Coordinator
    }

    fn instructions(&self) -> &str {
        &self.instructions
    }

    fn children(&self) -> &[Arc<dyn Unit>] {
        &self.children
    }

    async fn invoke(&self, task: &Task, ctx: &Context) -> UnitResult {
        let started = Utc::now();

        let plan = match self.obtain_plan(task).await {
            Ok(plan) => plan,
            Err(e) => {
                return UnitResult::failed(
                    &self.name,
                    UnitKind::Coordinator,
                    task,
                    started,
                    FailureKind::from(&e),
                    e.to_string(),
                )
            }
        };
        info!(
            unit = %self.name,
            task_id = %task.id(),
            steps = plan.steps.len(),
            "Coordinator plan ready"
        );

        let (mut outcomes, order) = self.execute(&plan, task, ctx).await;

        // Sections follow plan order; contributions follow invocation order.
        let sections: Vec<Section<'_>> = plan
            .steps
            .iter()
            .filter_map(|step| match outcomes.get(&step.id)? {
                StepOutcome::Ran(result) => Some(Section::Ran(result)),
                StepOutcome::Skipped(reason) => Some(Section::Skipped {
                    child: &step.child,
                    reason,
                }),
            })
            .collect();
        let material = concatenate(sections);

        let skipped: Vec<SkippedStep> = plan
            .steps
            .iter()
            .filter_map(|step| match outcomes.get(&step.id)? {
                StepOutcome::Skipped(reason) => Some(SkippedStep {
                    step_id: step.id.clone(),
                    child: step.child.clone(),
                    reason: reason.clone(),
                }),
                StepOutcome::Ran(_) => None,
            })
            .collect();

        let contributions: Vec<UnitResult> = order
            .iter()
            .filter_map(|id| match outcomes.remove(id)? {
                StepOutcome::Ran(result) => Some(result),
                StepOutcome::Skipped(_) => None,
            })
            .collect();

        let succeeded = contributions
            .iter()
            .filter(|r| r.status() != ResultStatus::Failed)
            .count();
        let fully_succeeded = skipped.is_empty()
            && contributions
                .iter()
                .all(|r| r.status() == ResultStatus::Succeeded);

        if succeeded == 0 {
            return UnitResult::failed(
                &self.name,
                UnitKind::Coordinator,
                task,
                started,
                FailureKind::ChildFailed,
                format!("All {} planned steps failed or were skipped", plan.steps.len()),
            )
            .with_contributions(contributions)
            .with_skipped(skipped);
        }

        let output = match &self.merge {
            MergeStrategy::Concatenate => material,
            MergeStrategy::Summarize(summarizer) => {
                match summarizer.summarize(&self.name, task.text(), &material).await {
                    Ok(summary) => summary,
                    Err(e) => {
                        warn!(unit = %self.name, error = %e, "Summary failed, concatenating");
                        material
                    }
                }
            }
        };

        let verdict = self.check_criteria(task, &output).await;

        let payloads: serde_json::Map<String, serde_json::Value> = contributions
            .iter()
            .filter_map(|r| Some((r.unit().to_string(), r.payload()?.clone())))
            .collect();

        let status = if fully_succeeded {
            ResultStatus::Succeeded
        } else {
            ResultStatus::PartiallyFailed
        };
        info!(
            unit = %self.name,
            task_id = %task.id(),
            status = %status,
            ran = contributions.len(),
            skipped = skipped.len(),
            "Coordinator finished"
        );

        let result = UnitResult::succeeded(&self.name, UnitKind::Coordinator, task, started, output)
            .with_status(status)
            .with_contributions(contributions)
            .with_skipped(skipped)
            .with_verdict(verdict);
        if payloads.is_empty() {
            result
        } else {
            result.with_payload(serde_json::Value::Object(payloads))
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("name", &self.name)
            .field(
                "children",
                &self.children.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("merge", &self.merge)
            .field("criteria", &self.criteria.as_ref().map(|c| &c.text))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::planning::{BroadcastPlanner, PipelinePlanner};
    use cadre_memory::Memory;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Records the task text it saw; optionally fails.
    struct Canned {
        name: String,
        fail: bool,
        seen: Mutex<Vec<String>>,
    }

    impl Canned {
        fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                fail,
                seen: Mutex::new(Vec::new()),
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
            self.seen.lock().unwrap().push(task.text().to_string());
            if self.fail {
                UnitResult::failed(
                    &self.name,
                    UnitKind::Worker,
                    task,
                    Utc::now(),
                    FailureKind::Model,
                    "model unavailable",
                )
            } else {
                UnitResult::succeeded(
                    &self.name,
                    UnitKind::Worker,
                    task,
                    Utc::now(),
                    format!("{} output", self.name),
                )
            }
        }
    }

    fn ctx() -> Context {
        Context::new(Uuid::new_v4(), Arc::new(Memory::in_memory()))
    }

    #[tokio::test]
    async fn pipeline_passes_outputs_forward() {
        let a = Canned::new("Research", false);
        let b = Canned::new("Writer", false);
        let coordinator = Coordinator::new(
            "Agency",
            "Runs campaigns",
            vec![a.clone(), b.clone()],
            Box::new(PipelinePlanner),
        )
        .unwrap();
        let ctx = ctx();

        let result = coordinator
            .invoke(&Task::new("Launch blog post", ctx.session_id), &ctx)
            .await;
        assert!(result.is_success());
        let writer_saw = b.seen.lock().unwrap()[0].clone();
        assert!(writer_saw.starts_with("Launch blog post"));
        assert!(writer_saw.contains("## Input from Research (step s1)\nResearch output"));
        assert_eq!(result.output(), "## Research\nResearch output\n\n## Writer\nWriter output");
    }

    #[tokio::test]
    async fn failed_dependency_skips_dependents() {
        let a = Canned::new("Research", true);
        let b = Canned::new("Writer", false);
        let c = Canned::new("Audit", false);
        let coordinator = Coordinator::new(
            "Agency",
            "r",
            vec![a, b.clone(), c],
            Box::new(PipelinePlanner),
        )
        .unwrap();
        let ctx = ctx();

        let result = coordinator.invoke(&Task::new("go", ctx.session_id), &ctx).await;
        assert_eq!(result.status(), ResultStatus::Failed);
        assert_eq!(result.failure().unwrap().kind, FailureKind::ChildFailed);
        assert_eq!(result.skipped().len(), 2);
        assert_eq!(result.skipped()[0].child, "Writer");
        assert!(b.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn broadcast_failure_is_partial() {
        let coordinator = Coordinator::new(
            "Panel",
            "r",
            vec![Canned::new("A", false), Canned::new("B", true)],
            Box::new(BroadcastPlanner),
        )
        .unwrap();
        let ctx = ctx();

        let result = coordinator.invoke(&Task::new("go", ctx.session_id), &ctx).await;
        assert_eq!(result.status(), ResultStatus::PartiallyFailed);
        assert!(result.failure().is_none());
        assert!(result.output().contains("## B (failed: model)"));
        assert_eq!(result.contributions().len(), 2);
    }

    #[test]
    fn duplicate_children_are_rejected() {
        let err = Coordinator::new(
            "Team",
            "r",
            vec![Canned::new("A", false), Canned::new("A", false)],
            Box::new(BroadcastPlanner),
        )
        .unwrap_err();
        assert!(err.to_string().contains("twice"));
    }
}
