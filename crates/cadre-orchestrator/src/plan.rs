use cadre_core::{CadreError, CadreResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One delegation in a coordinator's plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Step id, unique within the plan.
    pub id: String,
    /// Child that runs the step.
    pub child: String,
    /// Sub-task text for the child.
    pub task: String,
    /// Steps whose output this step needs.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl PlanStep {
    /// An independent step.
    pub fn new(id: impl Into<String>, child: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            child: child.into(),
            task: task.into(),
            depends_on: Vec::new(),
        }
    }

    /// Add a dependency on step `id`.
    pub fn after(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }
}

/// Which children run, with what sub-task, and in what order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Steps in plan order.
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// A plan of `steps`.
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    /// Check the plan against the coordinator's `members`.
    ///
    /// A valid plan has at least one step, unique step ids, each member at
    /// most once, dependencies on existing steps only, and no cycle.
    pub fn validate(&self, members: &[&str]) -> CadreResult<()> {
        if self.steps.is_empty() {
            return Err(CadreError::Plan("Plan has no steps".into()));
        }

        let mut ids = HashSet::new();
        let mut children = HashSet::new();
        for step in &self.steps {
            if !ids.insert(step.id.as_str()) {
                return Err(CadreError::Plan(format!("Duplicate step id '{}'", step.id)));
            }
            if !members.contains(&step.child.as_str()) {
                return Err(CadreError::Plan(format!(
                    "Step '{}' assigns '{}', which is not a member",
                    step.id, step.child
                )));
            }
            if !children.insert(step.child.as_str()) {
                return Err(CadreError::Plan(format!(
                    "'{}' is assigned more than one step",
                    step.child
                )));
            }
            if step.task.trim().is_empty() {
                return Err(CadreError::Plan(format!("Step '{}' has an empty task", step.id)));
            }
        }

        for step in &self.steps {
            for dep in &step.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(CadreError::Plan(format!(
                        "Step '{}' depends on unknown step '{dep}'",
                        step.id
                    )));
                }
            }
        }

        if self.has_cycle() {
            return Err(CadreError::Plan("Plan dependencies form a cycle".into()));
        }
        Ok(())
    }

    /// Whether the dependency graph has a cycle.
    pub fn has_cycle(&self) -> bool {
        let deps: HashMap<&str, &[String]> = self
            .steps
            .iter()
            .map(|s| (s.id.as_str(), s.depends_on.as_slice()))
            .collect();
        let mut visited = HashMap::new();
        self.steps
            .iter()
            .any(|s| dfs_cycle(s.id.as_str(), &deps, &mut visited))
    }
}

fn dfs_cycle<'a>(
    id: &'a str,
    deps: &HashMap<&'a str, &'a [String]>,
    visited: &mut HashMap<&'a str, u8>,
) -> bool {
    match visited.get(id) {
        Some(1) => return true,  // back edge
        Some(2) => return false, // done
        _ => {}
    }
    visited.insert(id, 1);
    if let Some(next) = deps.get(id) {
        for dep in *next {
            if dfs_cycle(dep.as_str(), deps, visited) {
                return true;
            }
        }
    }
    visited.insert(id, 2);
    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const MEMBERS: &[&str] = &["Research", "Writer", "Editor"];

    fn pipeline() -> Plan {
        Plan::new(vec![
            PlanStep::new("s1", "Research", "Collect facts"),
            PlanStep::new("s2", "Writer", "Draft").after("s1"),
            PlanStep::new("s3", "Editor", "Polish").after("s2"),
        ])
    }

    #[test]
    fn valid_pipeline() {
        pipeline().validate(MEMBERS).unwrap();
        assert!(!pipeline().has_cycle());
    }

    #[test]
    fn empty_plan_is_rejected() {
        assert!(Plan::default().validate(MEMBERS).is_err());
    }

    #[test]
    fn non_member_and_reused_member_are_rejected() {
        let plan = Plan::new(vec![PlanStep::new("s1", "Designer", "Logo")]);
        assert!(plan.validate(MEMBERS).unwrap_err().to_string().contains("not a member"));

        let plan = Plan::new(vec![
            PlanStep::new("s1", "Writer", "Draft A"),
            PlanStep::new("s2", "Writer", "Draft B"),
        ]);
        assert!(plan.validate(MEMBERS).unwrap_err().to_string().contains("more than one"));
    }

    #[test]
    fn unknown_dependency_and_duplicate_id_are_rejected() {
        let plan = Plan::new(vec![PlanStep::new("s1", "Writer", "Draft").after("s0")]);
        assert!(plan.validate(MEMBERS).is_err());

        let plan = Plan::new(vec![
            PlanStep::new("s1", "Writer", "Draft"),
            PlanStep::new("s1", "Editor", "Polish"),
        ]);
        assert!(plan.validate(MEMBERS).unwrap_err().to_string().contains("Duplicate"));
    }

    #[test]
    fn cycle_is_detected() {
        let plan = Plan::new(vec![
            PlanStep::new("a", "Writer", "Draft").after("b"),
            PlanStep::new("b", "Editor", "Polish").after("a"),
        ]);
        assert!(plan.has_cycle());
        let err = plan.validate(MEMBERS).unwrap_err();
        assert!(matches!(err, CadreError::Plan(_)));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let plan = Plan::new(vec![PlanStep::new("a", "Writer", "Draft").after("a")]);
        assert!(plan.has_cycle());
    }
}
