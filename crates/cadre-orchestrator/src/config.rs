use crate::coordinator::Coordinator;
use crate::merge::{CriteriaJudge, MergeStrategy, Summarizer};
use crate::organization::Organization;
use crate::planning::{BroadcastPlanner, KeywordPlanner, ModelPlanner, PipelinePlanner, PlanningStrategy};
use crate::result::UnitKind;
use crate::router::Router;
use crate::selection::{KeywordRule, KeywordSelector, ModelSelector, SelectionStrategy};
use crate::unit::Unit;
use crate::worker::Worker;
use cadre_agent::{LlmClient, ModelConfig};
use cadre_core::{CadreError, CadreResult};
use cadre_memory::Memory;
use cadre_tools::ToolCatalog;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How a router picks its child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SelectionConfig {
    /// Ask the model.
    Model,
    /// First matching keyword rule, then `fallback`.
    Keyword {
        /// Rules, tried in order.
        rules: Vec<KeywordRule>,
        /// Child used when nothing matches.
        #[serde(default)]
        fallback: Option<String>,
    },
}

/// How a coordinator plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PlanningConfig {
    /// Ask the model for a JSON plan.
    Model,
    /// Every child in order, each fed the previous output.
    Pipeline,
    /// Every child, same task, in parallel.
    Broadcast,
    /// One step per matching keyword rule.
    Keyword {
        /// Rules; every match contributes a step.
        rules: Vec<KeywordRule>,
        /// Children used when nothing matches.
        #[serde(default)]
        fallback: Vec<String>,
    },
}

/// How a coordinator merges child outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeConfig {
    /// Headed sections per child.
    #[default]
    Concatenate,
    /// Model-written synthesis.
    Summarize,
}

/// One `[[org.units]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfig {
    /// Unique unit name.
    pub name: String,
    /// Worker, router or coordinator.
    pub kind: UnitKind,
    /// One-line role description.
    #[serde(default)]
    pub role: String,
    /// Standing instructions.
    #[serde(default)]
    pub instructions: String,
    /// Tool names (workers only).
    #[serde(default)]
    pub tools: Vec<String>,
    /// Child unit names (routers and coordinators only).
    #[serde(default)]
    pub children: Vec<String>,
    /// Model override for this unit.
    #[serde(default)]
    pub model: Option<ModelConfig>,
    /// Tool-loop turn limit override (workers).
    #[serde(default)]
    pub max_turns: Option<u32>,
    /// Router selection strategy; model-driven when absent.
    #[serde(default)]
    pub selection: Option<SelectionConfig>,
    /// Coordinator planning strategy; model-driven when absent.
    #[serde(default)]
    pub planning: Option<PlanningConfig>,
    /// Coordinator merge strategy.
    #[serde(default)]
    pub merge: MergeConfig,
    /// Router: summarize the child's output.
    #[serde(default)]
    pub summarize: bool,
    /// Extra guidance for router or coordinator summaries.
    #[serde(default)]
    pub summary_instructions: Option<String>,
    /// Coordinator success criteria, checked after merging.
    #[serde(default)]
    pub success_criteria: Option<String>,
    /// Worker: include the current UTC datetime in the prompt.
    #[serde(default)]
    pub add_datetime: bool,
    /// Worker: write final answers to the long-term store.
    #[serde(default)]
    pub remember_results: bool,
    /// Worker: recent session events shown to the model.
    #[serde(default)]
    pub history_window: Option<usize>,
    /// Worker: long-term memories recalled per task.
    #[serde(default)]
    pub recall_k: Option<usize>,
}

impl UnitConfig {
    fn needs_model(&self) -> bool {
        match self.kind {
            UnitKind::Worker => true,
            UnitKind::Router => {
                self.summarize || matches!(self.selection, None | Some(SelectionConfig::Model))
            }
            UnitKind::Coordinator => {
                self.merge == MergeConfig::Summarize
                    || self.success_criteria.is_some()
                    || matches!(self.planning, None | Some(PlanningConfig::Model))
            }
        }
    }
}

/// The `[org]` table: a root name and the unit declarations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgConfig {
    /// Unit that receives tasks by default.
    pub root: String,
    /// Every unit, in any order.
    #[serde(default)]
    pub units: Vec<UnitConfig>,
}

/// Builds a model client from a model config.
pub type ClientFactory = dyn Fn(&ModelConfig) -> CadreResult<LlmClient> + Send + Sync;

/// Services and defaults an organization is built with.
pub struct BuildEnv<'a> {
    /// Tools workers may bind by name.
    pub catalog: &'a ToolCatalog,
    /// Shared memory.
    pub memory: Arc<Memory>,
    /// Model used by units without an override.
    pub default_model: ModelConfig,
    /// Default worker history window.
    pub history_window: usize,
    /// Default worker recall depth.
    pub recall_k: usize,
    /// Caller-side deadline for top-level tasks.
    pub task_timeout: Option<Duration>,
    /// Turns model configs into clients.
    pub clients: Arc<ClientFactory>,
}

impl<'a> BuildEnv<'a> {
    /// Defaults: history window 10, recall 3, no timeout, HTTP model clients.
    pub fn new(catalog: &'a ToolCatalog, memory: Arc<Memory>, default_model: ModelConfig) -> Self {
        Self {
            catalog,
            memory,
            default_model,
            history_window: 10,
            recall_k: 3,
            task_timeout: None,
            clients: Arc::new(LlmClient::new),
        }
    }

    /// Build clients with `factory` instead of the provider HTTP backends.
    pub fn with_clients<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ModelConfig) -> CadreResult<LlmClient> + Send + Sync + 'static,
    {
        self.clients = Arc::new(factory);
        self
    }
}

impl OrgConfig {
    /// Look up a unit declaration.
    pub fn unit(&self, name: &str) -> Option<&UnitConfig> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Check names, kinds, child membership, tools, and cycles.
    ///
    /// `catalog` enables the unknown-tool check.
    pub fn validate(&self, catalog: Option<&ToolCatalog>) -> CadreResult<()> {
        if self.units.is_empty() {
            return Err(config_err("Organization declares no units"));
        }

        let mut names = HashSet::new();
        for unit in &self.units {
            if unit.name.trim().is_empty() {
                return Err(config_err("Unit with an empty name"));
            }
            if !names.insert(unit.name.as_str()) {
                return Err(config_err(format!("Duplicate unit name '{}'", unit.name)));
            }
        }
        if !names.contains(self.root.as_str()) {
            return Err(config_err(format!("Root unit '{}' is not declared", self.root)));
        }

        for unit in &self.units {
            validate_unit(unit, &names, catalog)?;
        }

        if let Some(unit) = self.first_cycle() {
            return Err(config_err(format!(
                "Delegation cycle through unit '{unit}'"
            )));
        }
        Ok(())
    }

    /// A unit on a delegation cycle, if any.
    fn first_cycle(&self) -> Option<&str> {
        let children: HashMap<&str, &[String]> = self
            .units
            .iter()
            .map(|u| (u.name.as_str(), u.children.as_slice()))
            .collect();
        let mut visited = HashMap::new();
        self.units
            .iter()
            .map(|u| u.name.as_str())
            .find(|name| dfs_cycle(name, &children, &mut visited))
    }

    /// Validate, then build every unit and wire them into an [`Organization`].
    pub fn build(&self, env: &BuildEnv<'_>) -> CadreResult<Organization> {
        self.validate(Some(env.catalog))?;

        let mut builder = Builder {
            config: self,
            env,
            built: HashMap::new(),
            default_client: None,
        };
        let root = builder.build_unit(&self.root)?;
        let mut org = Organization::new(root, env.memory.clone());
        for unit in &self.units {
            if org.unit(&unit.name).is_none() {
                org.add_unit(builder.build_unit(&unit.name)?);
            }
        }
        if let Some(timeout) = env.task_timeout {
            org = org.with_timeout(timeout);
        }
        info!(root = %self.root, units = self.units.len(), "Organization built");
        Ok(org)
    }
}

fn config_err(msg: impl Into<String>) -> CadreError {
    CadreError::Config(msg.into())
}

fn validate_unit(
    unit: &UnitConfig,
    names: &HashSet<&str>,
    catalog: Option<&ToolCatalog>,
) -> CadreResult<()> {
    let name = &unit.name;
    match unit.kind {
        UnitKind::Worker => {
            if !unit.children.is_empty() {
                return Err(config_err(format!("Worker '{name}' cannot have children")));
            }
            if unit.selection.is_some() || unit.planning.is_some() {
                return Err(config_err(format!(
                    "Worker '{name}' cannot declare a selection or planning strategy"
                )));
            }
            if let Some(catalog) = catalog {
                if let Some(tool) = unit.tools.iter().find(|t| !catalog.contains(t)) {
                    return Err(config_err(format!("Worker '{name}' uses unknown tool '{tool}'")));
                }
            }
        }
        UnitKind::Router | UnitKind::Coordinator => {
            if unit.children.is_empty() {
                return Err(config_err(format!(
                    "{} '{name}' must have at least one child",
                    unit.kind
                )));
            }
            if !unit.tools.is_empty() {
                return Err(config_err(format!(
                    "Only workers have tools; '{name}' is a {}",
                    unit.kind
                )));
            }
            let mut seen = HashSet::new();
            for child in &unit.children {
                if !names.contains(child.as_str()) {
                    return Err(config_err(format!("'{name}' lists unknown child '{child}'")));
                }
                if !seen.insert(child.as_str()) {
                    return Err(config_err(format!("'{name}' lists child '{child}' twice")));
                }
            }
            validate_strategy(unit)?;
        }
    }
    Ok(())
}

fn validate_strategy(unit: &UnitConfig) -> CadreResult<()> {
    let name = &unit.name;
    let is_child = |target: &str| unit.children.iter().any(|c| c == target);
    let (rules, fallback): (&[KeywordRule], Vec<&str>) =
        match (&unit.kind, &unit.selection, &unit.planning) {
            (UnitKind::Router, _, Some(_)) => {
                return Err(config_err(format!("Router '{name}' cannot declare planning")));
            }
            (UnitKind::Coordinator, Some(_), _) => {
                return Err(config_err(format!(
                    "Coordinator '{name}' cannot declare selection"
                )));
            }
            (_, Some(SelectionConfig::Keyword { rules, fallback }), _) => {
                (rules.as_slice(), fallback.iter().map(String::as_str).collect())
            }
            (_, _, Some(PlanningConfig::Keyword { rules, fallback })) => {
                (rules.as_slice(), fallback.iter().map(String::as_str).collect())
            }
            _ => return Ok(()),
        };
    for target in rules.iter().map(|r| r.target.as_str()).chain(fallback) {
        if !is_child(target) {
            return Err(config_err(format!(
                "Keyword target '{target}' of '{name}' is not one of its children"
            )));
        }
    }
    Ok(())
}

fn dfs_cycle<'a>(
    name: &'a str,
    children: &HashMap<&'a str, &'a [String]>,
    visited: &mut HashMap<&'a str, u8>,
) -> bool {
    match visited.get(name) {
        Some(1) => return true,  // back edge
        Some(2) => return false, // done
        _ => {}
    }
    visited.insert(name, 1);
    if let Some(next) = children.get(name) {
        for child in *next {
            if dfs_cycle(child.as_str(), children, visited) {
                return true;
            }
        }
    }
    visited.insert(name, 2);
    false
}

/// Builds units bottom-up, sharing each built unit among all its parents.
struct Builder<'c, 'e> {
    config: &'c OrgConfig,
    env: &'e BuildEnv<'e>,
    built: HashMap<String, Arc<dyn Unit>>,
    default_client: Option<LlmClient>,
}

impl Builder<'_, '_> {
    fn client(&mut self, unit: &UnitConfig) -> CadreResult<LlmClient> {
        if let Some(model) = &unit.model {
            return (self.env.clients)(model);
        }
        if let Some(client) = &self.default_client {
            return Ok(client.clone());
        }
        let client = (self.env.clients)(&self.env.default_model)?;
        self.default_client = Some(client.clone());
        Ok(client)
    }

    fn build_unit(&mut self, name: &str) -> CadreResult<Arc<dyn Unit>> {
        if let Some(unit) = self.built.get(name) {
            return Ok(unit.clone());
        }
        let cfg = self
            .config
            .unit(name)
            .ok_or_else(|| config_err(format!("Unknown unit '{name}'")))?;

        let llm = if cfg.needs_model() {
            Some(self.client(cfg)?)
        } else {
            None
        };

        let unit: Arc<dyn Unit> = match cfg.kind {
            UnitKind::Worker => Arc::new(self.build_worker(cfg, llm)?),
            UnitKind::Router => {
                let children = self.build_children(cfg)?;
                let selector: Box<dyn SelectionStrategy> = match &cfg.selection {
                    Some(SelectionConfig::Keyword { rules, fallback }) => {
                        let selector = KeywordSelector::new(rules.clone());
                        Box::new(match fallback {
                            Some(child) => selector.with_fallback(child),
                            None => selector,
                        })
                    }
                    Some(SelectionConfig::Model) | None => {
                        Box::new(ModelSelector::new(require(llm.clone(), cfg)?))
                    }
                };
                let mut router = Router::new(&cfg.name, &cfg.role, children, selector)?
                    .with_instructions(&cfg.instructions);
                if cfg.summarize {
                    router = router.with_summarizer(summarizer(cfg, require(llm, cfg)?));
                }
                Arc::new(router)
            }
            UnitKind::Coordinator => {
                let children = self.build_children(cfg)?;
                let planner: Box<dyn PlanningStrategy> = match &cfg.planning {
                    Some(PlanningConfig::Pipeline) => Box::new(PipelinePlanner),
                    Some(PlanningConfig::Broadcast) => Box::new(BroadcastPlanner),
                    Some(PlanningConfig::Keyword { rules, fallback }) => {
                        Box::new(KeywordPlanner::new(rules.clone()).with_fallback(fallback.clone()))
                    }
                    Some(PlanningConfig::Model) | None => {
                        Box::new(ModelPlanner::new(require(llm.clone(), cfg)?))
                    }
                };
                let mut coordinator = Coordinator::new(&cfg.name, &cfg.role, children, planner)?
                    .with_instructions(&cfg.instructions);
                if cfg.merge == MergeConfig::Summarize {
                    let llm = require(llm.clone(), cfg)?;
                    coordinator =
                        coordinator.with_merge(MergeStrategy::Summarize(summarizer(cfg, llm)));
                }
                if let Some(criteria) = &cfg.success_criteria {
                    let judge = CriteriaJudge::new(require(llm, cfg)?);
                    coordinator = coordinator.with_success_criteria(criteria, judge);
                }
                Arc::new(coordinator)
            }
        };

        self.built.insert(name.to_string(), unit.clone());
        Ok(unit)
    }

    fn build_children(&mut self, cfg: &UnitConfig) -> CadreResult<Vec<Arc<dyn Unit>>> {
        cfg.children
            .iter()
            .map(|child| self.build_unit(child))
            .collect()
    }

    fn build_worker(&self, cfg: &UnitConfig, llm: Option<LlmClient>) -> CadreResult<Worker> {
        let model = cfg.model.as_ref().unwrap_or(&self.env.default_model);
        let tools = self.env.catalog.build_set(&cfg.tools)?;
        Ok(Worker::new(&cfg.name, &cfg.role, require(llm, cfg)?)
            .with_instructions(&cfg.instructions)
            .with_tools(tools)
            .with_max_turns(cfg.max_turns.unwrap_or(model.max_turns))
            .with_datetime(cfg.add_datetime)
            .with_history_window(cfg.history_window.unwrap_or(self.env.history_window))
            .with_recall(cfg.recall_k.unwrap_or(self.env.recall_k))
            .with_remember_results(cfg.remember_results))
    }
}

fn require(llm: Option<LlmClient>, cfg: &UnitConfig) -> CadreResult<LlmClient> {
    llm.ok_or_else(|| CadreError::Orchestrator(format!("Unit '{}' has no model client", cfg.name)))
}

fn summarizer(cfg: &UnitConfig, llm: LlmClient) -> Summarizer {
    match &cfg.summary_instructions {
        Some(extra) => Summarizer::new(llm).with_instructions(extra),
        None => Summarizer::new(llm),
    }
}
