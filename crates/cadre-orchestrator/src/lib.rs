//! Hierarchical multi-agent orchestration.
//!
//! An [`Organization`] is a tree of [`Unit`]s. Leaves are [`Worker`]s that run
//! a model tool loop; inner nodes are [`Router`]s, which hand a task to exactly
//! one child, and [`Coordinator`]s, which plan a task across several children
//! and merge what comes back. Every invocation yields a [`UnitResult`] carrying
//! its status, output, optional structured payload, and the results of the
//! children it delegated to.
//!
//! # Main types
//!
//! - [`Organization`]: Built tree plus shared memory, monitor, and timeout.
//! - [`OrgConfig`]: Declarative unit tree, validated and built with a [`BuildEnv`].
//! - [`Task`]: Unit of work, linked to its parent when delegated.
//! - [`UnitResult`]: Outcome of one invocation with its provenance.
//! - [`UnitMonitor`]: Per-unit invocation counters.
//! - [`Scheduler`]: Cron-based submission of recurring tasks.

/// Declarative organization config and the builder.
pub mod config;
/// Plan-driven fan-out over several children.
pub mod coordinator;
/// Summaries and success-criteria checks over child outputs.
pub mod merge;
/// Per-unit invocation counters.
pub mod monitor;
/// The built unit tree and its entry point.
pub mod organization;
mod parse;
/// Coordinator plans and their validation.
pub mod plan;
/// Planning strategies.
pub mod planning;
/// Invocation results and provenance.
pub mod result;
/// Single-child delegation.
pub mod router;
/// Cron-based job scheduler.
pub mod scheduler;
/// Router selection strategies.
pub mod selection;
/// Tasks and their metadata.
pub mod task;
/// The unit abstraction and shared invocation bookkeeping.
pub mod unit;
/// Model-backed leaf units.
pub mod worker;

pub use config::{
    BuildEnv, ClientFactory, MergeConfig, OrgConfig, PlanningConfig, SelectionConfig, UnitConfig,
};
pub use coordinator::Coordinator;
pub use merge::{CriteriaJudge, MergeStrategy, Summarizer};
pub use monitor::{UnitMonitor, UnitStats};
pub use organization::Organization;
pub use plan::{Plan, PlanStep};
pub use planning::{
    BroadcastPlanner, KeywordPlanner, ModelPlanner, PipelinePlanner, PlanningStrategy,
};
pub use result::{CriteriaVerdict, Failure, ResultStatus, SkippedStep, UnitKind, UnitResult};
pub use router::Router;
pub use scheduler::{ScheduledJob, Scheduler};
pub use selection::{KeywordRule, KeywordSelector, ModelSelector, Selection, SelectionStrategy};
pub use task::{Task, TaskMetadata};
pub use unit::{invoke_unit, resolve_member, Context, Unit, UnitDescriptor};
pub use worker::Worker;
