//! Model access and the worker tool loop for Cadre.
//!
//! # Main types
//!
//! - [`ModelConfig`]: Provider, model id, key and sampling settings.
//! - [`LlmClient`]: Cheap-to-clone handle over an [`LlmBackend`].
//! - [`FailoverBackend`]: Retry with backoff, then fall back to the next model.
//! - [`AgentRunner`]: The tool loop a worker runs for each task.

/// Provider backends.
pub mod backends;
/// Model configuration.
pub mod config;
/// Bounded message window.
pub mod context;
/// Retry and fallback across backends.
pub mod failover;
/// Model client.
pub mod llm;
/// The worker tool loop.
pub mod runner;

pub use backends::LlmBackend;
pub use config::{LlmProvider, ModelConfig};
pub use context::ContextWindow;
pub use failover::{FailoverBackend, RetryPolicy};
pub use llm::{LlmClient, LlmResponse};
pub use runner::{AgentRunner, RunOutcome, RunRequest, ToolCallRecord};
