//! Types shared by every Cadre crate.
//!
//! # Main types
//!
//! - [`CadreError`] and [`CadreResult`]: the common error.
//! - [`FailureKind`]: why a unit invocation failed.
//! - [`Message`] and [`Role`]: model conversation turns.
//! - [`ToolCall`] and [`ToolResult`]: tool requests and their outcomes.

/// Errors and failure classification.
pub mod error;
/// Conversation messages.
pub mod message;
/// Tool calls and results.
pub mod tool;

pub use error::{CadreError, CadreResult, FailureKind};
pub use message::{Message, Role};
pub use tool::{ToolCall, ToolResult};
