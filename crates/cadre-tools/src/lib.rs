//! Tool capabilities for Cadre workers.
//!
//! A tool is an external, named callable with its own input/output contract.
//! Workers own a [`ToolSet`]; organizations build those sets from a shared
//! [`ToolCatalog`] so that every worker receives its own tool instances.
//!
//! # Main types
//!
//! - [`ToolCapability`]: Trait every tool implements.
//! - [`ToolDescriptor`]: Name, description and JSON schema of a tool.
//! - [`ToolContext`]: Session and calling worker passed to every invocation.
//! - [`ToolSet`]: Ordered tools owned by a single worker.
//! - [`ToolCatalog`]: Named constructors used to instantiate tools.

/// Tool capability trait and descriptor.
pub mod capability;
/// Catalog of tool constructors.
pub mod catalog;
/// Ordered per-worker tool set.
pub mod toolset;

pub use capability::{ToolCapability, ToolContext, ToolDescriptor};
pub use catalog::ToolCatalog;
pub use toolset::ToolSet;
