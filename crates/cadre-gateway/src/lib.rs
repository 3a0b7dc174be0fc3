//! HTTP gateway for a Cadre organization.
//!
//! `POST /api/run` runs a task on any unit, configured endpoints map a request
//! field through a template to a unit, and `GET /api/units` reports the tree and
//! the per-unit monitor. Bearer auth applies to every route when keys are set.

/// Configured task endpoints.
pub mod endpoint;
/// Bearer-key auth.
pub mod middleware;
/// Request handlers.
pub mod routes;
/// Router assembly and serving.
pub mod server;

pub use endpoint::EndpointConfig;
pub use middleware::AuthConfig;
pub use server::{GatewayServer, ServerConfig};
