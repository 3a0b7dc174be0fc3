use crate::endpoint::EndpointConfig;
use crate::middleware::{auth_middleware, AuthConfig};
use crate::routes::{
    endpoint_handler, health_handler, run_handler, units_handler, AppState, EndpointState,
};
use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use cadre_core::{CadreError, CadreResult};
use cadre_orchestrator::Organization;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

const RESERVED: [&str; 3] = ["/health", "/api/run", "/api/units"];

/// The `[server]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bearer keys; empty disables auth.
    #[serde(default)]
    pub api_keys: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_keys: Vec::new(),
        }
    }
}

/// The main gateway server.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the gateway with the built-in routes only and no auth.
    pub fn build(org: Arc<Organization>) -> CadreResult<Router> {
        Self::build_with(org, Vec::new(), AuthConfig::default())
    }

    /// Build the gateway with configured endpoints and optional bearer auth.
    ///
    /// Endpoint paths must start with `/`, be unique, avoid the built-in
    /// routes, and target a unit the organization has.
    pub fn build_with(
        org: Arc<Organization>,
        endpoints: Vec<EndpointConfig>,
        auth: AuthConfig,
    ) -> CadreResult<Router> {
        validate_endpoints(&org, &endpoints)?;

        let state = Arc::new(AppState { org });
        let mut app = Router::new()
            .route("/health", get(health_handler))
            .route("/api/run", post(run_handler))
            .route("/api/units", get(units_handler))
            .with_state(state.clone());

        for endpoint in endpoints {
            info!(
                path = %endpoint.path,
                unit = endpoint.unit.as_deref().unwrap_or("root"),
                "Mounting endpoint"
            );
            let path = endpoint.path.clone();
            let endpoint_state = Arc::new(EndpointState {
                app: state.clone(),
                endpoint,
            });
            app = app.merge(
                Router::new()
                    .route(&path, post(endpoint_handler))
                    .with_state(endpoint_state),
            );
        }

        if auth.is_enabled() {
            app = app.layer(axum_mw::from_fn_with_state(Arc::new(auth), auth_middleware));
        }
        Ok(app)
    }

    /// Bind `host:port` and serve `app` until Ctrl-C.
    pub async fn serve(app: Router, host: &str, port: u16) -> CadreResult<()> {
        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&addr).await?;
        info!(addr = %addr, "Gateway listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down gateway");
            })
            .await
            .map_err(|e| CadreError::Gateway(e.to_string()))
    }
}

fn validate_endpoints(org: &Organization, endpoints: &[EndpointConfig]) -> CadreResult<()> {
    let mut seen = HashSet::new();
    for ep in endpoints {
        let path = ep.path.as_str();
        if !path.starts_with('/') {
            return Err(CadreError::Config(format!(
                "Endpoint path '{path}' must start with '/'"
            )));
        }
        if RESERVED.contains(&path) {
            return Err(CadreError::Config(format!(
                "Endpoint path '{path}' is a built-in route"
            )));
        }
        if !seen.insert(path) {
            return Err(CadreError::Config(format!("Duplicate endpoint path '{path}'")));
        }
        if let Some(unit) = &ep.unit {
            if org.unit(unit).is_none() {
                return Err(CadreError::Config(format!(
                    "Endpoint '{path}' targets unknown unit '{unit}'"
                )));
            }
        }
    }
    Ok(())
}
