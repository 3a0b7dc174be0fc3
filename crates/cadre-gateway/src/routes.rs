use crate::endpoint::EndpointConfig;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cadre_orchestrator::{Organization, ResultStatus, Task, UnitDescriptor, UnitResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Shared application state.
pub struct AppState {
    /// The organization every request runs against.
    pub org: Arc<Organization>,
}

/// State for one configured endpoint.
pub struct EndpointState {
    pub(crate) app: Arc<AppState>,
    pub(crate) endpoint: EndpointConfig,
}

/// `POST /api/run` body.
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    /// Task text.
    pub message: String,
    /// Target unit; the root when absent.
    #[serde(default)]
    pub unit: Option<String>,
    /// Session to continue; a new one when absent.
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

#[derive(Serialize)]
struct RunResponse<'a> {
    session_id: Uuid,
    status: ResultStatus,
    result_markdown: String,
    result: &'a UnitResult,
}

#[derive(Serialize)]
struct UnitsResponse<'a> {
    root: &'a str,
    tree: String,
    units: Vec<UnitDescriptor>,
    monitor: serde_json::Value,
}

#[derive(Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<UnitResult>,
}

/// An error answer: status code, failure kind, message, and the failed result if any.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: String,
    message: String,
    result: Option<UnitResult>,
}

impl ApiError {
    pub(crate) fn new(status: StatusCode, kind: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind: kind.to_string(),
            message: message.into(),
            result: None,
        }
    }

    fn failed(result: UnitResult) -> Self {
        let (kind, message) = match result.failure() {
            Some(f) => (f.kind.to_string(), f.message.clone()),
            None => ("internal".to_string(), result.output().to_string()),
        };
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind,
            message,
            result: Some(result),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                kind: self.kind,
                message: self.message,
            },
            result: self.result,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Run `message` on `unit` (or the root); a failed result becomes a 500.
async fn execute(
    state: &AppState,
    unit: Option<&str>,
    message: &str,
    session_id: Option<Uuid>,
    channel: &str,
) -> Result<(Uuid, UnitResult), ApiError> {
    if let Some(name) = unit {
        if state.org.unit(name).is_none() {
            return Err(ApiError::new(
                StatusCode::NOT_FOUND,
                "unknown_unit",
                format!("Unknown unit '{name}'"),
            ));
        }
    }
    if message.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_task",
            "Task text is empty",
        ));
    }

    let session_id = session_id.unwrap_or_else(Uuid::new_v4);
    let task = Task::new(message, session_id).with_channel(channel);
    let result = state
        .org
        .run(unit, task)
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string()))?;

    info!(
        session_id = %session_id,
        unit = result.unit(),
        status = %result.status(),
        duration_ms = result.duration_ms(),
        "Request finished"
    );
    if result.status() == ResultStatus::Failed {
        warn!(unit = result.unit(), "Returning failed result");
        return Err(ApiError::failed(result));
    }
    Ok((session_id, result))
}

/// `POST /api/run`
pub async fn run_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunRequest>,
) -> Result<Response, ApiError> {
    let (session_id, result) = execute(
        &state,
        req.unit.as_deref(),
        &req.message,
        req.session_id,
        "http",
    )
    .await?;
    let body = RunResponse {
        session_id,
        status: result.status(),
        result_markdown: result.to_markdown(),
        result: &result,
    };
    Ok(Json(body).into_response())
}

/// A configured endpoint: template the input, run, answer in `output_field`.
pub async fn endpoint_handler(
    State(state): State<Arc<EndpointState>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let endpoint = &state.endpoint;
    let input = endpoint.input_from(&body).ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!("Missing field '{}'", endpoint.input_field),
        )
    })?;
    let session_id = body
        .get("session_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok());

    let (session_id, result) = execute(
        &state.app,
        endpoint.unit.as_deref(),
        &endpoint.render(&input),
        session_id,
        &endpoint.path,
    )
    .await?;

    let mut out = serde_json::Map::new();
    out.insert(
        endpoint.output_field.clone(),
        serde_json::Value::String(result.to_markdown()),
    );
    out.insert(
        "status".into(),
        serde_json::Value::String(result.status().to_string()),
    );
    out.insert(
        "session_id".into(),
        serde_json::Value::String(session_id.to_string()),
    );
    Ok(Json(serde_json::Value::Object(out)))
}

/// `GET /api/units`
pub async fn units_handler(State(state): State<Arc<AppState>>) -> Response {
    let org = &state.org;
    let body = UnitsResponse {
        root: org.root().name(),
        tree: org.tree(),
        units: org.descriptors(),
        monitor: org.monitor().to_json().await,
    };
    Json(body).into_response()
}

/// `GET /health`
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "cadre",
        "root": state.org.root().name(),
    }))
}
