use crate::routes::ApiError;
use axum::{
    extract::{Query, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

/// Keys accepted by the gateway. No keys means no auth.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    keys: Vec<String>,
}

impl AuthConfig {
    /// Accept any of `api_keys`; blank entries are ignored.
    pub fn new(api_keys: Vec<String>) -> Self {
        Self {
            keys: api_keys.into_iter().filter(|k| !k.trim().is_empty()).collect(),
        }
    }

    /// Whether any key is configured.
    pub fn is_enabled(&self) -> bool {
        !self.keys.is_empty()
    }

    fn accepts(&self, presented: &str) -> bool {
        self.keys.iter().any(|k| k == presented)
    }
}

#[derive(Deserialize)]
struct KeyParam {
    api_key: Option<String>,
}

/// The key a request presents: `Authorization: Bearer` first, then `?api_key=`.
fn presented_key(request: &Request) -> Option<String> {
    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|k| k.trim().to_string());
    bearer.or_else(|| {
        Query::<KeyParam>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(p)| p.api_key)
    })
}

/// Reject requests without an accepted key with a JSON 401.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthConfig>>,
    request: Request,
    next: Next,
) -> Response {
    if !auth.is_enabled() {
        return next.run(request).await;
    }
    let reason = match presented_key(&request) {
        Some(key) if auth.accepts(&key) => return next.run(request).await,
        Some(_) => "Invalid API key",
        None => "API key required",
    };
    warn!(path = %request.uri().path(), reason, "Rejected request");
    ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", reason).into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(uri: &str, auth: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn blank_keys_leave_auth_disabled() {
        assert!(!AuthConfig::new(vec![]).is_enabled());
        assert!(!AuthConfig::new(vec!["  ".into()]).is_enabled());
    }

    #[test]
    fn only_exact_keys_match() {
        let auth = AuthConfig::new(vec!["ops-key".into(), "crm-key".into()]);
        assert!(auth.accepts("crm-key"));
        assert!(!auth.accepts("crm-ke"));
        assert!(!auth.accepts("crm-key2"));
        assert!(!auth.accepts(""));
    }

    #[test]
    fn header_wins_over_query() {
        let req = request("/api/run?api_key=from-query", Some("Bearer from-header"));
        assert_eq!(presented_key(&req).as_deref(), Some("from-header"));

        let req = request("/api/run?api_key=from-query", None);
        assert_eq!(presented_key(&req).as_deref(), Some("from-query"));

        let req = request("/api/run", Some("Basic abc"));
        assert!(presented_key(&req).is_none());
    }
}
