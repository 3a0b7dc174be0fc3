#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Route-level checks through `tower::ServiceExt::oneshot`, no listener.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use cadre_gateway::{AuthConfig, EndpointConfig, GatewayServer};
use serde_json::Value;
use tower::ServiceExt;

fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn endpoint(path: &str, unit: Option<&str>) -> EndpointConfig {
    EndpointConfig {
        path: path.into(),
        input_field: "market".into(),
        template: "Forecast demand for {{input}}".into(),
        unit: unit.map(str::to_string),
        output_field: "forecast_md".into(),
    }
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = GatewayServer::build(common::organization()).unwrap();
    let resp = app
        .oneshot(json_request("POST", "/api/run", "{not json"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_message_is_unprocessable() {
    let app = GatewayServer::build(common::organization()).unwrap();
    let resp = app
        .oneshot(json_request("POST", "/api/run", r#"{"unit": "Lead-Gen"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_blank_message_is_bad_request() {
    let app = GatewayServer::build(common::organization()).unwrap();
    let resp = app
        .oneshot(json_request("POST", "/api/run", r#"{"message": "   "}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"]["kind"], "invalid_task");
}

#[tokio::test]
async fn test_units_reports_tree_and_monitor() {
    let org = common::organization();
    let app = GatewayServer::build(org.clone()).unwrap();

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/run",
            r#"{"message": "Generate leads"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/units")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["root"], "Consultancy");
    assert!(body["tree"]
        .as_str()
        .unwrap()
        .contains("- Lead-Gen [router]"));
    assert_eq!(body["units"].as_array().unwrap().len(), 4);
    assert_eq!(body["monitor"]["aggregate"]["invocations"], 3);
}

#[tokio::test]
async fn test_endpoint_missing_input_field() {
    let app = GatewayServer::build_with(
        common::organization(),
        vec![endpoint("/api/forecast", Some("Finance-Prospector"))],
        AuthConfig::default(),
    )
    .unwrap();
    let resp = app
        .oneshot(json_request("POST", "/api/forecast", r#"{"message": "DACH"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"]["kind"], "invalid_request");
}

#[tokio::test]
async fn test_endpoint_runs_on_its_unit() {
    let app = GatewayServer::build_with(
        common::organization(),
        vec![endpoint("/api/forecast", Some("Finance-Prospector"))],
        AuthConfig::default(),
    )
    .unwrap();
    let resp = app
        .oneshot(json_request("POST", "/api/forecast", r#"{"market": "DACH"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert!(body["forecast_md"].as_str().unwrap().contains("Two leads."));
}

#[test]
fn test_build_rejects_bad_endpoints() {
    let org = common::organization();
    for bad in [
        endpoint("api/forecast", None),
        endpoint("/api/run", None),
        endpoint("/api/forecast", Some("Nobody")),
    ] {
        assert!(
            GatewayServer::build_with(org.clone(), vec![bad], AuthConfig::default()).is_err()
        );
    }
    let dupes = vec![endpoint("/api/forecast", None), endpoint("/api/forecast", None)];
    assert!(GatewayServer::build_with(org, dupes, AuthConfig::default()).is_err());
}
