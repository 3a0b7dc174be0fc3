#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Cross-module behaviour of the shared types as other crates rely on it.

use cadre_core::{CadreError, CadreResult, FailureKind, Message, Role, ToolCall, ToolResult};
use uuid::Uuid;

#[test]
fn message_survives_json_with_metadata() {
    let sid = Uuid::new_v4();
    let mut msg = Message::user("Find CFOs in Germany", sid);
    msg.metadata.insert("channel".into(), serde_json::json!("http"));

    let back: Message = serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
    assert_eq!(back.id, msg.id);
    assert_eq!(back.role, Role::User);
    assert_eq!(back.session_id, sid);
    assert_eq!(back.timestamp, msg.timestamp);
    assert_eq!(back.metadata["channel"], "http");
}

#[test]
fn message_without_metadata_field_still_parses() {
    let json = serde_json::json!({
        "id": Uuid::nil(),
        "role": "tool",
        "content": "1299.00",
        "session_id": Uuid::nil(),
        "timestamp": "2026-03-01T06:00:00Z"
    });
    let msg: Message = serde_json::from_value(json).unwrap();
    assert_eq!(msg.role, Role::Tool);
    assert!(msg.metadata.is_empty());
}

#[test]
fn every_message_gets_its_own_id() {
    let sid = Uuid::new_v4();
    assert_ne!(Message::user("a", sid).id, Message::user("a", sid).id);
}

#[test]
fn tool_results_echo_the_call_id() {
    let call = ToolCall {
        id: "tu_7".into(),
        name: "price_lookup".into(),
        arguments: serde_json::json!({"sku": "B-100"}),
    };
    let ok = ToolResult::success(&call.id, "1299.00");
    let failed = ToolResult::error(&call.id, "unknown sku");

    assert_eq!(ok.call_id, "tu_7");
    assert!(!ok.is_error);
    assert_eq!(failed.call_id, "tu_7");
    assert!(failed.is_error);

    let wire = serde_json::to_value(&failed).unwrap();
    assert_eq!(wire["is_error"], true);
}

#[test]
fn error_messages_name_their_subsystem() {
    assert_eq!(
        CadreError::Selection("no child named 'Ghost'".into()).to_string(),
        "Selection error: no child named 'Ghost'"
    );
    assert_eq!(
        CadreError::IterationLimit(8).to_string(),
        "Iteration limit exceeded: no final answer after 8 turns"
    );
    assert_eq!(CadreError::Plan("cycle".into()).to_string(), "Plan error: cycle");
}

#[test]
fn std_and_json_errors_convert_with_question_mark() {
    fn parse(text: &str) -> CadreResult<serde_json::Value> {
        Ok(serde_json::from_str(text)?)
    }
    fn open() -> CadreResult<()> {
        std::fs::File::open("/nonexistent/cadre/vectors.jsonl")?;
        Ok(())
    }

    let err = parse("not json").unwrap_err();
    assert!(err.to_string().starts_with("JSON error:"));
    assert_eq!(FailureKind::from(&err), FailureKind::Internal);

    let err = open().unwrap_err();
    assert!(matches!(err, CadreError::Io(_)));
}

#[test]
fn failure_kind_round_trips_through_json() {
    for kind in [FailureKind::Selection, FailureKind::InvalidTask, FailureKind::Timeout] {
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(serde_json::from_str::<FailureKind>(&json).unwrap(), kind);
    }
}
