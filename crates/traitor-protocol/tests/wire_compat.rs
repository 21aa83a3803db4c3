// Wire format checks for the debug stream and HTTP error bodies.
// Browser clients parse these by hand, so field names must not drift.

use traitor_protocol::frames::{DebugFrame, ErrorBody};
use traitor_protocol::handshake::DebugStart;

#[test]
fn output_frame_serialization() {
    let frame = DebugFrame::output(3, "stdout", "hello");
    let json = frame.to_json();

    assert!(json.contains(r#""type":"output""#));
    assert!(json.contains(r#""seq":3"#));
    assert!(json.contains(r#""stream":"stdout""#));
    assert!(json.contains(r#""text":"hello""#));
    assert!(!frame.is_terminal());
}

#[test]
fn done_frame_omits_absent_fields() {
    let frame = DebugFrame::Done {
        status: "succeeded".into(),
        exit_code: None,
        message: None,
        duration_ms: 12,
    };
    let json = frame.to_json();

    assert!(json.contains(r#""type":"done""#));
    assert!(json.contains(r#""durationMs":12"#));
    assert!(!json.contains("exitCode"));
    assert!(!json.contains("message"));
    assert!(frame.is_terminal());
}

#[test]
fn done_frame_parses_back() {
    let json = r#"{"type":"done","status":"failed","exitCode":2,"message":"boom","durationMs":5}"#;
    let frame: DebugFrame = serde_json::from_str(json).unwrap();
    match frame {
        DebugFrame::Done {
            status, exit_code, ..
        } => {
            assert_eq!(status, "failed");
            assert_eq!(exit_code, Some(2));
        }
        other => panic!("expected done frame, got {other:?}"),
    }
}

#[test]
fn error_frame_serialization() {
    let json = DebugFrame::error("NOT_FOUND", "job not found: x").to_json();
    assert!(json.contains(r#""type":"error""#));
    assert!(json.contains(r#""code":"NOT_FOUND""#));
}

#[test]
fn error_body_shape() {
    let body = ErrorBody::new("INVALID_CRON", "expected 6 fields, got 5");
    let json = serde_json::to_string(&body).unwrap();
    assert_eq!(
        json,
        r#"{"error":{"code":"INVALID_CRON","message":"expected 6 fields, got 5"}}"#
    );
}

#[test]
fn debug_start_accepts_json_and_plain_id() {
    assert_eq!(
        DebugStart::parse(r#"{"jobId":"abc"}"#).unwrap().job_id,
        "abc"
    );
    assert_eq!(DebugStart::parse(r#"{"id":"abc"}"#).unwrap().job_id, "abc");
    assert_eq!(DebugStart::parse("  abc-123\n").unwrap().job_id, "abc-123");
}

#[test]
fn debug_start_rejects_garbage() {
    assert!(DebugStart::parse("").is_none());
    assert!(DebugStart::parse("two words").is_none());
    assert!(DebugStart::parse(r#"{"jobId":""}"#).is_none());
    assert!(DebugStart::parse(r#"{"other":1}"#).is_none());
}
