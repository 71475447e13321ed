use super::*;
use serde_json::json;

fn notes(value: Value) -> GenerationInput {
    GenerationInput::Notes(serde_json::from_value(value).unwrap())
}

fn doubt(value: Value) -> GenerationInput {
    GenerationInput::Doubt(serde_json::from_value(value).unwrap())
}

// =============================================================================
// validate
// =============================================================================

#[test]
fn notes_with_all_fields_validates() {
    let req = notes(json!({
        "subject": "Biology", "unit": "2", "topic": " Mitosis ", "difficulty": "easy"
    }))
    .validate()
    .unwrap();
    assert_eq!(
        req,
        GenerationRequest::Notes(NotesRequest {
            subject: "Biology".into(),
            unit: "2".into(),
            topic: "Mitosis".into(),
            difficulty: "easy".into(),
        })
    );
    assert_eq!(req.kind(), "notes");
}

#[test]
fn notes_missing_topic_names_field() {
    let err = notes(json!({ "subject": "Biology", "unit": "2", "difficulty": "easy" }))
        .validate()
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation { field: "topic" }));
}

#[test]
fn blank_field_counts_as_missing() {
    let err = doubt(json!({ "subject": "Math", "question": "   ", "level": "basic" }))
        .validate()
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation { field: "question" }));
}

#[test]
fn numeric_fields_are_accepted_as_text() {
    let req = notes(json!({ "subject": "Physics", "unit": 3, "topic": "Optics", "difficulty": "hard" }))
        .validate()
        .unwrap();
    let GenerationRequest::Notes(n) = req else { panic!("expected notes") };
    assert_eq!(n.unit, "3");
}

#[test]
fn object_field_counts_as_missing() {
    let err = doubt(json!({ "subject": {"name": "Math"}, "question": "why?", "level": "basic" }))
        .validate()
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation { field: "subject" }));
}

#[test]
fn doubt_validates() {
    let req = doubt(json!({ "subject": "Math", "question": "What is a prime?", "level": "beginner" }))
        .validate()
        .unwrap();
    assert_eq!(req.kind(), "doubt");
}

// =============================================================================
// Caller
// =============================================================================

#[test]
fn identifier_prefers_user_id() {
    let caller = Caller { user_id: Some("abc".into()), is_logged_in: true, origin: Some("1.2.3.4".into()) };
    assert_eq!(caller.identifier(), "user:abc");
    assert_eq!(caller.tier(), Tier::Authenticated);
}

#[test]
fn identifier_falls_back_to_origin_then_demo() {
    let caller = Caller { user_id: Some("  ".into()), is_logged_in: false, origin: Some("1.2.3.4".into()) };
    assert_eq!(caller.identifier(), "ip:1.2.3.4");
    assert_eq!(caller.tier(), Tier::Anonymous);

    let nobody = Caller::default();
    assert_eq!(nobody.identifier(), DEMO_BUCKET);
}

#[test]
fn caller_parses_wire_fields() {
    let caller: Caller = serde_json::from_value(json!({ "userId": "u9", "isLoggedIn": true })).unwrap();
    assert_eq!(caller.user_id.as_deref(), Some("u9"));
    assert!(caller.is_logged_in);
    assert!(caller.origin.is_none());
}

#[test]
fn caller_is_logged_in_is_lenient() {
    let c: Caller = serde_json::from_value(json!({ "isLoggedIn": "TRUE" })).unwrap();
    assert!(c.is_logged_in);
    let c: Caller = serde_json::from_value(json!({ "isLoggedIn": 1 })).unwrap();
    assert!(!c.is_logged_in);
    let c: Caller = serde_json::from_value(json!({})).unwrap();
    assert!(!c.is_logged_in);
}
