use super::*;
use crate::llm::types::{ChatResponse, ContentBlock, LlmChat, LlmError, Message};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::services::request::{DoubtInput, NotesInput};
use crate::state::test_helpers;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// =========================================================================
// MockLlm
// =========================================================================

enum Reply {
    Text(&'static str),
    Status(u16),
    Hang,
}

struct MockLlm {
    reply: Reply,
    calls: AtomicUsize,
    last_system: Mutex<String>,
    last_user: Mutex<String>,
}

impl MockLlm {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
            last_system: Mutex::new(String::new()),
            last_user: Mutex::new(String::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LlmChat for MockLlm {
    async fn chat(&self, _max_tokens: u32, system: &str, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_system.lock().unwrap() = system.to_owned();
        *self.last_user.lock().unwrap() = messages
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        match self.reply {
            Reply::Text(text) => Ok(ChatResponse {
                content: vec![ContentBlock::Text { text: text.into() }],
                model: "mock".into(),
                stop_reason: "end_turn".into(),
                input_tokens: 10,
                output_tokens: 20,
            }),
            Reply::Status(status) => Err(LlmError::ApiResponse { status, body: "upstream says no".into() }),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Err(LlmError::ApiRequest("should have timed out".into()))
            }
        }
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn notes_input() -> GenerationInput {
    GenerationInput::Notes(NotesInput {
        subject: Some("Biology".into()),
        unit: Some("2".into()),
        topic: Some("Mitosis".into()),
        difficulty: Some("easy".into()),
    })
}

fn doubt_input() -> GenerationInput {
    GenerationInput::Doubt(DoubtInput {
        subject: Some("Math".into()),
        question: Some("Why is 1 not prime?".into()),
        level: Some("beginner".into()),
    })
}

fn anon(user_id: &str) -> Caller {
    Caller { user_id: Some(user_id.into()), is_logged_in: false, origin: None }
}

fn state_with(llm: Option<Arc<dyn LlmChat>>, limits: RateLimitConfig, settings: GenerationSettings) -> AppState {
    AppState::new(RateLimiter::in_memory(limits), llm, settings)
}

const NOTES_JSON: &str = r#"{"introduction":"i","explanation":"e","examples":"x","diagramDescription":"d","examPoints":["a","b"]}"#;

// =========================================================================
// Success path
// =========================================================================

#[tokio::test]
async fn notes_success_returns_content_and_remaining() {
    let llm = MockLlm::new(Reply::Text(NOTES_JSON));
    let state = test_helpers::test_app_state_with_llm(llm.clone());

    let ok = handle_generation_request(&state, notes_input(), &anon("u1"))
        .await
        .unwrap();

    assert_eq!(ok.remaining, 9);
    assert_eq!(ok.source, ContentSource::Provider);
    assert!(!ok.degraded);
    let GeneratedContent::Notes(notes) = ok.content else { panic!("expected notes") };
    assert_eq!(notes.explanation, "e");
    assert_eq!(notes.exam_points, "a\nb");
    assert_eq!(llm.calls(), 1);
    assert!(llm.last_system.lock().unwrap().contains("diagramDescription"));
    assert!(llm.last_user.lock().unwrap().contains("Mitosis"));
}

#[tokio::test]
async fn doubt_success_uses_doubt_shape() {
    let llm = MockLlm::new(Reply::Text(r#"{"answer":"Because it has one divisor.","steps":"1. Count"}"#));
    let state = test_helpers::test_app_state_with_llm(llm.clone());

    let ok = handle_generation_request(&state, doubt_input(), &anon("u1"))
        .await
        .unwrap();

    let GeneratedContent::Doubt(answer) = ok.content else { panic!("expected doubt") };
    assert_eq!(answer.answer, "Because it has one divisor.");
    assert_eq!(answer.key_takeaways, "");
    assert!(llm.last_system.lock().unwrap().contains("keyTakeaways"));
}

#[tokio::test]
async fn success_serializes_flat_body() {
    let llm = MockLlm::new(Reply::Text(NOTES_JSON));
    let state = test_helpers::test_app_state_with_llm(llm);

    let ok = handle_generation_request(&state, notes_input(), &anon("u1"))
        .await
        .unwrap();
    let body = serde_json::to_value(&ok).unwrap();

    assert_eq!(body["introduction"], "i");
    assert_eq!(body["examPoints"], "a\nb");
    assert_eq!(body["remaining"], 9);
    assert_eq!(body["source"], "provider");
    assert!(body.get("degraded").is_none());
}

#[tokio::test]
async fn malformed_output_is_degraded_success() {
    let llm = MockLlm::new(Reply::Text("Mitosis splits one cell into two."));
    let state = test_helpers::test_app_state_with_llm(llm);

    let ok = handle_generation_request(&state, notes_input(), &anon("u1"))
        .await
        .unwrap();

    assert!(ok.degraded);
    let GeneratedContent::Notes(notes) = ok.content else { panic!("expected notes") };
    assert_eq!(notes.explanation, "Mitosis splits one cell into two.");
    assert!(!notes.introduction.is_empty());
}

// =========================================================================
// Validation
// =========================================================================

#[tokio::test]
async fn validation_failure_does_not_consume_quota() {
    let llm = MockLlm::new(Reply::Text(NOTES_JSON));
    let state = test_helpers::test_app_state_with_llm(llm.clone());
    let input = GenerationInput::Notes(NotesInput {
        subject: Some("Biology".into()),
        unit: Some("2".into()),
        topic: None,
        difficulty: Some("easy".into()),
    });

    let err = handle_generation_request(&state, input, &anon("u1"))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Validation { field: "topic" }));
    let usage = state
        .rate_limiter
        .peek("user:u1", Tier::Anonymous)
        .await
        .unwrap();
    assert_eq!(usage.used, 0);
    assert_eq!(llm.calls(), 0);
}

// =========================================================================
// Rate limiting
// =========================================================================

#[tokio::test]
async fn eleventh_anonymous_request_is_rate_limited_without_provider_call() {
    let llm = MockLlm::new(Reply::Text(NOTES_JSON));
    let state = test_helpers::test_app_state_with_llm(llm.clone());
    let caller = anon("u1");

    for expected in (0..10).rev() {
        let ok = handle_generation_request(&state, notes_input(), &caller)
            .await
            .unwrap();
        assert_eq!(ok.remaining, expected);
    }
    let err = handle_generation_request(&state, notes_input(), &caller)
        .await
        .unwrap_err();

    let GatewayError::RateLimited { tier, message } = err else { panic!("expected rate limited") };
    assert_eq!(tier, Tier::Anonymous);
    assert!(message.contains("Sign in"));
    assert_eq!(llm.calls(), 10);
}

#[tokio::test]
async fn authenticated_denial_says_try_tomorrow() {
    let limits = RateLimitConfig { authenticated_limit: 1, ..RateLimitConfig::default() };
    let llm = MockLlm::new(Reply::Text(NOTES_JSON));
    let state = state_with(Some(llm as Arc<dyn LlmChat>), limits, GenerationSettings::default());
    let caller = Caller { user_id: Some("u2".into()), is_logged_in: true, origin: None };

    handle_generation_request(&state, doubt_input(), &caller)
        .await
        .unwrap();
    let err = handle_generation_request(&state, doubt_input(), &caller)
        .await
        .unwrap_err();

    let GatewayError::RateLimited { tier, message } = err else { panic!("expected rate limited") };
    assert_eq!(tier, Tier::Authenticated);
    assert!(message.contains("tomorrow"));
}

#[tokio::test]
async fn callers_without_identity_share_demo_bucket() {
    let limits = RateLimitConfig { anonymous_limit: 1, ..RateLimitConfig::default() };
    let llm = MockLlm::new(Reply::Text(NOTES_JSON));
    let state = state_with(Some(llm as Arc<dyn LlmChat>), limits, GenerationSettings::default());

    handle_generation_request(&state, notes_input(), &Caller::default())
        .await
        .unwrap();
    let err = handle_generation_request(&state, notes_input(), &Caller::default())
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::RateLimited { .. }));
}

// =========================================================================
// Provider
// =========================================================================

#[tokio::test]
async fn no_provider_is_unavailable_after_rate_check() {
    let state = test_helpers::test_app_state();

    let err = handle_generation_request(&state, notes_input(), &anon("u1"))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::ProviderUnavailable));
    let usage = state
        .rate_limiter
        .peek("user:u1", Tier::Anonymous)
        .await
        .unwrap();
    assert_eq!(usage.used, 1);
}

#[tokio::test]
async fn provider_error_keeps_status() {
    let llm = MockLlm::new(Reply::Status(502));
    let state = test_helpers::test_app_state_with_llm(llm.clone());

    let err = handle_generation_request(&state, notes_input(), &anon("u1"))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Provider { status: Some(502), .. }));
    assert!(err.retryable());
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn slow_provider_times_out() {
    let settings = GenerationSettings { provider_timeout: Duration::from_millis(50), ..GenerationSettings::default() };
    let llm = MockLlm::new(Reply::Hang);
    let state = state_with(Some(llm as Arc<dyn LlmChat>), RateLimitConfig::default(), settings);

    let err = handle_generation_request(&state, notes_input(), &anon("u1"))
        .await
        .unwrap_err();

    let GatewayError::Provider { status, message } = err else { panic!("expected provider error") };
    assert_eq!(status, None);
    assert!(message.contains("timed out"));
}

#[tokio::test]
async fn blank_provider_reply_is_provider_error() {
    let llm = MockLlm::new(Reply::Text("   "));
    let state = test_helpers::test_app_state_with_llm(llm);

    let err = handle_generation_request(&state, notes_input(), &anon("u1"))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Provider { status: None, .. }));
}

// =========================================================================
// Store failure
// =========================================================================

#[tokio::test]
async fn store_failure_is_internal_and_skips_provider() {
    let llm = MockLlm::new(Reply::Text(NOTES_JSON));
    let state = test_helpers::test_app_state_with_broken_store(Some(llm.clone() as Arc<dyn LlmChat>));

    let err = handle_generation_request(&state, notes_input(), &anon("u1"))
        .await
        .unwrap_err();

    let GatewayError::Internal(message) = &err else { panic!("expected internal error, got {err:?}") };
    assert!(message.contains("store offline"));
    assert_eq!(err.error_code(), "E_INTERNAL");
    assert!(err.retryable());
    assert_eq!(llm.calls(), 0);
}

// =========================================================================
// Error mapping
// =========================================================================

#[test]
fn rate_limit_errors_map_to_gateway_errors() {
    let err: GatewayError = RateLimitError::EmptyIdentifier.into();
    assert!(matches!(err, GatewayError::Validation { field: "identifier" }));
}

#[test]
fn error_codes_are_stable() {
    assert_eq!(GatewayError::Validation { field: "topic" }.error_code(), "E_VALIDATION");
    assert_eq!(GatewayError::ProviderUnavailable.error_code(), "E_PROVIDER_UNAVAILABLE");
    assert_eq!(GatewayError::Internal("x".into()).error_code(), "E_INTERNAL");
    assert!(!GatewayError::Provider { status: Some(401), message: String::new() }.retryable());
}
