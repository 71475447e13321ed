//! AI request gateway: validate, rate check, provider call, normalize.
//!
//! DESIGN
//! ======
//! One entry point serves both endpoints. The request kind only selects the
//! prompt contract and the content shape; the pipeline is identical. Each
//! stage short-circuits with a typed [`GatewayError`] so the HTTP layer maps
//! outcomes to status codes without inspecting strings.
//!
//! Validation runs before the limiter, so a malformed request never costs
//! quota. The rate check runs before the provider check, so requests made
//! while AI is disabled still count.

use std::time::Duration;

use serde::Serialize;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use super::normalize::{DoubtAnswer, NoteContent, Normalized, StructuredContent, normalize};
use super::prompts;
use super::request::{Caller, GenerationInput, GenerationRequest};
use crate::error::ErrorCode;
use crate::llm::types::{LlmError, Message};
use crate::rate_limit::{RateLimitError, Tier};
use crate::state::AppState;

pub const DEFAULT_AI_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_AI_PROVIDER_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing required field: {field}")]
    Validation { field: &'static str },
    #[error("rate limited ({tier:?}): {message}")]
    RateLimited { tier: Tier, message: String },
    #[error("AI provider not configured")]
    ProviderUnavailable,
    #[error("AI provider failed: {message}")]
    Provider { status: Option<u16>, message: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorCode for GatewayError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "E_VALIDATION",
            Self::RateLimited { .. } => "E_RATE_LIMITED",
            Self::ProviderUnavailable => "E_PROVIDER_UNAVAILABLE",
            Self::Provider { .. } => "E_PROVIDER",
            Self::Internal(_) => "E_INTERNAL",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Provider { status, .. } => !matches!(status, Some(400..=499)),
            Self::Internal(_) => true,
            _ => false,
        }
    }
}

impl From<RateLimitError> for GatewayError {
    fn from(e: RateLimitError) -> Self {
        match e {
            RateLimitError::EmptyIdentifier => Self::Validation { field: "identifier" },
            RateLimitError::Store(store) => Self::Internal(store.to_string()),
        }
    }
}

impl From<LlmError> for GatewayError {
    fn from(e: LlmError) -> Self {
        Self::Provider { status: e.status(), message: e.to_string() }
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Per-call provider budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationSettings {
    pub max_tokens: u32,
    pub provider_timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_AI_MAX_TOKENS,
            provider_timeout: Duration::from_secs(DEFAULT_AI_PROVIDER_TIMEOUT_SECS),
        }
    }
}

// =============================================================================
// RESULT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum GeneratedContent {
    Notes(NoteContent),
    Doubt(DoubtAnswer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    Provider,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationSuccess {
    #[serde(flatten)]
    pub content: GeneratedContent,
    pub remaining: u32,
    pub source: ContentSource,
    /// Provider text did not parse; content holds raw text and placeholders.
    #[serde(skip)]
    pub degraded: bool,
}

/// Denial message shown to the caller.
#[must_use]
pub fn rate_limit_message(tier: Tier, limit: u32) -> String {
    match tier {
        Tier::Anonymous => format!(
            "You've used all {limit} free AI requests for today. Sign in to get a higher daily limit."
        ),
        Tier::Authenticated => {
            format!("You've used all {limit} AI requests for today. Please try again tomorrow.")
        }
    }
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Run one generation request through the full pipeline.
///
/// # Errors
///
/// See [`GatewayError`]; each variant names the stage that stopped the
/// request.
pub async fn handle_generation_request(
    state: &AppState,
    input: GenerationInput,
    caller: &Caller,
) -> Result<GenerationSuccess, GatewayError> {
    let request_id = Uuid::new_v4();
    run_pipeline(state, input, caller)
        .instrument(info_span!("generation", %request_id))
        .await
}

async fn run_pipeline(
    state: &AppState,
    input: GenerationInput,
    caller: &Caller,
) -> Result<GenerationSuccess, GatewayError> {
    let request = input.validate()?;
    let identifier = caller.identifier();
    let tier = caller.tier();
    info!(kind = request.kind(), %identifier, ?tier, "gateway: request received");

    let decision = state
        .rate_limiter
        .check_and_consume(&identifier, tier)
        .await
        .inspect_err(|e| warn!(error = %e, %identifier, "gateway: rate store failed"))?;
    if !decision.allowed {
        return Err(GatewayError::RateLimited { tier, message: rate_limit_message(tier, decision.limit) });
    }

    let Some(llm) = state.llm.as_ref() else {
        return Err(GatewayError::ProviderUnavailable);
    };

    let prompt = prompts::build(&request);
    let messages = [Message::user(prompt.user)];
    let settings = state.generation;
    let call = llm.chat(settings.max_tokens, &prompt.system, &messages);
    let response = match tokio::time::timeout(settings.provider_timeout, call).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            warn!(error = %e, status = ?e.status(), "gateway: provider call failed");
            return Err(e.into());
        }
        Err(_) => {
            warn!(timeout_secs = settings.provider_timeout.as_secs_f64(), "gateway: provider call timed out");
            return Err(GatewayError::Provider {
                status: None,
                message: format!("provider timed out after {:?}", settings.provider_timeout),
            });
        }
    };

    info!(
        model = %response.model,
        stop_reason = %response.stop_reason,
        input_tokens = response.input_tokens,
        output_tokens = response.output_tokens,
        "gateway: provider response"
    );

    let text = response.text();
    if text.trim().is_empty() {
        warn!("gateway: provider returned no text");
        return Err(GatewayError::Provider { status: None, message: "provider returned an empty reply".into() });
    }

    let (content, degraded) = match request {
        GenerationRequest::Notes(_) => shape(normalize::<NoteContent>(&text), GeneratedContent::Notes),
        GenerationRequest::Doubt(_) => shape(normalize::<DoubtAnswer>(&text), GeneratedContent::Doubt),
    };
    if degraded {
        warn!(%identifier, text_len = text.len(), "gateway: provider output was not JSON, using raw text");
    }

    Ok(GenerationSuccess { content, remaining: decision.remaining, source: ContentSource::Provider, degraded })
}

fn shape<T: StructuredContent>(
    normalized: Normalized<T>,
    wrap: fn(T) -> GeneratedContent,
) -> (GeneratedContent, bool) {
    (wrap(normalized.content), normalized.degraded)
}

#[cfg(test)]
#[path = "generation_test.rs"]
mod tests;
