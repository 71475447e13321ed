//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the rate limiter (which owns the rate table through its store), the
//! optional provider client, and the per-call generation budget.

use std::sync::Arc;

use crate::llm::LlmChat;
use crate::rate_limit::RateLimiter;
use crate::services::generation::GenerationSettings;

// =============================================================================
// APP STATE
// =============================================================================

/// Clone is required by Axum; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: RateLimiter,
    /// Optional LLM client. `None` if no provider credential is configured.
    pub llm: Option<Arc<dyn LlmChat>>,
    pub generation: GenerationSettings,
}

impl AppState {
    #[must_use]
    pub fn new(rate_limiter: RateLimiter, llm: Option<Arc<dyn LlmChat>>, generation: GenerationSettings) -> Self {
        Self { rate_limiter, llm, generation }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
