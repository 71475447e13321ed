//! Per-identifier rate limiting for AI generation requests.
//!
//! DESIGN
//! ======
//! Rolling-window counters, one per identifier, with two quota tiers:
//! - Anonymous: 10 generations per window (default)
//! - Authenticated: 35 generations per window (default)
//!
//! The counter is keyed by identifier alone; the tier only picks which limit
//! applies. An identifier that used its anonymous quota can keep going up to
//! the authenticated limit once the caller signs in.
//!
//! TRADE-OFFS
//! ==========
//! Windows are measured as wall-clock time since the first request, not
//! calendar days. A burst at the end of one window followed by a burst at the
//! start of the next can admit up to `2 × limit` within 24 hours. The memory
//! store only serializes decisions inside one process; multi-instance
//! deployments should run the Redis store.

pub mod memory;
pub mod redis_store;
pub mod store;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::ErrorCode;
pub use memory::MemoryRateStore;
pub use store::{RateRecord, RateStore, StoreError};

pub const DEFAULT_ANONYMOUS_LIMIT: u32 = 10;
pub const DEFAULT_AUTHENTICATED_LIMIT: u32 = 35;
pub const DEFAULT_WINDOW_SECS: u64 = 24 * 60 * 60;

// =============================================================================
// CONFIG
// =============================================================================

/// Limit class applied to an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Anonymous,
    Authenticated,
}

impl Tier {
    #[must_use]
    pub fn from_logged_in(is_logged_in: bool) -> Self {
        if is_logged_in { Self::Authenticated } else { Self::Anonymous }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub anonymous_limit: u32,
    pub authenticated_limit: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    #[must_use]
    pub fn limit_for(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Anonymous => self.anonymous_limit,
            Tier::Authenticated => self.authenticated_limit,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            anonymous_limit: DEFAULT_ANONYMOUS_LIMIT,
            authenticated_limit: DEFAULT_AUTHENTICATED_LIMIT,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
        }
    }
}

/// Which backing store holds rate records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis { url: String },
}

// =============================================================================
// DECISIONS
// =============================================================================

/// Result of a [`RateLimiter::check_and_consume`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Operations left in the current window; 0 when denied.
    pub remaining: u32,
    pub limit: u32,
    /// Milliseconds since Unix epoch at which the current window ends.
    pub resets_at_ms: u64,
}

/// Read-only view of an identifier's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub tier: Tier,
    pub limit: u32,
    pub used: u32,
    pub remaining: u32,
    /// `None` when no window is active.
    pub resets_at_ms: Option<u64>,
}

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate-limit identifier must not be empty")]
    EmptyIdentifier,
    #[error("rate store failed: {0}")]
    Store(#[from] StoreError),
}

impl ErrorCode for RateLimitError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyIdentifier => "E_EMPTY_IDENTIFIER",
            Self::Store(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.retryable())
    }
}

// =============================================================================
// RATE LIMITER
// =============================================================================

/// Owns the rate table (through its store) and applies tier limits.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn RateStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Limiter over a fresh in-process store.
    #[must_use]
    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::new(Arc::new(MemoryRateStore::new()), config)
    }

    /// Build a limiter over the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis backend cannot be reached.
    pub async fn from_backend(backend: &StoreBackend, config: RateLimitConfig) -> Result<Self, StoreError> {
        match backend {
            StoreBackend::Memory => Ok(Self::in_memory(config)),
            StoreBackend::Redis { url } => {
                let store = redis_store::RedisRateStore::connect(url, config.window).await?;
                Ok(Self::new(Arc::new(store), config))
            }
        }
    }

    #[must_use]
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Decide whether `identifier` may run one more operation under `tier`,
    /// and record the decision.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::EmptyIdentifier`] for a blank identifier and
    /// [`RateLimitError::Store`] if the backing store fails.
    pub async fn check_and_consume(&self, identifier: &str, tier: Tier) -> Result<RateLimitDecision, RateLimitError> {
        self.check_and_consume_at(identifier, tier, now_ms())
            .await
    }

    /// Internal: check + consume with explicit timestamp (for testing).
    async fn check_and_consume_at(
        &self,
        identifier: &str,
        tier: Tier,
        now_ms: u64,
    ) -> Result<RateLimitDecision, RateLimitError> {
        if identifier.trim().is_empty() {
            return Err(RateLimitError::EmptyIdentifier);
        }
        let limit = self.config.limit_for(tier);
        let admission = self
            .store
            .check_and_increment(identifier, limit, self.config.window, now_ms)
            .await?;

        let resets_at_ms = admission
            .window_start_ms
            .saturating_add(store::window_ms(self.config.window));
        let decision = if admission.allowed {
            RateLimitDecision { allowed: true, remaining: limit.saturating_sub(admission.count), limit, resets_at_ms }
        } else {
            RateLimitDecision { allowed: false, remaining: 0, limit, resets_at_ms }
        };

        if decision.allowed {
            debug!(identifier, ?tier, remaining = decision.remaining, "rate limit: admitted");
        } else {
            info!(identifier, ?tier, limit, "rate limit: denied");
        }
        Ok(decision)
    }

    /// Report quota usage for `identifier` without consuming anything.
    ///
    /// # Errors
    ///
    /// Same as [`RateLimiter::check_and_consume`].
    pub async fn peek(&self, identifier: &str, tier: Tier) -> Result<UsageSnapshot, RateLimitError> {
        self.peek_at(identifier, tier, now_ms()).await
    }

    async fn peek_at(&self, identifier: &str, tier: Tier, now_ms: u64) -> Result<UsageSnapshot, RateLimitError> {
        if identifier.trim().is_empty() {
            return Err(RateLimitError::EmptyIdentifier);
        }
        let limit = self.config.limit_for(tier);
        let active = self
            .store
            .get(identifier)
            .await?
            .filter(|record| !record.is_expired(now_ms, self.config.window));

        Ok(match active {
            Some(record) => UsageSnapshot {
                tier,
                limit,
                used: record.count,
                remaining: limit.saturating_sub(record.count),
                resets_at_ms: Some(
                    record
                        .window_start_ms
                        .saturating_add(store::window_ms(self.config.window)),
                ),
            },
            None => UsageSnapshot { tier, limit, used: 0, remaining: limit, resets_at_ms: None },
        })
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
fn now_ms() -> u64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    u64::try_from(dur.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
