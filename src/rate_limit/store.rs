//! Backing-store contract for rate-limit records.
//!
//! DESIGN
//! ======
//! The limiter never touches a map directly. It talks to a [`RateStore`],
//! which must make `check_and_increment` atomic per identifier. The in-process
//! store does this with a mutex; the Redis store with a server-side script.
//! Which one runs is decided by configuration at startup.

use std::time::Duration;

use crate::error::ErrorCode;

// =============================================================================
// RECORD
// =============================================================================

/// Per-identifier counting state for the current window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateRecord {
    pub identifier: String,
    /// Operations accepted in the current window.
    pub count: u32,
    /// Milliseconds since Unix epoch at which the window began.
    pub window_start_ms: u64,
}

impl RateRecord {
    /// `true` once more than `window` has elapsed since the window began.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64, window: Duration) -> bool {
        now_ms.saturating_sub(self.window_start_ms) > window_ms(window)
    }
}

/// Outcome of an atomic check-and-increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// Count after the operation (unchanged when denied).
    pub count: u32,
    pub window_start_ms: u64,
}

pub(crate) fn window_ms(window: Duration) -> u64 {
    u64::try_from(window.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("corrupt rate record for {identifier}: {detail}")]
    Corrupt { identifier: String, detail: String },
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Redis(_) => "E_STORE_REDIS",
            Self::Corrupt { .. } => "E_STORE_CORRUPT",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Redis(_))
    }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Storage for [`RateRecord`]s. Implementations must be safe to share across
/// request tasks.
#[async_trait::async_trait]
pub trait RateStore: Send + Sync {
    /// Fetch the record for `identifier`, if any.
    async fn get(&self, identifier: &str) -> Result<Option<RateRecord>, StoreError>;

    /// Unconditionally overwrite the record for `record.identifier`.
    async fn set(&self, record: RateRecord) -> Result<(), StoreError>;

    /// Atomically apply one admission decision.
    ///
    /// - absent or expired record: start a new window with `count = 1`
    /// - `count >= limit`: deny without incrementing
    /// - otherwise: increment and admit
    async fn check_and_increment(
        &self,
        identifier: &str,
        limit: u32,
        window: Duration,
        now_ms: u64,
    ) -> Result<Admission, StoreError>;
}
