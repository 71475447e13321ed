//! Service configuration parsed from environment variables.
//!
//! Provider settings live in [`crate::llm::config`]; this module covers the
//! listener, the rate limiter and the per-call generation budget.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ErrorCode;
use crate::rate_limit::{
    DEFAULT_ANONYMOUS_LIMIT, DEFAULT_AUTHENTICATED_LIMIT, DEFAULT_WINDOW_SECS, RateLimitConfig, StoreBackend,
};
use crate::services::generation::{DEFAULT_AI_MAX_TOKENS, DEFAULT_AI_PROVIDER_TIMEOUT_SECS, GenerationSettings};

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
    #[error("unknown RATE_LIMIT_STORE: {0} (expected 'memory' or 'redis')")]
    UnknownStore(String),
    #[error("RATE_LIMIT_STORE=redis requires REDIS_URL")]
    MissingRedisUrl,
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Invalid { .. } => "E_CONFIG_INVALID",
            Self::Zero { .. } => "E_CONFIG_ZERO",
            Self::UnknownStore(_) => "E_CONFIG_UNKNOWN_STORE",
            Self::MissingRedisUrl => "E_CONFIG_MISSING_REDIS_URL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub rate_limit: RateLimitConfig,
    pub store: StoreBackend,
    pub generation: GenerationSettings,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// All optional:
    /// - `PORT`: default 3000
    /// - `RATE_LIMIT_ANONYMOUS` / `RATE_LIMIT_AUTHENTICATED`: default 10 / 35
    /// - `RATE_LIMIT_WINDOW_SECS`: default 86400
    /// - `RATE_LIMIT_STORE`: `memory` (default) or `redis` (needs `REDIS_URL`)
    /// - `AI_MAX_TOKENS`: default 2048
    /// - `AI_PROVIDER_TIMEOUT_SECS`: default 30
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for unparseable numbers, zero limits or
    /// windows, and an unusable store selection.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`], reading values through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`AppConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = env_parse(&lookup, "PORT", DEFAULT_PORT)?;

        let rate_limit = RateLimitConfig {
            anonymous_limit: non_zero("RATE_LIMIT_ANONYMOUS", env_parse(&lookup, "RATE_LIMIT_ANONYMOUS", DEFAULT_ANONYMOUS_LIMIT)?)?,
            authenticated_limit: non_zero(
                "RATE_LIMIT_AUTHENTICATED",
                env_parse(&lookup, "RATE_LIMIT_AUTHENTICATED", DEFAULT_AUTHENTICATED_LIMIT)?,
            )?,
            window: Duration::from_secs(non_zero(
                "RATE_LIMIT_WINDOW_SECS",
                env_parse(&lookup, "RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW_SECS)?,
            )?),
        };

        let store = match lookup("RATE_LIMIT_STORE").as_deref().map(str::trim) {
            None | Some("" | "memory") => StoreBackend::Memory,
            Some("redis") => {
                let url = lookup("REDIS_URL")
                    .filter(|url| !url.trim().is_empty())
                    .ok_or(ConfigError::MissingRedisUrl)?;
                StoreBackend::Redis { url }
            }
            Some(other) => return Err(ConfigError::UnknownStore(other.to_string())),
        };

        let generation = GenerationSettings {
            max_tokens: non_zero("AI_MAX_TOKENS", env_parse(&lookup, "AI_MAX_TOKENS", DEFAULT_AI_MAX_TOKENS)?)?,
            provider_timeout: Duration::from_secs(non_zero(
                "AI_PROVIDER_TIMEOUT_SECS",
                env_parse(&lookup, "AI_PROVIDER_TIMEOUT_SECS", DEFAULT_AI_PROVIDER_TIMEOUT_SECS)?,
            )?),
        };

        Ok(Self { port, rate_limit, store, generation })
    }
}

/// Parse `key` if set and non-blank, else `default`.
fn env_parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { var: key, value: raw }),
        _ => Ok(default),
    }
}

fn non_zero<T>(key: &'static str, value: T) -> Result<T, ConfigError>
where
    T: PartialEq + Default,
{
    if value == T::default() { Err(ConfigError::Zero { var: key }) } else { Ok(value) }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
