//! Generation request shapes and validation.
//!
//! Raw input arrives with every field optional. [`GenerationInput::validate`]
//! turns it into a typed [`GenerationRequest`] or names the first missing
//! field; nothing downstream ever sees a half-filled request.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::generation::GatewayError;
use crate::rate_limit::Tier;

/// Identifier bucket used when a caller has neither a user ID nor a known
/// network origin.
pub const DEMO_BUCKET: &str = "demo";

// =============================================================================
// RAW INPUT
// =============================================================================

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesInput {
    #[serde(default, deserialize_with = "lenient_string")]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub topic: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub difficulty: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoubtInput {
    #[serde(default, deserialize_with = "lenient_string")]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub question: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub level: Option<String>,
}

/// Unvalidated request, one variant per endpoint.
#[derive(Debug, Clone)]
pub enum GenerationInput {
    Notes(NotesInput),
    Doubt(DoubtInput),
}

// =============================================================================
// VALIDATED REQUEST
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotesRequest {
    pub subject: String,
    pub unit: String,
    pub topic: String,
    pub difficulty: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoubtRequest {
    pub subject: String,
    pub question: String,
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationRequest {
    Notes(NotesRequest),
    Doubt(DoubtRequest),
}

impl GenerationRequest {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Notes(_) => "notes",
            Self::Doubt(_) => "doubt",
        }
    }
}

impl GenerationInput {
    /// Check every required field is present and non-blank.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] naming the first missing field.
    pub fn validate(self) -> Result<GenerationRequest, GatewayError> {
        match self {
            Self::Notes(NotesInput { subject, unit, topic, difficulty }) => Ok(GenerationRequest::Notes(NotesRequest {
                subject: required("subject", subject)?,
                unit: required("unit", unit)?,
                topic: required("topic", topic)?,
                difficulty: required("difficulty", difficulty)?,
            })),
            Self::Doubt(DoubtInput { subject, question, level }) => Ok(GenerationRequest::Doubt(DoubtRequest {
                subject: required("subject", subject)?,
                question: required("question", question)?,
                level: required("level", level)?,
            })),
        }
    }
}

fn required(field: &'static str, value: Option<String>) -> Result<String, GatewayError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_owned()),
        _ => Err(GatewayError::Validation { field }),
    }
}

// =============================================================================
// CALLER
// =============================================================================

/// Who is asking: drives the rate-limit identifier and tier.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_logged_in: bool,
    /// Network origin (client address), filled in by the HTTP layer.
    #[serde(skip)]
    pub origin: Option<String>,
}

impl Caller {
    /// `user:<id>` when a user ID is present, else `ip:<origin>`, else the
    /// shared demo bucket. Never empty.
    #[must_use]
    pub fn identifier(&self) -> String {
        if let Some(user_id) = non_blank(self.user_id.as_deref()) {
            return format!("user:{user_id}");
        }
        if let Some(origin) = non_blank(self.origin.as_deref()) {
            return format!("ip:{origin}");
        }
        DEMO_BUCKET.to_string()
    }

    #[must_use]
    pub fn tier(&self) -> Tier {
        Tier::from_logged_in(self.is_logged_in)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// =============================================================================
// LENIENT DESERIALIZERS
// =============================================================================

/// Accept strings, numbers and bools as text; anything else counts as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Only `true` and `"true"` count as logged in.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

#[cfg(test)]
#[path = "request_test.rs"]
mod tests;
