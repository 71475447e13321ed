//! Provider output normalization.
//!
//! DESIGN
//! ======
//! Providers are asked for a bare JSON object but routinely wrap it in code
//! fences or a sentence of prose. Normalization strips the wrapping, parses,
//! and maps every expected field on its own: one absent or oddly-typed field
//! becomes an empty string, never a failed response.
//!
//! TRADE-OFFS
//! ==========
//! Text that still will not parse is not an error. The raw text goes into the
//! content's primary field and every other field gets a placeholder, and the
//! result is marked `degraded`. Callers get something readable instead of a
//! 500; the flag is kept so this can be tightened later.

use serde::Serialize;
use serde_json::{Map, Value};

const PLACEHOLDER: &str = "See explanation.";

// =============================================================================
// CONTENT SHAPES
// =============================================================================

/// Structured study notes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteContent {
    pub introduction: String,
    pub explanation: String,
    pub examples: String,
    pub diagram_description: String,
    pub exam_points: String,
}

/// Structured answer to a student's doubt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoubtAnswer {
    pub answer: String,
    pub steps: String,
    pub example: String,
    pub key_takeaways: String,
}

/// A fixed-shape payload that can be built from a parsed object or, failing
/// that, from raw text.
pub trait StructuredContent: Sized {
    /// Build from a parsed object, mapping each field independently.
    fn from_object(obj: &Map<String, Value>) -> Self;

    /// Build from unparseable text: raw text in the primary field,
    /// placeholders elsewhere.
    fn from_raw(raw: &str) -> Self;
}

impl StructuredContent for NoteContent {
    fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            introduction: field_text(obj, &["introduction", "intro"]),
            explanation: field_text(obj, &["explanation"]),
            examples: field_text(obj, &["examples"]),
            diagram_description: field_text(obj, &["diagramDescription", "diagram_description", "diagram"]),
            exam_points: field_text(obj, &["examPoints", "exam_points"]),
        }
    }

    fn from_raw(raw: &str) -> Self {
        Self {
            introduction: PLACEHOLDER.into(),
            explanation: raw.trim().to_owned(),
            examples: PLACEHOLDER.into(),
            diagram_description: PLACEHOLDER.into(),
            exam_points: PLACEHOLDER.into(),
        }
    }
}

impl StructuredContent for DoubtAnswer {
    fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            answer: field_text(obj, &["answer", "explanation"]),
            steps: field_text(obj, &["steps"]),
            example: field_text(obj, &["example", "examples"]),
            key_takeaways: field_text(obj, &["keyTakeaways", "key_takeaways"]),
        }
    }

    fn from_raw(raw: &str) -> Self {
        Self {
            answer: raw.trim().to_owned(),
            steps: PLACEHOLDER.into(),
            example: PLACEHOLDER.into(),
            key_takeaways: PLACEHOLDER.into(),
        }
    }
}

// =============================================================================
// NORMALIZATION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized<T> {
    pub content: T,
    /// `true` when the text could not be parsed and placeholders were used.
    pub degraded: bool,
}

/// Normalize provider text into `T`. Never fails.
#[must_use]
pub fn normalize<T: StructuredContent>(raw: &str) -> Normalized<T> {
    match parse_object(raw) {
        Some(obj) => Normalized { content: T::from_object(&obj), degraded: false },
        None => Normalized { content: T::from_raw(raw), degraded: true },
    }
}

/// Find a JSON object in `raw`: fence-stripped text first, then the span
/// from the first `{` to the last `}`.
fn parse_object(raw: &str) -> Option<Map<String, Value>> {
    let stripped = strip_code_fences(raw);
    if let Ok(Value::Object(obj)) = serde_json::from_str(stripped) {
        return Some(obj);
    }
    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&stripped[start..=end]) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

/// Remove a surrounding Markdown code fence (with optional language tag).
pub(crate) fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Text for the first present key in `keys`. Arrays become one item per
/// line; `null` and absent keys become `""`.
fn field_text(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| obj.get(*key))
        .map(value_text)
        .unwrap_or_default()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
