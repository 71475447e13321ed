//! Generation routes: notes, doubts and quota lookups.
//!
//! Handlers only translate HTTP to gateway calls and gateway results back to
//! HTTP. Bodies are parsed leniently: anything that is not a JSON object is
//! treated as an object with no fields, which fails validation with a 400.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{error, warn};

use crate::error::ErrorCode;
use crate::services::generation::{GatewayError, GenerationSuccess, handle_generation_request};
use crate::services::request::{Caller, DoubtInput, GenerationInput, NotesInput};
use crate::state::AppState;

// =============================================================================
// CLIENT ORIGIN EXTRACTOR
// =============================================================================

/// Network origin of the caller: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the socket peer address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOrigin(pub Option<String>);

impl<S> axum::extract::FromRequestParts<S> for ClientOrigin
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self(origin_from_headers(&parts.headers, peer)))
    }
}

pub(crate) fn origin_from_headers(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };

    if let Some(first) = header("x-forwarded-for")
        .and_then(|raw| raw.split(',').next().map(|hop| hop.trim().to_owned()))
        .filter(|hop| !hop.is_empty())
    {
        return Some(first);
    }
    if let Some(real) = header("x-real-ip")
        .map(|raw| raw.trim().to_owned())
        .filter(|ip| !ip.is_empty())
    {
        return Some(real);
    }
    peer.map(|addr| addr.ip().to_string())
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `POST /api/generate-notes`
pub async fn generate_notes(
    State(state): State<AppState>,
    ClientOrigin(origin): ClientOrigin,
    body: Bytes,
) -> Response {
    let (input, caller) = parse_body::<NotesInput>(&body, origin);
    respond(handle_generation_request(&state, GenerationInput::Notes(input), &caller).await)
}

/// `POST /api/solve-doubt`
pub async fn solve_doubt(State(state): State<AppState>, ClientOrigin(origin): ClientOrigin, body: Bytes) -> Response {
    let (input, caller) = parse_body::<DoubtInput>(&body, origin);
    respond(handle_generation_request(&state, GenerationInput::Doubt(input), &caller).await)
}

/// `OPTIONS` on the generation endpoints. Real preflights are answered by
/// the CORS layer before reaching this.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// `GET /api/usage?userId=&isLoggedIn=`: quota snapshot, consumes nothing.
pub async fn usage(
    State(state): State<AppState>,
    ClientOrigin(origin): ClientOrigin,
    Query(mut caller): Query<Caller>,
) -> Response {
    caller.origin = origin;
    let identifier = caller.identifier();
    match state
        .rate_limiter
        .peek(&identifier, caller.tier())
        .await
    {
        Ok(snapshot) => {
            let mut body = serde_json::to_value(&snapshot).unwrap_or_else(|_| json!({}));
            if let Value::Object(map) = &mut body {
                map.insert("identifier".into(), Value::String(identifier));
            }
            Json(body).into_response()
        }
        Err(e) => usage_error_response(&GatewayError::from(e)),
    }
}

/// Split a raw body into endpoint fields and caller context.
fn parse_body<T>(body: &[u8], origin: Option<String>) -> (T, Caller)
where
    T: DeserializeOwned + Default,
{
    let value = match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => value,
        _ => Value::Object(Map::new()),
    };
    let input = T::deserialize(&value).unwrap_or_default();
    let mut caller = Caller::deserialize(&value).unwrap_or_default();
    caller.origin = origin;
    (input, caller)
}

// =============================================================================
// RESPONSES
// =============================================================================

#[derive(Serialize)]
struct SuccessBody<'a> {
    success: bool,
    #[serde(flatten)]
    result: &'a GenerationSuccess,
}

fn respond(result: Result<GenerationSuccess, GatewayError>) -> Response {
    match result {
        Ok(ok) => Json(SuccessBody { success: true, result: &ok }).into_response(),
        Err(e) => error_response(&e),
    }
}

pub(crate) fn gateway_error_to_status(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Validation { .. } => StatusCode::BAD_REQUEST,
        GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        GatewayError::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::Provider { .. } | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &GatewayError) -> Response {
    let status = gateway_error_to_status(err);
    let code = err.error_code();
    let retryable = err.retryable();
    let body = match err {
        GatewayError::Validation { field } => {
            json!({ "error": "Missing required fields", "field": field, "code": code, "retryable": retryable })
        }
        GatewayError::RateLimited { message, .. } => json!({
            "error": "Rate limit exceeded",
            "message": message,
            "isRateLimited": true,
            "remaining": 0,
            "code": code,
            "retryable": retryable,
        }),
        GatewayError::ProviderUnavailable => {
            json!({ "error": "AI unavailable", "useDemoMode": true, "code": code, "retryable": retryable })
        }
        GatewayError::Provider { .. } => {
            warn!(error = %err, code, retryable, "generate: provider failure");
            json!({ "error": "AI generation failed", "useDemoMode": true, "code": code, "retryable": retryable })
        }
        GatewayError::Internal(_) => {
            error!(error = %err, code, retryable, "generate: internal failure");
            json!({ "error": "AI generation failed", "useDemoMode": true, "code": code, "retryable": retryable })
        }
    };
    (status, Json(body)).into_response()
}

/// Quota lookups never generate anything, so failures carry no demo-mode hint.
fn usage_error_response(err: &GatewayError) -> Response {
    let status = gateway_error_to_status(err);
    let code = err.error_code();
    let retryable = err.retryable();
    error!(error = %err, code, retryable, "usage: lookup failed");
    (status, Json(json!({ "error": "Usage lookup failed", "code": code, "retryable": retryable }))).into_response()
}

#[cfg(test)]
#[path = "generate_test.rs"]
mod tests;
