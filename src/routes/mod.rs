//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Two generation endpoints share one gateway pipeline. A quota endpoint
//! reads the same limiter without consuming, and `/healthz` answers
//! liveness probes. CORS is wide open: the browser client is served from a
//! different origin.

pub mod generate;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/generate-notes",
            post(generate::generate_notes).options(generate::preflight),
        )
        .route(
            "/api/solve-doubt",
            post(generate::solve_doubt).options(generate::preflight),
        )
        .route("/api/usage", get(generate::usage))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
