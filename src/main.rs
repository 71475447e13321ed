mod config;
mod error;
mod llm;
mod rate_limit;
mod routes;
mod services;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use llm::types::LlmError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::AppConfig::from_env().expect("invalid configuration");

    let rate_limiter = rate_limit::RateLimiter::from_backend(&config.store, config.rate_limit)
        .await
        .expect("rate store init failed");

    // A missing credential disables AI; any other provider misconfiguration is fatal.
    let llm: Option<Arc<dyn llm::LlmChat>> = match llm::LlmClient::from_env() {
        Ok(client) => {
            tracing::info!(model = client.model(), "LLM client initialized");
            Some(Arc::new(client))
        }
        Err(e @ LlmError::MissingApiKey { .. }) => {
            tracing::warn!(error = %e, "LLM client not configured, AI features disabled");
            None
        }
        Err(e) => panic!("LLM client init failed: {e}"),
    };

    let store_kind = match config.store {
        rate_limit::StoreBackend::Memory => "memory",
        rate_limit::StoreBackend::Redis { .. } => "redis",
    };
    let limits = rate_limiter.config();
    tracing::info!(
        anonymous_limit = limits.anonymous_limit,
        authenticated_limit = limits.authenticated_limit,
        window_secs = limits.window.as_secs(),
        store = store_kind,
        "rate limiter ready"
    );

    let state = state::AppState::new(rate_limiter, llm, config.generation);
    let app = routes::app(state);

    let port = config.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "studyhub gateway listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("server failed");
}
