//! HTTP front door: axum router, bearer authentication, route handlers, and
//! error mapping.
//!
//! Exposes OpenAI-compatible `/v1/chat/completions`, `/v1/completions` and
//! `/v1/models` endpoints in front of a [`ChatBackend`].

mod auth;
mod chat;
mod completions;
mod error;
mod models;
mod sse;

pub use error::ApiError;

use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use freegpt_config::Config;
use freegpt_store::ApiTokenStore;
use freegpt_types::{ChatBackend, traits::Result};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state passed to all route handlers.
pub struct AppState {
    pub config: Arc<Config>,
    /// Executes chat calls upstream.
    pub backend: Arc<dyn ChatBackend>,
    /// Locally issued API tokens.
    pub tokens: Arc<ApiTokenStore>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        backend: Arc<dyn ChatBackend>,
        tokens: Arc<ApiTokenStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            backend,
            tokens,
        })
    }
}

/// Build the outbound HTTP client: upstream timeouts plus the optional proxy.
///
/// An invalid `proxy_url` is logged and ignored.
///
/// # Errors
///
/// Returns an error if the client cannot be constructed.
pub fn build_http_client(config: &Config) -> Result<rquest::Client> {
    let mut builder = rquest::Client::builder();
    if let Some(t) = config.upstream.connect_timeout() {
        builder = builder.connect_timeout(t);
    }
    if let Some(t) = config.upstream.read_timeout() {
        builder = builder.read_timeout(t);
    }
    if let Some(url) = config.proxy_url.as_deref() {
        match rquest::Proxy::all(url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(e) => {
                tracing::warn!(url = url, error = %e, "invalid proxy_url, using direct connection");
            }
        }
    }
    Ok(builder.build()?)
}

/// Build the full axum router.
///
/// Routes:
/// - GET  /                      service info
/// - GET  /health
/// - POST /v1/chat/completions   bearer auth
/// - POST /v1/completions        bearer auth
/// - GET  /v1/models             bearer auth
/// - GET  /v1/models/{model}     bearer auth
pub fn make_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/completions", post(completions::completions))
        .route("/v1/models", get(models::list_models))
        .route("/v1/models/{model}", get(models::retrieve_model))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_bearer,
        ));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "FreeGPT API Server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/v1/chat/completions",
            "/v1/completions",
            "/v1/models",
            "/v1/models/{model}",
        ],
    }))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
