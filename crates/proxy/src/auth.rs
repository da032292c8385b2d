//! Bearer-token gate in front of the `/v1` routes.
//!
//! A request passes when its `Authorization: Bearer <token>` matches the
//! configured static key or an active token in the store. With no static key
//! and an empty store, every request passes.

use crate::{AppState, error::ApiError};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use freegpt_types::GatewayError;
use std::sync::Arc;

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Check the presented token. Validating against the store records `last_used`.
async fn authorized(state: &AppState, token: Option<&str>) -> bool {
    let static_key = state.config.api_key.as_deref().filter(|k| !k.is_empty());
    let Some(token) = token else {
        return static_key.is_none() && state.tokens.is_empty().await;
    };
    if static_key == Some(token) {
        return true;
    }
    if state.tokens.validate(token).await {
        return true;
    }
    // An unknown token is fine while authentication is disabled.
    static_key.is_none() && state.tokens.is_empty().await
}

/// axum middleware enforcing [`authorized`].
///
/// # Errors
///
/// Returns 401 `authentication_error` when the token is missing or invalid.
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ok = authorized(&state, bearer(req.headers())).await;
    if !ok {
        tracing::debug!(path = %req.uri().path(), "rejected unauthenticated request");
        return Err(GatewayError::Auth("Invalid API key provided".into()).into());
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_extraction() {
        let mut h = HeaderMap::new();
        assert_eq!(bearer(&h), None);
        h.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer sk-abc"));
        assert_eq!(bearer(&h), Some("sk-abc"));
        h.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(bearer(&h), None);
        h.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer(&h), None);
    }
}
