//! API error type that maps [`GatewayError`] variants to HTTP status codes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use freegpt_types::GatewayError;
use serde_json::{Value, json};

/// Wrapper around [`GatewayError`] that implements [`IntoResponse`].
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl ApiError {
    /// Returns `(status, error_type, error_code)` for the wrapped error.
    fn classify(&self) -> (StatusCode, &'static str, &'static str) {
        match &self.0 {
            GatewayError::Auth(_) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_api_key",
            ),
            GatewayError::Validation { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_request_error",
                "invalid_request",
            ),
            GatewayError::ModelNotFound(_) => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "model_not_found",
            ),
            GatewayError::GrantMissing
            | GatewayError::AuthorizationPending
            | GatewayError::GrantRejected { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "server_error",
                "upstream_authorization_required",
            ),
            GatewayError::Upstream { status, .. } => classify_upstream(*status),
            GatewayError::Http(_) => (StatusCode::BAD_GATEWAY, "server_error", "upstream_error"),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "internal_error",
            ),
        }
    }

    fn param(&self) -> Value {
        match &self.0 {
            GatewayError::Validation { field, .. } => Value::from(field.as_str()),
            _ => Value::Null,
        }
    }
}

fn classify_upstream(status: u16) -> (StatusCode, &'static str, &'static str) {
    match status {
        429 => (
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limit_error",
            "rate_limit_exceeded",
        ),
        401 => (
            StatusCode::UNAUTHORIZED,
            "authentication_error",
            "invalid_api_key",
        ),
        403 => (
            StatusCode::FORBIDDEN,
            "permission_error",
            "insufficient_quota",
        ),
        _ => (StatusCode::BAD_GATEWAY, "server_error", "upstream_error"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, error_code) = self.classify();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = json!({
            "error": {
                "message": self.0.to_string(),
                "type": error_type,
                "param": self.param(),
                "code": error_code,
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        Self(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt as _;

    async fn extract_error_body(err: ApiError) -> (StatusCode, Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        (status, body)
    }

    #[tokio::test]
    async fn test_auth_error() {
        let (status, body) =
            extract_error_body(ApiError(GatewayError::Auth("Invalid API key provided".into())))
                .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["type"], "authentication_error");
        assert_eq!(body["error"]["code"], "invalid_api_key");
        assert!(body["error"]["param"].is_null());
    }

    #[tokio::test]
    async fn test_validation_error_names_field() {
        let (status, body) = extract_error_body(ApiError(GatewayError::validation(
            "messages",
            "Missing required field: messages or input",
        )))
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["param"], "messages");
        assert_eq!(
            body["error"]["message"],
            "Missing required field: messages or input"
        );
    }

    #[tokio::test]
    async fn test_model_not_found() {
        let (status, body) =
            extract_error_body(ApiError(GatewayError::ModelNotFound("xyz".into()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "model_not_found");
        assert_eq!(body["error"]["message"], "Model 'xyz' not found");
    }

    #[tokio::test]
    async fn test_session_errors_are_unavailable() {
        for err in [
            GatewayError::GrantMissing,
            GatewayError::AuthorizationPending,
            GatewayError::GrantRejected { status: 401 },
        ] {
            let (status, body) = extract_error_body(ApiError(err)).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(body["error"]["code"], "upstream_authorization_required");
        }
    }

    #[tokio::test]
    async fn test_upstream_429_error() {
        let (status, body) = extract_error_body(ApiError(GatewayError::Upstream {
            status: 429,
            body: "rate limited".into(),
        }))
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["type"], "rate_limit_error");
    }

    #[tokio::test]
    async fn test_upstream_403_error() {
        let (status, body) = extract_error_body(ApiError(GatewayError::Upstream {
            status: 403,
            body: "forbidden".into(),
        }))
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["type"], "permission_error");
    }

    #[tokio::test]
    async fn test_upstream_500_error() {
        let (status, body) = extract_error_body(ApiError(GatewayError::Upstream {
            status: 500,
            body: "server error".into(),
        }))
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "upstream_error");
    }

    #[tokio::test]
    async fn test_http_transport_error() {
        let (status, _) =
            extract_error_body(ApiError(GatewayError::Http("connection refused".into()))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_internal_error() {
        let (status, body) =
            extract_error_body(ApiError(GatewayError::Storage("disk full".into()))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "internal_error");
    }
}
