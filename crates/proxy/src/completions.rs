//! Legacy text completions (`POST /v1/completions`).
//!
//! The prompt is sent upstream as a single user message; a list prompt is
//! joined with newlines first.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
};
use freegpt_translate::openai;
use freegpt_types::{ChatRequest, GatewayError, token::now_unix, traits::Result};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::{
    AppState,
    error::ApiError,
    sse::{event_stream, parse_body},
};

fn prompt_text(prompt: Option<&Value>) -> Result<String> {
    match prompt {
        None | Some(Value::Null) => Err(GatewayError::validation(
            "prompt",
            "Missing required field: prompt",
        )),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    GatewayError::validation("prompt", "prompt must be a string or a list of strings")
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(|parts| parts.join("\n")),
        Some(_) => Err(GatewayError::validation(
            "prompt",
            "prompt must be a string or a list of strings",
        )),
    }
}

/// Rewrite a completions body into a chat body and validate it like one.
fn to_chat_request(body: &Value) -> Result<ChatRequest> {
    let mut obj = body
        .as_object()
        .cloned()
        .ok_or_else(|| GatewayError::validation("body", "request body must be a JSON object"))?;
    let prompt = prompt_text(obj.remove("prompt").as_ref())?;
    obj.remove("input");
    obj.insert(
        "messages".into(),
        json!([{"role": "user", "content": prompt}]),
    );
    ChatRequest::from_body(&Value::Object(obj))
}

/// Handles `POST /v1/completions`.
///
/// # Errors
///
/// Returns [`ApiError`] for invalid bodies and for upstream session failures.
pub async fn completions(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = to_chat_request(&parse_body(&body)?)?;
    tracing::info!(model = %request.model, stream = request.stream, "text completion request");

    let id = openai::text_completion_id();
    let created = now_unix();

    if !request.stream {
        let completion = state.backend.complete(&request).await?;
        let doc = openai::text_completion(&id, created, &request.model, &completion);
        return Ok(Json(doc).into_response());
    }

    let fragments = state.backend.stream(&request).await?;
    let model = request.model;
    Ok(event_stream(fragments, move |fragment| {
        match fragment.to_text() {
            Some(text) => openai::sse_frame(&openai::text_chunk(&id, created, &model, &text, false)),
            None => format!(
                "{}{}",
                openai::sse_frame(&openai::text_chunk(&id, created, &model, "", true)),
                openai::DONE_FRAME
            ),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_forms() {
        assert_eq!(prompt_text(Some(&json!("hi"))).unwrap(), "hi");
        assert_eq!(prompt_text(Some(&json!(["a", "b"]))).unwrap(), "a\nb");
        assert!(prompt_text(None).is_err());
        assert!(prompt_text(Some(&json!([1]))).is_err());
        assert!(prompt_text(Some(&json!(5))).is_err());
    }

    #[test]
    fn test_to_chat_request_keeps_params() {
        let req = to_chat_request(&json!({
            "model": "gpt-4.1",
            "prompt": ["line one", "line two"],
            "temperature": 0.2,
            "stream": true
        }))
        .unwrap();
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].content, "line one\nline two");
        assert!((req.params.temperature - 0.2).abs() < f64::EPSILON);
        assert!(req.stream);
    }

    #[test]
    fn test_to_chat_request_validates() {
        let err = to_chat_request(&json!({"prompt": "x", "max_tokens": 0})).unwrap_err();
        assert!(matches!(err, GatewayError::Validation { ref field, .. } if field == "max_tokens"));
        let err = to_chat_request(&json!({"model": "gpt-4.1"})).unwrap_err();
        assert!(matches!(err, GatewayError::Validation { ref field, .. } if field == "prompt"));
    }
}
