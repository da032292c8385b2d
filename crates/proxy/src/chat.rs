//! Chat completions handler: OpenAI-compatible requests to the chat backend.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
};
use freegpt_translate::openai;
use freegpt_types::{ChatRequest, token::now_unix};
use std::sync::Arc;

use crate::{
    AppState,
    error::ApiError,
    sse::{event_stream, parse_body},
};

/// Handles `POST /v1/chat/completions`.
///
/// Returns a `chat.completion` document, or a `chat.completion.chunk` event
/// stream ending with a `finish_reason: "stop"` chunk and `[DONE]`.
///
/// # Errors
///
/// Returns [`ApiError`] for invalid bodies and for upstream session failures.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = ChatRequest::from_body(&parse_body(&body)?)?;
    tracing::info!(
        model = %request.model,
        stream = request.stream,
        messages = request.messages.len(),
        "chat completion request"
    );

    let id = openai::chat_completion_id();
    let created = now_unix();

    if !request.stream {
        let completion = state.backend.complete(&request).await?;
        let doc = openai::chat_completion(&id, created, &request.model, &completion);
        return Ok(Json(doc).into_response());
    }

    let fragments = state.backend.stream(&request).await?;
    let model = request.model;
    Ok(event_stream(fragments, move |fragment| match fragment.to_text() {
        Some(text) => openai::sse_frame(&openai::chat_chunk(&id, created, &model, &text)),
        None => chat_tail(&id, created, &model),
    }))
}

fn chat_tail(id: &str, created: u64, model: &str) -> String {
    let last = openai::chat_final_chunk(id, created, model);
    format!("{}{}", openai::sse_frame(&last), openai::DONE_FRAME)
}

