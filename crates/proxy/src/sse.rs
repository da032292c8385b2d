//! Shared plumbing for the JSON and event-stream handlers.

use axum::{
    body::{Body, Bytes},
    http::{HeaderName, header},
    response::{IntoResponse, Response},
};
use freegpt_types::{Fragment, FragmentStream, GatewayError, traits::Result};
use futures_util::StreamExt as _;
use serde_json::Value;
use std::convert::Infallible;

/// Parse a request body, reporting bad JSON as a validation error.
pub(crate) fn parse_body(bytes: &Bytes) -> Result<Value> {
    serde_json::from_slice(bytes)
        .map_err(|e| GatewayError::validation("body", format!("Invalid JSON: {e}")))
}

/// Render every fragment with `frame` and stream the result as
/// `text/event-stream`. Dropping the body drops `fragments`.
pub(crate) fn event_stream<F>(fragments: FragmentStream, mut frame: F) -> Response
where
    F: FnMut(&Fragment) -> String + Send + 'static,
{
    let frames = fragments.map(move |f| Ok::<_, Infallible>(frame(&f)));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}
