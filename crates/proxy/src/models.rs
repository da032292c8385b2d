//! Models listing handlers: the configured model names in `OpenAI` format.

use axum::{
    Json,
    extract::{Path, State},
};
use freegpt_translate::openai::model_object;
use freegpt_types::GatewayError;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::{AppState, error::ApiError};

/// Fixed creation time reported for every model.
const MODEL_CREATED: u64 = 1_686_935_002;
const OWNED_BY: &str = "freegpt";

/// Handles `GET /v1/models`.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<Value> {
    let data: Vec<Value> = state
        .backend
        .supported_models()
        .iter()
        .map(|id| model_object(id, MODEL_CREATED, OWNED_BY))
        .collect();

    Json(json!({
        "object": "list",
        "data": data,
    }))
}

/// Handles `GET /v1/models/{model}`.
///
/// # Errors
///
/// Returns 404 when `model` is not a configured name.
pub async fn retrieve_model(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if state.backend.supported_models().contains(&model) {
        Ok(Json(model_object(&model, MODEL_CREATED, OWNED_BY)))
    } else {
        Err(GatewayError::ModelNotFound(model).into())
    }
}
