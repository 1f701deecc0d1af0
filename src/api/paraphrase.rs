use std::time::Instant;

use axum::{
    extract::{State, rejection::JsonRejection},
    response::Json,
};
use uuid::Uuid;

use crate::{
    api::AppState,
    error::Error,
    errors::AppError,
    service::{ParaphraseRequest, ParaphraseResult},
};

// ENDPOINT: POST /paraphrase
pub async fn paraphrase(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ParaphraseRequest>, JsonRejection>,
) -> std::result::Result<Json<ParaphraseResult>, AppError> {
    let request_start = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!(request_id = %request_id, "Rejected request body: {}", rejection.body_text());
        AppError::from(rejection)
    })?;

    tracing::info!(
        request_id = %request_id,
        text_length = request.text.chars().count(),
        num_return_sequences = request.num_return_sequences,
        num_beams = request.num_beams,
        temperature = request.temperature,
        "Received paraphrase request"
    );

    let result = state.service.paraphrase(request).await.map_err(|e| {
        match &e {
            Error::GenerationFailed(_) | Error::ModelLoad(_) => {
                tracing::error!(request_id = %request_id, "Paraphrase failed: {}", e);
            }
            _ => tracing::warn!(request_id = %request_id, "Paraphrase rejected: {}", e),
        }
        AppError::from(e)
    })?;

    tracing::info!(
        request_id = %request_id,
        paraphrases = result.paraphrases.len(),
        device = %result.device,
        "Request {} completed in {}ms",
        request_id,
        request_start.elapsed().as_millis()
    );

    Ok(Json(result))
}
