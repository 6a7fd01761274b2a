use crate::{
    error::PredictionError,
    interpret::{interpret, Prediction},
    preprocess::preprocess,
    server::SharedState,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::instrument;

const ROUTE: &str = "/api/predict";

#[derive(Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Serialize)]
pub struct PredictResponse {
    result: String,
    #[serde(flatten)]
    prediction: Prediction,
}

#[instrument(skip(state, payload))]
pub async fn predict(
    State(state): State<SharedState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, PredictionError> {
    state.metrics.record_request(ROUTE);
    let started = Instant::now();

    let outcome = run_pipeline(&state, payload).await;

    state
        .metrics
        .record_prediction_duration(started.elapsed().as_millis() as u64, ROUTE);

    match outcome {
        Ok(prediction) => {
            state.metrics.record_prediction(&prediction.label);
            Ok(Json(PredictResponse {
                result: prediction.sentence(),
                prediction,
            }))
        }
        Err(e) => {
            state.metrics.record_failure(e.kind());
            Err(e)
        }
    }
}

async fn run_pipeline(
    state: &SharedState,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Prediction, PredictionError> {
    let Json(request) = payload.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            PredictionError::PayloadTooLarge {
                limit_bytes: state.max_body_bytes,
            }
        } else {
            PredictionError::Validation(rejection.body_text())
        }
    })?;

    let encoded = request
        .data
        .filter(|data| !data.trim().is_empty())
        .ok_or_else(|| PredictionError::Validation("No image data provided".into()))?;

    let tensor = tokio::task::spawn_blocking(move || preprocess(&encoded))
        .await
        .map_err(|e| PredictionError::Preprocessing(format!("worker task failed: {}", e)))??;

    let scores = state.prediction_service.predict(&tensor).await?;
    let prediction = interpret(&scores, &state.class_labels)?;

    tracing::info!(
        class = %prediction.label,
        confidence = prediction.confidence,
        "Prediction complete"
    );

    Ok(prediction)
}
