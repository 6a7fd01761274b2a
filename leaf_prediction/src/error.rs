use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("{0}")]
    Validation(String),
    #[error("Request body exceeds the {limit_bytes} byte limit")]
    PayloadTooLarge { limit_bytes: usize },
    #[error("Error during image preprocessing: {0}")]
    Preprocessing(String),
    #[error("Failed to get token: {0}")]
    Auth(String),
    #[error("Inference request failed: {0}")]
    Inference(String),
    #[error("Model returned {actual} scores but {expected} class labels are configured")]
    ResultShape { expected: usize, actual: usize },
    #[error("Call to {service} timed out after {timeout_ms}ms")]
    UpstreamTimeout {
        service: &'static str,
        timeout_ms: u64,
    },
}

impl PredictionError {
    pub fn kind(&self) -> &'static str {
        match self {
            PredictionError::Validation(_) => "validation",
            PredictionError::PayloadTooLarge { .. } => "payload_too_large",
            PredictionError::Preprocessing(_) => "preprocessing",
            PredictionError::Auth(_) => "auth",
            PredictionError::Inference(_) => "inference",
            PredictionError::ResultShape { .. } => "result_shape",
            PredictionError::UpstreamTimeout { .. } => "upstream_timeout",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PredictionError::Validation(_) => StatusCode::BAD_REQUEST,
            PredictionError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            PredictionError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

impl IntoResponse for PredictionError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "Prediction failed: {}", self);
        } else {
            tracing::warn!(kind = self.kind(), "Rejected prediction request: {}", self);
        }
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}
