mod health;
mod metrics;
mod predict;
mod questions;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/api/predict-health", get(health::liveness))
        .route("/api/python", get(health::liveness))
        .route("/api/predict", post(predict::predict))
        .route("/api/questions", post(questions::ask))
        .route("/metrics", get(metrics::metrics_handler))
}
