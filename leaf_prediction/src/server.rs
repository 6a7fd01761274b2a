use crate::{
    config::{AdvisorConfig, Config},
    prediction::PredictionService,
    routes::api_routes,
    telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Read-only per-process state handed to every request.
#[derive(Clone)]
pub struct SharedState {
    pub prediction_service: Arc<PredictionService>,
    pub class_labels: Arc<Vec<String>>,
    pub advisor: Option<Arc<AdvisorConfig>>,
    pub metrics: Arc<Metrics>,
    pub max_body_bytes: usize,
}

impl SharedState {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let prediction_service = PredictionService::new(&config.watson)?;
        let metrics = Metrics::new()?;

        Ok(Self {
            prediction_service: Arc::new(prediction_service),
            class_labels: Arc::new(config.class_labels.clone()),
            advisor: config.advisor.clone().map(Arc::new),
            metrics: Arc::new(metrics),
            max_body_bytes: config.server.max_body_bytes,
        })
    }
}

pub fn build_router(state: SharedState) -> Router {
    let metrics_layer = HttpMetricsLayerBuilder::new().build();
    let max_body_bytes = state.max_body_bytes;

    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(metrics_layer)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(state: SharedState, config: &Config) -> anyhow::Result<Self> {
        let addr = config.server.get_address();
        let router = build_router(state);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}
