//! HTTP API for training, model reload, prediction and health

use crate::error::ApiError;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use hazard_lib::health::components;
use hazard_lib::risk;
use hazard_lib::{
    FeatureRequest, HealthRegistry, InferenceEngine, ModelRegistry, ModelVersionInfo,
    PredictionResult, RiskAssessment, RiskInput, TrainingOutcome, TrainingPipeline,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Application state shared by all handlers
pub struct AppState {
    pub health: HealthRegistry,
    pub pipeline: TrainingPipeline,
    pub engine: InferenceEngine,
    pub registry: Arc<ModelRegistry>,
}

/// Body of `POST /ml/train`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainRangeRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainResponse {
    #[serde(flatten)]
    pub outcome: TrainingOutcome,
    /// Human-readable evaluation report
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health.health().await;

    let status_code = match health.status {
        hazard_lib::ComponentStatus::Healthy => StatusCode::OK,
        hazard_lib::ComponentStatus::Degraded => StatusCode::OK,
        hazard_lib::ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check; ready once a model is serving
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn record_training(
    state: &AppState,
    result: hazard_lib::Result<TrainingOutcome>,
) -> Result<Json<TrainResponse>, ApiError> {
    match result {
        Ok(outcome) => {
            state.health.set_healthy(components::TRAINER).await;
            let summary = outcome.report.to_string();
            Ok(Json(TrainResponse { outcome, summary }))
        }
        Err(e) => {
            warn!(error = %e, "Training request failed");
            state
                .health
                .set_degraded(components::TRAINER, e.to_string())
                .await;
            Err(e.into())
        }
    }
}

/// Train on every raw partition and publish a new version
async fn train_all(State(state): State<Arc<AppState>>) -> Result<Json<TrainResponse>, ApiError> {
    info!("Training on all partitions");
    let result = state.pipeline.train_all().await;
    record_training(&state, result).await
}

/// Train on the partitions of an inclusive date range
async fn train_range(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrainRangeRequest>,
) -> Result<Json<TrainResponse>, ApiError> {
    info!(start = %request.start, end = %request.end, "Training on date range");
    let result = state.pipeline.train_range(request.start, request.end).await;
    record_training(&state, result).await
}

/// Swap in the latest published model
async fn reload(State(state): State<Arc<AppState>>) -> Result<Json<ReloadResponse>, ApiError> {
    match state.engine.load_latest().await {
        Ok(version) => {
            let version = version.to_string();
            state.health.set_model_version(version.clone()).await;
            state.health.set_healthy(components::INFERENCE).await;
            Ok(Json(ReloadResponse {
                status: "ok".to_string(),
                version,
            }))
        }
        Err(e) => {
            // Only a failed reload on top of a serving model degrades inference
            if state.engine.is_loaded() {
                state
                    .health
                    .set_degraded(components::INFERENCE, e.to_string())
                    .await;
            }
            Err(e.into())
        }
    }
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FeatureRequest>,
) -> Result<Json<PredictionResult>, ApiError> {
    Ok(Json(state.engine.predict(&request)?))
}

/// Rule-based screening; independent of the loaded model
async fn risk_score(Query(input): Query<RiskInput>) -> Json<RiskAssessment> {
    Json(risk::assess(&input))
}

/// Published versions, newest first
async fn list_models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ModelVersionInfo>>, ApiError> {
    Ok(Json(state.registry.list_versions().await?))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/ml/train/all", post(train_all))
        .route("/ml/train", post(train_range))
        .route("/ml/reload", post(reload))
        .route("/ml/predict", post(predict))
        .route("/ml/models", get(list_models))
        .route("/ml/risk", get(risk_score))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = format!("0.0.0.0:{}", port);

    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
