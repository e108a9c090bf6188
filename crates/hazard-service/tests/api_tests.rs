//! Integration tests for the API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use hazard_lib::health::components;
use hazard_lib::pipeline::partition_key;
use hazard_lib::store::CONTENT_TYPE_CSV;
use hazard_lib::{
    encode_partition, ArtifactStore, HealthRegistry, InMemoryStore, InferenceConfig,
    InferenceEngine, ModelRegistry, NeoRecord, TrainingConfig, TrainingPipeline,
};
use hazard_service::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn records() -> Vec<NeoRecord> {
    (0..60)
        .map(|i| {
            let hazardous = i % 4 == 0;
            NeoRecord {
                neo_id: format!("{}", 3_000_000 + i),
                name: format!("(2024 QX{})", i),
                absolute_magnitude: Some(if hazardous { 18.0 } else { 24.5 } + (i % 5) as f64 * 0.1),
                diameter_min_m: Some(if hazardous { 400.0 } else { 35.0 } + (i % 7) as f64),
                diameter_max_m: Some(if hazardous { 900.0 } else { 80.0 } + (i % 7) as f64 * 2.0),
                is_potentially_hazardous: hazardous,
                first_approach_date: None,
                velocity_km_s: Some(10.0 + (i % 11) as f64),
                orbiting_body: Some("Earth".to_string()),
                created_at: "2024-03-01".to_string(),
            }
        })
        .collect()
}

async fn seed(store: &InMemoryStore) {
    let records = records();
    for (day, chunk) in [("2024-03-01", &records[..30]), ("2024-03-02", &records[30..])] {
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap();
        store
            .put(
                &partition_key("raw", date, "neo-feed.csv"),
                encode_partition(chunk).unwrap(),
                CONTENT_TYPE_CSV,
            )
            .await
            .unwrap();
    }
}

async fn create_test_app(with_data: bool) -> Router {
    let store = Arc::new(InMemoryStore::new());
    if with_data {
        seed(&store).await;
    }
    let config = TrainingConfig {
        num_trees: 15,
        ..Default::default()
    };
    let registry = Arc::new(ModelRegistry::new(store.clone(), config.registry_config()));
    let health = HealthRegistry::new();
    health.register(components::STORE).await;
    health.register(components::TRAINER).await;
    health.register(components::INFERENCE).await;

    let state = Arc::new(AppState {
        health,
        pipeline: TrainingPipeline::new(store.clone(), registry.clone(), config),
        engine: InferenceEngine::new(registry.clone(), InferenceConfig::default()),
        registry,
    });
    create_router(state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

fn hazardous_request() -> Value {
    json!({
        "absolute_magnitude": 18.2,
        "diameter_min_m": 402.0,
        "diameter_max_m": 905.0,
        "velocity_km_s": 12.0
    })
}

#[tokio::test]
async fn test_healthz_endpoint() {
    let app = create_test_app(false).await;
    let (status, json) = send(&app, "GET", "/healthz", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert!(json["components"].get("trainer").is_some());
}

#[tokio::test]
async fn test_readyz_not_ready_without_model() {
    let app = create_test_app(false).await;
    let (status, json) = send(&app, "GET", "/readyz", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["ready"], false);
    assert!(json["reason"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = create_test_app(false).await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/plain; charset=utf-8"
    );
}

#[tokio::test]
async fn test_predict_before_reload_is_not_ready() {
    let app = create_test_app(true).await;
    let (status, json) = send(&app, "POST", "/ml/predict", Some(hazardous_request())).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "not_ready");
}

#[tokio::test]
async fn test_reload_without_models_is_not_found() {
    let app = create_test_app(false).await;
    let (status, json) = send(&app, "POST", "/ml/reload", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn test_train_without_partitions_is_empty_input() {
    let app = create_test_app(false).await;
    let (status, json) = send(&app, "POST", "/ml/train/all", None).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"], "empty_input");

    let (_, health) = send(&app, "GET", "/healthz", None).await;
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_train_range_with_inverted_dates() {
    let app = create_test_app(true).await;
    let body = json!({"start": "2024-03-02", "end": "2024-03-01"});
    let (status, json) = send(&app, "POST", "/ml/train", Some(body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"], "empty_input");
}

#[tokio::test]
async fn test_train_reload_predict_flow() {
    let app = create_test_app(true).await;

    let (status, trained) = send(&app, "POST", "/ml/train/all", None).await;
    assert_eq!(status, StatusCode::OK);
    let version = trained["version"].as_str().unwrap().to_string();
    assert!(version.starts_with("models/rf-csc-"));
    assert_eq!(trained["rows"], 60);
    assert_eq!(trained["partitions"], 2);
    assert!(trained["summary"]
        .as_str()
        .unwrap()
        .contains("Confusion Matrix"));

    let (status, reloaded) = send(&app, "POST", "/ml/reload", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reloaded["status"], "ok");
    assert_eq!(reloaded["version"], version.as_str());

    let (status, ready) = send(&app, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ready["model_version"], version.as_str());

    let (status, prediction) = send(&app, "POST", "/ml/predict", Some(hazardous_request())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(prediction["hazardous"], true);
    assert_eq!(prediction["threshold"], 0.8);
    assert_eq!(prediction["model_version"], version.as_str());

    let (status, models) = send(&app, "GET", "/ml/models", None).await;
    assert_eq!(status, StatusCode::OK);
    let models = models.as_array().unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0]["version"], version.as_str());
}

#[tokio::test]
async fn test_train_range_selects_partitions() {
    let app = create_test_app(true).await;
    let body = json!({"start": "2024-03-02", "end": "2024-03-02"});
    let (status, trained) = send(&app, "POST", "/ml/train", Some(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(trained["partitions"], 1);
    assert_eq!(trained["rows"], 30);
}

#[tokio::test]
async fn test_risk_score_without_model() {
    let app = create_test_app(false).await;
    let (status, risk) = send(
        &app,
        "GET",
        "/ml/risk?absolute_magnitude=18&diameter_max_m=500&velocity_km_s=20",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(risk["hazardous"], true);
    assert_eq!(risk["criteria_met"], 3);
    let score = risk["score"].as_f64().unwrap();
    assert!(score > 45.0 && score < 46.0, "{}", score);

    let (status, partial) = send(&app, "GET", "/ml/risk?absolute_magnitude=18", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(partial["hazardous"], false);
    assert_eq!(partial["score"], 0.0);

    let (status, _) = send(&app, "GET", "/ml/risk?velocity_km_s=fast", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
