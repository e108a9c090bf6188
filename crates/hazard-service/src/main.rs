//! NEO hazard service
//!
//! Trains cost-sensitive hazard classifiers from raw NEO partitions, publishes
//! versioned artifacts and serves real-time predictions over HTTP.

use anyhow::Result;
use hazard_lib::health::components;
use hazard_lib::{
    ArtifactStore, FsStore, HazardMetrics, HealthRegistry, InferenceEngine, ModelRegistry,
    StructuredLogger, TrainingPipeline,
};
use hazard_service::{api, ServiceConfig};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON format
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = VERSION, "Starting NEO hazard service");

    let config = ServiceConfig::load()?;
    info!(?config, "Configuration loaded");

    let health = HealthRegistry::new();
    health.register(components::STORE).await;
    health.register(components::TRAINER).await;
    health.register(components::INFERENCE).await;

    // Register metrics before the first scrape
    let _metrics = HazardMetrics::new();
    let logger = StructuredLogger::new("hazard-service");

    let store = Arc::new(FsStore::new(&config.store_root, &config.bucket));
    match store.bucket_exists(&config.bucket).await {
        Ok(true) => {}
        Ok(false) => {
            info!(bucket = %config.bucket, "Creating artifact bucket");
            store.create_bucket(&config.bucket).await?;
        }
        Err(e) => {
            error!(error = %e, "Artifact store unavailable");
            health
                .set_unhealthy(components::STORE, e.to_string())
                .await;
        }
    }

    let training = config.training();
    let registry = Arc::new(ModelRegistry::new(store.clone(), training.registry_config()));
    let pipeline = TrainingPipeline::new(store.clone(), registry.clone(), training);
    let engine = InferenceEngine::new(registry.clone(), config.inference());

    // Serve the latest published model if there is one
    match engine.load_latest().await {
        Ok(version) => health.set_model_version(version.to_string()).await,
        Err(e) if e.is_not_ready() => {
            warn!("No published model yet; predictions unavailable until train and reload")
        }
        Err(e) => {
            error!(error = %e, "Failed to load latest model");
            health
                .set_degraded(components::INFERENCE, e.to_string())
                .await;
        }
    }

    logger.log_startup(VERSION, engine.current_version().as_deref());

    let state = Arc::new(api::AppState {
        health,
        pipeline,
        engine,
        registry,
    });

    let api_port = config.api_port;
    let server = tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, state).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("NEO hazard service started successfully");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Received shutdown signal");
            logger.log_shutdown("SIGINT received");
        }
        _ = server => {
            logger.log_shutdown("API server exited");
        }
    }

    Ok(())
}
