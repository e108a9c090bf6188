//! Observability for the hazard pipeline
//!
//! Provides:
//! - Prometheus metrics (training runs and duration, prediction counts and
//!   latency, loaded model version, last evaluation quality)
//! - Structured JSON logging of pipeline events with tracing

use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_counter, Gauge, GaugeVec,
    Histogram, IntCounter,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for prediction latency (seconds)
const PREDICTION_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.05, 0.1,
];

/// Histogram buckets for training duration (seconds)
const TRAINING_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<HazardMetricsInner> = OnceLock::new();

struct HazardMetricsInner {
    training_runs: IntCounter,
    training_failures: IntCounter,
    training_duration_seconds: Histogram,
    rows_consolidated: IntCounter,
    predictions_served: IntCounter,
    hazardous_predictions: IntCounter,
    prediction_errors: IntCounter,
    prediction_latency_seconds: Histogram,
    model_version_info: GaugeVec,
    last_auc: Gauge,
    last_recall: Gauge,
}

impl HazardMetricsInner {
    fn new() -> Self {
        Self {
            training_runs: register_int_counter!(
                "neo_hazard_training_runs_total",
                "Completed training runs"
            )
            .expect("Failed to register training_runs"),

            training_failures: register_int_counter!(
                "neo_hazard_training_failures_total",
                "Training runs that ended in an error"
            )
            .expect("Failed to register training_failures"),

            training_duration_seconds: register_histogram!(
                "neo_hazard_training_duration_seconds",
                "Wall time of a training run from consolidation to publish",
                TRAINING_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            rows_consolidated: register_int_counter!(
                "neo_hazard_rows_consolidated_total",
                "Data rows merged from raw partitions"
            )
            .expect("Failed to register rows_consolidated"),

            predictions_served: register_int_counter!(
                "neo_hazard_predictions_total",
                "Predictions answered"
            )
            .expect("Failed to register predictions_served"),

            hazardous_predictions: register_int_counter!(
                "neo_hazard_hazardous_predictions_total",
                "Predictions at or above the decision threshold"
            )
            .expect("Failed to register hazardous_predictions"),

            prediction_errors: register_int_counter!(
                "neo_hazard_prediction_errors_total",
                "Prediction requests that failed"
            )
            .expect("Failed to register prediction_errors"),

            prediction_latency_seconds: register_histogram!(
                "neo_hazard_prediction_latency_seconds",
                "Time spent building the feature vector and scoring it",
                PREDICTION_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            model_version_info: register_gauge_vec!(
                "neo_hazard_model_version_info",
                "Version key of the currently loaded model",
                &["version"]
            )
            .expect("Failed to register model_version_info"),

            last_auc: register_gauge!(
                "neo_hazard_last_evaluation_auc",
                "ROC-AUC of the hazardous class from the last training run"
            )
            .expect("Failed to register last_auc"),

            last_recall: register_gauge!(
                "neo_hazard_last_evaluation_recall",
                "Recall of the hazardous class from the last training run"
            )
            .expect("Failed to register last_recall"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct HazardMetrics {
    _private: (),
}

impl Default for HazardMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HazardMetrics {
    /// Create a handle, registering the global metrics on first call
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(HazardMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &HazardMetricsInner {
        GLOBAL_METRICS.get_or_init(HazardMetricsInner::new)
    }

    pub fn record_training(&self, duration_secs: f64, rows: usize) {
        let inner = self.inner();
        inner.training_runs.inc();
        inner.training_duration_seconds.observe(duration_secs);
        inner.rows_consolidated.inc_by(rows as u64);
    }

    pub fn inc_training_failures(&self) {
        self.inner().training_failures.inc();
    }

    /// Record a successful prediction
    pub fn record_prediction(&self, duration_secs: f64, hazardous: bool) {
        let inner = self.inner();
        inner.predictions_served.inc();
        if hazardous {
            inner.hazardous_predictions.inc();
        }
        inner.prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_prediction_errors(&self) {
        self.inner().prediction_errors.inc();
    }

    /// Replace the loaded-version label
    pub fn set_model_version(&self, version: &str) {
        self.inner().model_version_info.reset();
        self.inner()
            .model_version_info
            .with_label_values(&[version])
            .set(1.0);
    }

    /// AUC is left unchanged when the report has none
    pub fn set_evaluation(&self, auc: Option<f64>, recall: f64) {
        if let Some(auc) = auc {
            self.inner().last_auc.set(auc);
        }
        self.inner().last_recall.set(recall);
    }
}

/// Structured logger for pipeline events
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_training_completed(
        &self,
        version: &str,
        partitions: usize,
        rows: usize,
        accuracy: f64,
        recall: f64,
        auc: Option<f64>,
        duration_ms: u64,
    ) {
        info!(
            event = "training_completed",
            service = %self.service,
            version = %version,
            partitions = partitions,
            rows = rows,
            accuracy = accuracy,
            recall = recall,
            auc = ?auc,
            duration_ms = duration_ms,
            "Hazard model trained"
        );
    }

    pub fn log_model_published(&self, version: &str, train_rows: usize) {
        info!(
            event = "model_published",
            service = %self.service,
            version = %version,
            train_rows = train_rows,
            "Model artifacts published"
        );
    }

    /// Log a model swap; `previous` is `None` on first load
    pub fn log_model_loaded(&self, previous: Option<&str>, version: &str) {
        info!(
            event = "model_loaded",
            service = %self.service,
            previous_version = ?previous,
            version = %version,
            "Inference model swapped in"
        );
    }

    pub fn log_model_load_failed(&self, current: Option<&str>, error: &str) {
        warn!(
            event = "model_load_failed",
            service = %self.service,
            current_version = ?current,
            error = %error,
            "Model load failed, keeping previous model"
        );
    }

    pub fn log_prediction(&self, version: &str, probability: f64, threshold: f64, hazardous: bool) {
        info!(
            event = "prediction_made",
            service = %self.service,
            version = %version,
            probability = probability,
            threshold = threshold,
            hazardous = hazardous,
            "Hazard prediction"
        );
    }

    pub fn log_startup(&self, version: &str, model_version: Option<&str>) {
        info!(
            event = "startup",
            service = %self.service,
            service_version = %version,
            model_version = ?model_version,
            "Hazard service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "shutdown",
            service = %self.service,
            reason = %reason,
            "Hazard service shutting down"
        );
    }
}
