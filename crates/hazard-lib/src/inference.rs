//! Real-time hazard inference
//!
//! The engine owns the currently loaded (model, schema) pair as one
//! `Arc<LoadedModel>`. Predictions clone the `Arc` under a brief read lock and
//! score outside it; a reload resolves and verifies the new pair first and
//! only then replaces the reference under the write lock. Readers therefore
//! see either the old pair or the new one, and a failed reload leaves the old
//! pair serving.

use crate::classifier::HazardModel;
use crate::dataset::{Schema, TRUE_LABEL};
use crate::error::{HazardError, Result};
use crate::models::{FeatureRequest, PredictionResult};
use crate::observability::{HazardMetrics, StructuredLogger};
use crate::registry::{describe, LoadedArtifact, ModelRegistry, VersionKey};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, info};

/// Default decision threshold on the hazardous-class probability
pub const DEFAULT_THRESHOLD: f64 = 0.80;

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    /// A row is hazardous when its probability is at least this value
    pub threshold: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// A verified model together with the schema it was trained against
#[derive(Debug)]
pub struct LoadedModel {
    pub version: VersionKey,
    pub schema: Schema,
    pub model: HazardModel,
    pub loaded_at: DateTime<Utc>,
}

/// Inference statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceStats {
    pub total_predictions: u64,
    pub failed_predictions: u64,
    pub successful_loads: u64,
    pub failed_loads: u64,
}

/// `hazardous` decision; the bound is inclusive
pub fn is_hazardous(probability: f64, threshold: f64) -> bool {
    probability >= threshold
}

pub struct InferenceEngine {
    registry: Arc<ModelRegistry>,
    config: InferenceConfig,
    current: RwLock<Option<Arc<LoadedModel>>>,
    metrics: HazardMetrics,
    logger: StructuredLogger,
    predictions: AtomicU64,
    failed_predictions: AtomicU64,
    loads: AtomicU64,
    failed_loads: AtomicU64,
}

impl InferenceEngine {
    /// Create an engine with nothing loaded
    pub fn new(registry: Arc<ModelRegistry>, config: InferenceConfig) -> Self {
        Self {
            registry,
            config,
            current: RwLock::new(None),
            metrics: HazardMetrics::new(),
            logger: StructuredLogger::new("inference"),
            predictions: AtomicU64::new(0),
            failed_predictions: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            failed_loads: AtomicU64::new(0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    /// Snapshot of the loaded pair, if any
    pub fn current(&self) -> Result<Option<Arc<LoadedModel>>> {
        let guard = self
            .current
            .read()
            .map_err(|e| HazardError::Inference(format!("lock poisoned: {}", e)))?;
        Ok(guard.clone())
    }

    pub fn current_version(&self) -> Option<String> {
        self.current()
            .ok()
            .flatten()
            .map(|loaded| loaded.version.to_string())
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.current(), Ok(Some(_)))
    }

    /// Resolve the latest published pair and swap it in.
    ///
    /// On any failure the previously loaded pair keeps serving. A reload
    /// that resolved an older version than the one now loaded (two reloads
    /// overlapping) leaves the newer one in place.
    pub async fn load_latest(&self) -> Result<VersionKey> {
        match self.registry.resolve_latest().await {
            Ok(artifact) => self.install(artifact),
            Err(e) => {
                self.failed_loads.fetch_add(1, Ordering::Relaxed);
                self.logger
                    .log_model_load_failed(self.current_version().as_deref(), &e.to_string());
                Err(e)
            }
        }
    }

    /// Swap a verified artifact in unless a newer version is already loaded;
    /// returns the version serving afterwards
    fn install(&self, artifact: LoadedArtifact) -> Result<VersionKey> {
        let version = artifact.version.clone();
        let loaded = Arc::new(LoadedModel {
            version: artifact.version,
            schema: artifact.header.schema,
            model: artifact.model,
            loaded_at: Utc::now(),
        });
        let previous = {
            let mut guard = self
                .current
                .write()
                .map_err(|e| HazardError::Inference(format!("lock poisoned: {}", e)))?;
            if let Some(current) = guard.as_ref() {
                if current.version.timestamp_ms > version.timestamp_ms {
                    info!(
                        loaded = %current.version,
                        resolved = %version,
                        "Newer model already loaded, keeping it"
                    );
                    return Ok(current.version.clone());
                }
            }
            guard
                .replace(loaded)
                .map(|old| old.version.to_string())
        };

        self.loads.fetch_add(1, Ordering::Relaxed);
        self.metrics.set_model_version(&version.to_string());
        self.logger
            .log_model_loaded(previous.as_deref(), &version.to_string());
        Ok(version)
    }

    /// Score a prediction request against the loaded pair
    pub fn predict(&self, request: &FeatureRequest) -> Result<PredictionResult> {
        self.predict_named(request.named_values())
    }

    /// Score named feature values; names the schema lacks are ignored and
    /// schema features not given stay missing
    pub fn predict_named<'a>(
        &self,
        named: impl IntoIterator<Item = (&'a str, Option<f64>)>,
    ) -> Result<PredictionResult> {
        let start = Instant::now();
        let result = self.score(named);
        match &result {
            Ok(prediction) => {
                self.predictions.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .record_prediction(start.elapsed().as_secs_f64(), prediction.hazardous);
                self.logger.log_prediction(
                    &prediction.model_version,
                    prediction.probability,
                    prediction.threshold,
                    prediction.hazardous,
                );
            }
            Err(e) => {
                self.failed_predictions.fetch_add(1, Ordering::Relaxed);
                self.metrics.inc_prediction_errors();
                debug!(error = %e, "Prediction failed");
            }
        }
        result
    }

    fn score<'a>(
        &self,
        named: impl IntoIterator<Item = (&'a str, Option<f64>)>,
    ) -> Result<PredictionResult> {
        let loaded = self.current()?.ok_or(HazardError::NotReady)?;
        let schema = &loaded.schema;
        if loaded.model.base().schema() != schema {
            return Err(HazardError::Inference(format!(
                "model {} expects [{}] but its schema is [{}]",
                loaded.version,
                describe(loaded.model.base().schema()),
                describe(schema)
            )));
        }
        let true_index = schema.class().index_of(TRUE_LABEL).ok_or_else(|| {
            HazardError::Inference(format!(
                "\"{}\" is not a value of class '{}'",
                TRUE_LABEL,
                schema.class().name
            ))
        })?;

        let vector = schema.build_vector(named);
        let distribution = loaded.model.distribution(&vector);
        if distribution.len() != schema.num_classes() {
            return Err(HazardError::Inference(format!(
                "model returned {} probabilities for {} class values",
                distribution.len(),
                schema.num_classes()
            )));
        }

        let probability = distribution[true_index];
        Ok(PredictionResult {
            hazardous: is_hazardous(probability, self.config.threshold),
            probability,
            threshold: self.config.threshold,
            cost_sensitive_hazardous: loaded.model.decide(&distribution) == true_index,
            model_version: loaded.version.to_string(),
        })
    }

    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_predictions: self.predictions.load(Ordering::Relaxed),
            failed_predictions: self.failed_predictions.load(Ordering::Relaxed),
            successful_loads: self.loads.load(Ordering::Relaxed),
            failed_loads: self.failed_loads.load(Ordering::Relaxed),
        }
    }
}
