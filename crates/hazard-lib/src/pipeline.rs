//! Training pipeline
//!
//! Discovers raw partitions, consolidates them into a staged temp file, binds
//! the corpus to a schema, splits it, trains and evaluates the cost-sensitive
//! model and publishes the result. A run is a single batch; concurrent runs
//! are not coordinated and only race on which version ends up latest.

use crate::classifier::{self, ForestParams, DEFAULT_NUM_TREES};
use crate::dataset::{self, BindOptions};
use crate::error::{HazardError, Result};
use crate::evaluation::{self, Report};
use crate::models::columns;
use crate::observability::{HazardMetrics, StructuredLogger};
use crate::registry::{ModelRegistry, RegistryConfig, VersionKey};
use crate::store::ArtifactStore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;
use tokio::io::BufWriter;
use tracing::{debug, info, warn};

const PARTITION_SUFFIX: &str = ".csv";

/// Training parameters
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub class_column: String,
    pub excluded_columns: Vec<String>,
    pub train_ratio: f64,
    pub seed: u64,
    pub num_trees: usize,
    /// Cost of predicting non-hazardous for a hazardous object
    pub cost_fn: f64,
    /// Cost of predicting hazardous for a non-hazardous object
    pub cost_fp: f64,
    pub namespace: String,
    pub algorithm_tag: String,
    /// Raw partitions live under `<raw_prefix>/<YYYY-MM-DD>/`
    pub raw_prefix: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            class_column: columns::HAZARDOUS.to_string(),
            excluded_columns: columns::NON_FEATURE.iter().map(|c| c.to_string()).collect(),
            train_ratio: 0.70,
            seed: 123,
            num_trees: DEFAULT_NUM_TREES,
            cost_fn: 15.0,
            cost_fp: 3.0,
            namespace: "models".to_string(),
            algorithm_tag: "rf-csc".to_string(),
            raw_prefix: "raw".to_string(),
        }
    }
}

impl TrainingConfig {
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            namespace: self.namespace.clone(),
            algorithm_tag: self.algorithm_tag.clone(),
        }
    }

    fn bind_options(&self) -> BindOptions {
        BindOptions {
            class_column: self.class_column.clone(),
            excluded_columns: self.excluded_columns.clone(),
        }
    }

    /// The ensemble shares the split seed
    fn forest_params(&self) -> ForestParams {
        ForestParams {
            num_trees: self.num_trees,
            seed: self.seed,
            ..Default::default()
        }
    }
}

/// Result of a successful training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingOutcome {
    pub version: String,
    pub report: Report,
    pub partitions: usize,
    pub rows: usize,
    pub rows_missing_class: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub duration_ms: u64,
}

/// Key of a raw partition object
pub fn partition_key(raw_prefix: &str, date: NaiveDate, name: &str) -> String {
    format!("{}/{}/{}", raw_prefix, date.format("%Y-%m-%d"), name)
}

pub struct TrainingPipeline {
    store: Arc<dyn ArtifactStore>,
    registry: Arc<ModelRegistry>,
    config: TrainingConfig,
    metrics: HazardMetrics,
    logger: StructuredLogger,
}

struct Trained {
    model: classifier::HazardModel,
    schema: dataset::Schema,
    report: Report,
    rows: usize,
    rows_missing_class: usize,
    train_rows: usize,
    test_rows: usize,
}

impl TrainingPipeline {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        registry: Arc<ModelRegistry>,
        config: TrainingConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            metrics: HazardMetrics::new(),
            logger: StructuredLogger::new("training"),
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train on every raw partition
    pub async fn train_all(&self) -> Result<TrainingOutcome> {
        let result = async {
            let prefix = format!("{}/", self.config.raw_prefix);
            let partitions = self.partitions_under(&prefix).await?;
            self.run(partitions).await
        }
        .await;
        self.finish(result)
    }

    /// Train on the partitions dated `start..=end`
    pub async fn train_range(&self, start: NaiveDate, end: NaiveDate) -> Result<TrainingOutcome> {
        let result = async {
            if start > end {
                return Err(HazardError::EmptyInput(format!(
                    "date range {} to {} contains no dates",
                    start, end
                )));
            }
            let mut partitions = Vec::new();
            let mut day = Some(start);
            while let Some(date) = day.filter(|d| *d <= end) {
                let prefix = format!("{}/{}/", self.config.raw_prefix, date.format("%Y-%m-%d"));
                partitions.extend(self.partitions_under(&prefix).await?);
                day = date.succ_opt();
            }
            partitions.sort();
            self.run(partitions).await
        }
        .await;
        self.finish(result)
    }

    fn finish(&self, result: Result<TrainingOutcome>) -> Result<TrainingOutcome> {
        if let Err(e) = &result {
            self.metrics.inc_training_failures();
            warn!(error = %e, kind = e.kind(), "Training run failed");
        }
        result
    }

    /// Partition keys under `prefix`, sorted
    async fn partitions_under(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .store
            .list(prefix)
            .await?
            .into_iter()
            .map(|o| o.key)
            .filter(|k| k.ends_with(PARTITION_SUFFIX))
            .collect();
        keys.sort();
        debug!(prefix = %prefix, partitions = keys.len(), "Listed raw partitions");
        Ok(keys)
    }

    async fn run(&self, partitions: Vec<String>) -> Result<TrainingOutcome> {
        if partitions.is_empty() {
            return Err(HazardError::EmptyInput(format!(
                "no raw partitions under '{}/'",
                self.config.raw_prefix
            )));
        }
        let start = Instant::now();

        // Staged on disk; removed when `staged` drops at the end of `fit`
        let staged = NamedTempFile::new()?;
        let stats = {
            let mut out = BufWriter::new(tokio::fs::File::from_std(staged.as_file().try_clone()?));
            dataset::consolidate(self.store.as_ref(), &partitions, &mut out).await?
        };
        debug!(path = %staged.path().display(), rows = stats.data_rows, "Staged corpus");

        let config = self.config.clone();
        let trained = tokio::task::spawn_blocking(move || fit(staged, &config))
            .await
            .map_err(|e| HazardError::Training(format!("training task failed: {}", e)))??;

        let version: VersionKey = self.registry.publish(&trained.model, &trained.schema).await?;
        let duration = start.elapsed();

        let recall = trained.report.hazardous().map(|m| m.recall).unwrap_or(0.0);
        self.metrics
            .record_training(duration.as_secs_f64(), stats.data_rows);
        self.metrics.set_evaluation(trained.report.auc, recall);
        self.logger
            .log_model_published(&version.to_string(), trained.train_rows);
        self.logger.log_training_completed(
            &version.to_string(),
            stats.partitions,
            trained.rows,
            trained.report.accuracy,
            recall,
            trained.report.auc,
            duration.as_millis() as u64,
        );

        Ok(TrainingOutcome {
            version: version.to_string(),
            report: trained.report,
            partitions: stats.partitions,
            rows: trained.rows,
            rows_missing_class: trained.rows_missing_class,
            train_rows: trained.train_rows,
            test_rows: trained.test_rows,
            duration_ms: duration.as_millis() as u64,
        })
    }
}

/// Bind, split, train and evaluate; CPU-bound
fn fit(staged: NamedTempFile, config: &TrainingConfig) -> Result<Trained> {
    let (data, bind_stats) = dataset::bind(staged.reopen()?, &config.bind_options())?;
    let split = dataset::stratified_split(&data, config.train_ratio, config.seed)?;
    info!(
        rows = data.len(),
        train = split.train.len(),
        test = split.test.len(),
        "Corpus split"
    );

    let model = classifier::train(
        &split.train,
        config.cost_fn,
        config.cost_fp,
        &config.forest_params(),
    )?;
    let report = evaluation::evaluate(&model, &split.train, &split.test)?;

    Ok(Trained {
        model,
        schema: data.schema().clone(),
        report,
        rows: data.len(),
        rows_missing_class: bind_stats.rows_missing_class,
        train_rows: split.train.len(),
        test_rows: split.test.len(),
    })
}
