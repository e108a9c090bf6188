//! Service configuration

use anyhow::{bail, Result};
use hazard_lib::{InferenceConfig, TrainingConfig};
use serde::Deserialize;

/// Service configuration, read from an optional file named by `HAZARD_CONFIG`
/// and `HAZARD_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Port of the HTTP API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory holding artifact buckets
    #[serde(default = "default_store_root")]
    pub store_root: String,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Decision threshold on the hazardous-class probability
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(default = "default_cost_fn")]
    pub cost_fn: f64,

    #[serde(default = "default_cost_fp")]
    pub cost_fp: f64,

    #[serde(default = "default_class_column")]
    pub class_column: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_raw_prefix")]
    pub raw_prefix: String,
}

fn default_api_port() -> u16 {
    8080
}

fn default_store_root() -> String {
    "/var/lib/neo-hazard".to_string()
}

fn default_bucket() -> String {
    "neo-artifacts".to_string()
}

fn default_threshold() -> f64 {
    hazard_lib::inference::DEFAULT_THRESHOLD
}

fn default_cost_fn() -> f64 {
    TrainingConfig::default().cost_fn
}

fn default_cost_fp() -> f64 {
    TrainingConfig::default().cost_fp
}

fn default_class_column() -> String {
    TrainingConfig::default().class_column
}

fn default_namespace() -> String {
    TrainingConfig::default().namespace
}

fn default_raw_prefix() -> String {
    TrainingConfig::default().raw_prefix
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            store_root: default_store_root(),
            bucket: default_bucket(),
            threshold: default_threshold(),
            cost_fn: default_cost_fn(),
            cost_fp: default_cost_fp(),
            class_column: default_class_column(),
            namespace: default_namespace(),
            raw_prefix: default_raw_prefix(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the optional file and the environment
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var("HAZARD_CONFIG") {
            builder = builder.add_source(config::File::with_name(&path));
        }
        let config = builder
            .add_source(config::Environment::with_prefix("HAZARD"))
            .build()?;

        let service: ServiceConfig = config.try_deserialize()?;
        service.validate()?;
        Ok(service)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            bail!("threshold {} outside [0, 1]", self.threshold);
        }
        if self.cost_fn < 0.0 || self.cost_fp < 0.0 {
            bail!(
                "costs must be non-negative (fn={}, fp={})",
                self.cost_fn,
                self.cost_fp
            );
        }
        Ok(())
    }

    /// Train ratio, seed and tree count stay at their fixed defaults
    pub fn training(&self) -> TrainingConfig {
        TrainingConfig {
            class_column: self.class_column.clone(),
            cost_fn: self.cost_fn,
            cost_fp: self.cost_fp,
            namespace: self.namespace.clone(),
            raw_prefix: self.raw_prefix.clone(),
            ..Default::default()
        }
    }

    pub fn inference(&self) -> InferenceConfig {
        InferenceConfig {
            threshold: self.threshold,
        }
    }
}
