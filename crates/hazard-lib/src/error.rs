//! Error taxonomy for the training and inference pipeline

use crate::store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HazardError>;

/// Errors surfaced by the pipeline. None of them is retried internally.
#[derive(Debug, Error)]
pub enum HazardError {
    /// No data to process
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// Structural mismatch between data, configuration and schema
    #[error("schema error: {0}")]
    Schema(String),

    /// Degenerate training set
    #[error("training error: {0}")]
    Training(String),

    /// Failed or partial artifact write
    #[error("persist error: {0}")]
    Persist(String),

    /// No model artifact has been published yet
    #[error("not found: {0}")]
    NotFound(String),

    /// Prediction requested before any successful load
    #[error("model not loaded; train and reload first")]
    NotReady,

    /// Schema/model inconsistency detected at prediction time
    #[error("inference error: {0}")]
    Inference(String),

    /// Model bytes do not match the checksum recorded beside them
    #[error("corrupt artifact {key}: {reason}")]
    CorruptArtifact { key: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HazardError {
    /// Stable machine-readable kind, used in API error bodies and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            HazardError::EmptyInput(_) => "empty_input",
            HazardError::Schema(_) => "schema",
            HazardError::Training(_) => "training",
            HazardError::Persist(_) => "persist",
            HazardError::NotFound(_) => "not_found",
            HazardError::NotReady => "not_ready",
            HazardError::Inference(_) => "inference",
            HazardError::CorruptArtifact { .. } => "corrupt_artifact",
            HazardError::Store(_) => "store",
            HazardError::Csv(_) => "csv",
            HazardError::Serialization(_) => "serialization",
            HazardError::Io(_) => "io",
        }
    }

    /// True when the error means "no model yet" rather than a hard failure
    pub fn is_not_ready(&self) -> bool {
        matches!(self, HazardError::NotFound(_) | HazardError::NotReady)
    }
}
