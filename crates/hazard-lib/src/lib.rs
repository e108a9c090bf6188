//! Hazard-classification library for near-earth objects
//!
//! This crate provides the core functionality for:
//! - Consolidating raw partitions and binding them to a schema
//! - Stratified splitting and cost-sensitive random-forest training
//! - Evaluation reports
//! - Versioned model artifacts in a blob store
//! - Real-time inference with atomic model swaps
//! - Rule-based risk screening
//! - Health checks and observability

pub mod classifier;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod health;
pub mod inference;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod registry;
pub mod risk;
pub mod store;

pub use error::{HazardError, Result};
pub use evaluation::Report;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use inference::{InferenceConfig, InferenceEngine};
pub use models::*;
pub use observability::{HazardMetrics, StructuredLogger};
pub use pipeline::{TrainingConfig, TrainingOutcome, TrainingPipeline};
pub use registry::{ModelRegistry, ModelVersionInfo, RegistryConfig, VersionKey};
pub use risk::{RiskAssessment, RiskInput};
pub use store::{ArtifactStore, FsStore, InMemoryStore};
