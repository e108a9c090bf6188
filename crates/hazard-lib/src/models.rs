//! Core data models for the hazard pipeline

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Column names of the raw partition extracts
pub mod columns {
    pub const NEO_ID: &str = "neo_id";
    pub const NAME: &str = "name";
    pub const ABSOLUTE_MAGNITUDE: &str = "absolute_magnitude";
    pub const DIAMETER_MIN_M: &str = "diameter_min_m";
    pub const DIAMETER_MAX_M: &str = "diameter_max_m";
    pub const HAZARDOUS: &str = "is_potentially_hazardous";
    pub const FIRST_APPROACH_DATE: &str = "first_approach_date";
    pub const VELOCITY_KM_S: &str = "velocity_km_s";
    pub const ORBITING_BODY: &str = "orbiting_body";
    pub const CREATED_AT: &str = "created_at";

    /// Columns that identify or describe an object without predicting hazard
    pub const NON_FEATURE: &[&str] = &[NEO_ID, NAME, FIRST_APPROACH_DATE, ORBITING_BODY, CREATED_AT];
}

/// One observed object as it appears in a raw partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeoRecord {
    pub neo_id: String,
    pub name: String,
    pub absolute_magnitude: Option<f64>,
    pub diameter_min_m: Option<f64>,
    pub diameter_max_m: Option<f64>,
    pub is_potentially_hazardous: bool,
    pub first_approach_date: Option<String>,
    pub velocity_km_s: Option<f64>,
    pub orbiting_body: Option<String>,
    pub created_at: String,
}

impl NeoRecord {
    /// Project onto the four model features plus the label
    pub fn features(&self) -> FeatureRecord {
        FeatureRecord {
            absolute_magnitude: self.absolute_magnitude,
            diameter_min_m: self.diameter_min_m,
            diameter_max_m: self.diameter_max_m,
            velocity_km_s: self.velocity_km_s,
            hazardous: self.is_potentially_hazardous,
        }
    }
}

/// Encode records as one delimited-text partition with a header row
pub fn encode_partition(records: &[NeoRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .into_inner()
        .map_err(|e| crate::error::HazardError::Io(e.into_error()))
}

/// Labeled feature record; missing measurements stay `None`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub absolute_magnitude: Option<f64>,
    pub diameter_min_m: Option<f64>,
    pub diameter_max_m: Option<f64>,
    pub velocity_km_s: Option<f64>,
    pub hazardous: bool,
}

impl FeatureRecord {
    pub fn request(&self) -> FeatureRequest {
        FeatureRequest {
            absolute_magnitude: self.absolute_magnitude,
            diameter_min_m: self.diameter_min_m,
            diameter_max_m: self.diameter_max_m,
            velocity_km_s: self.velocity_km_s,
        }
    }
}

/// Prediction request: the four optional features
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRequest {
    #[serde(default)]
    pub absolute_magnitude: Option<f64>,
    #[serde(default)]
    pub diameter_min_m: Option<f64>,
    #[serde(default)]
    pub diameter_max_m: Option<f64>,
    #[serde(default)]
    pub velocity_km_s: Option<f64>,
}

impl FeatureRequest {
    /// Feature values keyed by their column names
    pub fn named_values(&self) -> [(&'static str, Option<f64>); 4] {
        [
            (columns::ABSOLUTE_MAGNITUDE, self.absolute_magnitude),
            (columns::DIAMETER_MIN_M, self.diameter_min_m),
            (columns::DIAMETER_MAX_M, self.diameter_max_m),
            (columns::VELOCITY_KM_S, self.velocity_km_s),
        ]
    }
}

/// Prediction outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// `probability >= threshold`
    pub hazardous: bool,
    /// Ensemble probability of the hazardous class
    pub probability: f64,
    pub threshold: f64,
    /// Minimum-expected-cost decision of the cost-sensitive wrapper
    pub cost_sensitive_hazardous: bool,
    pub model_version: String,
}
