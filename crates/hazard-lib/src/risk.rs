//! Rule-based risk screening
//!
//! A fixed heuristic served beside the trained model. It never consults a
//! model version: an object is flagged when at least two of three thresholds
//! are crossed, and graded 0 to 100 from weighted components that are each
//! capped before summing.

use crate::models::columns;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Brighter than this (lower H) counts toward the flag
pub const BRIGHT_MAGNITUDE: f64 = 22.0;
/// Wider than this counts toward the flag
pub const LARGE_DIAMETER_M: f64 = 140.0;
/// Faster than this counts toward the flag
pub const FAST_VELOCITY_KM_S: f64 = 15.0;
/// Criteria needed to flag an object
pub const CRITERIA_REQUIRED: u8 = 2;

const MAGNITUDE_WEIGHT: f64 = 30.0;
const DIAMETER_WEIGHT: f64 = 40.0;
const VELOCITY_WEIGHT: f64 = 30.0;
/// Diameter at which the size component saturates
const DIAMETER_SCALE_M: f64 = 1000.0;
/// Velocity at which the speed component saturates
const VELOCITY_SCALE_KM_S: f64 = 30.0;

/// Inputs to the screening rule; non-finite values count as absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskInput {
    pub absolute_magnitude: Option<f64>,
    pub diameter_max_m: Option<f64>,
    pub velocity_km_s: Option<f64>,
}

/// Outcome of the screening rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub hazardous: bool,
    /// 0 to 100
    pub score: f64,
    pub criteria_met: u8,
    pub justification: String,
}

/// Apply the rule. Any absent input yields a zero score and no flag.
pub fn assess(input: &RiskInput) -> RiskAssessment {
    let finite = |v: Option<f64>| v.filter(|v| v.is_finite());
    let (magnitude, diameter, velocity) = match (
        finite(input.absolute_magnitude),
        finite(input.diameter_max_m),
        finite(input.velocity_km_s),
    ) {
        (Some(m), Some(d), Some(v)) => (m, d, v),
        _ => {
            let missing: Vec<&str> = [
                (columns::ABSOLUTE_MAGNITUDE, input.absolute_magnitude),
                (columns::DIAMETER_MAX_M, input.diameter_max_m),
                (columns::VELOCITY_KM_S, input.velocity_km_s),
            ]
            .into_iter()
            .filter(|(_, v)| finite(*v).is_none())
            .map(|(name, _)| name)
            .collect();
            return RiskAssessment {
                hazardous: false,
                score: 0.0,
                criteria_met: 0,
                justification: format!("Insufficient data: missing {}", missing.join(", ")),
            };
        }
    };

    let criteria_met = [
        magnitude < BRIGHT_MAGNITUDE,
        diameter > LARGE_DIAMETER_M,
        velocity > FAST_VELOCITY_KM_S,
    ]
    .iter()
    .filter(|&&met| met)
    .count() as u8;

    let magnitude_part = ((BRIGHT_MAGNITUDE - magnitude) / BRIGHT_MAGNITUDE).max(0.0) * MAGNITUDE_WEIGHT;
    let diameter_part = (diameter / DIAMETER_SCALE_M).min(1.0) * DIAMETER_WEIGHT;
    let velocity_part = (velocity / VELOCITY_SCALE_KM_S).min(1.0) * VELOCITY_WEIGHT;
    let score = (magnitude_part + diameter_part + velocity_part).clamp(0.0, 100.0);

    debug!(magnitude, diameter, velocity, score, criteria_met, "Risk screened");

    RiskAssessment {
        hazardous: criteria_met >= CRITERIA_REQUIRED,
        score,
        criteria_met,
        justification: format!(
            "Based on magnitude={:.2}, diameter={:.2} m, velocity={:.2} km/s. Risk score: {:.1}%",
            magnitude, diameter, velocity, score
        ),
    }
}
