//! Single-object hazard prediction and rule-based risk screening

use anyhow::Result;

use crate::client::{ApiClient, FeatureRequest, PredictionResult, RiskAssessment, RiskQuery};
use crate::output::{color_decision, color_probability, print_json, print_warning, OutputFormat};

pub async fn predict(client: &ApiClient, request: FeatureRequest, format: OutputFormat) -> Result<()> {
    let result: PredictionResult = client.post("ml/predict", &request).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            println!(
                "{}  p={} (threshold {:.2})",
                color_decision(result.hazardous),
                color_probability(result.probability, result.threshold),
                result.threshold
            );
            if result.cost_sensitive_hazardous != result.hazardous {
                print_warning(&format!(
                    "Minimum-expected-cost decision differs: {}",
                    color_decision(result.cost_sensitive_hazardous)
                ));
            }
            println!("Model: {}", result.model_version);
        }
    }

    Ok(())
}

/// Rule-based 0-100 risk score; works without a trained model
pub async fn risk(client: &ApiClient, query: RiskQuery, format: OutputFormat) -> Result<()> {
    let result: RiskAssessment = client.get_query("ml/risk", &query).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            println!(
                "{}  score={:.1} ({} of 3 criteria)",
                color_decision(result.hazardous),
                result.score,
                result.criteria_met
            );
            println!("{}", result.justification);
        }
    }

    Ok(())
}
