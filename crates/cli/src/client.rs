//! API client for the NEO hazard service

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// API client for the hazard service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        // Training on a large corpus takes a while
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        parse(response).await
    }

    /// Make a GET request with query parameters
    pub async fn get_query<T: DeserializeOwned, Q: Serialize>(&self, path: &str, query: &Q) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .context("Failed to send request")?;

        parse(response).await
    }

    /// GET that also accepts 503, for health and readiness probes
    pub async fn get_probe<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return response.json().await.context("Failed to parse response");
        }
        parse(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        parse(response).await
    }

    /// Make a POST request without a body
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send request")?;

        parse(response).await
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => anyhow::bail!("API error ({}): {}: {}", status, err.error, err.message),
            Err(_) => anyhow::bail!("API error ({}): {}", status, body),
        }
    }

    response.json().await.context("Failed to parse response")
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainRangeRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: String,
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub instances: u64,
    pub correct: u64,
    pub accuracy: f64,
    pub kappa: f64,
    pub total_cost: f64,
    pub average_cost: f64,
    pub baseline_accuracy: f64,
    pub per_class: Vec<ClassMetrics>,
    pub auc: Option<f64>,
}

impl Report {
    pub fn hazardous(&self) -> Option<&ClassMetrics> {
        self.per_class.iter().find(|m| m.class == "true")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainResponse {
    pub version: String,
    pub report: Report,
    pub partitions: usize,
    pub rows: usize,
    pub rows_missing_class: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub duration_ms: u64,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute_magnitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diameter_min_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diameter_max_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity_km_s: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub hazardous: bool,
    pub probability: f64,
    pub threshold: f64,
    pub cost_sensitive_hazardous: bool,
    pub model_version: String,
}

/// Query of `GET /ml/risk`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute_magnitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diameter_max_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity_km_s: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub hazardous: bool,
    pub score: f64,
    pub criteria_met: u8,
    pub justification: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    pub version: String,
    pub model_key: String,
    pub header_key: String,
    pub last_modified: DateTime<Utc>,
    pub size_bytes: u64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
