//! Versioned model artifacts
//!
//! A published version is a pair of objects sharing one key prefix:
//! `<namespace>/<algorithm>-<epoch-millis>.header` holding the schema and
//! metadata, and `<namespace>/<algorithm>-<epoch-millis>.model` holding the
//! serialized classifier. The header is written first and the model last, so
//! a `.model` key is only ever visible once its header is in place; a publish
//! that fails midway leaves no listable version behind.

use crate::classifier::{CostMatrix, HazardModel};
use crate::dataset::Schema;
use crate::error::{HazardError, Result};
use crate::store::{ArtifactStore, ObjectInfo, StoreError, CONTENT_TYPE_JSON, CONTENT_TYPE_OCTET};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const MODEL_SUFFIX: &str = ".model";
const HEADER_SUFFIX: &str = ".header";
/// Upper bound on millis skipped while looking for a free version key
const MAX_KEY_ATTEMPTS: usize = 1000;

/// Naming of published artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub namespace: String,
    pub algorithm_tag: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            namespace: "models".to_string(),
            algorithm_tag: "rf-csc".to_string(),
        }
    }
}

/// Identifies one published (model, header) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionKey {
    pub namespace: String,
    pub algorithm_tag: String,
    pub timestamp_ms: i64,
}

impl VersionKey {
    /// Shared key prefix, e.g. `models/rf-csc-1700000000000`
    pub fn prefix(&self) -> String {
        format!(
            "{}/{}-{}",
            self.namespace, self.algorithm_tag, self.timestamp_ms
        )
    }

    pub fn model_key(&self) -> String {
        format!("{}{}", self.prefix(), MODEL_SUFFIX)
    }

    pub fn header_key(&self) -> String {
        format!("{}{}", self.prefix(), HEADER_SUFFIX)
    }

    /// Parse a `.model` key; anything else under the namespace is ignored
    pub fn from_model_key(key: &str) -> Option<Self> {
        let stem = key.strip_suffix(MODEL_SUFFIX)?;
        let (namespace, name) = stem.rsplit_once('/')?;
        let (tag, millis) = name.rsplit_once('-')?;
        if tag.is_empty() || millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            namespace: namespace.to_string(),
            algorithm_tag: tag.to_string(),
            timestamp_ms: millis.parse().ok()?,
        })
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix())
    }
}

/// Metadata written beside every model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHeader {
    pub version: String,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
    /// Hex SHA-256 of the model object's bytes
    pub model_sha256: String,
    pub model_bytes: u64,
    pub schema: Schema,
    pub cost_matrix: CostMatrix,
}

/// A resolved, verified version
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub version: VersionKey,
    pub header: ModelHeader,
    pub model: HazardModel,
}

impl LoadedArtifact {
    pub fn schema(&self) -> &Schema {
        &self.header.schema
    }
}

/// Listing entry for a published version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersionInfo {
    pub version: String,
    pub model_key: String,
    pub header_key: String,
    pub last_modified: DateTime<Utc>,
    pub size_bytes: u64,
    pub created_at: Option<DateTime<Utc>>,
}

/// Publishes and resolves model versions in an artifact store
pub struct ModelRegistry {
    store: Arc<dyn ArtifactStore>,
    config: RegistryConfig,
    last_timestamp_ms: AtomicI64,
}

impl ModelRegistry {
    pub fn new(store: Arc<dyn ArtifactStore>, config: RegistryConfig) -> Self {
        Self {
            store,
            config,
            last_timestamp_ms: AtomicI64::new(0),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Current epoch millis, bumped past the last one this registry issued
    fn next_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_timestamp_ms.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self.last_timestamp_ms.compare_exchange(
                last,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// Claim a version whose header and model keys are both unused.
    ///
    /// Other registries may share the store, so the local counter alone does
    /// not guarantee a fresh key.
    async fn claim_version(&self) -> Result<VersionKey> {
        for _ in 0..MAX_KEY_ATTEMPTS {
            let version = VersionKey {
                namespace: self.config.namespace.clone(),
                algorithm_tag: self.config.algorithm_tag.clone(),
                timestamp_ms: self.next_timestamp(),
            };
            if !self.store.head(&version.header_key()).await?
                && !self.store.head(&version.model_key()).await?
            {
                return Ok(version);
            }
            debug!(version = %version, "Version key taken, bumping");
        }
        Err(HazardError::Persist(format!(
            "no free version key under '{}/' after {} attempts",
            self.config.namespace, MAX_KEY_ATTEMPTS
        )))
    }

    /// Persist `model` and the schema it was trained against.
    ///
    /// `schema` must be the model's training schema, attribute for attribute.
    /// Both objects are written before this returns; any write failure is a
    /// `Persist` error and the previous latest version stays the latest.
    pub async fn publish(&self, model: &HazardModel, schema: &Schema) -> Result<VersionKey> {
        if model.base().schema() != schema {
            return Err(HazardError::Schema(format!(
                "model was trained on [{}] but publish was given [{}]",
                describe(model.base().schema()),
                describe(schema)
            )));
        }

        let model_bytes = serde_json::to_vec(model)?;
        let checksum = hex::encode(Sha256::digest(&model_bytes));
        let version = self.claim_version().await?;
        let header = ModelHeader {
            version: version.to_string(),
            algorithm: self.config.algorithm_tag.clone(),
            created_at: Utc::now(),
            model_sha256: checksum.clone(),
            model_bytes: model_bytes.len() as u64,
            schema: schema.clone(),
            cost_matrix: model.cost_matrix().clone(),
        };
        let header_bytes = serde_json::to_vec_pretty(&header)?;

        let header_key = version.header_key();
        self.store
            .put(&header_key, header_bytes, CONTENT_TYPE_JSON)
            .await
            .map_err(|e| persist_error(&header_key, e))?;

        let model_key = version.model_key();
        let size = model_bytes.len();
        self.store
            .put(&model_key, model_bytes, CONTENT_TYPE_OCTET)
            .await
            .map_err(|e| persist_error(&model_key, e))?;

        info!(
            version = %version,
            model_bytes = size,
            sha256 = %checksum,
            "Published model version"
        );
        Ok(version)
    }

    /// Model keys under the namespace with their listing metadata
    async fn model_objects(&self) -> Result<Vec<(VersionKey, ObjectInfo)>> {
        let prefix = format!("{}/", self.config.namespace);
        let objects = self.store.list(&prefix).await?;
        Ok(objects
            .into_iter()
            .filter_map(|o| VersionKey::from_model_key(&o.key).map(|v| (v, o)))
            .collect())
    }

    /// Load the most recently modified version.
    ///
    /// Ties on modification time go to the greater key. The model bytes are
    /// checked against the header's checksum before deserializing.
    pub async fn resolve_latest(&self) -> Result<LoadedArtifact> {
        let latest = self
            .model_objects()
            .await?
            .into_iter()
            .max_by(|a, b| {
                (a.1.last_modified, &a.1.key).cmp(&(b.1.last_modified, &b.1.key))
            })
            .ok_or_else(|| {
                HazardError::NotFound(format!(
                    "no model artifacts under '{}/'",
                    self.config.namespace
                ))
            })?;
        let (version, object) = latest;
        debug!(version = %version, last_modified = %object.last_modified, "Resolved latest model");
        self.load(version).await
    }

    /// Load and verify a specific version
    pub async fn load(&self, version: VersionKey) -> Result<LoadedArtifact> {
        let header_key = version.header_key();
        let header_bytes = match self.store.get(&header_key).await {
            Ok(bytes) => bytes,
            Err(StoreError::NoSuchKey(_)) => {
                return Err(HazardError::CorruptArtifact {
                    key: header_key,
                    reason: "header missing for published model".to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let header: ModelHeader =
            serde_json::from_slice(&header_bytes).map_err(|e| HazardError::CorruptArtifact {
                key: header_key.clone(),
                reason: e.to_string(),
            })?;

        let model_key = version.model_key();
        let model_bytes = self.store.get(&model_key).await?;
        let checksum = hex::encode(Sha256::digest(&model_bytes));
        if checksum != header.model_sha256 {
            warn!(
                key = %model_key,
                expected = %header.model_sha256,
                actual = %checksum,
                "Model checksum mismatch"
            );
            return Err(HazardError::CorruptArtifact {
                key: model_key,
                reason: format!(
                    "checksum mismatch: expected {}, got {}",
                    header.model_sha256, checksum
                ),
            });
        }
        let model: HazardModel =
            serde_json::from_slice(&model_bytes).map_err(|e| HazardError::CorruptArtifact {
                key: model_key.clone(),
                reason: e.to_string(),
            })?;
        if model.base().schema() != &header.schema {
            return Err(HazardError::CorruptArtifact {
                key: model_key,
                reason: format!(
                    "header schema [{}] does not match model schema [{}]",
                    describe(&header.schema),
                    describe(model.base().schema())
                ),
            });
        }

        Ok(LoadedArtifact {
            version,
            header,
            model,
        })
    }

    /// Published versions, newest first
    pub async fn list_versions(&self) -> Result<Vec<ModelVersionInfo>> {
        let mut objects = self.model_objects().await?;
        objects.sort_by(|a, b| {
            (b.1.last_modified, &b.1.key).cmp(&(a.1.last_modified, &a.1.key))
        });
        Ok(objects
            .into_iter()
            .map(|(version, object)| ModelVersionInfo {
                version: version.to_string(),
                model_key: object.key,
                header_key: version.header_key(),
                last_modified: object.last_modified,
                size_bytes: object.size,
                created_at: Utc.timestamp_millis_opt(version.timestamp_ms).single(),
            })
            .collect())
    }
}

/// Feature names then the class attribute, for error messages
pub(crate) fn describe(schema: &Schema) -> String {
    let mut names: Vec<&str> = schema.features().iter().map(|a| a.name.as_str()).collect();
    names.push(&schema.class().name);
    names.join(", ")
}

fn persist_error(key: &str, e: StoreError) -> HazardError {
    HazardError::Persist(format!("failed to write {}: {}", key, e))
}
