//! Schema binding
//!
//! Resolves the configured class column of a consolidated corpus, types the
//! remaining columns, and produces the ordered attribute definition shared by
//! training and inference. The feature-to-slot lookup table is built once here
//! and rebuilt whenever a persisted schema is deserialized.

use crate::error::{HazardError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, warn};

pub const TRUE_LABEL: &str = "true";
pub const FALSE_LABEL: &str = "false";

/// Cell contents treated as missing
const MISSING_TOKENS: &[&str] = &["", "?"];

/// Type of a feature attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AttributeKind {
    Numeric,
    /// Categorical, values in first-encounter order; encoded by value index
    Nominal { values: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Numeric,
        }
    }

    pub fn nominal(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Nominal { values },
        }
    }

    pub fn is_nominal(&self) -> bool {
        matches!(self.kind, AttributeKind::Nominal { .. })
    }
}

/// The nominal class attribute; legal values in first-encounter order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassAttribute {
    pub name: String,
    pub values: Vec<String>,
}

impl ClassAttribute {
    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.values.iter().position(|v| v == value)
    }
}

/// Positions of the two binary labels, always looked up by value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryClass {
    pub true_index: usize,
    pub false_index: usize,
}

#[derive(Serialize, Deserialize)]
struct SchemaDef {
    features: Vec<Attribute>,
    class: ClassAttribute,
}

/// Ordered features plus the class attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SchemaDef", into = "SchemaDef")]
pub struct Schema {
    features: Vec<Attribute>,
    class: ClassAttribute,
    slots: HashMap<String, usize>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.features == other.features && self.class == other.class
    }
}

impl TryFrom<SchemaDef> for Schema {
    type Error = HazardError;

    fn try_from(def: SchemaDef) -> Result<Self> {
        Schema::new(def.features, def.class)
    }
}

impl From<Schema> for SchemaDef {
    fn from(schema: Schema) -> Self {
        SchemaDef {
            features: schema.features,
            class: schema.class,
        }
    }
}

impl Schema {
    /// Build a schema, rejecting duplicate names
    pub fn new(features: Vec<Attribute>, class: ClassAttribute) -> Result<Self> {
        let mut slots = HashMap::with_capacity(features.len());
        for (slot, attribute) in features.iter().enumerate() {
            if attribute.name == class.name || slots.insert(attribute.name.clone(), slot).is_some() {
                return Err(HazardError::Schema(format!(
                    "duplicate attribute name '{}'",
                    attribute.name
                )));
            }
        }
        Ok(Self {
            features,
            class,
            slots,
        })
    }

    pub fn features(&self) -> &[Attribute] {
        &self.features
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    pub fn class(&self) -> &ClassAttribute {
        &self.class
    }

    pub fn num_classes(&self) -> usize {
        self.class.values.len()
    }

    /// Slot of a feature in the vector layout
    pub fn feature_slot(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    /// Require exactly two class values, literally `"true"` and `"false"`
    pub fn binary_class(&self) -> Result<BinaryClass> {
        let true_index = self.class.index_of(TRUE_LABEL);
        let false_index = self.class.index_of(FALSE_LABEL);
        match (true_index, false_index) {
            (Some(true_index), Some(false_index)) if self.class.values.len() == 2 => {
                Ok(BinaryClass {
                    true_index,
                    false_index,
                })
            }
            _ => Err(HazardError::Schema(format!(
                "class must be binary with labels true/false, found {:?}",
                self.class.values
            ))),
        }
    }

    /// Build a feature vector from named values.
    ///
    /// Names absent from the schema are ignored; schema features absent from
    /// the input stay missing. Numeric input for a nominal slot is treated as
    /// missing.
    pub fn build_vector<'a>(
        &self,
        named: impl IntoIterator<Item = (&'a str, Option<f64>)>,
    ) -> Vec<Option<f64>> {
        let mut vector = vec![None; self.features.len()];
        for (name, value) in named {
            let Some(slot) = self.feature_slot(name) else {
                debug!(feature = %name, "Ignoring feature absent from schema");
                continue;
            };
            if self.features[slot].is_nominal() {
                continue;
            }
            vector[slot] = value.filter(|v| v.is_finite());
        }
        vector
    }
}

/// One row of a bound corpus
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// Feature values in schema order; nominal values are value indices
    pub values: Vec<Option<f64>>,
    /// Index into the class attribute's values
    pub class: usize,
}

/// Schema-bound corpus
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    schema: Schema,
    instances: Vec<Instance>,
}

impl Dataset {
    pub fn new(schema: Schema, instances: Vec<Instance>) -> Self {
        Self { schema, instances }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Row counts per class value index
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.schema.num_classes()];
        for instance in &self.instances {
            counts[instance.class] += 1;
        }
        counts
    }

    /// Copy of the rows at `indices`, in the given order
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            schema: self.schema.clone(),
            instances: indices.iter().map(|&i| self.instances[i].clone()).collect(),
        }
    }
}

/// Options for binding a corpus
#[derive(Debug, Clone)]
pub struct BindOptions {
    pub class_column: String,
    /// Columns dropped entirely (neither feature nor class)
    pub excluded_columns: Vec<String>,
}

/// Bookkeeping from a bind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindStats {
    pub rows_read: usize,
    pub rows_missing_class: usize,
}

fn is_missing(cell: &str) -> bool {
    MISSING_TOKENS.contains(&cell)
}

/// Bind a delimited-text corpus with a header row to a schema
pub fn bind<R: Read>(corpus: R, options: &BindOptions) -> Result<(Dataset, BindStats)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(corpus);

    let headers = reader.headers()?.clone();
    let class_position = headers
        .iter()
        .position(|h| h == options.class_column)
        .ok_or_else(|| {
            HazardError::Schema(format!(
                "class column '{}' not found in header",
                options.class_column
            ))
        })?;

    let feature_positions: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(i, name)| {
            *i != class_position && !options.excluded_columns.iter().any(|c| c == name)
        })
        .map(|(i, _)| i)
        .collect();

    let mut records = Vec::new();
    for record in reader.records() {
        records.push(record?);
    }
    if records.is_empty() {
        return Err(HazardError::Schema("corpus is empty".to_string()));
    }

    let cell = |record: &csv::StringRecord, position: usize| -> Option<String> {
        record
            .get(position)
            .filter(|c| !is_missing(c))
            .map(str::to_string)
    };

    // Type each feature column
    let mut features = Vec::with_capacity(feature_positions.len());
    for &position in &feature_positions {
        let name = headers.get(position).unwrap_or_default().to_string();
        let cells: Vec<String> = records.iter().filter_map(|r| cell(r, position)).collect();
        if cells.iter().all(|c| c.parse::<f64>().is_ok()) {
            features.push(Attribute::numeric(name));
        } else {
            let mut values: Vec<String> = Vec::new();
            for c in cells {
                if !values.contains(&c) {
                    values.push(c);
                }
            }
            features.push(Attribute::nominal(name, values));
        }
    }

    let mut class_values: Vec<String> = Vec::new();
    for record in &records {
        if let Some(value) = cell(record, class_position) {
            if !class_values.contains(&value) {
                class_values.push(value);
            }
        }
    }

    let schema = Schema::new(
        features,
        ClassAttribute {
            name: options.class_column.clone(),
            values: class_values,
        },
    )?;

    let mut stats = BindStats {
        rows_read: records.len(),
        rows_missing_class: 0,
    };
    let mut instances = Vec::with_capacity(records.len());
    for record in &records {
        let Some(class) = cell(record, class_position).and_then(|v| schema.class.index_of(&v))
        else {
            stats.rows_missing_class += 1;
            continue;
        };
        let values = feature_positions
            .iter()
            .zip(schema.features())
            .map(|(&position, attribute)| {
                let raw = cell(record, position)?;
                match &attribute.kind {
                    AttributeKind::Numeric => raw.parse::<f64>().ok().filter(|v| v.is_finite()),
                    AttributeKind::Nominal { values } => {
                        values.iter().position(|v| *v == raw).map(|i| i as f64)
                    }
                }
            })
            .collect();
        instances.push(Instance { values, class });
    }

    if stats.rows_missing_class > 0 {
        warn!(
            skipped = stats.rows_missing_class,
            "Skipped rows with a missing class value"
        );
    }
    if instances.is_empty() {
        return Err(HazardError::Schema(
            "corpus has no rows with a class value".to_string(),
        ));
    }

    debug!(
        rows = instances.len(),
        features = schema.num_features(),
        class = %schema.class.name,
        class_values = ?schema.class.values,
        "Bound corpus to schema"
    );

    Ok((Dataset::new(schema, instances), stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::columns;

    fn options() -> BindOptions {
        BindOptions {
            class_column: columns::HAZARDOUS.to_string(),
            excluded_columns: vec![columns::NEO_ID.to_string()],
        }
    }

    const CORPUS: &str = "neo_id,absolute_magnitude,is_potentially_hazardous,orbiting_body\n\
                          1,20.5,true,Earth\n\
                          2,,false,Mars\n\
                          3,25.1,false,Earth\n";

    #[test]
    fn test_bind_types_and_order() {
        let (data, stats) = bind(CORPUS.as_bytes(), &options()).unwrap();
        let schema = data.schema();

        assert_eq!(stats.rows_read, 3);
        assert_eq!(schema.num_features(), 2);
        assert_eq!(schema.features()[0], Attribute::numeric("absolute_magnitude"));
        assert_eq!(
            schema.features()[1],
            Attribute::nominal("orbiting_body", vec!["Earth".into(), "Mars".into()])
        );
        // Encounter order, not alphabetical
        assert_eq!(schema.class().values, vec!["true", "false"]);
        assert_eq!(data.instances()[1].values, vec![None, Some(1.0)]);
        assert_eq!(data.class_counts(), vec![1, 2]);
    }

    #[test]
    fn test_binary_class_lookup_by_value() {
        let (data, _) = bind(CORPUS.as_bytes(), &options()).unwrap();
        let binary = data.schema().binary_class().unwrap();
        assert_eq!(binary.true_index, 0);
        assert_eq!(binary.false_index, 1);
    }

    #[test]
    fn test_missing_class_column() {
        let opts = BindOptions {
            class_column: "hazard".to_string(),
            excluded_columns: vec![],
        };
        let err = bind(CORPUS.as_bytes(), &opts).unwrap_err();
        assert!(matches!(err, HazardError::Schema(_)));
    }

    #[test]
    fn test_empty_corpus() {
        let err = bind(&b"a,is_potentially_hazardous\n"[..], &options()).unwrap_err();
        assert!(matches!(err, HazardError::Schema(_)));
    }

    #[test]
    fn test_non_binary_class_rejected() {
        let corpus = "x,is_potentially_hazardous\n1,yes\n2,no\n";
        let (data, _) = bind(corpus.as_bytes(), &options()).unwrap();
        let err = data.schema().binary_class().unwrap_err();
        assert!(err.to_string().contains("true/false"));
    }

    #[test]
    fn test_rows_without_class_are_skipped() {
        let corpus = "x,is_potentially_hazardous\n1,true\n2,\n3,false\n";
        let (data, stats) = bind(corpus.as_bytes(), &options()).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(stats.rows_missing_class, 1);
    }

    #[test]
    fn test_build_vector_ignores_unknown_and_marks_missing() {
        let (data, _) = bind(CORPUS.as_bytes(), &options()).unwrap();
        let vector = data.schema().build_vector([
            ("absolute_magnitude", Some(21.0)),
            ("velocity_km_s", Some(9.0)),
        ]);
        assert_eq!(vector, vec![Some(21.0), None]);
    }

    #[test]
    fn test_schema_serde_rebuilds_slots() {
        let (data, _) = bind(CORPUS.as_bytes(), &options()).unwrap();
        let json = serde_json::to_string(data.schema()).unwrap();
        let restored: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(&restored, data.schema());
        assert_eq!(restored.feature_slot("orbiting_body"), Some(1));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Schema::new(
            vec![Attribute::numeric("a"), Attribute::numeric("a")],
            ClassAttribute {
                name: "c".into(),
                values: vec![],
            },
        )
        .unwrap_err();
        assert!(matches!(err, HazardError::Schema(_)));
    }
}
