//! End-to-end tests: raw partitions through training, publish, reload and predict

use chrono::NaiveDate;
use hazard_lib::dataset::{bind, stratified_split, BindOptions};
use hazard_lib::inference::{InferenceConfig, InferenceEngine};
use hazard_lib::pipeline::partition_key;
use hazard_lib::store::{ArtifactStore, FsStore, InMemoryStore, CONTENT_TYPE_CSV};
use hazard_lib::{
    columns, encode_partition, FeatureRequest, HazardError, ModelRegistry, NeoRecord,
    TrainingConfig, TrainingPipeline,
};
use std::sync::Arc;

/// 80 non-hazardous rows followed by 20 hazardous ones
fn scenario_records() -> Vec<NeoRecord> {
    (0..100)
        .map(|i| {
            let hazardous = i >= 80;
            NeoRecord {
                neo_id: format!("{}", 2_000_000 + i),
                name: format!("(2024 AB{})", i),
                absolute_magnitude: Some(if hazardous { 18.5 } else { 24.0 } + (i % 9) as f64 * 0.2),
                diameter_min_m: if i % 13 == 0 {
                    None
                } else {
                    Some(if hazardous { 350.0 } else { 40.0 } + (i % 17) as f64 * 3.0)
                },
                diameter_max_m: Some(if hazardous { 800.0 } else { 90.0 } + (i % 17) as f64 * 6.0),
                is_potentially_hazardous: hazardous,
                first_approach_date: Some("2024-Jan-05 10:00".to_string()),
                velocity_km_s: Some(8.0 + (i % 23) as f64 * 0.7),
                orbiting_body: Some("Earth".to_string()),
                created_at: "2024-01-05".to_string(),
            }
        })
        .collect()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Spread the scenario over three daily partitions
async fn seed(store: &dyn ArtifactStore) {
    let records = scenario_records();
    let chunks = [
        ("2024-01-05", &records[..40]),
        ("2024-01-06", &records[40..70]),
        ("2024-01-07", &records[70..]),
    ];
    for (day, chunk) in chunks {
        store
            .put(
                &partition_key("raw", date(day), "neo-feed.csv"),
                encode_partition(chunk).unwrap(),
                CONTENT_TYPE_CSV,
            )
            .await
            .unwrap();
    }
}

fn fast_config() -> TrainingConfig {
    TrainingConfig {
        num_trees: 20,
        ..Default::default()
    }
}

#[test]
fn test_scenario_split_counts() {
    let corpus = encode_partition(&scenario_records()).unwrap();
    let options = BindOptions {
        class_column: columns::HAZARDOUS.to_string(),
        excluded_columns: columns::NON_FEATURE.iter().map(|c| c.to_string()).collect(),
    };
    let (data, _) = bind(corpus.as_slice(), &options).unwrap();
    let split = stratified_split(&data, 0.7, 123).unwrap();

    let class = data.schema().binary_class().unwrap();
    let train = split.train.class_counts();
    let test = split.test.class_counts();
    assert_eq!(train[class.false_index], 56);
    assert_eq!(train[class.true_index], 14);
    assert_eq!(test[class.false_index], 24);
    assert_eq!(test[class.true_index], 6);

    // Reference membership for seed 123
    let expected_train: Vec<usize> = vec![
        44, 18, 0, 74, 79, 45, 17, 15, 51, 32, 7, 62, 46, 35, 23, 28, 29, 69, 58, 61, 5, 50, 20,
        60, 39, 26, 42, 76, 64, 71, 22, 38, 48, 12, 70, 66, 31, 68, 40, 24, 19, 43, 33, 2, 57,
        37, 30, 8, 77, 78, 6, 27, 65, 4, 73, 63, 94, 90, 97, 87, 86, 85, 99, 83, 92, 82, 93, 98,
        96, 89,
    ];
    let expected_test: Vec<usize> = vec![
        56, 14, 34, 21, 11, 55, 41, 10, 36, 16, 1, 3, 47, 53, 52, 59, 75, 54, 49, 25, 9, 13, 67,
        72, 81, 95, 80, 84, 91, 88,
    ];
    assert_eq!(split.train_indices, expected_train);
    assert_eq!(split.test_indices, expected_test);
}

#[tokio::test]
async fn test_train_publish_reload_predict() {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref()).await;
    let config = fast_config();
    let registry = Arc::new(ModelRegistry::new(store.clone(), config.registry_config()));
    let pipeline = TrainingPipeline::new(store.clone(), registry.clone(), config);
    let engine = InferenceEngine::new(registry.clone(), InferenceConfig::default());

    let request = FeatureRequest {
        absolute_magnitude: Some(18.9),
        diameter_min_m: Some(380.0),
        diameter_max_m: Some(850.0),
        velocity_km_s: Some(14.0),
    };
    assert!(matches!(
        engine.predict(&request),
        Err(HazardError::NotReady)
    ));

    let outcome = pipeline.train_all().await.unwrap();
    assert_eq!(outcome.partitions, 3);
    assert_eq!(outcome.rows, 100);
    assert_eq!(outcome.train_rows, 70);
    assert_eq!(outcome.test_rows, 30);
    assert_eq!(outcome.report.instances, 30);
    let hazardous = outcome.report.hazardous().unwrap();
    assert_eq!(hazardous.true_positives + hazardous.false_negatives, 6);
    assert!(outcome.report.auc.is_some());

    let version = engine.load_latest().await.unwrap();
    assert_eq!(version.to_string(), outcome.version);

    let result = engine.predict(&request).unwrap();
    assert!(result.hazardous);
    assert!(result.probability >= 0.8);
    assert_eq!(result.model_version, outcome.version);

    let benign = engine
        .predict(&FeatureRequest {
            absolute_magnitude: Some(25.0),
            diameter_min_m: Some(45.0),
            diameter_max_m: Some(100.0),
            velocity_km_s: Some(9.0),
        })
        .unwrap();
    assert!(!benign.hazardous);
}

#[tokio::test]
async fn test_own_schema_rows_never_fail() {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref()).await;
    let config = fast_config();
    let registry = Arc::new(ModelRegistry::new(store.clone(), config.registry_config()));
    TrainingPipeline::new(store.clone(), registry.clone(), config)
        .train_all()
        .await
        .unwrap();

    let engine = InferenceEngine::new(registry.clone(), InferenceConfig::default());
    engine.load_latest().await.unwrap();
    let loaded = engine.current().unwrap().unwrap();
    let names: Vec<String> = loaded
        .schema
        .features()
        .iter()
        .map(|a| a.name.clone())
        .collect();

    for record in scenario_records() {
        let request = record.features().request();
        let by_name: Vec<(&str, Option<f64>)> = request
            .named_values()
            .into_iter()
            .filter(|(name, _)| names.iter().any(|n| n.as_str() == *name))
            .collect();
        let result = engine.predict_named(by_name).unwrap();
        assert!((0.0..=1.0).contains(&result.probability));
    }
}

#[tokio::test]
async fn test_latest_of_three_publishes_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsStore::new(dir.path(), "neo-artifacts"));
    store.create_bucket("neo-artifacts").await.unwrap();
    seed(store.as_ref()).await;

    let config = fast_config();
    let registry = Arc::new(ModelRegistry::new(store.clone(), config.registry_config()));
    let pipeline = TrainingPipeline::new(store.clone(), registry.clone(), config);

    let mut versions = Vec::new();
    for _ in 0..3 {
        versions.push(pipeline.train_all().await.unwrap().version);
        // File modification times need to be distinguishable
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    let latest = registry.resolve_latest().await.unwrap();
    assert_eq!(latest.version.to_string(), versions[2]);

    let listed: Vec<String> = registry
        .list_versions()
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.version)
        .collect();
    let mut expected = versions.clone();
    expected.reverse();
    assert_eq!(listed, expected);
}

#[tokio::test]
async fn test_train_range_over_partitions() {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref()).await;
    let config = fast_config();
    let registry = Arc::new(ModelRegistry::new(store.clone(), config.registry_config()));
    let pipeline = TrainingPipeline::new(store.clone(), registry, config);

    // Only the last two days: rows 40..100, 40 false and 20 true
    let outcome = pipeline
        .train_range(date("2024-01-06"), date("2024-01-07"))
        .await
        .unwrap();
    assert_eq!(outcome.partitions, 2);
    assert_eq!(outcome.rows, 60);
    assert_eq!(outcome.train_rows, 28 + 14);
}
