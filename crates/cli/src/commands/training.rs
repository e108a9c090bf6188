//! Training and reload commands

use anyhow::Result;
use chrono::NaiveDate;
use tabled::Tabled;

use crate::client::{ApiClient, ReloadResponse, TrainRangeRequest, TrainResponse};
use crate::output::{format_auc, format_percent, print_info, print_json, print_success, OutputFormat};

/// Row for the per-class metrics table
#[derive(Tabled)]
struct ClassRow {
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "TP")]
    true_positives: u64,
    #[tabled(rename = "FP")]
    false_positives: u64,
    #[tabled(rename = "FN")]
    false_negatives: u64,
    #[tabled(rename = "Precision")]
    precision: String,
    #[tabled(rename = "Recall")]
    recall: String,
    #[tabled(rename = "F1")]
    f1: String,
}

/// Key/value row for the run summary
#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

/// Train on every raw partition
pub async fn train_all(client: &ApiClient, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Table {
        print_info("Training on all partitions...");
    }
    let response: TrainResponse = client.post_empty("ml/train/all").await?;
    render(&response, format)
}

/// Train on the partitions of an inclusive date range
pub async fn train_range(
    client: &ApiClient,
    start: NaiveDate,
    end: NaiveDate,
    format: OutputFormat,
) -> Result<()> {
    if start > end {
        anyhow::bail!("--start {} is after --end {}", start, end);
    }
    if format == OutputFormat::Table {
        print_info(&format!("Training on partitions {} to {}...", start, end));
    }
    let response: TrainResponse = client
        .post("ml/train", &TrainRangeRequest { start, end })
        .await?;
    render(&response, format)
}

/// Ask the service to serve the latest published model
pub async fn reload(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response: ReloadResponse = client.post_empty("ml/reload").await?;
    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_success(&format!("Now serving {}", response.version)),
    }
    Ok(())
}

fn render(response: &TrainResponse, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(response);
    }

    print_success(&format!("Published {}", response.version));

    let report = &response.report;
    let recall = report
        .hazardous()
        .map(|m| format_percent(m.recall))
        .unwrap_or_else(|| "n/a".to_string());
    let fields = vec![
        FieldRow {
            field: "Partitions",
            value: response.partitions.to_string(),
        },
        FieldRow {
            field: "Rows",
            value: format!(
                "{} ({} skipped without class)",
                response.rows, response.rows_missing_class
            ),
        },
        FieldRow {
            field: "Train / test",
            value: format!("{} / {}", response.train_rows, response.test_rows),
        },
        FieldRow {
            field: "Accuracy",
            value: format!(
                "{} (baseline {})",
                format_percent(report.accuracy),
                format_percent(report.baseline_accuracy)
            ),
        },
        FieldRow {
            field: "Hazardous recall",
            value: recall,
        },
        FieldRow {
            field: "ROC-AUC",
            value: format_auc(report.auc),
        },
        FieldRow {
            field: "Average cost",
            value: format!("{:.4}", report.average_cost),
        },
        FieldRow {
            field: "Duration",
            value: format!("{} ms", response.duration_ms),
        },
    ];
    println!(
        "{}",
        tabled::Table::new(fields)
            .with(tabled::settings::Style::rounded())
            .to_string()
    );

    let rows: Vec<ClassRow> = report
        .per_class
        .iter()
        .map(|m| ClassRow {
            class: m.class.clone(),
            true_positives: m.true_positives,
            false_positives: m.false_positives,
            false_negatives: m.false_negatives,
            precision: format!("{:.3}", m.precision),
            recall: format!("{:.3}", m.recall),
            f1: format!("{:.3}", m.f1),
        })
        .collect();
    println!(
        "{}",
        tabled::Table::new(rows)
            .with(tabled::settings::Style::rounded())
            .to_string()
    );

    Ok(())
}
