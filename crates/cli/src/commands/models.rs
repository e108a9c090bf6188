//! Model listing and service status

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, HealthResponse, ModelVersion, ReadinessResponse};
use crate::output::{color_status, format_bytes, print_json, print_warning, OutputFormat};

/// Row for models table
#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Published")]
    last_modified: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Serving")]
    serving: String,
}

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// List published model versions, newest first
pub async fn list_models(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let models: Vec<ModelVersion> = client.get("ml/models").await?;

    if format == OutputFormat::Json {
        return print_json(&models);
    }
    if models.is_empty() {
        print_warning("No published models; run `neoctl train all` first");
        return Ok(());
    }

    let readiness: ReadinessResponse = client.get_probe("readyz").await?;
    let serving = readiness.model_version.unwrap_or_default();

    let rows: Vec<ModelRow> = models
        .iter()
        .map(|m| ModelRow {
            version: m.version.clone(),
            last_modified: m.last_modified.format("%Y-%m-%d %H:%M:%S").to_string(),
            size: format_bytes(m.size_bytes),
            serving: if m.version == serving { "*" } else { "" }.to_string(),
        })
        .collect();

    let table = tabled::Table::new(rows)
        .with(tabled::settings::Style::rounded())
        .to_string();
    println!("{}", table);
    println!("\nTotal: {} models", models.len());

    Ok(())
}

/// Show service health and readiness
pub async fn status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.get_probe("healthz").await?;
    let readiness: ReadinessResponse = client.get_probe("readyz").await?;

    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "health": health,
            "readiness": readiness,
        }));
    }

    println!("Service: {}", color_status(&health.status));
    match (&readiness.model_version, readiness.ready) {
        (Some(version), true) => println!("Model:   {} ({})", version, color_status("ready")),
        _ => println!(
            "Model:   {} ({})",
            color_status("not ready"),
            readiness.reason.as_deref().unwrap_or("unknown")
        ),
    }

    let mut rows: Vec<ComponentRow> = health
        .components
        .into_iter()
        .map(|(name, c)| ComponentRow {
            name,
            status: color_status(&c.status),
            message: c.message.unwrap_or_default(),
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    if !rows.is_empty() {
        let table = tabled::Table::new(rows)
            .with(tabled::settings::Style::rounded())
            .to_string();
        println!("{}", table);
    }

    Ok(())
}
