//! NEO hazard CLI
//!
//! A command-line tool for triggering training runs, reloading models,
//! requesting predictions and risk scores, and checking the hazard service.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use commands::{models, predict, training};

/// NEO hazard CLI
#[derive(Parser)]
#[command(name = "neoctl")]
#[command(author, version, about = "CLI for the NEO hazard service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via NEOCTL_API_URL env var)
    #[arg(long, env = "NEOCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train and publish a new model version
    #[command(subcommand)]
    Train(TrainCommands),

    /// Serve the latest published model
    Reload,

    /// Classify a single object
    Predict {
        /// Absolute magnitude (H)
        #[arg(long)]
        magnitude: Option<f64>,

        /// Minimum estimated diameter in meters
        #[arg(long)]
        diameter_min: Option<f64>,

        /// Maximum estimated diameter in meters
        #[arg(long)]
        diameter_max: Option<f64>,

        /// Relative velocity in km/s
        #[arg(long)]
        velocity: Option<f64>,
    },

    /// Rule-based risk score from magnitude, diameter and velocity
    Risk {
        /// Absolute magnitude (H)
        #[arg(long)]
        magnitude: Option<f64>,

        /// Maximum estimated diameter in meters
        #[arg(long)]
        diameter_max: Option<f64>,

        /// Relative velocity in km/s
        #[arg(long)]
        velocity: Option<f64>,
    },

    /// List published model versions
    Models,

    /// Show service health and readiness
    Status,
}

#[derive(Subcommand)]
pub enum TrainCommands {
    /// Train on every raw partition
    All,

    /// Train on partitions within a date range
    Range {
        /// First date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;
    let api_url = config.resolve_api_url(cli.api_url.as_deref());
    let format = cli
        .format
        .or_else(|| config.default_format.as_deref()?.parse().ok())
        .unwrap_or_default();

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    // Execute command
    match cli.command {
        Commands::Train(train_cmd) => match train_cmd {
            TrainCommands::All => training::train_all(&client, format).await?,
            TrainCommands::Range { start, end } => {
                training::train_range(&client, start, end, format).await?
            }
        },
        Commands::Reload => training::reload(&client, format).await?,
        Commands::Predict {
            magnitude,
            diameter_min,
            diameter_max,
            velocity,
        } => {
            let request = client::FeatureRequest {
                absolute_magnitude: magnitude,
                diameter_min_m: diameter_min,
                diameter_max_m: diameter_max,
                velocity_km_s: velocity,
            };
            predict::predict(&client, request, format).await?;
        }
        Commands::Risk {
            magnitude,
            diameter_max,
            velocity,
        } => {
            let query = client::RiskQuery {
                absolute_magnitude: magnitude,
                diameter_max_m: diameter_max,
                velocity_km_s: velocity,
            };
            predict::risk(&client, query, format).await?;
        }
        Commands::Models => models::list_models(&client, format).await?,
        Commands::Status => models::status(&client, format).await?,
    }

    Ok(())
}
