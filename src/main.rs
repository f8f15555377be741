//! Knee Telemetry CLI
//!
//! Runs the telemetry service and offers offline model tooling.

use anyhow::Context;
use clap::{Parser, Subcommand};
use knee_telemetry::{
    build_features,
    classifier::{to_c_array, Classifier, DenseModel, InferenceModel},
    config::{Config, StoreBackend},
    server::{run, ServerConfig, ServerState},
    VERSION,
};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "knee-telemetry")]
#[command(version = VERSION)]
#[command(about = "Knee motion telemetry service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to bind to
        #[arg(long)]
        host: Option<IpAddr>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Model file (JSON)
        #[arg(long)]
        model: Option<PathBuf>,

        /// SQLite database file
        #[arg(long)]
        database: Option<PathBuf>,

        /// Keep readings in memory only
        #[arg(long)]
        memory: bool,
    },

    /// Classify a single sample with a model file
    #[command(allow_negative_numbers = true)]
    Predict {
        /// Model file (JSON)
        #[arg(long)]
        model: Option<PathBuf>,

        /// x y z gx gy gz [knee_angle]
        #[arg(num_args = 6..=7, required = true)]
        values: Vec<f64>,
    },

    /// Write a model file as a C byte array
    ExportModel {
        /// Model file to embed
        #[arg(long)]
        model: PathBuf,

        /// Output C source file
        #[arg(long, short, default_value = "model_data.cc")]
        output: PathBuf,

        /// Symbol name for the array
        #[arg(long, default_value = "model_data")]
        name: String,
    },

    /// Show configuration
    Config {
        /// Write the default configuration file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            model,
            database,
            memory,
        } => {
            init_tracing();
            cmd_serve(host, port, model, database, memory).await
        }
        Commands::Predict { model, values } => cmd_predict(model, &values),
        Commands::ExportModel {
            model,
            output,
            name,
        } => cmd_export_model(&model, &output, &name),
        Commands::Config { init } => cmd_config(init),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("knee_telemetry=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn cmd_serve(
    host: Option<IpAddr>,
    port: Option<u16>,
    model: Option<PathBuf>,
    database: Option<PathBuf>,
    memory: bool,
) -> anyhow::Result<()> {
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(model) = model {
        config.model_path = model;
    }
    if let Some(database) = database {
        config.database_path = database;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if memory {
        config.store = StoreBackend::Memory;
    }
    let host: IpAddr = match host {
        Some(host) => host,
        None => config
            .host
            .parse()
            .with_context(|| format!("invalid host '{}'", config.host))?,
    };

    if config.store == StoreBackend::Sqlite {
        if let Err(e) = config.ensure_directories() {
            tracing::warn!("Could not create data directory: {e}");
        }
    }

    tracing::info!("Knee Telemetry v{VERSION}");
    let state = ServerState::from_config(&config)?;
    let (_addr, shutdown_tx) = run(ServerConfig::new(host, config.port), state).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    let _ = shutdown_tx.send(());
    Ok(())
}

fn cmd_predict(model: Option<PathBuf>, values: &[f64]) -> anyhow::Result<()> {
    let model_path = match model {
        Some(path) => path,
        None => Config::load()?.model_path,
    };
    let model = DenseModel::load(&model_path)
        .with_context(|| format!("failed to load model from {}", model_path.display()))?;
    println!("Expected input width: {}", model.input_len());

    let fields = ["x", "y", "z", "gx", "gy", "gz", "knee_angle"];
    let raw: serde_json::Map<String, serde_json::Value> = fields
        .iter()
        .zip(values)
        .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
        .collect();
    let features = build_features(&serde_json::Value::Object(raw))?;

    let classifier = Classifier::new(Box::new(model));
    let scores = classifier.scores(&features)?;
    println!("Model output: {scores:?}");
    println!("Predicted label: {}", classifier.classify(&features)?);
    Ok(())
}

fn cmd_export_model(model: &Path, output: &Path, name: &str) -> anyhow::Result<()> {
    // Parse first so a broken file is never embedded.
    DenseModel::load(model)
        .with_context(|| format!("failed to load model from {}", model.display()))?;
    let bytes = std::fs::read(model)?;

    std::fs::write(output, to_c_array(name, &bytes))
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Wrote {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

fn cmd_config(init: bool) -> anyhow::Result<()> {
    let path = Config::config_path();
    if init {
        if path.exists() {
            println!("Configuration already exists at {}", path.display());
        } else {
            Config::default()
                .save()
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
        }
    }

    let config = Config::load()?;
    println!("Configuration file: {}", path.display());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
