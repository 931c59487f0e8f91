use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use emotion_detect::api::{self, AppState};
use emotion_detect::models;
use emotion_detect::{Config, Dispatcher, ModelRegistry};

/// HTTP service that classifies facial emotions in base64 images
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config file (defaults to ~/.emotiondetect/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory with the transformer's model.onnx and JSON configs
    #[arg(long)]
    vit_dir: Option<PathBuf>,

    /// Path to the compact CNN ONNX file
    #[arg(long)]
    cnn_model: Option<PathBuf>,

    /// Never download missing model files
    #[arg(long)]
    no_download: bool,

    /// Print which model files are present and exit
    #[arg(long)]
    check_models: bool,

    /// Write the effective configuration (file plus flags) to the config path and exit
    #[arg(long)]
    init_config: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = &self.vit_dir {
            config.vit.model_dir = dir.clone();
        }
        if let Some(path) = &self.cnn_model {
            config.mini_xception.model_path = path.clone();
        }
        if self.no_download {
            config.auto_download = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };
    let mut config = Config::load(&config_path)?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    if args.init_config {
        config.save(&config_path)?;
        println!("Wrote configuration to {:?}", config_path);
        return Ok(());
    }

    if args.check_models {
        for status in models::model_status(&config) {
            if status.available {
                println!("{}: ok ({:?})", status.name, status.path);
            } else {
                println!("{}: missing", status.name);
                for path in &status.missing {
                    println!("  {:?}", path);
                }
            }
        }
        return Ok(());
    }

    info!("Emotion detection service starting...");
    info!("Config: {:?}", config_path);

    // Model files and ONNX sessions are loaded before binding; any failure is fatal
    let load_config = config.clone();
    let registry = tokio::task::spawn_blocking(move || -> Result<ModelRegistry> {
        models::ensure_models(&load_config).context("Failed to prepare model files")?;
        ModelRegistry::load(&load_config).context("Failed to load models")
    })
    .await
    .context("Model loading task panicked")??;

    info!("Loaded {} model(s): {:?}", registry.len(), registry.ids());

    let dispatcher = Dispatcher::new(Arc::new(registry));
    api::serve(&config.bind_address(), AppState::new(dispatcher), config.max_body_bytes).await
}
