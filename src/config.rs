use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default HuggingFace location of the exported transformer
pub const DEFAULT_VIT_DOWNLOAD_URL: &str =
    "https://huggingface.co/trpakov/vit-face-expression/resolve/main";

/// Transformer model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VitModelConfig {
    pub enabled: bool,
    /// Directory holding model.onnx, config.json and preprocessor_config.json
    pub model_dir: PathBuf,
    /// Base URL the three files are downloaded from when missing
    pub download_url: Option<String>,
}

impl Default for VitModelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_dir: default_models_dir().join("vit-face-expression"),
            download_url: Some(DEFAULT_VIT_DOWNLOAD_URL.to_string()),
        }
    }
}

/// Compact CNN settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiniXceptionConfig {
    pub enabled: bool,
    /// Path to the ONNX export of the CNN
    pub model_path: PathBuf,
    /// URL of the ONNX file, used when the file is missing
    pub download_url: Option<String>,
}

impl Default for MiniXceptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_path: default_models_dir().join("mini_xception.onnx"),
            download_url: None,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: u32,
    pub host: String,
    pub port: u16,
    /// Largest accepted request body
    pub max_body_bytes: usize,
    /// Intra-op threads per ONNX session
    pub intra_threads: usize,
    /// Download missing model files at startup
    pub auto_download: bool,
    pub vit: VitModelConfig,
    pub mini_xception: MiniXceptionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: 1,
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_body_bytes: 16 * 1024 * 1024,
            intra_threads: 2,
            auto_download: true,
            vit: VitModelConfig::default(),
            mini_xception: MiniXceptionConfig::default(),
        }
    }
}

/// `~/.emotiondetect`, or the working directory when there is no home
fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".emotiondetect"))
        .unwrap_or_else(|| PathBuf::from(".emotiondetect"))
}

fn default_models_dir() -> PathBuf {
    default_config_dir().join("models")
}

impl Config {
    /// Get the default config directory
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".emotiondetect"))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from file, or defaults if the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {:?}", path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file {:?}", path))
        } else {
            debug!("No config file at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")
    }

    /// Reject configurations the service cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("port must be non-zero");
        }
        if self.max_body_bytes == 0 {
            bail!("max_body_bytes must be non-zero");
        }
        if !self.vit.enabled && !self.mini_xception.enabled {
            bail!("at least one model must be enabled");
        }
        Ok(())
    }

    /// `host:port` for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
