//! Model file management.
//!
//! Resolves the files each classifier needs and downloads missing ones when a
//! download URL is configured:
//! - Transformer: model.onnx, config.json, preprocessor_config.json
//! - Compact CNN: a single ONNX file

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{Config, MiniXceptionConfig, VitModelConfig};
use crate::emotion::vit::{CONFIG_FILE, MODEL_FILE, PREPROCESSOR_FILE};

/// Files that make up the transformer model directory
pub const VIT_FILES: [&str; 3] = [MODEL_FILE, CONFIG_FILE, PREPROCESSOR_FILE];

/// Errors that can occur during model operations
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to download model: {0}")]
    DownloadError(String),

    #[error("Failed to create directory: {0}")]
    DirectoryError(String),

    #[error("Failed to write model file: {0}")]
    WriteError(String),

    #[error("Model not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Availability of one model on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStatus {
    pub name: &'static str,
    pub path: PathBuf,
    pub available: bool,
    pub missing: Vec<PathBuf>,
}

/// Fetch `url` into `dest_path`, streaming the body to disk
fn download_file(url: &str, dest_path: &Path) -> Result<u64, ModelError> {
    info!("Downloading {} to {:?}", url, dest_path);

    let response = reqwest::blocking::Client::new()
        .get(url)
        .send()
        .map_err(|e| ModelError::NetworkError(e.to_string()))?;

    if !response.status().is_success() {
        return Err(ModelError::DownloadError(format!(
            "HTTP {} for {}",
            response.status(),
            url
        )));
    }

    let expected_len = response.content_length();
    let written = write_download(response, dest_path, expected_len)?;

    info!(
        "Download complete: {:?} ({:.1} MB)",
        dest_path,
        written as f64 / 1_000_000.0
    );
    Ok(written)
}

/// `<dest>.download`, next to the destination
fn partial_path(dest_path: &Path) -> PathBuf {
    let mut name = dest_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".download");
    dest_path.with_file_name(name)
}

/// Copy `reader` into a partial file and move it into place once complete.
///
/// A body shorter or longer than `expected_len` is an error; on any error the
/// partial file is removed and `dest_path` is left untouched.
fn write_download(
    mut reader: impl Read,
    dest_path: &Path,
    expected_len: Option<u64>,
) -> Result<u64, ModelError> {
    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent).map_err(|e| ModelError::DirectoryError(e.to_string()))?;
    }

    let temp_path = partial_path(dest_path);
    let written = match copy_to_file(&mut reader, &temp_path, expected_len) {
        Ok(written) => written,
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
    };

    fs::rename(&temp_path, dest_path).map_err(|e| ModelError::WriteError(e.to_string()))?;
    Ok(written)
}

fn copy_to_file(
    reader: &mut impl Read,
    path: &Path,
    expected_len: Option<u64>,
) -> Result<u64, ModelError> {
    let file = File::create(path).map_err(|e| ModelError::WriteError(e.to_string()))?;
    let mut writer = BufWriter::new(file);

    let written = io::copy(reader, &mut writer)
        .map_err(|e| ModelError::DownloadError(e.to_string()))?;
    writer
        .flush()
        .map_err(|e| ModelError::WriteError(e.to_string()))?;

    match expected_len {
        Some(expected) if expected != written => Err(ModelError::DownloadError(format!(
            "expected {} bytes, received {}",
            expected, written
        ))),
        _ => Ok(written),
    }
}

/// Join a base URL and a file name
fn file_url(base: &str, file: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), file)
}

/// Ensure the transformer directory is complete, downloading missing files
pub fn ensure_vit_model(config: &VitModelConfig, auto_download: bool) -> Result<PathBuf, ModelError> {
    let missing: Vec<&str> = VIT_FILES
        .into_iter()
        .filter(|file| !config.model_dir.join(file).exists())
        .collect();

    if missing.is_empty() {
        debug!("Transformer model already present: {:?}", config.model_dir);
        return Ok(config.model_dir.clone());
    }

    let base = match (&config.download_url, auto_download) {
        (Some(url), true) => url,
        _ => {
            return Err(ModelError::NotFound(format!(
                "{:?} is missing {}",
                config.model_dir,
                missing.join(", ")
            )))
        }
    };

    for file in missing {
        download_file(&file_url(base, file), &config.model_dir.join(file))?;
    }

    Ok(config.model_dir.clone())
}

/// Ensure the CNN file exists, downloading it if possible
pub fn ensure_mini_xception_model(
    config: &MiniXceptionConfig,
    auto_download: bool,
) -> Result<PathBuf, ModelError> {
    if config.model_path.exists() {
        debug!("CNN model already present: {:?}", config.model_path);
        return Ok(config.model_path.clone());
    }

    match (&config.download_url, auto_download) {
        (Some(url), true) => {
            download_file(url, &config.model_path)?;
            Ok(config.model_path.clone())
        }
        _ => Err(ModelError::NotFound(format!("{:?}", config.model_path))),
    }
}

/// Ensure every enabled model is on disk
pub fn ensure_models(config: &Config) -> Result<(), ModelError> {
    if config.vit.enabled {
        ensure_vit_model(&config.vit, config.auto_download)?;
    }
    if config.mini_xception.enabled {
        ensure_mini_xception_model(&config.mini_xception, config.auto_download)?;
    }
    Ok(())
}

/// Report which enabled models are present on disk
pub fn model_status(config: &Config) -> Vec<ModelStatus> {
    let mut statuses = Vec::new();

    if config.vit.enabled {
        let missing: Vec<PathBuf> = VIT_FILES
            .iter()
            .map(|file| config.vit.model_dir.join(file))
            .filter(|path| !path.exists())
            .collect();
        statuses.push(ModelStatus {
            name: crate::emotion::ModelIdentifier::VitFaceExpression.display_name(),
            path: config.vit.model_dir.clone(),
            available: missing.is_empty(),
            missing,
        });
    }

    if config.mini_xception.enabled {
        let path = config.mini_xception.model_path.clone();
        let available = path.exists();
        statuses.push(ModelStatus {
            name: crate::emotion::ModelIdentifier::MiniXception.display_name(),
            missing: if available { Vec::new() } else { vec![path.clone()] },
            path,
            available,
        });
    }

    statuses
}
