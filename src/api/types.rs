//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};

use crate::dispatcher::ClassificationResult;
use crate::emotion::ModelAdapter;

/// Body of `POST /detect`
#[derive(Debug, Default, Deserialize)]
pub struct DetectRequest {
    /// Base64 image, optionally with a `data:` URI prefix
    #[serde(default)]
    pub image: Option<String>,
    /// Display name or slug of the model
    #[serde(default)]
    pub model: Option<String>,
}

/// One label of a detection response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionEntry {
    pub emotion: String,
    /// Probability, 0 - 1
    pub confidence: f64,
}

/// Successful detection response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    pub primary_emotion: String,
    /// Percentage, 0 - 100
    pub confidence: f64,
    pub all_results: Vec<EmotionEntry>,
}

/// Error body shared by every failing route
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Body of `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub models: Vec<&'static str>,
    pub timestamp: String,
}

/// One entry of `GET /models`
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub labels: Vec<String>,
}

impl ModelInfo {
    pub fn from_adapter(adapter: &dyn ModelAdapter) -> Self {
        let id = adapter.id();
        Self {
            id: id.slug(),
            name: id.display_name(),
            labels: adapter.labels().to_vec(),
        }
    }
}

/// Body of `GET /models`
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

/// Convert a classification into the wire shape.
///
/// Confidence is already a percentage and `all_results` keeps the ranked
/// order; nothing is rounded here.
pub fn format_response(result: &ClassificationResult) -> DetectResponse {
    DetectResponse {
        primary_emotion: result.primary_emotion().to_string(),
        confidence: result.confidence(),
        all_results: result
            .all_results()
            .iter()
            .map(|score| EmotionEntry {
                emotion: score.label.clone(),
                confidence: score.confidence,
            })
            .collect(),
    }
}
