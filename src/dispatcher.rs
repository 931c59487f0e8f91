//! Request dispatcher.
//!
//! Validates the request, decodes the image, picks the adapter for the
//! requested model, classifies and builds the ranked result. Classification
//! either fully succeeds or the whole request fails.

use crate::decode::{self, DecodeError};
use crate::emotion::{sort_by_confidence, ClassifyError, EmotionScore, InferenceError, ModelIdentifier};
use crate::preprocess::PreprocessError;
use crate::registry::ModelRegistry;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

/// Message returned when the request has no image
pub const NO_IMAGE_MESSAGE: &str = "No image provided";
/// Message returned when the model name does not match a registered model
pub const INVALID_MODEL_MESSAGE: &str = "Invalid model choice";

/// Everything that can fail while serving one detection request
#[derive(Debug, Error)]
pub enum DetectError {
    /// The caller sent a missing or invalid field
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl DetectError {
    /// HTTP status for this error: 400 for caller mistakes, 500 otherwise
    pub fn status_code(&self) -> u16 {
        match self {
            DetectError::Validation(_) => 400,
            DetectError::Decode(_) | DetectError::Preprocess(_) | DetectError::Inference(_) => 500,
        }
    }
}

impl From<ClassifyError> for DetectError {
    fn from(err: ClassifyError) -> Self {
        match err {
            ClassifyError::Preprocess(e) => DetectError::Preprocess(e),
            ClassifyError::Inference(e) => DetectError::Inference(e),
        }
    }
}

/// Ranked classification of one image
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    model: ModelIdentifier,
    primary_emotion: String,
    confidence: f64,
    all_results: Vec<EmotionScore>,
}

impl ClassificationResult {
    /// Build a result from scores, sorting them by confidence descending.
    ///
    /// The primary emotion and its percentage confidence are taken from the
    /// top score; they cannot be set independently.
    pub fn from_ranked(
        model: ModelIdentifier,
        mut scores: Vec<EmotionScore>,
    ) -> Result<Self, InferenceError> {
        sort_by_confidence(&mut scores);
        let top = scores.first().ok_or(InferenceError::EmptyOutput)?;
        Ok(Self {
            model,
            primary_emotion: top.label.clone(),
            confidence: top.confidence * 100.0,
            all_results: scores,
        })
    }

    /// Model that produced the result
    pub fn model(&self) -> ModelIdentifier {
        self.model
    }

    /// Label with the highest confidence
    pub fn primary_emotion(&self) -> &str {
        &self.primary_emotion
    }

    /// Confidence of the primary emotion as a percentage (0 - 100)
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// All scores, highest confidence first (probabilities, 0 - 1)
    pub fn all_results(&self) -> &[EmotionScore] {
        &self.all_results
    }
}

/// Routes images to the requested classifier
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Classify one image with the requested model.
    ///
    /// Blocking: preprocessing and inference run on the calling thread.
    pub fn dispatch(
        &self,
        payload: Option<&str>,
        model: Option<&str>,
    ) -> Result<ClassificationResult, DetectError> {
        let payload = payload.ok_or_else(|| DetectError::Validation(NO_IMAGE_MESSAGE.to_string()))?;

        let started = Instant::now();
        let image = decode::decode(payload)?;

        let adapter = self
            .registry
            .resolve(model)
            .ok_or_else(|| DetectError::Validation(INVALID_MODEL_MESSAGE.to_string()))?;

        let scores = adapter.classify(&image)?;
        let result = ClassificationResult::from_ranked(adapter.id(), scores)?;

        debug!(
            "{} classified {}x{}x{} image as {} ({:.1}%) in {:?}",
            adapter.id(),
            image.width(),
            image.height(),
            image.channels(),
            result.primary_emotion(),
            result.confidence(),
            started.elapsed()
        );

        Ok(result)
    }
}
