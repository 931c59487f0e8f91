//! Compact CNN classifier trained on 48x48 grayscale faces.
//!
//! The network ends in a softmax layer, so its output is already a
//! probability vector. It is stored as-is: small float drift away from a sum
//! of exactly 1.0 is expected and not corrected.

use super::backend::{InferenceBackend, OnnxBackend};
use super::{rank_scores, ClassifyError, EmotionScore, ModelAdapter, ModelIdentifier, ModelLoadError};
use crate::decode::DecodedImage;
use crate::preprocess::{GrayscalePreprocessor, Preprocessor};
use std::path::Path;

/// Output index -> label, in the order the weights were trained with.
///
/// This order is part of the model; it must never be sorted or re-derived.
pub const FER_LABELS: [&str; 7] = ["Angry", "Disgust", "Fear", "Happy", "Sad", "Surprise", "Neutral"];

/// Adapter for the compact CNN (probability outputs over [`FER_LABELS`])
pub struct CompactCnnAdapter {
    preprocessor: GrayscalePreprocessor,
    labels: Vec<String>,
    backend: Box<dyn InferenceBackend>,
}

impl CompactCnnAdapter {
    /// Load the CNN from a single ONNX file
    pub fn load(model_path: &Path, n_threads: usize) -> Result<Self, ModelLoadError> {
        let backend = OnnxBackend::load(model_path, n_threads)?;
        tracing::info!("Compact CNN classifier ready: {} labels", FER_LABELS.len());
        Ok(Self::with_backend(Box::new(backend)))
    }

    /// Wrap an already loaded backend
    pub fn with_backend(backend: Box<dyn InferenceBackend>) -> Self {
        Self {
            preprocessor: GrayscalePreprocessor::new(),
            labels: FER_LABELS.iter().map(|s| s.to_string()).collect(),
            backend,
        }
    }
}

impl ModelAdapter for CompactCnnAdapter {
    fn id(&self) -> ModelIdentifier {
        ModelIdentifier::MiniXception
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn classify(&self, image: &DecodedImage) -> Result<Vec<EmotionScore>, ClassifyError> {
        let input = self.preprocessor.preprocess(image)?;
        let probabilities = self.backend.run(input)?;
        Ok(rank_scores(&self.labels, &probabilities)?)
    }
}
