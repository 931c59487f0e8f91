//! Facial emotion classifiers.
//!
//! Every supported model is wrapped in a [`ModelAdapter`] that hides its native
//! input shape, output format and label vocabulary behind one contract:
//! classify a decoded image into a ranked list of [`EmotionScore`]s covering
//! the model's full label set.
//!
//! - [`TransformerAdapter`]: ViT face-expression model, logits + softmax
//! - [`CompactCnnAdapter`]: 48x48 grayscale CNN with probability outputs

pub mod backend;
pub mod mini_xception;
pub mod vit;

pub use backend::{InferenceBackend, OnnxBackend};
pub use mini_xception::{CompactCnnAdapter, FER_LABELS};
pub use vit::TransformerAdapter;

use crate::decode::DecodedImage;
use crate::preprocess::PreprocessError;
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by a classifier while running
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference failed: {0}")]
    Runtime(String),

    #[error("Model returned {actual} scores, expected {expected}")]
    OutputShape { expected: usize, actual: usize },

    #[error("Model returned a non-finite score at index {0}")]
    NonFinite(usize),

    #[error("Model returned no scores")]
    EmptyOutput,
}

/// Errors that can occur while loading a classifier at startup
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("Model not found at path: {0}")]
    ModelNotFound(PathBuf),

    #[error("Failed to load ONNX model: {0}")]
    Session(String),

    #[error("Invalid model configuration: {0}")]
    Config(String),

    #[error("Model {0} is registered more than once")]
    Duplicate(ModelIdentifier),

    #[error("Feature not enabled: ONNX classifiers require the 'onnx' feature")]
    FeatureNotEnabled,
}

/// Errors returned by [`ModelAdapter::classify`]
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Supported models
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelIdentifier {
    /// Vision transformer fine-tuned for facial expressions
    VitFaceExpression,
    /// Compact CNN trained on 48x48 grayscale faces
    MiniXception,
}

impl ModelIdentifier {
    pub const ALL: [ModelIdentifier; 2] = [Self::VitFaceExpression, Self::MiniXception];

    /// Name shown to users and sent by clients
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::VitFaceExpression => "Model 1: ViT Face Expression",
            Self::MiniXception => "Model 2: Mini-Xception CNN",
        }
    }

    /// Stable short identifier
    pub fn slug(&self) -> &'static str {
        match self {
            Self::VitFaceExpression => "vit-face-expression",
            Self::MiniXception => "mini-xception",
        }
    }

    /// Exact match against the display name or the slug
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.display_name() == name || id.slug() == name)
    }
}

impl fmt::Display for ModelIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ModelIdentifier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("Unknown model: {}", s))
    }
}

/// One label paired with its probability (0.0 - 1.0)
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionScore {
    pub label: String,
    pub confidence: f64,
}

impl EmotionScore {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Uniform classify-and-rank contract over one loaded classifier
pub trait ModelAdapter: Send + Sync {
    /// Which model this adapter wraps
    fn id(&self) -> ModelIdentifier;

    /// Full label set, in model output order
    fn labels(&self) -> &[String];

    /// Classify an image.
    ///
    /// Returns one score per label, sorted by confidence descending. Equal
    /// confidences keep label index order.
    fn classify(&self, image: &DecodedImage) -> Result<Vec<EmotionScore>, ClassifyError>;
}

/// Stable descending sort by confidence
pub fn sort_by_confidence(scores: &mut [EmotionScore]) {
    scores.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
}

/// Pair per-class probabilities with labels and rank them.
///
/// The output vector must have exactly one finite value per label.
pub fn rank_scores(
    labels: &[String],
    probabilities: &[f32],
) -> Result<Vec<EmotionScore>, InferenceError> {
    if probabilities.is_empty() {
        return Err(InferenceError::EmptyOutput);
    }
    if probabilities.len() != labels.len() {
        return Err(InferenceError::OutputShape {
            expected: labels.len(),
            actual: probabilities.len(),
        });
    }
    if let Some(index) = probabilities.iter().position(|p| !p.is_finite()) {
        return Err(InferenceError::NonFinite(index));
    }

    let mut scores: Vec<EmotionScore> = labels
        .iter()
        .zip(probabilities)
        .map(|(label, &p)| EmotionScore::new(label.clone(), p as f64))
        .collect();
    sort_by_confidence(&mut scores);
    Ok(scores)
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }
    let max_val = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max_val).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

/// Uppercase the first character and lowercase the rest ("HAPPY" -> "Happy")
pub fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::preprocess::InputTensor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Backend returning the same raw output for every input
    pub struct FixedBackend {
        pub output: Vec<f32>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FixedBackend {
        pub fn new(output: Vec<f32>) -> Self {
            Self {
                output,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl InferenceBackend for FixedBackend {
        fn run(&self, _input: InputTensor) -> Result<Vec<f32>, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }
    }

    /// Deterministic backend whose output depends on the input pixels.
    ///
    /// Produces one raw score per class from the tensor mean; with
    /// `probabilities` set the scores are softmaxed, like a model with a
    /// softmax head.
    pub struct PixelBackend {
        pub classes: usize,
        pub probabilities: bool,
        pub expected_shape: Option<[usize; 4]>,
    }

    impl InferenceBackend for PixelBackend {
        fn run(&self, input: InputTensor) -> Result<Vec<f32>, InferenceError> {
            if let Some(expected) = self.expected_shape {
                if input.shape() != &expected[..] {
                    return Err(InferenceError::Runtime(format!(
                        "Got invalid dimensions for input: {:?}, expected {:?}",
                        input.shape(),
                        expected
                    )));
                }
            }
            let mean = input.mean().unwrap_or(0.0);
            let raw: Vec<f32> = (0..self.classes)
                .map(|i| ((i as f32 + 1.0) * (mean + 1.3)).sin() * 3.0)
                .collect();
            Ok(if self.probabilities { softmax(&raw) } else { raw })
        }
    }

    /// Backend that always fails
    pub struct FailingBackend;

    impl InferenceBackend for FailingBackend {
        fn run(&self, _input: InputTensor) -> Result<Vec<f32>, InferenceError> {
            Err(InferenceError::Runtime("shape mismatch".to_string()))
        }
    }
}
