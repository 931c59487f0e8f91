//! Vision transformer face-expression classifier.
//!
//! Expects an exported HuggingFace model directory:
//!
//! ```text
//! <model_dir>/
//!   model.onnx                  # exported weights, logits output [1, num_labels]
//!   config.json                 # id2label mapping
//!   preprocessor_config.json    # resize / rescale / normalize settings
//! ```

use super::backend::{InferenceBackend, OnnxBackend};
use super::{
    capitalize, rank_scores, softmax, ClassifyError, EmotionScore, ModelAdapter, ModelIdentifier,
    ModelLoadError,
};
use crate::decode::DecodedImage;
use crate::preprocess::{ImageProcessor, ImageProcessorConfig, Preprocessor};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// ONNX weights file inside the model directory
pub const MODEL_FILE: &str = "model.onnx";
/// Model configuration holding the label mapping
pub const CONFIG_FILE: &str = "config.json";
/// Image processor configuration
pub const PREPROCESSOR_FILE: &str = "preprocessor_config.json";

/// The part of `config.json` this adapter needs
#[derive(Debug, Deserialize)]
struct ModelConfig {
    id2label: BTreeMap<usize, String>,
}

/// Build the display label list from an index-to-label mapping.
///
/// Indices must cover `0..n` without gaps; labels are capitalized.
pub fn labels_from_id2label(id2label: &BTreeMap<usize, String>) -> Result<Vec<String>, ModelLoadError> {
    if id2label.is_empty() {
        return Err(ModelLoadError::Config("id2label is empty".to_string()));
    }
    id2label
        .iter()
        .enumerate()
        .map(|(expected, (&index, label))| {
            if index != expected {
                Err(ModelLoadError::Config(format!(
                    "id2label is missing index {}",
                    expected
                )))
            } else {
                Ok(capitalize(label))
            }
        })
        .collect()
}

/// Adapter for the transformer classifier (logits over its own label set)
pub struct TransformerAdapter {
    processor: ImageProcessor,
    labels: Vec<String>,
    backend: Box<dyn InferenceBackend>,
}

impl TransformerAdapter {
    /// Load the model, its label mapping and its processor from `model_dir`
    pub fn load(model_dir: &Path, n_threads: usize) -> Result<Self, ModelLoadError> {
        if !model_dir.is_dir() {
            return Err(ModelLoadError::ModelNotFound(model_dir.to_path_buf()));
        }

        let config_path = model_dir.join(CONFIG_FILE);
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ModelLoadError::Config(format!("{:?}: {}", config_path, e)))?;
        let model_config: ModelConfig = serde_json::from_str(&content)
            .map_err(|e| ModelLoadError::Config(format!("{:?}: {}", config_path, e)))?;
        let labels = labels_from_id2label(&model_config.id2label)?;

        let processor_config = ImageProcessorConfig::from_file(&model_dir.join(PREPROCESSOR_FILE))
            .map_err(|e| ModelLoadError::Config(format!("{:#}", e)))?;
        let processor = ImageProcessor::new(&processor_config)
            .map_err(|e| ModelLoadError::Config(e.to_string()))?;

        let backend = OnnxBackend::load(&model_dir.join(MODEL_FILE), n_threads)?;

        tracing::info!(
            "Transformer classifier ready: {} labels, input {:?}",
            labels.len(),
            processor.input_shape()
        );

        Ok(Self::with_backend(processor, labels, Box::new(backend)))
    }

    /// Assemble an adapter from already loaded parts
    pub fn with_backend(
        processor: ImageProcessor,
        labels: Vec<String>,
        backend: Box<dyn InferenceBackend>,
    ) -> Self {
        Self {
            processor,
            labels,
            backend,
        }
    }
}

impl ModelAdapter for TransformerAdapter {
    fn id(&self) -> ModelIdentifier {
        ModelIdentifier::VitFaceExpression
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn classify(&self, image: &DecodedImage) -> Result<Vec<EmotionScore>, ClassifyError> {
        let input = self.processor.preprocess(image)?;
        let logits = self.backend.run(input)?;
        if let Some(index) = logits.iter().position(|v| !v.is_finite()) {
            return Err(super::InferenceError::NonFinite(index).into());
        }
        Ok(rank_scores(&self.labels, &softmax(&logits))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::test_support::solid_rgb;
    use crate::emotion::test_support::{FailingBackend, FixedBackend, PixelBackend};
    use crate::emotion::InferenceError;

    fn vit_labels() -> Vec<String> {
        ["Angry", "Disgust", "Fear", "Happy", "Neutral", "Sad", "Surprise"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn processor() -> ImageProcessor {
        ImageProcessor::new(&ImageProcessorConfig::default()).unwrap()
    }

    #[test]
    fn test_labels_from_id2label() {
        let config: ModelConfig = serde_json::from_str(
            r#"{"id2label": {"0": "angry", "1": "HAPPY", "2": "neutral"}, "model_type": "vit"}"#,
        )
        .unwrap();
        let labels = labels_from_id2label(&config.id2label).unwrap();
        assert_eq!(labels, vec!["Angry", "Happy", "Neutral"]);
    }

    #[test]
    fn test_labels_ordered_by_index_not_key_text() {
        let mut map = BTreeMap::new();
        for i in 0..12 {
            map.insert(i, format!("label{}", i));
        }
        let labels = labels_from_id2label(&map).unwrap();
        assert_eq!(labels[2], "Label2");
        assert_eq!(labels[10], "Label10");
    }

    #[test]
    fn test_labels_with_gap_rejected() {
        let mut map = BTreeMap::new();
        map.insert(0, "a".to_string());
        map.insert(2, "c".to_string());
        assert!(matches!(
            labels_from_id2label(&map),
            Err(ModelLoadError::Config(_))
        ));
        assert!(labels_from_id2label(&BTreeMap::new()).is_err());
    }

    #[test]
    fn test_classify_applies_softmax_and_sorts() {
        let logits = vec![0.1, -1.0, 0.3, 4.0, 1.5, 0.0, -0.5];
        let adapter = TransformerAdapter::with_backend(
            processor(),
            vit_labels(),
            Box::new(FixedBackend::new(logits)),
        );

        let image = DecodedImage::new(solid_rgb(48, 48, [0, 0, 0]));
        let scores = adapter.classify(&image).unwrap();

        assert_eq!(scores.len(), 7);
        assert_eq!(scores[0].label, "Happy");
        assert_eq!(scores[1].label, "Neutral");
        let sum: f64 = scores.iter().map(|s| s.confidence).sum();
        assert!((sum - 1.0).abs() < 1e-3);
        assert!(scores.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn test_classify_receives_channel_first_tensor() {
        let adapter = TransformerAdapter::with_backend(
            processor(),
            vit_labels(),
            Box::new(PixelBackend {
                classes: 7,
                probabilities: false,
                expected_shape: Some([1, 3, 224, 224]),
            }),
        );
        let image = DecodedImage::new(solid_rgb(30, 60, [200, 10, 10]));
        assert!(adapter.classify(&image).is_ok());
    }

    #[test]
    fn test_wrong_output_length() {
        let adapter = TransformerAdapter::with_backend(
            processor(),
            vit_labels(),
            Box::new(FixedBackend::new(vec![1.0, 2.0])),
        );
        let image = DecodedImage::new(solid_rgb(8, 8, [0, 0, 0]));
        assert!(matches!(
            adapter.classify(&image),
            Err(ClassifyError::Inference(InferenceError::OutputShape { expected: 7, actual: 2 }))
        ));
    }

    #[test]
    fn test_non_finite_logits() {
        let mut logits = vec![0.0; 7];
        logits[3] = f32::INFINITY;
        let adapter = TransformerAdapter::with_backend(
            processor(),
            vit_labels(),
            Box::new(FixedBackend::new(logits)),
        );
        let image = DecodedImage::new(solid_rgb(8, 8, [0, 0, 0]));
        assert!(matches!(
            adapter.classify(&image),
            Err(ClassifyError::Inference(InferenceError::NonFinite(3)))
        ));
    }

    #[test]
    fn test_backend_failure_is_inference_error() {
        let adapter =
            TransformerAdapter::with_backend(processor(), vit_labels(), Box::new(FailingBackend));
        let image = DecodedImage::new(solid_rgb(8, 8, [0, 0, 0]));
        assert!(matches!(
            adapter.classify(&image),
            Err(ClassifyError::Inference(InferenceError::Runtime(_)))
        ));
    }

    #[test]
    fn test_load_missing_directory() {
        let result = TransformerAdapter::load(Path::new("/nonexistent/vit"), 1);
        assert!(matches!(result, Err(ModelLoadError::ModelNotFound(_))));
    }

    #[test]
    fn test_load_bad_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{"model_type": "vit"}"#).unwrap();
        let result = TransformerAdapter::load(dir.path(), 1);
        assert!(matches!(result, Err(ModelLoadError::Config(_))));
    }

    #[test]
    fn test_load_missing_weights() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"id2label": {"0": "happy", "1": "sad"}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join(PREPROCESSOR_FILE), "{}").unwrap();
        let result = TransformerAdapter::load(dir.path(), 1);
        // Missing weights, or no ONNX support compiled in
        assert!(matches!(
            result,
            Err(ModelLoadError::ModelNotFound(_)) | Err(ModelLoadError::FeatureNotEnabled)
        ));
    }
}
