//! Inference backends.
//!
//! Adapters own the model-specific preprocessing and output handling; a
//! backend only runs a prepared tensor through the weights and returns the raw
//! output vector.

use super::{InferenceError, ModelLoadError};
use crate::preprocess::InputTensor;
use std::path::Path;

#[cfg(feature = "onnx")]
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
#[cfg(feature = "onnx")]
use std::sync::Mutex;

/// Runs one prepared tensor through a loaded model
pub trait InferenceBackend: Send + Sync {
    /// Run inference and return the first output tensor, flattened
    fn run(&self, input: InputTensor) -> Result<Vec<f32>, InferenceError>;
}

/// ONNX Runtime session loaded from a model file.
///
/// ONNX Runtime only executes the forward graph, so no gradient state is kept
/// between requests. A run needs exclusive access to the session, hence the
/// mutex.
#[cfg(feature = "onnx")]
pub struct OnnxBackend {
    session: Mutex<Session>,
}

#[cfg(feature = "onnx")]
impl OnnxBackend {
    /// Load an ONNX model
    ///
    /// # Arguments
    /// * `model_path` - Path to the `.onnx` file
    /// * `n_threads` - Intra-op threads for inference
    pub fn load(model_path: &Path, n_threads: usize) -> Result<Self, ModelLoadError> {
        if !model_path.exists() {
            return Err(ModelLoadError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| ModelLoadError::Session(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| ModelLoadError::Session(e.to_string()))?
            .with_intra_threads(n_threads.max(1))
            .map_err(|e: ort::Error| ModelLoadError::Session(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e: ort::Error| ModelLoadError::Session(e.to_string()))?;

        tracing::info!("Loaded ONNX model from {:?}", model_path);

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

#[cfg(feature = "onnx")]
impl InferenceBackend for OnnxBackend {
    fn run(&self, input: InputTensor) -> Result<Vec<f32>, InferenceError> {
        let (batch, d1, d2, d3) = input.dim();
        let input_shape = [batch, d1, d2, d3];
        let input_data: Vec<f32> = input.iter().copied().collect();

        let input_tensor = Value::from_array((input_shape, input_data))
            .map_err(|e: ort::Error| InferenceError::Runtime(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| InferenceError::Runtime("ONNX session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e: ort::Error| InferenceError::Runtime(e.to_string()))?;

        // Classifiers have a single [1, num_classes] output
        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| InferenceError::Runtime("No output from model".to_string()))?;

        let tensor = output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e: ort::Error| InferenceError::Runtime(e.to_string()))?;

        Ok(tensor.1.to_vec())
    }
}

// Stub implementation when feature is not enabled
#[cfg(not(feature = "onnx"))]
pub struct OnnxBackend;

#[cfg(not(feature = "onnx"))]
impl OnnxBackend {
    pub fn load(_model_path: &Path, _n_threads: usize) -> Result<Self, ModelLoadError> {
        Err(ModelLoadError::FeatureNotEnabled)
    }
}

#[cfg(not(feature = "onnx"))]
impl InferenceBackend for OnnxBackend {
    fn run(&self, _input: InputTensor) -> Result<Vec<f32>, InferenceError> {
        Err(InferenceError::Runtime(
            "ONNX support not compiled in".to_string(),
        ))
    }
}
