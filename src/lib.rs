//! Facial emotion detection.
//!
//! A base64 image goes through [`decode`], a model-specific preprocessor,
//! and one of the registered [`emotion::ModelAdapter`]s. The [`Dispatcher`]
//! ties these together and the [`api`] module exposes it over HTTP.

pub mod api;
pub mod config;
pub mod decode;
pub mod dispatcher;
pub mod emotion;
pub mod models;
pub mod preprocess;
pub mod registry;

pub use api::{build_router, format_response, AppState, DetectResponse};
pub use config::Config;
pub use dispatcher::{ClassificationResult, DetectError, Dispatcher};
pub use emotion::{EmotionScore, ModelAdapter, ModelIdentifier};
pub use registry::ModelRegistry;
