//! HTTP API for emotion detection.
//!
//! ## Routes
//!
//! - `POST /detect` - classify a base64 image with one of the loaded models
//! - `GET /health` - liveness plus the loaded model names
//! - `GET /models` - loaded models with their label sets
//!
//! ## Protocol
//!
//! ```json
//! POST /detect
//! {
//!     "image": "data:image/jpeg;base64,/9j/4AAQ...",
//!     "model": "Model 2: Mini-Xception CNN"
//! }
//! ```
//!
//! Success returns `{"primaryEmotion", "confidence", "allResults"}`. Failures
//! return `{"error": "..."}` with 400 for caller mistakes and 500 for decode or
//! inference failures.

mod handlers;
mod server;
mod types;

pub use handlers::ApiError;
pub use server::{build_router, serve, AppState};
pub use types::{format_response, DetectRequest, DetectResponse, EmotionEntry, ErrorResponse};
