//! Route handlers.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, error, warn};

use crate::dispatcher::DetectError;

use super::server::AppState;
use super::types::{
    format_response, DetectRequest, DetectResponse, ErrorResponse, HealthResponse, ModelInfo,
    ModelsResponse,
};

/// A failed request, rendered as `{"error": ...}`
#[derive(Debug)]
pub enum ApiError {
    Detect(DetectError),
    /// The body was not a JSON object of the expected shape
    Body(JsonRejection),
    /// The blocking classification task did not finish
    Task(String),
}

impl From<DetectError> for ApiError {
    fn from(err: DetectError) -> Self {
        ApiError::Detect(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Detect(err) => {
                let status = StatusCode::from_u16(err.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, err.to_string())
            }
            ApiError::Body(rejection) => {
                let status = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    StatusCode::PAYLOAD_TOO_LARGE
                } else {
                    StatusCode::BAD_REQUEST
                };
                (status, rejection.body_text())
            }
            ApiError::Task(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        if status.is_server_error() {
            error!("Detection failed ({}): {}", status, message);
        } else {
            warn!("Rejected request ({}): {}", status, message);
        }

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

/// `POST /detect`
pub async fn detect(
    State(state): State<AppState>,
    body: Result<Json<DetectRequest>, JsonRejection>,
) -> Result<Json<DetectResponse>, ApiError> {
    let Json(request) = body.map_err(ApiError::Body)?;

    let dispatcher = state.dispatcher.clone();
    let result = tokio::task::spawn_blocking(move || {
        dispatcher.dispatch(request.image.as_deref(), request.model.as_deref())
    })
    .await
    .map_err(|e| ApiError::Task(format!("Classification task failed: {}", e)))??;

    debug!(
        "Detected {} ({:.1}%) with {}",
        result.primary_emotion(),
        result.confidence(),
        result.model()
    );

    Ok(Json(format_response(&result)))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.dispatcher.registry();
    Json(HealthResponse {
        healthy: !registry.is_empty(),
        models: registry.ids().iter().map(|id| id.display_name()).collect(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /models`
pub async fn models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let models = state
        .dispatcher
        .registry()
        .adapters()
        .map(|adapter| ModelInfo::from_adapter(adapter.as_ref()))
        .collect();
    Json(ModelsResponse { models })
}
