//! HTTP server for the detection API.

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::dispatcher::Dispatcher;

use super::handlers;

/// Shared state for the HTTP server
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

/// Build the router with CORS for any origin and a request body limit.
///
/// The limit is enforced by the body extractor, so oversized requests are
/// rejected as `413 {"error": ...}` like every other failure.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/detect", post(handlers::detect))
        .route("/health", get(handlers::health))
        .route("/models", get(handlers::models))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Bind `addr` and serve until Ctrl-C
pub async fn serve(addr: &str, state: AppState, max_body_bytes: usize) -> Result<()> {
    let app = build_router(state, max_body_bytes);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Emotion detection server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::test_support::{gradient_rgb, png_base64, solid_rgb};
    use crate::registry::test_support::fake_registry;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const CNN: &str = "Model 2: Mini-Xception CNN";
    const VIT: &str = "Model 1: ViT Face Expression";

    fn app() -> Router {
        let dispatcher = Dispatcher::new(Arc::new(fake_registry()));
        build_router(AppState::new(dispatcher), 16 * 1024 * 1024)
    }

    fn post_json(body: String) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/detect")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_detect_success_shape() {
        let image = png_base64(&gradient_rgb(64, 64));
        for model in [VIT, CNN] {
            let body = json!({ "image": image, "model": model }).to_string();
            let (status, value) = send(app(), post_json(body)).await;
            assert_eq!(status, StatusCode::OK);

            let object = value.as_object().unwrap();
            assert_eq!(object.len(), 3);
            let all = value["allResults"].as_array().unwrap();
            assert_eq!(all.len(), 7);
            assert_eq!(value["primaryEmotion"], all[0]["emotion"]);
            let top = all[0]["confidence"].as_f64().unwrap();
            let confidence = value["confidence"].as_f64().unwrap();
            assert!((confidence - top * 100.0).abs() < 1e-9);
            assert!((0.0..=100.0).contains(&confidence));
        }
    }

    #[tokio::test]
    async fn test_detect_with_data_uri() {
        let image = format!("data:image/png;base64,{}", png_base64(&solid_rgb(48, 48, [0, 0, 0])));
        let body = json!({ "image": image, "model": CNN }).to_string();
        let (status, _) = send(app(), post_json(body)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_image() {
        let body = json!({ "model": CNN }).to_string();
        let (status, value) = send(app(), post_json(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value, json!({ "error": "No image provided" }));

        let body = json!({ "image": null, "model": CNN }).to_string();
        let (status, value) = send(app(), post_json(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["error"], "No image provided");
    }

    #[tokio::test]
    async fn test_invalid_model() {
        let image = png_base64(&solid_rgb(48, 48, [0, 0, 0]));
        let body = json!({ "image": image, "model": "Model 3: Unknown" }).to_string();
        let (status, value) = send(app(), post_json(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value, json!({ "error": "Invalid model choice" }));
    }

    #[tokio::test]
    async fn test_malformed_base64_is_server_error() {
        let body = json!({ "image": "not base64 at all!!", "model": CNN }).to_string();
        let (status, value) = send(app(), post_json(body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!value["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_image_is_server_error() {
        let body = json!({ "image": "aGVsbG8gd29ybGQ=", "model": CNN }).to_string();
        let (status, value) = send(app(), post_json(body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(value["error"].is_string());
    }

    #[tokio::test]
    async fn test_malformed_json_body() {
        let (status, value) = send(app(), post_json("{ nope".to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(value["error"].is_string());
    }

    #[tokio::test]
    async fn test_body_limit() {
        let dispatcher = Dispatcher::new(Arc::new(fake_registry()));
        let app = build_router(AppState::new(dispatcher), 64);
        let body = json!({ "image": "A".repeat(256), "model": CNN }).to_string();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/detect")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap();

        let (status, value) = send(app, request).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        let object = value.as_object().expect("error body is JSON");
        assert_eq!(object.len(), 1);
        assert!(!object["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_body_under_limit_accepted() {
        let image = png_base64(&solid_rgb(48, 48, [0, 0, 0]));
        let body = json!({ "image": image, "model": CNN }).to_string();
        let dispatcher = Dispatcher::new(Arc::new(fake_registry()));
        let app = build_router(AppState::new(dispatcher), body.len());
        let request = Request::builder()
            .method(Method::POST)
            .uri("/detect")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, value) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["healthy"], true);
        assert_eq!(value["models"], json!([VIT, CNN]));
        assert!(value["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_models() {
        let request = Request::builder().uri("/models").body(Body::empty()).unwrap();
        let (status, value) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        let models = value["models"].as_array().unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0]["id"], "vit-face-expression");
        assert_eq!(models[1]["id"], "mini-xception");
        assert_eq!(models[1]["name"], CNN);
        assert_eq!(models[1]["labels"][0], "Angry");
        assert_eq!(models[1]["labels"].as_array().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://example.com")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }
}
