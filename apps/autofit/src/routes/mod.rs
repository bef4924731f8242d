pub mod health;
pub mod render;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/render", post(render::handle_render))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::layout::FontFamily;
    use crate::queue::QueueSettings;
    use crate::session::SessionSettings;

    fn state() -> AppState {
        let config = Config {
            port: 0,
            rust_log: "info".to_string(),
            font: FontFamily::Inter,
            sparsity_threshold: 0.85,
            max_iterations: 25,
            ready_interval_ms: 10,
            handshake_timeout_ms: 2000,
            debounce_ms: 20,
            dedup_window_ms: 1000,
            render_timeout_ms: 10000,
            profile_path: None,
        };
        AppState {
            settings: SessionSettings {
                ready_interval: Duration::from_millis(10),
                queue: QueueSettings {
                    debounce: Duration::from_millis(20),
                    dedup_window: Duration::from_millis(1000),
                },
                ..SessionSettings::default()
            },
            config,
        }
    }

    async fn post_render(body: Value) -> (StatusCode, Value) {
        let response = build_router(state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/render")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let response = build_router(state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_render_returns_report() {
        let markdown = "# Jane Doe\n\n## Experience\n\n- Shipped the billing service\n- Led the migration\n";
        let (status, body) = post_render(json!({ "markdown": markdown })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["current_pages"], 1);
        assert_eq!(body["auto_fit_status"]["run"], true);
        assert_eq!(body["content_stats"]["li_count"], 2);
        assert!(body["job_id"].is_string());
    }

    #[tokio::test]
    async fn test_view_options_are_accepted() {
        let (status, body) = post_render(json!({
            "markdown": "# Title\n\nBody",
            "view_options": { "show-guides": "on" },
            "auto_fit": false
        }))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_pages"], 1);
        assert_eq!(body["auto_fit_status"]["run"], false);
    }

    #[tokio::test]
    async fn test_empty_markdown_is_rejected() {
        let (status, body) = post_render(json!({ "markdown": "  \n" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "EMPTY_CONTENT");
    }

    #[tokio::test]
    async fn test_non_custom_property_style_is_rejected() {
        let (status, body) = post_render(json!({
            "markdown": "# Title",
            "styles": { "margin": "3mm" }
        }))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }
}
