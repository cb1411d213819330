//! API Routes

use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::{ptz_routes, stream_routes};
use crate::camera_controller::RestartTarget;
use crate::models::StatusResponse;
use crate::state::AppState;

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Operator UI
        .route("/", get(index))
        // Live feeds
        .route("/video_feed", get(stream_routes::video_feed))
        .route("/video_feed_fixed", get(stream_routes::video_feed_fixed))
        // PTZ
        .route("/ptz_control", post(ptz_routes::ptz_control))
        .route("/ptz_status", get(ptz_routes::ptz_status))
        // Streams & device
        .route("/restart_stream", post(restart_stream))
        .route("/reconnect_onvif", post(reconnect_onvif))
        // Status
        .route("/status", get(status))
        .route("/healthz", get(super::health_check))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Debug, Default, Deserialize)]
pub struct RestartStreamRequest {
    #[serde(default)]
    pub stream: Option<String>,
}

/// POST /restart_stream
///
/// Body is optional; a missing or unknown `stream` restarts both feeds.
async fn restart_stream(
    State(state): State<AppState>,
    payload: Option<Json<RestartStreamRequest>>,
) -> impl IntoResponse {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let target = RestartTarget::parse(request.stream.as_deref());

    tracing::info!(target = ?target, "Stream restart requested");
    state.controller.restart_stream(target).await;

    Json(json!({
        "success": true,
        "message": target.message(),
    }))
}

/// POST /reconnect_onvif
async fn reconnect_onvif(State(state): State<AppState>) -> impl IntoResponse {
    let connected = state.controller.reconnect_onvif().await;
    Json(json!({
        "success": connected,
        "onvif_connected": connected,
    }))
}

/// GET /status
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(state.controller.status().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_controller::CameraController;
    use crate::models::FeedId;
    use crate::settings::Settings;
    use crate::testing::{wait_until, FakePtzConnector, FakeVideoSourceFactory};
    use std::sync::Arc;

    fn state() -> AppState {
        AppState::new(Arc::new(CameraController::new(
            Settings::default(),
            Arc::new(FakePtzConnector::unreachable()),
            Arc::new(FakeVideoSourceFactory::healthy()),
        )))
    }

    #[tokio::test]
    async fn test_status_with_no_frames() {
        let Json(status) = status(State(state())).await;
        let value = serde_json::to_value(status).unwrap();
        assert_eq!(
            value,
            json!({
                "onvif_connected": false,
                "ptz_stream_active": false,
                "fixed_stream_active": false,
                "last_frame_time_ptz": 0.0,
                "last_frame_time_fixed": 0.0,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_stream_ptz_only() {
        let state = state();
        let response = restart_stream(
            State(state.clone()),
            Some(Json(RestartStreamRequest {
                stream: Some("ptz".to_string()),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);

        assert!(state.controller.worker(FeedId::Ptz).is_running());
        assert!(!state.controller.worker(FeedId::Fixed).is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_stream_defaults_to_all() {
        let state = state();
        restart_stream(State(state.clone()), None).await;

        assert!(state.controller.worker(FeedId::Ptz).is_running());
        assert!(state.controller.worker(FeedId::Fixed).is_running());

        wait_until(|| state.controller.stream_active(FeedId::Fixed)).await;
        let Json(status) = status(State(state.clone())).await;
        assert!(status.fixed_stream_active);
        assert!(status.last_frame_time_fixed > 0.0);
    }

    #[tokio::test]
    async fn test_reconnect_onvif_reports_state() {
        let response = reconnect_onvif(State(state())).await.into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"success": false, "onvif_connected": false}));
    }

    #[tokio::test]
    async fn test_health_check_reports_workers() {
        let response = super::super::health_check(State(state())).await.into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["streams"]["ptz"]["state"], "idle");
        assert_eq!(value["frame_age_ms"]["fixed"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_index_served() {
        let Html(page) = index().await;
        assert!(page.contains("/video_feed"));
        assert!(page.contains("/ptz_control"));
    }

    #[test]
    fn test_router_builds() {
        let _router = create_router(state());
    }
}
