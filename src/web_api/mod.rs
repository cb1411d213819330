//! WebAPI - HTTP Endpoints
//!
//! ## Responsibilities
//!
//! - Live MJPEG feeds
//! - PTZ control and stream restart
//! - Status reporting
//!
//! Control endpoints always answer 200 with a `success` flag; failures
//! never escape as HTTP errors.

mod ptz_routes;
mod routes;
mod stream_routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::models::FeedId;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let onvif_connected = state.controller.onvif_connected().await;
    let frame_age_ms = |feed: FeedId| {
        state
            .controller
            .frames()
            .latest(feed)
            .map(|f| f.age().as_millis() as u64)
    };

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_sec": state.started_at.elapsed().as_secs(),
        "onvif_connected": onvif_connected,
        "streams": state.controller.streams(),
        "frame_age_ms": {
            "ptz": frame_age_ms(FeedId::Ptz),
            "fixed": frame_age_ms(FeedId::Fixed),
        },
    }))
}
