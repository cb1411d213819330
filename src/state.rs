//! Application state
//!
//! Holds the shared controller handed to every handler

use crate::camera_controller::CameraController;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// CameraController (streams + PTZ)
    pub controller: Arc<CameraController>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    pub fn new(controller: Arc<CameraController>) -> Self {
        Self {
            controller,
            started_at: Instant::now(),
        }
    }
}
