//! PTZ Camserver Library
//!
//! Live view and pan-tilt-zoom control for a dual-lens network camera.
//!
//! ## Architecture (6 Components)
//!
//! 1. VideoSource - Decoded frames from an RTSP feed (ffmpeg)
//! 2. StreamWorker - Per-feed connect/read/reconnect loop
//! 3. FrameCache - Latest frame per feed, JPEG on demand
//! 4. PtzController - Direction table, timed move sequencing, ONVIF client
//! 5. CameraController - Facade owning settings, workers and the PTZ session
//! 6. WebAPI - MJPEG feeds, PTZ control, status
//!
//! ## Data Flow
//!
//! - StreamWorker -> FrameCache -> MJPEG handler -> browser
//! - PTZ handler -> CameraController -> PtzSequencer -> camera

pub mod camera_controller;
pub mod error;
pub mod frame_cache;
pub mod models;
pub mod ptz_controller;
pub mod settings;
pub mod state;
pub mod stream_worker;
pub mod video_source;
pub mod web_api;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use state::AppState;
