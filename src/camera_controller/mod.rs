//! CameraController - Facade over streams and PTZ
//!
//! ## Responsibilities
//!
//! - Own the settings and both StreamWorkers
//! - Run the ONVIF connect sequence (profiles, PTZ profile selection, status probe)
//! - Expose the operations the HTTP layer calls
//!
//! ## Connection lifecycle
//!
//! The connect sequence runs once at construction. A failed connect leaves
//! the controller disconnected; only `reconnect_onvif()` retries it.

use crate::error::{Error, Result};
use crate::frame_cache::FrameCache;
use crate::models::{FeedId, StatusResponse};
use crate::ptz_controller::{
    PtzConnector, PtzProfile, PtzSequencer, PtzSession, PtzStatus, Velocity,
};
use crate::settings::Settings;
use crate::stream_worker::{RetryPolicy, StreamWorker, WorkerSnapshot};
use crate::video_source::VideoSourceFactory;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Which feeds a restart applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartTarget {
    Feed(FeedId),
    All,
}

impl RestartTarget {
    /// "ptz" and "fixed" select one feed; anything else (or nothing) means all
    pub fn parse(stream: Option<&str>) -> Self {
        match stream {
            Some("ptz") => Self::Feed(FeedId::Ptz),
            Some("fixed") => Self::Feed(FeedId::Fixed),
            _ => Self::All,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Feed(FeedId::Ptz) => "PTZ video stream restarted",
            Self::Feed(FeedId::Fixed) => "Fixed video stream restarted",
            Self::All => "All video streams restarted",
        }
    }
}

/// Worker view of both feeds
#[derive(Debug, Clone, Serialize)]
pub struct StreamsSnapshot {
    pub ptz: WorkerSnapshot,
    pub fixed: WorkerSnapshot,
}

/// CameraController instance
pub struct CameraController {
    settings: Settings,
    connector: Arc<dyn PtzConnector>,
    frames: Arc<FrameCache>,
    ptz_stream: StreamWorker,
    fixed_stream: StreamWorker,
    sequencer: PtzSequencer,
    /// Serializes connect attempts
    connect_lock: Mutex<()>,
    /// Flips to true on shutdown so live viewers disconnect
    closing: watch::Sender<bool>,
}

impl CameraController {
    /// Build the controller without touching the device
    pub fn new(
        settings: Settings,
        connector: Arc<dyn PtzConnector>,
        sources: Arc<dyn VideoSourceFactory>,
    ) -> Self {
        let frames = Arc::new(FrameCache::new(settings.stream.jpeg_quality));
        let worker = |feed: FeedId| {
            StreamWorker::new(
                feed,
                settings.stream_config(feed),
                Arc::clone(&sources),
                Arc::clone(&frames),
                RetryPolicy::default(),
            )
        };
        let ptz_stream = worker(FeedId::Ptz);
        let fixed_stream = worker(FeedId::Fixed);
        let sequencer = PtzSequencer::new(settings.ptz.speed, settings.ptz_duration());

        Self {
            settings,
            connector,
            frames,
            ptz_stream,
            fixed_stream,
            sequencer,
            connect_lock: Mutex::new(()),
            closing: watch::channel(false).0,
        }
    }

    /// Build the controller and run the connect sequence once
    pub async fn connect(
        settings: Settings,
        connector: Arc<dyn PtzConnector>,
        sources: Arc<dyn VideoSourceFactory>,
    ) -> Self {
        let controller = Self::new(settings, connector, sources);
        controller.connect_onvif().await;
        controller
    }

    /// Run the connect sequence; returns whether the controller is connected
    ///
    /// Failure is logged and leaves the controller disconnected.
    pub async fn connect_onvif(&self) -> bool {
        let _guard = self.connect_lock.lock().await;
        let camera = &self.settings.camera;

        tracing::info!(
            camera_ip = %camera.ip,
            onvif_port = camera.onvif_port,
            username = %camera.username,
            "ONVIF connection start"
        );

        match self.open_session().await {
            Ok(session) => {
                self.sequencer.attach(session).await;
                tracing::info!(
                    camera_ip = %camera.ip,
                    onvif_port = camera.onvif_port,
                    "ONVIF connection successful"
                );
                true
            }
            Err(e) => {
                tracing::error!(camera_ip = %camera.ip, error = %e, "ONVIF connection failed");
                self.sequencer.detach().await;
                false
            }
        }
    }

    async fn open_session(&self) -> Result<PtzSession> {
        let device = self.connector.open().await?;

        let profiles = device.get_profiles().await?;
        tracing::info!(count = profiles.len(), "Media profiles received");
        for (index, profile) in profiles.iter().enumerate() {
            tracing::info!(
                index = index,
                token = %profile.token,
                name = profile.name.as_deref().unwrap_or("-"),
                ptz = profile.supports_ptz(),
                "Media profile"
            );
        }

        let profile = PtzProfile::select(&profiles)
            .ok_or_else(|| Error::Device("No media profiles found".to_string()))?;
        if profile.supports_ptz {
            tracing::info!(profile = %profile.profile_token, "Selected PTZ-enabled profile");
        } else {
            tracing::warn!(
                profile = %profile.profile_token,
                "No PTZ configuration found, using first profile"
            );
        }

        match device.get_status(&profile.profile_token).await {
            Ok(status) => tracing::info!(status = ?status, "PTZ status probe successful"),
            Err(e) => tracing::warn!(error = %e, "PTZ status probe failed"),
        }

        Ok(PtzSession { device, profile })
    }

    /// Explicit operator reconnect
    pub async fn reconnect_onvif(&self) -> bool {
        tracing::info!("ONVIF reconnect requested");
        self.connect_onvif().await
    }

    pub async fn onvif_connected(&self) -> bool {
        self.sequencer.is_ready().await
    }

    pub async fn ptz_profile(&self) -> Option<PtzProfile> {
        self.sequencer.profile().await
    }

    pub fn frames(&self) -> &Arc<FrameCache> {
        &self.frames
    }

    pub fn worker(&self, feed: FeedId) -> &StreamWorker {
        match feed {
            FeedId::Ptz => &self.ptz_stream,
            FeedId::Fixed => &self.fixed_stream,
        }
    }

    /// Start a feed's worker if it is not running
    pub fn start_stream(&self, feed: FeedId) -> bool {
        self.worker(feed).start()
    }

    pub fn stop_stream(&self, feed: FeedId) {
        self.worker(feed).stop();
    }

    pub async fn restart_stream(&self, target: RestartTarget) {
        match target {
            RestartTarget::Feed(feed) => self.worker(feed).restart().await,
            RestartTarget::All => {
                tokio::join!(self.ptz_stream.restart(), self.fixed_stream.restart());
            }
        }
    }

    /// Feed has produced a frame and its worker is alive
    pub fn stream_active(&self, feed: FeedId) -> bool {
        self.frames.has_frame(feed) && self.worker(feed).state().is_live()
    }

    pub fn streams(&self) -> StreamsSnapshot {
        StreamsSnapshot {
            ptz: self.ptz_stream.snapshot(),
            fixed: self.fixed_stream.snapshot(),
        }
    }

    pub async fn move_ptz(&self, direction: &str) -> Result<Velocity> {
        self.sequencer.move_direction(direction).await
    }

    pub async fn stop_ptz(&self) -> Result<()> {
        self.sequencer.stop().await
    }

    pub async fn ptz_status(&self) -> Result<PtzStatus> {
        self.sequencer.status().await
    }

    pub async fn status(&self) -> StatusResponse {
        StatusResponse {
            onvif_connected: self.onvif_connected().await,
            ptz_stream_active: self.stream_active(FeedId::Ptz),
            fixed_stream_active: self.stream_active(FeedId::Fixed),
            last_frame_time_ptz: self.frames.last_frame_time(FeedId::Ptz),
            last_frame_time_fixed: self.frames.last_frame_time(FeedId::Fixed),
        }
    }

    /// Receiver that turns true once shutdown begins
    pub fn closing(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }

    /// Stop both workers and end live viewer streams
    pub fn shutdown(&self) {
        tracing::info!("Stopping video streams");
        self.closing.send_replace(true);
        for feed in FeedId::ALL {
            self.stop_stream(feed);
        }
    }
}
