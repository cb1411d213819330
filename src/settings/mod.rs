//! Settings - config file with built-in defaults
//!
//! ## Responsibilities
//!
//! - Load `config.toml` (or `$CAMSERVER_CONFIG`)
//! - Fill missing keys from defaults
//! - Write a default file on first run
//! - Derive per-feed `StreamConfig`

use crate::error::{Error, Result};
use crate::models::{FeedId, StreamConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Env var overriding the config file path
pub const CONFIG_PATH_ENV: &str = "CAMSERVER_CONFIG";

/// Shortest PTZ move in seconds
const MIN_PTZ_DURATION_SECS: f64 = 0.05;

/// Longest PTZ move in seconds
const MAX_PTZ_DURATION_SECS: f64 = 60.0;

/// Camera connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub ip: String,
    pub onvif_port: u16,
    pub username: String,
    pub password: String,
    /// Locator of the PTZ head feed; derived from ip/credentials when unset
    pub rtsp_ptz: Option<String>,
    /// Locator of the fixed lens feed; derived from ip/credentials when unset
    pub rtsp_fixed: Option<String>,
    pub onvif_timeout_ms: u64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            ip: "192.168.55.98".to_string(),
            onvif_port: 2020,
            username: "admin".to_string(),
            password: "admin".to_string(),
            rtsp_ptz: None,
            rtsp_fixed: None,
            onvif_timeout_ms: 10_000,
        }
    }
}

impl CameraSettings {
    /// ONVIF device service endpoint
    pub fn onvif_endpoint(&self) -> String {
        format!("http://{}:{}/onvif/device_service", self.ip, self.onvif_port)
    }

    pub fn locator(&self, feed: FeedId) -> String {
        let (configured, path) = match feed {
            FeedId::Ptz => (&self.rtsp_ptz, "stream6"),
            FeedId::Fixed => (&self.rtsp_fixed, "stream2"),
        };
        configured.clone().unwrap_or_else(|| {
            format!(
                "rtsp://{}:{}@{}:554/{}",
                self.username, self.password, self.ip, path
            )
        })
    }
}

/// PTZ move settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PtzSettings {
    /// Velocity magnitude, clamped to [0.05, 1.0] at move time
    pub speed: f32,
    /// Move duration in seconds before the automatic stop
    pub duration: f64,
}

impl Default for PtzSettings {
    fn default() -> Self {
        Self {
            speed: 0.4,
            duration: 0.5,
        }
    }
}

/// Stream acquisition settings shared by both feeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub target_fps: u32,
    pub buffer_depth: u32,
    pub read_timeout_ms: u64,
    pub jpeg_quality: u8,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            target_fps: 15,
            buffer_depth: 1,
            read_timeout_ms: 5_000,
            jpeg_quality: 80,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    /// Directory for `camera_debug.log`; empty disables the file log
    pub log_dir: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            debug: false,
            log_dir: ".".to_string(),
        }
    }
}

/// Whole config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub camera: CameraSettings,
    pub ptz: PtzSettings,
    pub stream: StreamSettings,
    pub server: ServerSettings,
}

impl Settings {
    /// Config path from the environment, falling back to `config.toml`
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Load settings, creating the file with defaults when it is missing
    ///
    /// Returns the settings and whether the file was created.
    pub fn load_or_create(path: &Path) -> Result<(Self, bool)> {
        if path.exists() {
            let text = std::fs::read_to_string(path)?;
            let settings: Settings = toml::from_str(&text)?;
            settings.validate()?;
            return Ok((settings, false));
        }

        let settings = Settings::default();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(&settings)?)?;
        Ok((settings, true))
    }

    /// Reject values that parse as TOML but cannot drive the service
    pub fn validate(&self) -> Result<()> {
        let duration = self.ptz.duration;
        if !duration.is_finite() || duration > MAX_PTZ_DURATION_SECS {
            return Err(Error::Config(format!(
                "ptz.duration must be a number of seconds up to {}, got {}",
                MAX_PTZ_DURATION_SECS, duration
            )));
        }
        if !self.ptz.speed.is_finite() {
            return Err(Error::Config(format!(
                "ptz.speed must be a finite number, got {}",
                self.ptz.speed
            )));
        }
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(Error::Config(format!(
                "stream.jpeg_quality must be between 1 and 100, got {}",
                self.stream.jpeg_quality
            )));
        }
        Ok(())
    }

    /// Bind address for the HTTP server
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn stream_config(&self, feed: FeedId) -> StreamConfig {
        StreamConfig {
            locator: self.camera.locator(feed),
            target_fps: self.stream.target_fps,
            buffer_depth: self.stream.buffer_depth,
            read_timeout: Duration::from_millis(self.stream.read_timeout_ms),
        }
    }

    /// Move duration with the 50ms floor applied
    pub fn ptz_duration(&self) -> Duration {
        // f64::max maps NaN to the floor
        let secs = self
            .ptz
            .duration
            .max(MIN_PTZ_DURATION_SECS)
            .min(MAX_PTZ_DURATION_SECS);
        Duration::from_secs_f64(secs)
    }
}
