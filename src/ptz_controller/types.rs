//! PTZ Controller type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest speed a move is issued with
pub const MIN_SPEED: f32 = 0.05;
/// Highest speed a move is issued with
pub const MAX_SPEED: f32 = 1.0;

/// PTZ move direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtzDirection {
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
    ZoomIn,
    ZoomOut,
}

impl PtzDirection {
    pub const ALL: [PtzDirection; 10] = [
        Self::Up,
        Self::Down,
        Self::Left,
        Self::Right,
        Self::UpLeft,
        Self::UpRight,
        Self::DownLeft,
        Self::DownRight,
        Self::ZoomIn,
        Self::ZoomOut,
    ];

    /// Parse a direction symbol as sent by the operator UI
    pub fn parse(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == symbol)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
            Self::UpLeft => "upleft",
            Self::UpRight => "upright",
            Self::DownLeft => "downleft",
            Self::DownRight => "downright",
            Self::ZoomIn => "zoom_in",
            Self::ZoomOut => "zoom_out",
        }
    }

    /// (pan, tilt, zoom) for speed `s`
    pub fn components(&self, s: f32) -> (f32, f32, f32) {
        match self {
            Self::Up => (0.0, s, 0.0),
            Self::Down => (0.0, -s, 0.0),
            Self::Left => (-s, 0.0, 0.0),
            Self::Right => (s, 0.0, 0.0),
            Self::UpLeft => (-s, s, 0.0),
            Self::UpRight => (s, s, 0.0),
            Self::DownLeft => (-s, -s, 0.0),
            Self::DownRight => (s, -s, 0.0),
            Self::ZoomIn => (0.0, 0.0, s),
            Self::ZoomOut => (0.0, 0.0, -s),
        }
    }
}

impl fmt::Display for PtzDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamp a configured speed into the accepted range
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_nan() {
        return MIN_SPEED;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

/// Pan/tilt velocity component
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PanTilt {
    pub x: f32,
    pub y: f32,
}

/// ContinuousMove velocity
///
/// A component is present only when it moves something.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Velocity {
    pub pan_tilt: Option<PanTilt>,
    pub zoom: Option<f32>,
}

impl Velocity {
    pub fn from_components(pan: f32, tilt: f32, zoom: f32) -> Self {
        Self {
            pan_tilt: (pan != 0.0 || tilt != 0.0).then_some(PanTilt { x: pan, y: tilt }),
            zoom: (zoom != 0.0).then_some(zoom),
        }
    }

    /// Velocity for a direction symbol; unknown symbols give the zero vector
    pub fn for_symbol(symbol: &str, speed: f32) -> Self {
        let (pan, tilt, zoom) = PtzDirection::parse(symbol)
            .map(|d| d.components(speed))
            .unwrap_or((0.0, 0.0, 0.0));
        Self::from_components(pan, tilt, zoom)
    }

    pub fn is_zero(&self) -> bool {
        self.pan_tilt.is_none() && self.zoom.is_none()
    }
}

/// Media profile offered by the camera
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaProfile {
    pub token: String,
    pub name: Option<String>,
    /// PTZConfiguration token, if the profile carries one
    pub ptz_configuration: Option<String>,
}

impl MediaProfile {
    pub fn supports_ptz(&self) -> bool {
        self.ptz_configuration.is_some()
    }
}

/// Profile chosen at connect time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PtzProfile {
    pub profile_token: String,
    pub supports_ptz: bool,
}

impl PtzProfile {
    /// First PTZ-capable profile, otherwise the first offered
    pub fn select(profiles: &[MediaProfile]) -> Option<Self> {
        let chosen = profiles
            .iter()
            .find(|p| p.supports_ptz())
            .or_else(|| profiles.first())?;
        Some(Self {
            profile_token: chosen.token.clone(),
            supports_ptz: chosen.supports_ptz(),
        })
    }
}

/// Device position and motion state (GetStatus)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PtzStatus {
    pub pan: Option<f32>,
    pub tilt: Option<f32>,
    pub zoom: Option<f32>,
    /// MoveStatus of pan/tilt, e.g. "IDLE" or "MOVING"
    pub move_status: Option<String>,
}

/// POST /ptz_control body
#[derive(Debug, Clone, Deserialize)]
pub struct PtzControlRequest {
    pub direction: String,
}

/// POST /ptz_control result
#[derive(Debug, Clone, Serialize)]
pub struct PtzControlResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PtzControlResponse {
    pub fn success(direction: impl Into<String>) -> Self {
        Self {
            success: true,
            direction: Some(direction.into()),
            error: None,
        }
    }

    pub fn failure(direction: Option<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            direction,
            error: Some(error.into()),
        }
    }
}
