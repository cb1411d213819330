//! Error handling for the PTZ camserver

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Control session or profile missing
    #[error("Device not ready: {0}")]
    NotReady(String),

    /// Selected profile carries no PTZ configuration
    #[error("PTZ not supported by profile {0}")]
    PtzUnsupported(String),

    /// Device rejected a command or answered with a SOAP fault
    #[error("Device error: {0}")]
    Device(String),

    /// Network error talking to the camera
    #[error("Network error: {0}")]
    Network(String),

    /// Video stream error
    #[error("Stream error: {0}")]
    Stream(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JPEG encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Config file parse error
    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// Config file write error
    #[error("Config write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            Error::NotReady(_) => (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY"),
            Error::PtzUnsupported(_) => (StatusCode::CONFLICT, "PTZ_UNSUPPORTED"),
            Error::Device(_) => (StatusCode::BAD_GATEWAY, "DEVICE_ERROR"),
            Error::Network(_) | Error::Http(_) => (StatusCode::BAD_GATEWAY, "NETWORK_ERROR"),
            Error::Stream(_) => (StatusCode::SERVICE_UNAVAILABLE, "STREAM_ERROR"),
            Error::Config(_) | Error::TomlDe(_) | Error::TomlSer(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR")
            }
            Error::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Error::Image(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IMAGE_ERROR"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        let message = self.to_string();

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
