//! VideoSource - decoded frame providers
//!
//! ## Responsibilities
//!
//! - `Frame`: decoded RGB image
//! - `VideoSource`: one open connection yielding frames
//! - `VideoSourceFactory`: opens connections for a `StreamConfig`
//!
//! `FfmpegSourceFactory` is the production implementation (RTSP via ffmpeg).

mod ffmpeg;

pub use ffmpeg::{FfmpegSource, FfmpegSourceFactory};

use crate::error::{Error, Result};
use crate::models::StreamConfig;
use async_trait::async_trait;
use image::{ImageBuffer, Rgb};

/// Decoded video frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Raw RGB data (3 bytes per pixel, row-major)
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(Error::Stream(format!(
                "frame {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    /// Encode as JPEG
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let img: ImageBuffer<Rgb<u8>, &[u8]> =
            ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
                .ok_or_else(|| Error::Internal("frame buffer size mismatch".to_string()))?;

        let mut jpeg = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
        encoder.encode_image(&img)?;
        Ok(jpeg)
    }
}

/// One open video connection
///
/// `read_frame` returns `Ok(None)` for a failed read the caller may retry,
/// and `Err` for a fault that invalidates the connection.
#[async_trait]
pub trait VideoSource: Send {
    async fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying connection
    async fn release(&mut self);
}

/// Opens `VideoSource`s
#[async_trait]
pub trait VideoSourceFactory: Send + Sync {
    async fn open(&self, config: &StreamConfig) -> Result<Box<dyn VideoSource>>;
}
