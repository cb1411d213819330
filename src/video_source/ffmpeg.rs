//! ffmpeg-backed RTSP source
//!
//! Runs one ffmpeg process per connection and decodes its stdout as a
//! stream of binary PPM (P6) images.

use super::{Frame, VideoSource, VideoSourceFactory};
use crate::error::{Error, Result};
use crate::models::StreamConfig;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};

/// Longest header token accepted (magic, width, height, maxval)
const MAX_TOKEN_LEN: usize = 16;

/// Largest width or height accepted from a PPM header
const MAX_DIMENSION: u32 = 8192;

/// Opens ffmpeg RTSP connections
#[derive(Debug, Clone)]
pub struct FfmpegSourceFactory {
    binary: String,
}

impl FfmpegSourceFactory {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }

    /// Use a specific ffmpeg binary
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(config: &StreamConfig) -> Vec<String> {
        let mut args: Vec<String> = vec!["-rtsp_transport".into(), "tcp".into()];
        if config.buffer_depth <= 1 {
            args.extend(["-fflags", "nobuffer", "-flags", "low_delay"].map(String::from));
        }
        args.extend([
            "-i".to_string(),
            config.locator.clone(),
            "-an".to_string(),
            "-r".to_string(),
            config.target_fps.max(1).to_string(),
            "-f".to_string(),
            "image2pipe".to_string(),
            "-vcodec".to_string(),
            "ppm".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-".to_string(),
        ]);
        args
    }
}

impl Default for FfmpegSourceFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoSourceFactory for FfmpegSourceFactory {
    async fn open(&self, config: &StreamConfig) -> Result<Box<dyn VideoSource>> {
        let mut child = Command::new(&self.binary)
            .args(Self::args(config))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Stream(format!("ffmpeg spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("ffmpeg stdout not captured".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            let locator = config.display_locator();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(locator = %locator, "ffmpeg: {}", line);
                }
            });
        }

        tracing::debug!(
            locator = %config.display_locator(),
            pid = ?child.id(),
            "ffmpeg source started"
        );

        Ok(Box::new(FfmpegSource {
            child: Some(child),
            stdout: BufReader::new(stdout),
            read_timeout: config.read_timeout,
        }))
    }
}

/// One running ffmpeg process
pub struct FfmpegSource {
    child: Option<Child>,
    stdout: BufReader<ChildStdout>,
    read_timeout: Duration,
}

#[async_trait]
impl VideoSource for FfmpegSource {
    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        // A timeout can cut a frame in half, so the pipe is unusable afterwards
        match tokio::time::timeout(self.read_timeout, read_ppm_frame(&mut self.stdout)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Stream(format!(
                "frame read timed out after {}ms",
                self.read_timeout.as_millis()
            ))),
        }
    }

    async fn release(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "ffmpeg kill failed (already exited?)");
            }
        }
    }
}

/// Read one binary PPM image
///
/// `Ok(None)` when the stream ends before or inside a frame.
pub(crate) async fn read_ppm_frame<R>(reader: &mut R) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let magic = match read_token(reader).await? {
        Some(token) => token,
        None => return Ok(None),
    };
    if magic != "P6" {
        return Err(Error::Stream(format!("unexpected image magic {:?}", magic)));
    }

    let width = read_number(reader).await?;
    let height = read_number(reader).await?;
    let maxval = read_number(reader).await?;
    let (Some(width), Some(height), Some(maxval)) = (width, height, maxval) else {
        return Ok(None);
    };
    if maxval != 255 {
        return Err(Error::Stream(format!("unsupported PPM maxval {}", maxval)));
    }

    let len = frame_len(width, height)?;
    let mut data = vec![0u8; len];
    match reader.read_exact(&mut data).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    Frame::new(width, height, data).map(Some)
}

/// RGB byte length for a header, rejecting corrupt dimensions
fn frame_len(width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(Error::Stream(format!(
            "PPM dimensions {}x{} out of range",
            width, height
        )));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(3))
        .ok_or_else(|| Error::Stream(format!("PPM dimensions {}x{} overflow", width, height)))
}

async fn read_number<R>(reader: &mut R) -> Result<Option<u32>>
where
    R: AsyncRead + Unpin,
{
    match read_token(reader).await? {
        Some(token) => token
            .parse()
            .map(Some)
            .map_err(|_| Error::Stream(format!("invalid PPM header value {:?}", token))),
        None => Ok(None),
    }
}

/// Whitespace-delimited header token; consumes exactly one trailing whitespace byte
async fn read_token<R>(reader: &mut R) -> Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut token = Vec::new();
    loop {
        let byte = match reader.read_u8().await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(if token.is_empty() {
                    None
                } else {
                    Some(String::from_utf8_lossy(&token).into_owned())
                });
            }
            Err(e) => return Err(e.into()),
        };

        if byte.is_ascii_whitespace() {
            if token.is_empty() {
                continue;
            }
            return Ok(Some(String::from_utf8_lossy(&token).into_owned()));
        }

        token.push(byte);
        if token.len() > MAX_TOKEN_LEN {
            return Err(Error::Stream("PPM header token too long".to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ppm(width: u32, height: u32, fill: u8) -> Vec<u8> {
        let mut bytes = format!("P6\n{} {}\n255\n", width, height).into_bytes();
        bytes.extend(std::iter::repeat(fill).take((width * height * 3) as usize));
        bytes
    }

    #[tokio::test]
    async fn test_reads_consecutive_frames() {
        let mut bytes = ppm(2, 1, 10);
        bytes.extend(ppm(1, 1, 20));
        let mut reader = bytes.as_slice();

        let first = read_ppm_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!((first.width, first.height), (2, 1));
        assert_eq!(first.data, vec![10; 6]);

        let second = read_ppm_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(second.data, vec![20; 3]);

        assert!(read_ppm_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pixel_data_starting_with_whitespace_byte() {
        // 0x0A is a valid first pixel value, not header padding
        let bytes = ppm(1, 1, b'\n');
        let mut reader = bytes.as_slice();
        let frame = read_ppm_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(frame.data, vec![b'\n'; 3]);
    }

    #[tokio::test]
    async fn test_truncated_frame_is_failed_read() {
        let mut bytes = ppm(4, 4, 0);
        bytes.truncate(bytes.len() - 5);
        let mut reader = bytes.as_slice();
        assert!(read_ppm_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bad_magic_is_fault() {
        let bytes = b"P5\n1 1\n255\n\0".to_vec();
        let mut reader = bytes.as_slice();
        assert!(matches!(
            read_ppm_frame(&mut reader).await,
            Err(Error::Stream(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_header_is_fault() {
        let mut bytes = b"P6\n4294967295 4294967295\n255\n".to_vec();
        bytes.extend([0u8; 16]);
        let mut reader = bytes.as_slice();
        assert!(matches!(
            read_ppm_frame(&mut reader).await,
            Err(Error::Stream(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_width_is_fault() {
        let bytes = b"P6\n0 1\n255\n".to_vec();
        let mut reader = bytes.as_slice();
        assert!(matches!(
            read_ppm_frame(&mut reader).await,
            Err(Error::Stream(_))
        ));
    }

    #[test]
    fn test_frame_len_limits() {
        assert_eq!(frame_len(640, 480).unwrap(), 640 * 480 * 3);
        assert_eq!(frame_len(MAX_DIMENSION, MAX_DIMENSION).unwrap(), 8192 * 8192 * 3);
        assert!(frame_len(MAX_DIMENSION + 1, 1).is_err());
    }

    #[test]
    fn test_low_latency_args() {
        let config = StreamConfig::new("rtsp://cam/stream6");
        let args = FfmpegSourceFactory::args(&config);
        assert!(args.contains(&"nobuffer".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-r" && w[1] == "15"));
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == "rtsp://cam/stream6"));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }
}
