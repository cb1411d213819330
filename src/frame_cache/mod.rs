//! FrameCache - Latest Frame per Feed
//!
//! ## Responsibilities
//!
//! - Hold the latest decoded frame and its capture time per feed
//! - Encode it to JPEG on demand (once per frame, shared by all readers)
//! - Wake streaming readers when a new frame is published
//!
//! Only the newest frame is kept. Slow readers skip frames instead of
//! queueing them.

use crate::error::Result;
use crate::models::FeedId;
use crate::video_source::Frame;
use bytes::Bytes;
use std::sync::{Arc, OnceLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

/// Default JPEG quality for live view
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Published frame with its capture timestamps
#[derive(Debug)]
pub struct CachedFrame {
    frame: Frame,
    /// Wall-clock capture time (reported by /status)
    captured_at: SystemTime,
    /// Monotonic capture time (used for staleness)
    captured_mono: Instant,
    /// Publish counter for the feed, starting at 1
    seq: u64,
    jpeg: OnceLock<Bytes>,
}

impl CachedFrame {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Capture time as unix seconds
    pub fn unix_time(&self) -> f64 {
        self.captured_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Time since capture
    pub fn age(&self) -> std::time::Duration {
        self.captured_mono.elapsed()
    }

    /// JPEG bytes, encoded on first use
    pub fn jpeg(&self, quality: u8) -> Result<Bytes> {
        if let Some(bytes) = self.jpeg.get() {
            return Ok(bytes.clone());
        }
        let encoded = Bytes::from(self.frame.to_jpeg(quality)?);
        // A concurrent reader may have won; both encodings are equivalent
        Ok(self.jpeg.get_or_init(|| encoded).clone())
    }
}

type Slot = watch::Sender<Option<Arc<CachedFrame>>>;

/// FrameCache service
pub struct FrameCache {
    ptz: Slot,
    fixed: Slot,
    quality: u8,
}

impl FrameCache {
    /// Create new FrameCache
    pub fn new(quality: u8) -> Self {
        Self {
            ptz: watch::channel(None).0,
            fixed: watch::channel(None).0,
            quality: quality.clamp(1, 100),
        }
    }

    /// Create with default quality
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }

    fn slot(&self, feed: FeedId) -> &Slot {
        match feed {
            FeedId::Ptz => &self.ptz,
            FeedId::Fixed => &self.fixed,
        }
    }

    /// Replace the latest frame of a feed
    ///
    /// Frame and timestamp are swapped in as one value.
    pub fn publish(&self, feed: FeedId, frame: Frame, captured_at: SystemTime) {
        let slot = self.slot(feed);
        let seq = slot.borrow().as_ref().map_or(0, |f| f.seq) + 1;
        let entry = Arc::new(CachedFrame {
            frame,
            captured_at,
            captured_mono: Instant::now(),
            seq,
            jpeg: OnceLock::new(),
        });
        slot.send_replace(Some(entry));

        tracing::trace!(feed = %feed, seq = seq, "Published frame");
    }

    /// Latest frame of a feed, if any was published
    pub fn latest(&self, feed: FeedId) -> Option<Arc<CachedFrame>> {
        self.slot(feed).borrow().clone()
    }

    /// Latest frame as JPEG, or `None` before the first publish
    pub fn get_jpeg(&self, feed: FeedId) -> Result<Option<Bytes>> {
        match self.latest(feed) {
            Some(entry) => entry.jpeg(self.quality).map(Some),
            None => Ok(None),
        }
    }

    /// Capture time of the latest frame as unix seconds, 0 when none
    pub fn last_frame_time(&self, feed: FeedId) -> f64 {
        self.latest(feed).map_or(0.0, |f| f.unix_time())
    }

    pub fn has_frame(&self, feed: FeedId) -> bool {
        self.slot(feed).borrow().is_some()
    }

    /// Receiver that wakes on every publish to the feed
    pub fn subscribe(&self, feed: FeedId) -> watch::Receiver<Option<Arc<CachedFrame>>> {
        self.slot(feed).subscribe()
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}
