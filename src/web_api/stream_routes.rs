//! Live feed routes
//!
//! `multipart/x-mixed-replace` MJPEG streams, one part per published frame.

use crate::error::{Error, Result};
use crate::frame_cache::CachedFrame;
use crate::models::FeedId;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::{BufMut, Bytes, BytesMut};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::watch;

pub const MULTIPART_BOUNDARY: &str = "frame";
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// GET /video_feed
pub async fn video_feed(State(state): State<AppState>) -> Response {
    mjpeg_stream(&state, FeedId::Ptz)
}

/// GET /video_feed_fixed
pub async fn video_feed_fixed(State(state): State<AppState>) -> Response {
    mjpeg_stream(&state, FeedId::Fixed)
}

/// Per-client stream position
struct FeedReader {
    feed: FeedId,
    rx: watch::Receiver<Option<Arc<CachedFrame>>>,
    closing: watch::Receiver<bool>,
    quality: u8,
    last_seq: u64,
}

fn mjpeg_stream(state: &AppState, feed: FeedId) -> Response {
    if state.controller.start_stream(feed) {
        tracing::info!(feed = %feed, "Stream started by viewer");
    }

    let frames = state.controller.frames();
    let reader = FeedReader {
        feed,
        rx: frames.subscribe(feed),
        closing: state.controller.closing(),
        quality: frames.quality(),
        last_seq: 0,
    };
    tracing::debug!(feed = %feed, "MJPEG viewer connected");

    // Ends only on shutdown
    let parts = futures::stream::unfold(reader, |mut reader| async move {
        loop {
            if *reader.closing.borrow() {
                tracing::debug!(feed = %reader.feed, "MJPEG viewer closed by shutdown");
                return None;
            }
            let latest = reader.rx.borrow_and_update().clone();
            if let Some(entry) = latest.filter(|e| e.seq() != reader.last_seq) {
                reader.last_seq = entry.seq();
                match encode(entry, reader.quality).await {
                    Ok(jpeg) => return Some((Ok::<_, Infallible>(multipart_part(&jpeg)), reader)),
                    Err(e) => tracing::warn!(feed = %reader.feed, error = %e, "JPEG encode failed"),
                }
            }
            tokio::select! {
                changed = reader.rx.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                closed = reader.closing.changed() => {
                    if closed.is_err() {
                        return None;
                    }
                }
            }
        }
    });

    (
        [(header::CONTENT_TYPE, MULTIPART_CONTENT_TYPE)],
        Body::from_stream(parts),
    )
        .into_response()
}

/// Encode off the async threads
async fn encode(entry: Arc<CachedFrame>, quality: u8) -> Result<Bytes> {
    tokio::task::spawn_blocking(move || entry.jpeg(quality))
        .await
        .map_err(|e| Error::Internal(format!("encoder task failed: {}", e)))?
}

fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(jpeg.len() + 64);
    part.put_slice(b"--");
    part.put_slice(MULTIPART_BOUNDARY.as_bytes());
    part.put_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}
