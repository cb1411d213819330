//! StreamWorker - Per-Feed Acquisition Loop
//!
//! ## Responsibilities
//!
//! - Keep one video feed connected, tolerating transient failures
//! - Publish every decoded frame to the FrameCache
//! - Back off and reconnect on connection faults, give up after the retry budget
//!
//! ## Loop states
//!
//! CONNECTING -> READING -> FAILED -> BACKOFF -> CONNECTING ...
//!
//! - A failed probe read releases the connection and retries after 2s
//!   without touching the retry budget.
//! - 10 consecutive failed reads, a read fault or an open fault all count as
//!   one FAILED transition.
//! - After 5 FAILED transitions without a successful probe the worker
//!   terminates and stays down until `restart()`.
//!
//! A panic inside the video source is caught and handled like a fault.
//!
//! Stop is cooperative: the loop checks its generation at every iteration
//! and every sleep is cut short by `stop()`.

mod types;

pub use types::*;

use crate::error::{Error, Result};
use crate::frame_cache::FrameCache;
use crate::models::{FeedId, StreamConfig};
use crate::video_source::{VideoSource, VideoSourceFactory};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Why the read loop returned
enum ReadOutcome {
    /// Stop requested or superseded by a newer start
    Stopped,
    /// Too many consecutive failed reads
    Exhausted(u32),
    /// Source reported a fault
    Fault(Error),
}

/// State shared between the handle and its loop
struct WorkerInner {
    feed: FeedId,
    config: StreamConfig,
    sources: Arc<dyn VideoSourceFactory>,
    frames: Arc<FrameCache>,
    policy: RetryPolicy,
    running: AtomicBool,
    /// Bumped by every start/stop; a loop only acts while it owns the current value
    generation: AtomicU64,
    state: Mutex<WorkerState>,
    retry_count: AtomicU32,
    consecutive_failures: AtomicU32,
    wake: Notify,
}

/// StreamWorker instance (one per physical feed)
pub struct StreamWorker {
    inner: Arc<WorkerInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamWorker {
    /// Create new StreamWorker
    pub fn new(
        feed: FeedId,
        config: StreamConfig,
        sources: Arc<dyn VideoSourceFactory>,
        frames: Arc<FrameCache>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                feed,
                config,
                sources,
                frames,
                policy,
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                state: Mutex::new(WorkerState::Idle),
                retry_count: AtomicU32::new(0),
                consecutive_failures: AtomicU32::new(0),
                wake: Notify::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Launch the worker loop
    ///
    /// No-op when already running or terminated. Returns whether a loop was launched.
    pub fn start(&self) -> bool {
        let inner = &self.inner;
        let generation = {
            let mut state = inner.lock_state();
            if *state == WorkerState::Terminated {
                tracing::warn!(
                    feed = %inner.feed,
                    "Stream worker terminated after max retries, restart required"
                );
                return false;
            }
            if inner.running.swap(true, Ordering::SeqCst) {
                return false;
            }
            inner.retry_count.store(0, Ordering::SeqCst);
            inner.consecutive_failures.store(0, Ordering::SeqCst);
            *state = WorkerState::Connecting;
            inner.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        let handle = tokio::spawn(Arc::clone(inner).supervise(generation));
        if let Some(previous) = self.lock_task().replace(handle) {
            // Old loop is already superseded and will exit on its own
            drop(previous);
        }

        tracing::info!(feed = %inner.feed, generation = generation, "Stream worker started");
        true
    }

    /// Request loop termination
    ///
    /// The loop exits at its next check and releases its connection.
    pub fn stop(&self) {
        let _ = self.stop_and_take();
    }

    fn stop_and_take(&self) -> Option<JoinHandle<()>> {
        let inner = &self.inner;
        {
            let mut state = inner.lock_state();
            inner.running.store(false, Ordering::SeqCst);
            inner.generation.fetch_add(1, Ordering::SeqCst);
            *state = WorkerState::Idle;
        }
        inner.wake.notify_waiters();
        tracing::info!(feed = %inner.feed, "Stream worker stop requested");
        self.lock_task().take()
    }

    /// Stop, wait briefly for the old loop to release its handle, start again
    ///
    /// Also revives a terminated worker.
    pub async fn restart(&self) {
        tracing::info!(feed = %self.inner.feed, "Restarting video stream");

        if let Some(handle) = self.stop_and_take() {
            let grace = self.inner.policy.restart_grace;
            if tokio::time::timeout(grace, handle).await.is_err() {
                tracing::warn!(
                    feed = %self.inner.feed,
                    grace_ms = grace.as_millis() as u64,
                    "Previous stream loop still busy, starting new loop anyway"
                );
            }
        }

        self.start();
        tracing::info!(feed = %self.inner.feed, "Video stream restart complete");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> WorkerState {
        *self.inner.lock_state()
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            is_running: self.is_running(),
            state: self.state(),
            retry_count: self.inner.retry_count.load(Ordering::SeqCst),
            consecutive_failures: self.inner.consecutive_failures.load(Ordering::SeqCst),
        }
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.wake.notify_waiters();
    }
}

impl WorkerInner {
    fn lock_state(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Write the state only while this loop still owns the feed
    fn set_state(&self, generation: u64, next: WorkerState) {
        let mut state = self.lock_state();
        if self.is_current(generation) {
            *state = next;
        }
    }

    /// Sleep, cut short by stop()
    async fn idle(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.wake.notified() => {}
        }
    }

    /// Run the loop; a panic outside the source calls leaves the worker stopped, not wedged
    async fn supervise(self: Arc<Self>, generation: u64) {
        let outcome = AssertUnwindSafe(Arc::clone(&self).run(generation))
            .catch_unwind()
            .await;
        if let Err(panic) = outcome {
            {
                let mut state = self.lock_state();
                if self.is_current(generation) {
                    self.running.store(false, Ordering::SeqCst);
                    *state = WorkerState::Idle;
                }
            }
            tracing::error!(
                feed = %self.feed,
                panic = %panic_message(panic.as_ref()),
                "Video stream worker panicked"
            );
        }
    }

    async fn run(self: Arc<Self>, generation: u64) {
        let feed = self.feed;
        let locator = self.config.display_locator();
        let mut retry_count: u32 = 0;

        while self.is_current(generation) {
            self.set_state(generation, WorkerState::Connecting);
            tracing::info!(feed = %feed, locator = %locator, "Connecting video stream");

            let fault = match guarded(self.sources.open(&self.config)).await {
                Ok(mut source) => match guarded(source.read_frame()).await {
                    Ok(Some(frame)) => {
                        tracing::info!(feed = %feed, "Video stream connected");
                        retry_count = 0;
                        self.retry_count.store(0, Ordering::SeqCst);
                        self.frames.publish(feed, frame, SystemTime::now());
                        self.set_state(generation, WorkerState::Reading);

                        let outcome = self.read_loop(source.as_mut(), generation).await;
                        source.release().await;
                        match outcome {
                            ReadOutcome::Stopped => break,
                            ReadOutcome::Exhausted(count) => Error::Stream(format!(
                                "{} consecutive frame read failures",
                                count
                            )),
                            ReadOutcome::Fault(e) => e,
                        }
                    }
                    Ok(None) => {
                        tracing::error!(feed = %feed, "Cannot read test frame, reconnecting");
                        source.release().await;
                        self.idle(self.policy.probe_retry_delay).await;
                        continue;
                    }
                    Err(e) => {
                        source.release().await;
                        e
                    }
                },
                Err(e) => e,
            };

            if !self.is_current(generation) {
                break;
            }

            retry_count += 1;
            self.retry_count.store(retry_count, Ordering::SeqCst);
            tracing::error!(
                feed = %feed,
                retry = retry_count,
                max_retries = self.policy.max_retries,
                error = %fault,
                "Video stream error"
            );

            if retry_count >= self.policy.max_retries {
                let mut state = self.lock_state();
                if self.is_current(generation) {
                    self.running.store(false, Ordering::SeqCst);
                    *state = WorkerState::Terminated;
                }
                tracing::error!(feed = %feed, "Reached maximum retry attempts, stopping stream");
                break;
            }

            self.set_state(generation, WorkerState::Backoff);
            let delay = self.policy.backoff(retry_count);
            tracing::debug!(feed = %feed, delay_ms = delay.as_millis() as u64, "Backing off");
            self.idle(delay).await;
        }

        tracing::info!(feed = %feed, generation = generation, "Video stream worker ended");
    }

    async fn read_loop(&self, source: &mut dyn VideoSource, generation: u64) -> ReadOutcome {
        let max = self.policy.max_consecutive_failures;
        let mut consecutive: u32 = 0;
        self.consecutive_failures.store(0, Ordering::SeqCst);

        while self.is_current(generation) {
            match guarded(source.read_frame()).await {
                Ok(Some(frame)) => {
                    self.frames.publish(self.feed, frame, SystemTime::now());
                    if consecutive != 0 {
                        consecutive = 0;
                        self.consecutive_failures.store(0, Ordering::SeqCst);
                    }
                }
                Ok(None) => {
                    consecutive += 1;
                    self.consecutive_failures.store(consecutive, Ordering::SeqCst);
                    tracing::warn!(
                        feed = %self.feed,
                        "Video frame read failed ({}/{})",
                        consecutive,
                        max
                    );
                    if consecutive >= max {
                        tracing::error!(
                            feed = %self.feed,
                            "Too many consecutive read failures, reconnecting stream"
                        );
                        return ReadOutcome::Exhausted(consecutive);
                    }
                    self.idle(self.policy.read_failure_delay).await;
                }
                Err(e) => return ReadOutcome::Fault(e),
            }
        }

        ReadOutcome::Stopped
    }
}

/// Await a video source call, turning a panic into a stream fault
async fn guarded<T>(call: impl Future<Output = Result<T>>) -> Result<T> {
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(Error::Stream(format!(
            "video source panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
