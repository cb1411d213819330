//! StreamWorker type definitions

use serde::Serialize;
use std::time::Duration;

/// Worker loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Never started, or stopped by request
    Idle,
    /// Opening the source and reading the probe frame
    Connecting,
    /// Pulling frames
    Reading,
    /// Connection dropped, sleeping before the next attempt
    Backoff,
    /// Retry budget exhausted; only an explicit restart revives the feed
    Terminated,
}

impl WorkerState {
    /// Worker loop is alive (connecting, reading or waiting to reconnect)
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reading | Self::Backoff)
    }
}

/// Reconnect and failure thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Consecutive failed reads before the connection is abandoned
    pub max_consecutive_failures: u32,
    /// Failed connections before the worker terminates
    pub max_retries: u32,
    /// Sleep after a failed read
    pub read_failure_delay: Duration,
    /// Sleep after a failed probe read
    pub probe_retry_delay: Duration,
    /// Backoff per retry, multiplied by the retry count
    pub backoff_step: Duration,
    /// Backoff ceiling
    pub backoff_max: Duration,
    /// How long restart waits for the old loop to release its handle
    pub restart_grace: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 10,
            max_retries: 5,
            read_failure_delay: Duration::from_millis(100),
            probe_retry_delay: Duration::from_secs(2),
            backoff_step: Duration::from_secs(2),
            backoff_max: Duration::from_secs(10),
            restart_grace: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Linear backoff capped at `backoff_max`
    pub fn backoff(&self, retry_count: u32) -> Duration {
        self.backoff_step
            .saturating_mul(retry_count)
            .min(self.backoff_max)
    }
}

/// Point-in-time view of one feed's worker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerSnapshot {
    pub is_running: bool,
    pub state: WorkerState,
    pub retry_count: u32,
    pub consecutive_failures: u32,
}
