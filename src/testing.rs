//! Test doubles for the video and PTZ seams
//!
//! Fakes record every call so tests can assert on ordering.

use crate::error::{Error, Result};
use crate::models::StreamConfig;
use crate::ptz_controller::{MediaProfile, PtzConnector, PtzDevice, PtzStatus, Velocity};
use crate::video_source::{Frame, VideoSource, VideoSourceFactory};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Frame interval of fake sources (about 15 fps)
const FAKE_FRAME_INTERVAL: Duration = Duration::from_millis(66);

/// Poll `cond` every 10ms of (virtual) time until it holds
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..100_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

pub fn test_frame(fill: u8) -> Frame {
    Frame::new(4, 4, vec![fill; 4 * 4 * 3]).unwrap()
}

/// One scripted read result
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    Frame,
    /// Failed read (`Ok(None)`)
    Fail,
    /// Source fault (`Err`)
    Fault,
    /// Source panics mid-read
    Panic,
}

/// What one `open` call does
#[derive(Debug, Clone, PartialEq)]
pub enum OpenScript {
    Fail,
    /// Source playing these reads, then frames forever
    Source(Vec<Step>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceEvent {
    Open,
    ReadFrame,
    ReadFailed,
    ReadFault,
    Release,
}

type EventLog = Arc<Mutex<Vec<SourceEvent>>>;

fn record(log: &EventLog, event: SourceEvent) {
    log.lock().unwrap().push(event);
}

pub struct FakeVideoSourceFactory {
    scripts: Mutex<VecDeque<OpenScript>>,
    fallback: OpenScript,
    events: EventLog,
}

impl FakeVideoSourceFactory {
    pub fn scripted(scripts: Vec<OpenScript>, fallback: OpenScript) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            fallback,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every open succeeds and yields frames forever
    pub fn healthy() -> Self {
        Self::scripted(vec![], OpenScript::Source(vec![]))
    }

    /// Every open fails
    pub fn always_failing() -> Self {
        Self::scripted(vec![], OpenScript::Fail)
    }

    pub fn events(&self) -> Vec<SourceEvent> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, event: SourceEvent) -> usize {
        self.events.lock().unwrap().iter().filter(|e| **e == event).count()
    }

    /// Open attempts, successful or not
    pub fn open_count(&self) -> usize {
        self.count(SourceEvent::Open)
    }

    pub fn release_count(&self) -> usize {
        self.count(SourceEvent::Release)
    }
}

#[async_trait]
impl VideoSourceFactory for FakeVideoSourceFactory {
    async fn open(&self, _config: &StreamConfig) -> Result<Box<dyn VideoSource>> {
        record(&self.events, SourceEvent::Open);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match script {
            OpenScript::Fail => Err(Error::Stream("connection refused".to_string())),
            OpenScript::Source(steps) => Ok(Box::new(FakeVideoSource {
                steps: steps.into(),
                events: self.events.clone(),
            })),
        }
    }
}

struct FakeVideoSource {
    steps: VecDeque<Step>,
    events: EventLog,
}

#[async_trait]
impl VideoSource for FakeVideoSource {
    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        match self.steps.pop_front().unwrap_or(Step::Frame) {
            Step::Frame => {
                tokio::time::sleep(FAKE_FRAME_INTERVAL).await;
                record(&self.events, SourceEvent::ReadFrame);
                Ok(Some(test_frame(128)))
            }
            Step::Fail => {
                record(&self.events, SourceEvent::ReadFailed);
                Ok(None)
            }
            Step::Fault => {
                record(&self.events, SourceEvent::ReadFault);
                Err(Error::Stream("decoder fault".to_string()))
            }
            Step::Panic => {
                record(&self.events, SourceEvent::ReadFault);
                panic!("corrupt frame header");
            }
        }
    }

    async fn release(&mut self) {
        record(&self.events, SourceEvent::Release);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PtzCall {
    GetProfiles,
    Move { token: String, velocity: Velocity },
    Stop { token: String },
    GetStatus { token: String },
}

#[derive(Default)]
pub struct FakePtzDevice {
    profiles: Vec<MediaProfile>,
    calls: Mutex<Vec<PtzCall>>,
    fail_profiles: AtomicBool,
    fail_move: AtomicBool,
    fail_stop: AtomicBool,
    fail_status: AtomicBool,
}

impl FakePtzDevice {
    pub fn new(profiles: Vec<MediaProfile>) -> Self {
        Self {
            profiles,
            ..Default::default()
        }
    }

    /// One plain profile followed by one PTZ profile
    pub fn with_ptz_profile() -> Self {
        Self::new(vec![
            MediaProfile {
                token: "profile_0".to_string(),
                name: Some("mainStream".to_string()),
                ptz_configuration: None,
            },
            MediaProfile {
                token: "profile_1".to_string(),
                name: Some("minorStream".to_string()),
                ptz_configuration: Some("ptz_0".to_string()),
            },
        ])
    }

    pub fn calls(&self) -> Vec<PtzCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_profiles(&self, fail: bool) {
        self.fail_profiles.store(fail, Ordering::SeqCst);
    }

    pub fn fail_move(&self, fail: bool) {
        self.fail_move.store(fail, Ordering::SeqCst);
    }

    pub fn fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn fail_status(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    fn call(&self, call: PtzCall, fail: &AtomicBool) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if fail.load(Ordering::SeqCst) {
            return Err(Error::Device("fault injected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PtzDevice for FakePtzDevice {
    async fn get_profiles(&self) -> Result<Vec<MediaProfile>> {
        self.call(PtzCall::GetProfiles, &self.fail_profiles)?;
        Ok(self.profiles.clone())
    }

    async fn continuous_move(&self, profile_token: &str, velocity: &Velocity) -> Result<()> {
        self.call(
            PtzCall::Move {
                token: profile_token.to_string(),
                velocity: *velocity,
            },
            &self.fail_move,
        )
    }

    async fn stop(&self, profile_token: &str) -> Result<()> {
        self.call(
            PtzCall::Stop {
                token: profile_token.to_string(),
            },
            &self.fail_stop,
        )
    }

    async fn get_status(&self, profile_token: &str) -> Result<PtzStatus> {
        self.call(
            PtzCall::GetStatus {
                token: profile_token.to_string(),
            },
            &self.fail_status,
        )?;
        Ok(PtzStatus {
            pan: Some(0.0),
            tilt: Some(0.0),
            zoom: Some(0.0),
            move_status: Some("IDLE".to_string()),
        })
    }
}

/// Hands out a shared `FakePtzDevice`, or fails when none is set
#[derive(Default)]
pub struct FakePtzConnector {
    device: Mutex<Option<Arc<FakePtzDevice>>>,
    opens: AtomicU32,
}

impl FakePtzConnector {
    pub fn new(device: Arc<FakePtzDevice>) -> Self {
        Self {
            device: Mutex::new(Some(device)),
            opens: AtomicU32::new(0),
        }
    }

    /// Connector whose device is unreachable
    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn set_device(&self, device: Option<Arc<FakePtzDevice>>) {
        *self.device.lock().unwrap() = device;
    }

    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PtzConnector for FakePtzConnector {
    async fn open(&self) -> Result<Arc<dyn PtzDevice>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.device.lock().unwrap().clone() {
            Some(device) => Ok(device),
            None => Err(Error::Network("connection timed out".to_string())),
        }
    }
}
