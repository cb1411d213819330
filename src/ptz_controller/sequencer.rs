//! PTZ Sequencer
//!
//! Turns a direction symbol into a timed ContinuousMove followed by Stop.
//!
//! ## Responsibilities
//!
//! - Hold the control session and selected profile
//! - Clamp speed and map directions to velocity vectors
//! - Serialize device commands (one move/stop sequence at a time)
//! - Always attempt Stop after a move, even when the move failed

use super::device::PtzDevice;
use super::types::*;
use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Shortest wait between move and stop
pub const MIN_MOVE_DURATION: Duration = Duration::from_millis(50);

/// Open control session bound to the profile chosen at connect time
pub struct PtzSession {
    pub device: Arc<dyn PtzDevice>,
    pub profile: PtzProfile,
}

/// PTZ sequencer service
pub struct PtzSequencer {
    session: RwLock<Option<Arc<PtzSession>>>,
    /// Held across move -> wait -> stop
    command_lock: Mutex<()>,
    speed: f32,
    duration: Duration,
}

impl PtzSequencer {
    /// Create new PtzSequencer
    pub fn new(speed: f32, duration: Duration) -> Self {
        Self {
            session: RwLock::new(None),
            command_lock: Mutex::new(()),
            speed: clamp_speed(speed),
            duration: duration.max(MIN_MOVE_DURATION),
        }
    }

    /// Effective (clamped) speed
    pub async fn attach(&self, session: PtzSession) {
        tracing::info!(
            profile = %session.profile.profile_token,
            supports_ptz = session.profile.supports_ptz,
            "PTZ session attached"
        );
        *self.session.write().await = Some(Arc::new(session));
    }

    pub async fn detach(&self) {
        if self.session.write().await.take().is_some() {
            tracing::info!("PTZ session detached");
        }
    }

    /// Session and profile exist
    pub async fn is_ready(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn profile(&self) -> Option<PtzProfile> {
        self.session.read().await.as_ref().map(|s| s.profile.clone())
    }

    async fn ready_session(&self) -> Result<Arc<PtzSession>> {
        let session = self
            .session
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::NotReady("PTZ service or profile not initialized".to_string()))?;
        if !session.profile.supports_ptz {
            return Err(Error::PtzUnsupported(session.profile.profile_token.clone()));
        }
        Ok(session)
    }

    /// Move in a direction for the configured duration, then stop
    ///
    /// Unknown symbols issue a zero-velocity move and still succeed.
    /// Returns the velocity that was sent.
    pub async fn move_direction(&self, symbol: &str) -> Result<Velocity> {
        let session = self.ready_session().await?;
        let token = session.profile.profile_token.as_str();

        let velocity = Velocity::for_symbol(symbol, self.speed);
        if PtzDirection::parse(symbol).is_none() {
            tracing::warn!(direction = %symbol, "Unknown PTZ direction, sending zero velocity");
        }

        let _guard = self.command_lock.lock().await;

        tracing::info!(
            direction = %symbol,
            profile = %token,
            speed = self.speed,
            duration_ms = self.duration.as_millis() as u64,
            velocity = ?velocity,
            "PTZ move begin"
        );

        // Stop always follows the full wait, even after a failed move
        let moved = session.device.continuous_move(token, &velocity).await;
        if let Err(e) = &moved {
            tracing::error!(direction = %symbol, error = %e, "PTZ ContinuousMove failed");
        }
        tokio::time::sleep(self.duration).await;

        let stopped = self.stop_with(&session).await;

        moved?;
        stopped?;
        tracing::info!(direction = %symbol, "PTZ move complete");
        Ok(velocity)
    }

    /// Stop all motion
    pub async fn stop(&self) -> Result<()> {
        let session = self.ready_session().await?;
        let _guard = self.command_lock.lock().await;
        self.stop_with(&session).await
    }

    async fn stop_with(&self, session: &PtzSession) -> Result<()> {
        let token = session.profile.profile_token.as_str();
        match session.device.stop(token).await {
            Ok(()) => {
                tracing::info!(profile = %token, "PTZ stop command sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(profile = %token, error = %e, "PTZ stop failed");
                Err(e)
            }
        }
    }

    /// Current device position and motion state
    pub async fn status(&self) -> Result<PtzStatus> {
        let session = self.ready_session().await?;
        session
            .device
            .get_status(&session.profile.profile_token)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePtzDevice, PtzCall};

    async fn sequencer(device: Arc<FakePtzDevice>, speed: f32) -> PtzSequencer {
        let sequencer = PtzSequencer::new(speed, Duration::from_millis(500));
        sequencer
            .attach(PtzSession {
                device,
                profile: PtzProfile {
                    profile_token: "profile_1".to_string(),
                    supports_ptz: true,
                },
            })
            .await;
        sequencer
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_issues_table_vector_then_stop() {
        let s = 0.4;
        for direction in PtzDirection::ALL {
            let device = Arc::new(FakePtzDevice::with_ptz_profile());
            let sequencer = sequencer(device.clone(), s).await;

            sequencer.move_direction(direction.as_str()).await.unwrap();

            let (pan, tilt, zoom) = direction.components(s);
            assert_eq!(
                device.calls(),
                vec![
                    PtzCall::Move {
                        token: "profile_1".into(),
                        velocity: Velocity::from_components(pan, tilt, zoom),
                    },
                    PtzCall::Stop {
                        token: "profile_1".into()
                    },
                ],
                "{}",
                direction
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_is_clamped() {
        let device = Arc::new(FakePtzDevice::with_ptz_profile());
        let sequencer = sequencer(device.clone(), 3.0).await;
        assert_eq!(sequencer.speed, 1.0);

        sequencer.move_direction("right").await.unwrap();
        assert_eq!(
            device.calls()[0],
            PtzCall::Move {
                token: "profile_1".into(),
                velocity: Velocity::from_components(1.0, 0.0, 0.0),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_duration_before_stop() {
        let device = Arc::new(FakePtzDevice::with_ptz_profile());
        let sequencer = sequencer(device, 0.4).await;

        let started = tokio::time::Instant::now();
        sequencer.move_direction("up").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[test]
    fn test_duration_floor() {
        let sequencer = PtzSequencer::new(0.4, Duration::from_millis(1));
        assert_eq!(sequencer.duration, MIN_MOVE_DURATION);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_direction_sends_zero_vector_and_succeeds() {
        let device = Arc::new(FakePtzDevice::with_ptz_profile());
        let sequencer = sequencer(device.clone(), 0.4).await;

        let velocity = sequencer.move_direction("diagonalUp").await.unwrap();
        assert!(velocity.is_zero());
        assert_eq!(
            device.calls()[0],
            PtzCall::Move {
                token: "profile_1".into(),
                velocity: Velocity::default(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_attempted_when_move_fails() {
        let device = Arc::new(FakePtzDevice::with_ptz_profile());
        device.fail_move(true);
        let sequencer = sequencer(device.clone(), 0.4).await;

        let started = tokio::time::Instant::now();
        let result = sequencer.move_direction("left").await;
        assert!(matches!(result, Err(Error::Device(_))));
        assert!(started.elapsed() >= Duration::from_millis(500));

        let calls = device.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], PtzCall::Move { .. }));
        assert_eq!(calls[1], PtzCall::Stop { token: "profile_1".into() });
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_failure_reported() {
        let device = Arc::new(FakePtzDevice::with_ptz_profile());
        device.fail_stop(true);
        let sequencer = sequencer(device.clone(), 0.4).await;

        assert!(sequencer.move_direction("up").await.is_err());
        assert!(sequencer.stop().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_moves_are_serialized() {
        let device = Arc::new(FakePtzDevice::with_ptz_profile());
        let sequencer = Arc::new(sequencer(device.clone(), 0.4).await);

        let a = tokio::spawn({
            let sequencer = sequencer.clone();
            async move { sequencer.move_direction("up").await }
        });
        let b = tokio::spawn({
            let sequencer = sequencer.clone();
            async move { sequencer.move_direction("down").await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let kinds: Vec<&str> = device
            .calls()
            .iter()
            .map(|c| match c {
                PtzCall::Move { .. } => "move",
                PtzCall::Stop { .. } => "stop",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["move", "stop", "move", "stop"]);
    }

    #[tokio::test]
    async fn test_not_ready_without_session() {
        let sequencer = PtzSequencer::new(0.4, Duration::from_millis(500));
        assert!(!sequencer.is_ready().await);
        assert!(matches!(
            sequencer.move_direction("up").await,
            Err(Error::NotReady(_))
        ));
        assert!(matches!(sequencer.stop().await, Err(Error::NotReady(_))));
    }

    #[tokio::test]
    async fn test_non_ptz_profile_fails_fast() {
        let device = Arc::new(FakePtzDevice::with_ptz_profile());
        let sequencer = PtzSequencer::new(0.4, Duration::from_millis(500));
        sequencer
            .attach(PtzSession {
                device: device.clone(),
                profile: PtzProfile {
                    profile_token: "profile_1".to_string(),
                    supports_ptz: false,
                },
            })
            .await;

        assert!(matches!(
            sequencer.move_direction("up").await,
            Err(Error::PtzUnsupported(_))
        ));
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_status_passthrough() {
        let device = Arc::new(FakePtzDevice::with_ptz_profile());
        let sequencer = sequencer(device.clone(), 0.4).await;

        let status = sequencer.status().await.unwrap();
        assert_eq!(status.move_status.as_deref(), Some("IDLE"));
        assert_eq!(
            device.calls(),
            vec![PtzCall::GetStatus {
                token: "profile_1".into()
            }]
        );
    }
}
