//! PTZ device seams
//!
//! `PtzDevice` is an open control session, `PtzConnector` opens one.

use super::types::{MediaProfile, PtzStatus, Velocity};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Open PTZ control session
#[async_trait]
pub trait PtzDevice: Send + Sync {
    async fn get_profiles(&self) -> Result<Vec<MediaProfile>>;

    async fn continuous_move(&self, profile_token: &str, velocity: &Velocity) -> Result<()>;

    /// Stop pan/tilt and zoom
    async fn stop(&self, profile_token: &str) -> Result<()>;

    async fn get_status(&self, profile_token: &str) -> Result<PtzStatus>;
}

/// Opens control sessions
#[async_trait]
pub trait PtzConnector: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn PtzDevice>>;
}
