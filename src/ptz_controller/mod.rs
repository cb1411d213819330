//! PTZ Controller Module
//!
//! Direction table, timed move sequencing and the ONVIF control client.

pub mod device;
pub mod onvif;
pub mod sequencer;
pub mod types;

pub use device::{PtzConnector, PtzDevice};
pub use onvif::{OnvifClient, OnvifConnector};
pub use sequencer::{PtzSequencer, PtzSession};
pub use types::*;
