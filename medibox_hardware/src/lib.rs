//! Concrete collaborators for the controller core.
//!
//! - [`sim`]: simulated transport and sensor feed, for bench runs
//! - [`player`]: external-command audio renderer
//! - `mqtt` (feature `mqtt`): broker link

pub mod error;
#[cfg(feature = "mqtt")]
pub mod mqtt;
pub mod player;
pub mod sim;

pub use error::HwError;
#[cfg(feature = "mqtt")]
pub use mqtt::MqttLink;
pub use player::{CommandPlayer, LogOnlyAudio};
pub use sim::{SimulatedSensors, SimulatedTransport};
