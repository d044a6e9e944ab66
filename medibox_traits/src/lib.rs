pub mod clock;
pub mod cues;

pub use clock::{Clock, SystemClock};
pub use cues::{AudioCategory, AudioCue, HealthCue, MedicationCue, SystemCue, UserCue};

/// Error type crossing the collaborator seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outbound side of the publish/subscribe link.
///
/// `Ok(())` means the payload was handed to the transport; nothing is known
/// about whether the device acted on it.
pub trait Transport {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BoxError>;
}

/// Audio renderer: plays one named alert and reports whether it played.
pub trait AudioSink {
    fn play_alert(&self, category: &str, key: &str) -> bool;
}

/// One message delivered by the link for a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Events surfaced by the inbound side of the link, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Broker accepted the connection.
    Connected,
    /// Connection attempt was refused or dropped.
    ConnectFailed(String),
    Message(InboundMessage),
}
