use crate::reading::Channel;
use thiserror::Error;

/// Malformed or unexpected telemetry payload. Recovered where it happens:
/// the previous reading for the channel stays in place.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("{channel}: payload is not valid UTF-8")]
    InvalidUtf8 { channel: Channel },
    #[error("{channel}: not a number: {payload:?}")]
    NotNumeric { channel: Channel, payload: String },
    #[error("{channel}: expected a JSON object: {payload:?}")]
    NotAnObject { channel: Channel, payload: String },
    #[error("{channel}: missing axis '{axis}'")]
    MissingAxis { channel: Channel, axis: char },
    #[error("{channel}: no numeric field in {payload:?}")]
    NoNumericField { channel: Channel, payload: String },
}

/// Command could not be handed to the transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("link down, cannot publish to {topic}")]
    LinkDown { topic: String },
    #[error("encode {what} command: {reason}")]
    Encode { what: &'static str, reason: String },
    #[error("{what} out of range: {value}")]
    OutOfRange { what: &'static str, value: i64 },
}

/// Missing or invalid schedule field; the schedule is skipped for the cycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("schedule {schedule_id}: invalid time of day {value:?}")]
    InvalidTime { schedule_id: String, value: String },
    #[error("schedule {schedule_id}: weekday {day} outside 0..=6")]
    InvalidWeekday { schedule_id: String, day: u8 },
    #[error("schedule {0} is not active")]
    Inactive(String),
    #[error("unknown schedule {0}")]
    UnknownSchedule(String),
}

/// Everything that can stop one schedule from being dispensed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispenseError {
    #[error(transparent)]
    Config(#[from] ConfigurationError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("schedule {0} was dispensed within the cooldown window")]
    CoolingDown(String),
    #[error("schedule store unavailable: {0}")]
    Store(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
