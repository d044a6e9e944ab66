//! Normalized reading model.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// A named telemetry stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Gyro,
    Accel,
    Temperature,
    Distance,
    WeightValue,
    WeightStatus,
    GyroY,
    GyroZ,
    Load,
    HeartRate,
    Alcohol,
    StepperState,
    ServoState,
}

/// How a channel's payload is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Bare number, else JSON scalar.
    Numeric,
    /// JSON object with `x`, `y`, `z`.
    Vector,
    /// JSON first (known field names in priority order, then first numeric
    /// field), bare number when the payload is not JSON.
    Tolerant { fields: &'static [&'static str] },
    /// Verbatim text.
    Status,
}

impl Channel {
    pub const ALL: [Channel; 13] = [
        Channel::Gyro,
        Channel::Accel,
        Channel::Temperature,
        Channel::Distance,
        Channel::WeightValue,
        Channel::WeightStatus,
        Channel::GyroY,
        Channel::GyroZ,
        Channel::Load,
        Channel::HeartRate,
        Channel::Alcohol,
        Channel::StepperState,
        Channel::ServoState,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Gyro => "gyro",
            Self::Accel => "accel",
            Self::Temperature => "temp",
            Self::Distance => "distance",
            Self::WeightValue => "weight_value",
            Self::WeightStatus => "weight_status",
            Self::GyroY => "gyro_y",
            Self::GyroZ => "gyro_z",
            Self::Load => "load",
            Self::HeartRate => "bpm",
            Self::Alcohol => "alcohol",
            Self::StepperState => "stepper_state",
            Self::ServoState => "servo_state",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn encoding(self) -> Encoding {
        match self {
            Self::Gyro | Self::Accel => Encoding::Vector,
            Self::Temperature => Encoding::Tolerant {
                fields: &["temp", "temperature"],
            },
            Self::Alcohol => Encoding::Tolerant {
                fields: &["alcohol_level", "alcohol"],
            },
            Self::WeightStatus => Encoding::Status,
            Self::Distance
            | Self::WeightValue
            | Self::GyroY
            | Self::GyroZ
            | Self::Load
            | Self::HeartRate
            | Self::StepperState
            | Self::ServoState => Encoding::Numeric,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReadingValue {
    Scalar(f64),
    Vector(Vector3),
    Status(String),
}

impl ReadingValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }
}

/// One decoded sample. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub channel: Channel,
    pub value: ReadingValue,
    pub captured_at: NaiveDateTime,
}

impl SensorReading {
    pub fn new(channel: Channel, value: ReadingValue, captured_at: NaiveDateTime) -> Self {
        Self {
            channel,
            value,
            captured_at,
        }
    }
}
