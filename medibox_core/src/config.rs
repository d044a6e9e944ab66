//! Runtime configuration for the engine.
//!
//! Separate from the TOML-deserialized config in `medibox_config`; see
//! `conversions` for the bridge.

use crate::actuator::Direction;
use crate::schedule::MorningWindow;
use std::time::Duration;

/// Alert thresholds. Boundaries are inclusive on the alerting side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// At or above: high temperature (Celsius).
    pub temp_high: f64,
    /// At or below: low temperature.
    pub temp_low: f64,
    /// At or above: high heart rate (bpm).
    pub bpm_high: f64,
    /// In `(0, bpm_low]`: low heart rate.
    pub bpm_low: f64,
    pub alcohol: f64,
    /// Gyro/accel vector magnitude.
    pub motion: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temp_high: 37.5,
            temp_low: 35.0,
            bpm_high: 100.0,
            bpm_low: 60.0,
            alcohol: 0.1,
            motion: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertCfg {
    pub cooldown: Duration,
    /// Gap between the two startup cues.
    pub startup_gap: Duration,
}

impl Default for AlertCfg {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(30),
            startup_gap: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerCfg {
    pub poll_interval: Duration,
    pub dispense_cooldown: Duration,
    /// Match tolerance in minutes, after day-boundary wraparound.
    pub tolerance_min: u16,
    /// Pause between the "time to take" cue and actuation.
    pub advisory_pause: Duration,
    pub morning: MorningWindow,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            dispense_cooldown: Duration::from_secs(300),
            tolerance_min: 5,
            advisory_pause: Duration::from_millis(2000),
            morning: MorningWindow::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorCfg {
    pub servo_topic: String,
    pub stepper_topic: String,
    /// Degrees, 0..=180.
    pub open_angle: u16,
    pub close_angle: u16,
    /// Time the servo stays open before the close command.
    pub close_delay: Duration,
    pub stepper_steps: u32,
    pub stepper_direction: Direction,
}

impl Default for ActuatorCfg {
    fn default() -> Self {
        Self {
            servo_topic: "actuators/servo".into(),
            stepper_topic: "actuators/stepper".into(),
            open_angle: 90,
            close_angle: 0,
            close_delay: Duration::from_secs(3),
            stepper_steps: 200,
            stepper_direction: Direction::Cw,
        }
    }
}
