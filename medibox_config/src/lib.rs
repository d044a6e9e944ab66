#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and schedule-file parsing for the dispensing appliance.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//!   Every section is optional; an empty file yields the factory defaults.
//! - `schedules` holds the record schema of the medication-schedule file and
//!   its JSON loader.
use serde::Deserialize;

pub mod schedules;

pub use schedules::{
    FrequencyRecord, RejectedRecord, ScheduleFileContents, ScheduleRecord, load_schedules_json,
    parse_schedules_json,
};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Broker {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_s: u64,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for Broker {
    fn default() -> Self {
        Self {
            host: "192.168.4.1".into(),
            port: 1883,
            client_id: "medibox".into(),
            keep_alive_s: 60,
            username: None,
            password: None,
        }
    }
}

/// Channel name -> topic. Inbound channels first, then the two actuator
/// command topics.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Topics {
    pub gyro: String,
    pub accel: String,
    pub temp: String,
    pub distance: String,
    pub weight_value: String,
    pub weight_status: String,
    pub gyro_y: String,
    pub gyro_z: String,
    pub load: String,
    pub bpm: String,
    pub alcohol: String,
    pub stepper_state: String,
    pub servo_state: String,
    pub servo: String,
    pub stepper: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            gyro: "sensors/gyro".into(),
            accel: "sensors/accel".into(),
            temp: "tempgun/sensor/temp_object".into(),
            distance: "sensors/distance".into(),
            weight_value: "weight/value".into(),
            weight_status: "weight/status".into(),
            gyro_y: "esp32/gyro/y".into(),
            gyro_z: "esp32/gyro/z".into(),
            load: "esp32/loadcell".into(),
            bpm: "health/bpm".into(),
            alcohol: "alcohol/reading".into(),
            stepper_state: "actuators/stepper/state".into(),
            servo_state: "actuators/servo/state".into(),
            servo: "actuators/servo".into(),
            stepper: "actuators/stepper".into(),
        }
    }
}

impl Topics {
    /// All (name, topic) pairs, used for duplicate detection.
    pub fn entries(&self) -> [(&'static str, &str); 15] {
        [
            ("gyro", self.gyro.as_str()),
            ("accel", self.accel.as_str()),
            ("temp", self.temp.as_str()),
            ("distance", self.distance.as_str()),
            ("weight_value", self.weight_value.as_str()),
            ("weight_status", self.weight_status.as_str()),
            ("gyro_y", self.gyro_y.as_str()),
            ("gyro_z", self.gyro_z.as_str()),
            ("load", self.load.as_str()),
            ("bpm", self.bpm.as_str()),
            ("alcohol", self.alcohol.as_str()),
            ("stepper_state", self.stepper_state.as_str()),
            ("servo_state", self.servo_state.as_str()),
            ("servo", self.servo.as_str()),
            ("stepper", self.stepper.as_str()),
        ]
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Thresholds {
    /// Celsius
    pub temp_high: f64,
    pub temp_low: f64,
    /// Beats per minute
    pub bpm_high: f64,
    pub bpm_low: f64,
    pub alcohol: f64,
    /// Magnitude of the gyro/accel vector
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

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Alerts {
    pub cooldown_s: u64,
}

impl Default for Alerts {
    fn default() -> Self {
        Self { cooldown_s: 30 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Dispense {
    pub cooldown_s: u64,
    pub poll_interval_s: u64,
    pub tolerance_min: u16,
    /// Pause between the "time to take" cue and actuation so cues don't overlap.
    pub advisory_pause_ms: u64,
    /// Morning window is [morning_start_hour, morning_end_hour).
    pub morning_start_hour: u8,
    pub morning_end_hour: u8,
}

impl Default for Dispense {
    fn default() -> Self {
        Self {
            cooldown_s: 300,
            poll_interval_s: 60,
            tolerance_min: 5,
            advisory_pause_ms: 2000,
            morning_start_hour: 6,
            morning_end_hour: 12,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Servo {
    pub open_angle: u16,
    pub close_angle: u16,
    pub close_delay_s: u64,
}

impl Default for Servo {
    fn default() -> Self {
        Self {
            open_angle: 90,
            close_angle: 0,
            close_delay_s: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum StepDirection {
    #[default]
    #[serde(rename = "CW", alias = "cw")]
    Cw,
    #[serde(rename = "CCW", alias = "ccw")]
    Ccw,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Stepper {
    pub steps: u32,
    pub direction: StepDirection,
}

impl Default for Stepper {
    fn default() -> Self {
        Self {
            steps: 200,
            direction: StepDirection::Cw,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Audio {
    /// Directory holding the cue sound files.
    pub sounds_dir: String,
    /// External player invoked as `<player> <file>`.
    pub player: String,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for Audio {
    fn default() -> Self {
        Self {
            sounds_dir: "sounds".into(),
            player: "aplay".into(),
            retry_attempts: 3,
            retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleFile {
    /// JSON array of schedule records; re-read on every poll.
    pub file: String,
}

impl Default for ScheduleFile {
    fn default() -> Self {
        Self {
            file: "etc/schedules.json".into(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub broker: Broker,
    pub topics: Topics,
    pub thresholds: Thresholds,
    pub alerts: Alerts,
    pub dispense: Dispense,
    pub servo: Servo,
    pub stepper: Stepper,
    pub audio: Audio,
    pub schedules: ScheduleFile,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Broker
        if self.broker.host.trim().is_empty() {
            eyre::bail!("broker.host must not be empty");
        }
        if self.broker.port == 0 {
            eyre::bail!("broker.port must be > 0");
        }
        if self.broker.username.is_some() != self.broker.password.is_some() {
            eyre::bail!("broker.username and broker.password must be set together");
        }

        // Topics
        let entries = self.topics.entries();
        for (i, (name, topic)) in entries.iter().enumerate() {
            if topic.trim().is_empty() {
                eyre::bail!("topics.{name} must not be empty");
            }
            if let Some((other, _)) = entries[..i].iter().find(|(_, t)| t == topic) {
                eyre::bail!("topics.{name} duplicates topics.{other} ({topic})");
            }
        }

        // Thresholds
        let t = &self.thresholds;
        let all = [
            ("temp_high", t.temp_high),
            ("temp_low", t.temp_low),
            ("bpm_high", t.bpm_high),
            ("bpm_low", t.bpm_low),
            ("alcohol", t.alcohol),
            ("motion", t.motion),
        ];
        for (name, v) in all {
            if !v.is_finite() {
                eyre::bail!("thresholds.{name} must be a finite number");
            }
        }
        if t.temp_low >= t.temp_high {
            eyre::bail!("thresholds.temp_low must be < thresholds.temp_high");
        }
        if t.bpm_low <= 0.0 || t.bpm_low >= t.bpm_high {
            eyre::bail!("thresholds.bpm_low must be in (0, thresholds.bpm_high)");
        }
        if t.alcohol < 0.0 {
            eyre::bail!("thresholds.alcohol must be >= 0");
        }
        if t.motion <= 0.0 {
            eyre::bail!("thresholds.motion must be > 0");
        }

        // Alerts
        if self.alerts.cooldown_s == 0 {
            eyre::bail!("alerts.cooldown_s must be >= 1");
        }

        // Dispense
        let d = &self.dispense;
        if d.cooldown_s == 0 {
            eyre::bail!("dispense.cooldown_s must be >= 1");
        }
        if d.poll_interval_s == 0 {
            eyre::bail!("dispense.poll_interval_s must be >= 1");
        }
        if d.tolerance_min > 720 {
            eyre::bail!("dispense.tolerance_min must be <= 720");
        }
        if d.advisory_pause_ms > 60_000 {
            eyre::bail!("dispense.advisory_pause_ms is unreasonably large (>60s)");
        }
        if d.morning_end_hour > 24 || d.morning_start_hour >= d.morning_end_hour {
            eyre::bail!("dispense morning window must satisfy start < end <= 24");
        }

        // Servo
        if self.servo.open_angle > 180 || self.servo.close_angle > 180 {
            eyre::bail!("servo angles must be in [0, 180]");
        }
        if self.servo.close_delay_s > 120 {
            eyre::bail!("servo.close_delay_s is unreasonably large (>120s)");
        }

        // Stepper
        if self.stepper.steps == 0 {
            eyre::bail!("stepper.steps must be >= 1");
        }

        // Audio
        if self.audio.retry_attempts == 0 {
            eyre::bail!("audio.retry_attempts must be >= 1");
        }
        if self.audio.player.trim().is_empty() {
            eyre::bail!("audio.player must not be empty");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref() {
            if !matches!(rot, "never" | "daily" | "hourly") {
                eyre::bail!("logging.rotation must be one of never|daily|hourly");
            }
        }

        Ok(())
    }
}
