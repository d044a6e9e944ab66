#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Medication-box controller core (transport-agnostic).
//!
//! All I/O goes through `medibox_traits`: `Transport` for actuator commands,
//! `AudioSink` for cues, `Clock` for time. Schedules come from a
//! [`store::ScheduleSource`].
//!
//! ## Telemetry path
//!
//! Inbound message -> [`parser`] -> [`telemetry::TelemetryStore`] ->
//! [`alerts::AlertEvaluator`] -> [`throttle::AlertThrottle`] ->
//! [`audio::AudioGate`]. Driven one message at a time by [`ingest::Ingestor`].
//!
//! ## Dispense path
//!
//! [`scheduler::DispenseScheduler`] polls the schedule source, asks
//! [`schedule::ScheduleMatcher`] what is due, gates through
//! [`cooldown::DispenseCooldownTracker`], and actuates via
//! [`actuator::ActuatorDispatcher`].
//!
//! ## Errors
//!
//! Nothing here is fatal. Parse errors keep the previous reading; dispatch
//! and configuration errors skip one schedule for one cycle and are logged on
//! the `ops` tracing target.

pub mod actuator;
pub mod alerts;
pub mod audio;
pub mod config;
pub mod conversions;
pub mod cooldown;
pub mod error;
pub mod ingest;
pub mod mocks;
pub mod parser;
pub mod reading;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod throttle;
pub mod transport_error;

pub use actuator::{ActuatorDispatcher, Direction, ManualCommand, StepperCommand};
pub use alerts::{AlertClass, AlertEvaluator};
pub use audio::{AudioGate, PlayOutcome, PlaybackMode};
pub use config::{ActuatorCfg, AlertCfg, SchedulerCfg, Thresholds};
pub use cooldown::{DispenseClaim, DispenseCooldownTracker};
pub use error::{ConfigurationError, DispatchError, DispenseError, ParseError};
pub use ingest::{IngestOutcome, IngestStats, Ingestor, TopicMap};
pub use reading::{Channel, ReadingValue, SensorReading, Vector3};
pub use schedule::{
    Frequency, MedicationSchedule, MorningWindow, Motor, ScheduleMatcher, TimeOfDay, minute_gap,
    minute_offset,
};
pub use scheduler::{CycleReport, DispenseEvent, DispenseScheduler, SchedulerState, StartOutcome};
pub use store::{InMemorySchedules, JsonFileSchedules, ScheduleSource};
pub use telemetry::TelemetryStore;
pub use throttle::{AlertThrottle, Throttle};
