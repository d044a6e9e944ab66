//! Actuator commands: stepper (single command) and servo (open, timed close).
//!
//! Success means the command was handed to the transport. There is no
//! feedback from the motors.
//!
//! Each servo dispense leaves a pending close running on its own thread so the
//! caller never waits out the close delay. [`ActuatorDispatcher::shutdown`]
//! (also run on drop) fast-forwards pending closes: the wait is cut short and
//! the close command is still published, so the servo is never left open.

use crate::audio::AudioGate;
use crate::config::ActuatorCfg;
use crate::error::DispatchError;
use crate::schedule::Motor;
use crate::transport_error::map_publish_error;
use crossbeam_channel as xch;
use medibox_traits::{AudioCue, MedicationCue, SystemCue, Transport, UserCue};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

pub const MAX_SERVO_ANGLE: u16 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Direction {
    #[default]
    #[serde(rename = "CW")]
    Cw,
    #[serde(rename = "CCW")]
    Ccw,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cw => "CW",
            Self::Ccw => "CCW",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire form of a stepper command: `{"steps":200,"direction":"CW"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepperCommand {
    pub steps: u32,
    pub direction: Direction,
}

impl StepperCommand {
    pub fn encode(&self) -> Result<Vec<u8>, DispatchError> {
        serde_json::to_vec(self).map_err(|e| DispatchError::Encode {
            what: "stepper",
            reason: e.to_string(),
        })
    }
}

/// An operator command issued outside the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualCommand {
    /// Move the servo to an angle and leave it there.
    ServoAngle(u16),
    /// Stepper dispense with explicit steps and direction.
    Stepper(StepperCommand),
    /// Servo open and timed close, as a scheduled dose.
    ServoDispense,
}

struct PendingClose {
    /// Dropping the sender wakes the close thread early.
    cancel: xch::Sender<()>,
    handle: JoinHandle<()>,
}

/// Shared by the delayed-close threads.
struct Link {
    transport: Arc<dyn Transport + Send + Sync>,
    audio: Arc<AudioGate>,
}

impl Link {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), DispatchError> {
        self.transport.publish(topic, payload).map_err(|e| {
            let err = map_publish_error(topic, &*e);
            tracing::error!(target: "ops", topic, error = %err, "actuator publish failed");
            err
        })
    }

    fn publish_angle(&self, topic: &str, angle: u16) -> Result<(), DispatchError> {
        if angle > MAX_SERVO_ANGLE {
            return Err(DispatchError::OutOfRange {
                what: "servo angle",
                value: i64::from(angle),
            });
        }
        self.publish(topic, angle.to_string().as_bytes())
    }

    fn close_servo(&self, cfg: &ActuatorCfg) {
        if self.publish_angle(&cfg.servo_topic, cfg.close_angle).is_ok() {
            tracing::info!(angle = cfg.close_angle, "servo closed");
            self.audio.play(AudioCue::Medication(MedicationCue::Complete));
        }
    }
}

pub struct ActuatorDispatcher {
    link: Arc<Link>,
    cfg: ActuatorCfg,
    pending: Mutex<Vec<PendingClose>>,
}

impl fmt::Debug for ActuatorDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActuatorDispatcher")
            .field("cfg", &self.cfg)
            .field("pending_closes", &self.pending_closes())
            .finish_non_exhaustive()
    }
}

impl ActuatorDispatcher {
    pub fn new(
        transport: Arc<dyn Transport + Send + Sync>,
        audio: Arc<AudioGate>,
        cfg: ActuatorCfg,
    ) -> Self {
        Self {
            link: Arc::new(Link { transport, audio }),
            cfg,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn cfg(&self) -> &ActuatorCfg {
        &self.cfg
    }

    fn pending(&self) -> MutexGuard<'_, Vec<PendingClose>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Dispense with the configured stepper command or the servo sequence.
    pub fn dispense(&self, motor: Motor) -> Result<(), DispatchError> {
        match motor {
            Motor::Stepper => {
                self.dispense_via_stepper(self.cfg.stepper_steps, self.cfg.stepper_direction)
            }
            Motor::Servo => self.dispense_via_servo(),
        }
    }

    pub fn dispense_via_stepper(&self, steps: u32, direction: Direction) -> Result<(), DispatchError> {
        if steps == 0 {
            return Err(DispatchError::OutOfRange {
                what: "stepper steps",
                value: 0,
            });
        }
        let payload = StepperCommand { steps, direction }.encode()?;
        self.link.publish(&self.cfg.stepper_topic, &payload)?;
        tracing::info!(steps, %direction, "stepper dispense");
        self.link
            .audio
            .play(AudioCue::Medication(MedicationCue::Dispensing));
        Ok(())
    }

    /// Open the servo now; the close follows after the configured delay
    /// without blocking the caller.
    pub fn dispense_via_servo(&self) -> Result<(), DispatchError> {
        self.link
            .publish_angle(&self.cfg.servo_topic, self.cfg.open_angle)?;
        tracing::info!(angle = self.cfg.open_angle, "servo opened");
        self.link
            .audio
            .play(AudioCue::Medication(MedicationCue::Dispensing));
        self.schedule_close();
        Ok(())
    }

    /// Direct servo positioning, outside any dispense sequence.
    pub fn set_servo_angle(&self, angle: u16) -> Result<(), DispatchError> {
        self.link.publish_angle(&self.cfg.servo_topic, angle)
    }

    /// Run an operator command. The press-button cue acknowledges success,
    /// the error cue reports a failure.
    pub fn manual(&self, cmd: ManualCommand) -> Result<(), DispatchError> {
        let result = match cmd {
            ManualCommand::ServoAngle(angle) => self.set_servo_angle(angle).inspect(|()| {
                tracing::info!(angle, "servo moved");
            }),
            ManualCommand::Stepper(StepperCommand { steps, direction }) => {
                self.dispense_via_stepper(steps, direction)
            }
            ManualCommand::ServoDispense => self.dispense_via_servo(),
        };
        let cue = match &result {
            Ok(()) => AudioCue::User(UserCue::PressButton),
            Err(e) => {
                tracing::warn!(?cmd, error = %e, "manual command failed");
                AudioCue::System(SystemCue::Error)
            }
        };
        self.link.audio.play(cue);
        result
    }

    fn schedule_close(&self) {
        let (cancel, cancelled) = xch::bounded::<()>(0);
        let link = Arc::clone(&self.link);
        let cfg = self.cfg.clone();
        let spawned = std::thread::Builder::new()
            .name("servo-close".into())
            .spawn(move || {
                match cancelled.recv_timeout(cfg.close_delay) {
                    Err(xch::RecvTimeoutError::Timeout) => {}
                    _ => tracing::debug!("servo close fast-forwarded by shutdown"),
                }
                link.close_servo(&cfg);
            });
        match spawned {
            Ok(handle) => {
                let mut pending = self.pending();
                pending.retain(|p| !p.handle.is_finished());
                pending.push(PendingClose { cancel, handle });
            }
            Err(e) => {
                tracing::warn!(error = %e, "servo close thread spawn failed, closing now");
                self.link.close_servo(&self.cfg);
            }
        }
    }

    /// Servo closes scheduled but not yet published.
    pub fn pending_closes(&self) -> usize {
        self.pending()
            .iter()
            .filter(|p| !p.handle.is_finished())
            .count()
    }

    /// Publish every pending close now and wait for them. Idempotent.
    pub fn shutdown(&self) {
        let drained: Vec<PendingClose> = std::mem::take(&mut *self.pending());
        for PendingClose { cancel, handle } in drained {
            drop(cancel);
            if handle.join().is_err() {
                tracing::warn!("servo close thread panicked");
            }
        }
    }
}

impl Drop for ActuatorDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PlaybackMode;
    use crate::mocks::{RecordingAudio, RecordingTransport};
    use std::time::{Duration, Instant};

    fn dispatcher(
        close_delay: Duration,
    ) -> (ActuatorDispatcher, Arc<RecordingTransport>, Arc<RecordingAudio>) {
        let transport = Arc::new(RecordingTransport::new());
        let audio = Arc::new(RecordingAudio::new());
        let gate = Arc::new(AudioGate::new(audio.clone(), PlaybackMode::Inline));
        let cfg = ActuatorCfg {
            close_delay,
            ..ActuatorCfg::default()
        };
        (
            ActuatorDispatcher::new(transport.clone(), gate, cfg),
            transport,
            audio,
        )
    }

    #[test]
    fn stepper_command_wire_format() {
        let cmd = StepperCommand {
            steps: 200,
            direction: Direction::Ccw,
        };
        assert_eq!(
            cmd.encode().expect("encode"),
            br#"{"steps":200,"direction":"CCW"}"#.to_vec()
        );
    }

    #[test]
    fn stepper_dispense_publishes_once_with_cue() {
        let (d, transport, audio) = dispatcher(Duration::from_secs(3));
        d.dispense(Motor::Stepper).expect("dispense");
        assert_eq!(
            transport.published_on("actuators/stepper"),
            vec![r#"{"steps":200,"direction":"CW"}"#.to_string()]
        );
        assert_eq!(audio.count("medication", "dispensing"), 1);
        assert_eq!(d.pending_closes(), 0);
    }

    #[test]
    fn zero_steps_rejected_before_publish() {
        let (d, transport, _) = dispatcher(Duration::from_secs(3));
        assert!(matches!(
            d.dispense_via_stepper(0, Direction::Cw),
            Err(DispatchError::OutOfRange { .. })
        ));
        assert!(transport.published().is_empty());
    }

    #[test]
    fn servo_opens_then_closes_after_delay() {
        let (d, transport, audio) = dispatcher(Duration::from_millis(50));
        let t0 = Instant::now();
        d.dispense(Motor::Servo).expect("dispense");
        assert!(t0.elapsed() < Duration::from_millis(50), "caller must not wait");
        assert_eq!(transport.published_on("actuators/servo"), vec!["90".to_string()]);
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(
            transport.published_on("actuators/servo"),
            vec!["90".to_string(), "0".to_string()]
        );
        assert_eq!(audio.count("medication", "complete"), 1);
        assert_eq!(d.pending_closes(), 0);
    }

    #[test]
    fn shutdown_fast_forwards_pending_close() {
        let (d, transport, _) = dispatcher(Duration::from_secs(60));
        d.dispense_via_servo().expect("dispense");
        assert_eq!(d.pending_closes(), 1);
        let t0 = Instant::now();
        d.shutdown();
        assert!(t0.elapsed() < Duration::from_secs(5));
        assert_eq!(
            transport.published_on("actuators/servo"),
            vec!["90".to_string(), "0".to_string()]
        );
        assert_eq!(d.pending_closes(), 0);
        d.shutdown();
    }

    #[test]
    fn failed_open_schedules_no_close() {
        let (d, transport, audio) = dispatcher(Duration::from_millis(10));
        transport.set_failing(true);
        assert!(matches!(
            d.dispense_via_servo(),
            Err(DispatchError::Publish { .. })
        ));
        assert_eq!(d.pending_closes(), 0);
        assert!(audio.played().is_empty());
    }

    #[test]
    fn servo_angle_bounds() {
        let (d, transport, _) = dispatcher(Duration::from_secs(3));
        d.set_servo_angle(180).expect("in range");
        assert_eq!(
            d.set_servo_angle(181),
            Err(DispatchError::OutOfRange {
                what: "servo angle",
                value: 181
            })
        );
        assert_eq!(transport.published_on("actuators/servo"), vec!["180".to_string()]);
    }

    #[test]
    fn manual_angle_is_acknowledged() {
        let (d, transport, audio) = dispatcher(Duration::from_secs(3));
        d.manual(ManualCommand::ServoAngle(45)).expect("move");
        assert_eq!(transport.published_on("actuators/servo"), vec!["45".to_string()]);
        assert_eq!(
            audio.played(),
            vec![("user_interaction".into(), "press_button".into())]
        );
        assert_eq!(d.pending_closes(), 0);
    }

    #[test]
    fn manual_stepper_uses_given_steps() {
        let (d, transport, audio) = dispatcher(Duration::from_secs(3));
        let cmd = StepperCommand {
            steps: 50,
            direction: Direction::Ccw,
        };
        d.manual(ManualCommand::Stepper(cmd)).expect("step");
        assert_eq!(
            transport.published_on("actuators/stepper"),
            vec![r#"{"steps":50,"direction":"CCW"}"#.to_string()]
        );
        assert_eq!(audio.count("user_interaction", "press_button"), 1);
    }

    #[test]
    fn manual_failure_plays_error_cue() {
        let (d, transport, audio) = dispatcher(Duration::from_secs(3));
        assert!(d.manual(ManualCommand::ServoAngle(200)).is_err());
        transport.set_failing(true);
        assert!(d.manual(ManualCommand::ServoDispense).is_err());
        assert_eq!(audio.count("system_status", "error"), 2);
        assert_eq!(audio.count("user_interaction", "press_button"), 0);
        assert!(transport.published().is_empty());
    }
}
