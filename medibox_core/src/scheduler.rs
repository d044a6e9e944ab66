//! Periodic dispense loop.
//!
//! States: `Idle -> Running -> Idle`. `start` while running and `stop` while
//! idle are no-ops. `stop` lets the in-flight cycle finish.
//!
//! One cycle:
//! 1. fetch active schedules;
//! 2. skip schedules still cooling down;
//! 3. match against local time and drop occurrences already served; the
//!    earliest remaining time picks the motor (morning: stepper, otherwise
//!    servo);
//! 4. "time to take" cue, advisory pause, actuate;
//! 5. on a successful hand-off, record the dispense and its occurrence.
//!
//! An occurrence is one configured time on one date, so a matching window
//! wider than the cooldown still yields a single dose.
//!
//! A failure on one schedule is logged and never stops the rest of the cycle.

use crate::actuator::ActuatorDispatcher;
use crate::audio::AudioGate;
use crate::config::SchedulerCfg;
use crate::cooldown::DispenseCooldownTracker;
use crate::error::{ConfigurationError, DispenseError};
use crate::schedule::{MedicationSchedule, Motor, ScheduleMatcher, TimeOfDay};
use crate::store::ScheduleSource;
use chrono::NaiveDateTime;
use crossbeam_channel as xch;
use eyre::WrapErr;
use medibox_traits::{AudioCue, Clock, MedicationCue};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// One dose handed to an actuator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispenseEvent {
    pub schedule_id: String,
    pub patient_id: String,
    pub medication: String,
    pub dosage: String,
    /// `None` for manual triggers.
    pub matched_time: Option<TimeOfDay>,
    pub motor: Motor,
    pub dispensed_at: NaiveDateTime,
}

/// What one cycle did, schedule by schedule.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub dispensed: Vec<DispenseEvent>,
    /// Ids skipped because of the dispense cooldown.
    pub cooling_down: Vec<String>,
    /// Ids that matched only occurrences dispensed in an earlier cycle.
    pub already_dispensed: Vec<String>,
    pub not_due: usize,
    pub failed: Vec<(String, DispenseError)>,
    /// Set when the schedule store could not be read; nothing else ran.
    pub store_error: Option<String>,
}

struct Inner {
    source: Arc<dyn ScheduleSource + Send + Sync>,
    matcher: ScheduleMatcher,
    cooldowns: DispenseCooldownTracker,
    dispatcher: Arc<ActuatorDispatcher>,
    audio: Arc<AudioGate>,
    clock: Arc<dyn Clock + Send + Sync>,
    cfg: SchedulerCfg,
}

impl Inner {
    fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let schedules = match self.source.list_active_schedules() {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(target: "ops", error = %e, "schedule store unavailable, cycle skipped");
                report.store_error = Some(format!("{e:#}"));
                return report;
            }
        };
        let now = self.clock.now();
        let wall = self.clock.local_now();
        for schedule in &schedules {
            let id = schedule.id.as_str();
            if !self
                .cooldowns
                .can_dispense(id, now, self.cfg.dispense_cooldown)
            {
                tracing::trace!(schedule_id = id, "cooling down");
                report.cooling_down.push(schedule.id.clone());
                continue;
            }
            let hits = match self.matcher.matching_times(schedule, wall) {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::error!(target: "ops", schedule_id = id, error = %e, "schedule skipped");
                    report.failed.push((schedule.id.clone(), e.into()));
                    continue;
                }
            };
            if hits.is_empty() {
                report.not_due += 1;
                continue;
            }
            let pending = hits
                .into_iter()
                .map(|t| (t, t.occurrence_near(wall)))
                .find(|(_, occ)| !self.cooldowns.occurrence_served(id, *occ));
            let Some((time, occurrence)) = pending else {
                tracing::trace!(schedule_id = id, "occurrence already dispensed");
                report.already_dispensed.push(schedule.id.clone());
                continue;
            };
            let motor = self.cfg.morning.motor_for(time);
            match self.dispense(schedule, Some((time, occurrence)), motor) {
                Ok(ev) => report.dispensed.push(ev),
                Err(e) => report.failed.push((schedule.id.clone(), e)),
            }
        }
        report
    }

    fn dispense(
        &self,
        schedule: &MedicationSchedule,
        matched: Option<(TimeOfDay, NaiveDateTime)>,
        motor: Motor,
    ) -> Result<DispenseEvent, DispenseError> {
        let id = schedule.id.as_str();
        let (matched_time, occurrence) = matched.unzip();
        let claim = self
            .cooldowns
            .try_begin_occurrence(id, occurrence, self.clock.now(), self.cfg.dispense_cooldown)
            .ok_or_else(|| DispenseError::CoolingDown(schedule.id.clone()))?;

        tracing::info!(
            schedule_id = id,
            medication = %schedule.name,
            %motor,
            time = ?matched_time.map(|t| t.to_string()),
            "medication due"
        );
        self.audio
            .play(AudioCue::Medication(MedicationCue::TimeToTake));
        self.clock.sleep(self.cfg.advisory_pause);

        if let Err(e) = self.dispatcher.dispense(motor) {
            tracing::error!(target: "ops", schedule_id = id, %motor, error = %e, "dispense failed");
            return Err(e.into());
        }
        claim.commit(self.clock.now());
        tracing::info!(schedule_id = id, %motor, "dispensed");
        Ok(DispenseEvent {
            schedule_id: schedule.id.clone(),
            patient_id: schedule.patient_id.clone(),
            medication: schedule.name.clone(),
            dosage: schedule.dosage.clone(),
            matched_time,
            motor,
            dispensed_at: self.clock.local_now(),
        })
    }
}

struct Worker {
    stop: xch::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct DispenseScheduler {
    inner: Arc<Inner>,
    worker: Mutex<Option<Worker>>,
}

impl fmt::Debug for DispenseScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispenseScheduler")
            .field("cfg", &self.inner.cfg)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl DispenseScheduler {
    pub fn new(
        source: Arc<dyn ScheduleSource + Send + Sync>,
        dispatcher: Arc<ActuatorDispatcher>,
        audio: Arc<AudioGate>,
        clock: Arc<dyn Clock + Send + Sync>,
        cfg: SchedulerCfg,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                matcher: ScheduleMatcher::new(cfg.tolerance_min),
                cooldowns: DispenseCooldownTracker::new(),
                dispatcher,
                audio,
                clock,
                cfg,
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn cfg(&self) -> &SchedulerCfg {
        &self.inner.cfg
    }

    pub fn cooldowns(&self) -> &DispenseCooldownTracker {
        &self.inner.cooldowns
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One poll cycle on the caller's thread.
    pub fn run_cycle(&self) -> CycleReport {
        self.inner.run_cycle()
    }

    /// Dispense `schedule_id` now, through the same cooldown gate as the
    /// loop. The motor follows the current local time of day.
    pub fn trigger(&self, schedule_id: &str) -> Result<DispenseEvent, DispenseError> {
        let all = self
            .inner
            .source
            .list_schedules()
            .map_err(|e| DispenseError::Store(format!("{e:#}")))?;
        let schedule = all
            .into_iter()
            .find(|s| s.id == schedule_id)
            .ok_or_else(|| ConfigurationError::UnknownSchedule(schedule_id.to_owned()))?;
        if !schedule.is_active {
            return Err(ConfigurationError::Inactive(schedule.id).into());
        }
        let now = TimeOfDay::from(self.inner.clock.local_now().time());
        let motor = self.inner.cfg.morning.motor_for(now);
        tracing::info!(schedule_id, %motor, "manual dispense");
        self.inner.dispense(&schedule, None, motor)
    }

    pub fn state(&self) -> SchedulerState {
        match &*self.worker() {
            Some(w) if !w.handle.is_finished() => SchedulerState::Running,
            _ => SchedulerState::Idle,
        }
    }

    /// Spawn the poll thread. The first cycle runs immediately, then one per
    /// `poll_interval` measured start to start.
    pub fn start(&self) -> crate::error::Result<StartOutcome> {
        let mut slot = self.worker();
        if slot.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            tracing::info!("dispense scheduler already running");
            return Ok(StartOutcome::AlreadyRunning);
        }
        let (stop, stopped) = xch::bounded::<()>(1);
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name("dispense-scheduler".into())
            .spawn(move || {
                tracing::info!(
                    poll_s = inner.cfg.poll_interval.as_secs(),
                    "dispense scheduler started"
                );
                loop {
                    let began = Instant::now();
                    let report = inner.run_cycle();
                    tracing::debug!(
                        dispensed = report.dispensed.len(),
                        cooling = report.cooling_down.len(),
                        already = report.already_dispensed.len(),
                        not_due = report.not_due,
                        failed = report.failed.len(),
                        "cycle done"
                    );
                    let wait = inner.cfg.poll_interval.saturating_sub(began.elapsed());
                    match stopped.recv_timeout(wait) {
                        Err(xch::RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                }
                tracing::info!("dispense scheduler stopped");
            })
            .wrap_err("spawn dispense scheduler thread")?;
        *slot = Some(Worker { stop, handle });
        Ok(StartOutcome::Started)
    }

    /// Ask the loop to stop and wait for the current cycle to finish.
    /// Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        let Some(Worker { stop, handle }) = self.worker().take() else {
            return false;
        };
        let was_running = !handle.is_finished();
        let _ = stop.try_send(());
        drop(stop);
        if handle.join().is_err() {
            tracing::warn!("dispense scheduler thread panicked");
        }
        was_running
    }
}

impl Drop for DispenseScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PlaybackMode;
    use crate::config::ActuatorCfg;
    use crate::mocks::{FailingSchedules, RecordingAudio, RecordingTransport};
    use crate::store::InMemorySchedules;
    use chrono::NaiveDate;
    use medibox_traits::clock::test_clock::TestClock;
    use rstest::rstest;
    use std::time::Duration;

    struct Rig {
        scheduler: DispenseScheduler,
        transport: Arc<RecordingTransport>,
        audio: Arc<RecordingAudio>,
        clock: Arc<TestClock>,
        store: Arc<InMemorySchedules>,
    }

    fn rig_with(
        hour: u32,
        minute: u32,
        schedules: Vec<MedicationSchedule>,
        source: Option<Arc<dyn ScheduleSource + Send + Sync>>,
    ) -> Rig {
        rig_full(hour, minute, 0, schedules, source, SchedulerCfg::default())
    }

    fn rig_full(
        hour: u32,
        minute: u32,
        second: u32,
        schedules: Vec<MedicationSchedule>,
        source: Option<Arc<dyn ScheduleSource + Send + Sync>>,
        cfg: SchedulerCfg,
    ) -> Rig {
        let wall = NaiveDate::from_ymd_opt(2026, 3, 10)
            .and_then(|d| d.and_hms_opt(hour, minute, second))
            .expect("valid");
        let clock = Arc::new(TestClock::starting_at(wall));
        let transport = Arc::new(RecordingTransport::new());
        let audio = Arc::new(RecordingAudio::new());
        let gate = Arc::new(AudioGate::new(audio.clone(), PlaybackMode::Inline));
        let dispatcher = Arc::new(ActuatorDispatcher::new(
            transport.clone(),
            gate.clone(),
            ActuatorCfg {
                close_delay: Duration::from_millis(1),
                ..ActuatorCfg::default()
            },
        ));
        let store = Arc::new(InMemorySchedules::new(schedules));
        let source = source.unwrap_or_else(|| store.clone() as Arc<dyn ScheduleSource + Send + Sync>);
        let scheduler = DispenseScheduler::new(
            source,
            dispatcher,
            gate,
            clock.clone(),
            cfg,
        );
        Rig {
            scheduler,
            transport,
            audio,
            clock,
            store,
        }
    }

    fn rig(hour: u32, minute: u32, schedules: Vec<MedicationSchedule>) -> Rig {
        rig_with(hour, minute, schedules, None)
    }

    #[test]
    fn due_schedule_dispenses_with_advisory_first() {
        let r = rig(8, 0, vec![MedicationSchedule::daily("m", "Morning", &["8:00 AM"])]);
        let report = r.scheduler.run_cycle();
        assert_eq!(report.dispensed.len(), 1);
        let ev = &report.dispensed[0];
        assert_eq!(ev.motor, Motor::Stepper);
        assert_eq!(ev.matched_time.map(|t| t.to_string()), Some("08:00".into()));
        assert_eq!(r.transport.published_on("actuators/stepper").len(), 1);
        let played = r.audio.played();
        assert_eq!(played[0], ("medication".into(), "time_to_take".into()));
        assert_eq!(played[1], ("medication".into(), "dispensing".into()));
    }

    #[test]
    fn evening_schedule_uses_servo() {
        let r = rig(19, 31, vec![MedicationSchedule::daily("e", "Evening", &["7:30 PM"])]);
        let report = r.scheduler.run_cycle();
        assert_eq!(report.dispensed[0].motor, Motor::Servo);
        assert_eq!(r.transport.published_on("actuators/servo")[0], "90");
    }

    #[rstest]
    #[case(12, 0, &["12:02 PM", "11:58 AM"], Motor::Stepper, "11:58")]
    #[case(6, 0, &["06:02", "05:58"], Motor::Servo, "05:58")]
    #[case(0, 0, &["00:02", "11:58 PM"], Motor::Servo, "23:58")]
    fn earliest_match_picks_the_motor_across_boundaries(
        #[case] hour: u32,
        #[case] minute: u32,
        #[case] times: &[&str],
        #[case] motor: Motor,
        #[case] matched: &str,
    ) {
        let r = rig(hour, minute, vec![MedicationSchedule::daily("s", "Split", times)]);
        let report = r.scheduler.run_cycle();
        assert_eq!(report.dispensed.len(), 1);
        assert_eq!(report.dispensed[0].motor, motor);
        assert_eq!(
            report.dispensed[0].matched_time.map(|t| t.to_string()),
            Some(matched.to_owned())
        );
    }

    #[test]
    fn running_loop_gives_one_dose_across_the_whole_window() {
        let r = rig_full(
            7,
            50,
            30,
            vec![MedicationSchedule::daily("m", "Morning", &["08:00 AM"])],
            None,
            SchedulerCfg::default(),
        );
        let mut dispensed = Vec::new();
        let mut already = 0;
        for _ in 0..20 {
            let report = r.scheduler.run_cycle();
            dispensed.extend(report.dispensed);
            already += report.already_dispensed.len();
            r.clock.advance(Duration::from_secs(60));
        }
        assert_eq!(dispensed.len(), 1, "{dispensed:?}");
        assert!(already > 0);
        assert_eq!(r.transport.published_on("actuators/stepper").len(), 1);
    }

    #[test]
    fn zero_advisory_pause_does_not_redispense_at_the_window_edge() {
        let cfg = SchedulerCfg {
            advisory_pause: Duration::ZERO,
            ..SchedulerCfg::default()
        };
        let r = rig_full(
            8,
            0,
            0,
            vec![MedicationSchedule::daily("m", "Morning", &["08:00"])],
            None,
            cfg,
        );
        let mut dispensed = 0;
        for k in 0..10u64 {
            r.clock.set_offset(Duration::from_secs(k * 60));
            dispensed += r.scheduler.run_cycle().dispensed.len();
        }
        assert_eq!(dispensed, 1);
    }

    #[test]
    fn second_time_in_the_window_is_still_served() {
        let cfg = SchedulerCfg {
            advisory_pause: Duration::ZERO,
            dispense_cooldown: Duration::from_secs(60),
            ..SchedulerCfg::default()
        };
        let r = rig_full(
            8,
            0,
            0,
            vec![MedicationSchedule::daily("m", "Pair", &["07:58", "08:03"])],
            None,
            cfg,
        );
        let first = r.scheduler.run_cycle();
        assert_eq!(first.dispensed[0].matched_time.map(|t| t.to_string()), Some("07:58".into()));
        r.clock.advance(Duration::from_secs(120));
        let second = r.scheduler.run_cycle();
        assert_eq!(second.dispensed[0].matched_time.map(|t| t.to_string()), Some("08:03".into()));
    }

    #[test]
    fn one_failure_does_not_stop_the_cycle() {
        let r = rig(
            8,
            0,
            vec![
                MedicationSchedule::daily("bad", "Typo", &["8:00 XM"]),
                MedicationSchedule::daily("ok", "Fine", &["08:00"]),
                MedicationSchedule::daily("later", "Later", &["13:00"]),
            ],
        );
        let report = r.scheduler.run_cycle();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bad");
        assert_eq!(report.dispensed.len(), 1);
        assert_eq!(report.not_due, 1);
    }

    #[test]
    fn dispatch_failure_is_not_recorded() {
        let r = rig(8, 0, vec![MedicationSchedule::daily("m", "M", &["08:00"])]);
        r.transport.set_failing(true);
        let report = r.scheduler.run_cycle();
        assert!(matches!(
            report.failed.as_slice(),
            [(_, DispenseError::Dispatch(_))]
        ));
        assert!(r.scheduler.cooldowns().last_dispensed("m").is_none());
        r.transport.set_failing(false);
        r.clock.advance(Duration::from_secs(60));
        assert_eq!(r.scheduler.run_cycle().dispensed.len(), 1);
    }

    #[test]
    fn store_failure_skips_cycle() {
        let r = rig_with(8, 0, Vec::new(), Some(Arc::new(FailingSchedules)));
        let report = r.scheduler.run_cycle();
        assert!(report.store_error.is_some());
        assert!(report.dispensed.is_empty());
    }

    #[test]
    fn trigger_respects_cooldown_and_activity() {
        let r = rig(15, 0, vec![MedicationSchedule::daily("m", "M", &["08:00"])]);
        let ev = r.scheduler.trigger("m").expect("manual dispense");
        assert_eq!(ev.motor, Motor::Servo);
        assert_eq!(ev.matched_time, None);
        assert_eq!(
            r.scheduler.trigger("m"),
            Err(DispenseError::CoolingDown("m".into()))
        );
        assert_eq!(
            r.scheduler.trigger("nope"),
            Err(ConfigurationError::UnknownSchedule("nope".into()).into())
        );
        let mut off = MedicationSchedule::daily("off", "Off", &["08:00"]);
        off.is_active = false;
        r.store.upsert(off);
        assert_eq!(
            r.scheduler.trigger("off"),
            Err(ConfigurationError::Inactive("off".into()).into())
        );
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let r = rig(3, 0, Vec::new());
        assert_eq!(r.scheduler.state(), SchedulerState::Idle);
        assert!(!r.scheduler.stop());
        assert_eq!(r.scheduler.start().expect("start"), StartOutcome::Started);
        assert_eq!(
            r.scheduler.start().expect("start"),
            StartOutcome::AlreadyRunning
        );
        assert_eq!(r.scheduler.state(), SchedulerState::Running);
        assert!(r.scheduler.stop());
        assert_eq!(r.scheduler.state(), SchedulerState::Idle);
        assert!(!r.scheduler.stop());
        assert_eq!(r.scheduler.start().expect("restart"), StartOutcome::Started);
    }
}
