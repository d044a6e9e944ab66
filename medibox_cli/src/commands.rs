//! Subcommand implementations. Each builds the collaborators it needs from
//! the validated `Config` and tears them down in order before returning.

use crate::cli::{DirectionArg, ManualArgs, MotorArg};
use crate::error_fmt::StartupError;
use chrono::NaiveDateTime;
use crossbeam_channel as xch;
use eyre::WrapErr;
use medibox_config::{Config, ScheduleFileContents, load_schedules_json};
use medibox_core::{
    ActuatorCfg, ActuatorDispatcher, AlertEvaluator, AudioGate, ConfigurationError, Direction,
    DispenseError, DispenseScheduler, Frequency, IngestStats, Ingestor, JsonFileSchedules,
    ManualCommand, MedicationSchedule, Motor, PlayOutcome, PlaybackMode, ScheduleMatcher,
    SchedulerCfg, StepperCommand, TelemetryStore, TimeOfDay, TopicMap,
};
use medibox_hardware::{CommandPlayer, LogOnlyAudio, SimulatedSensors, SimulatedTransport};
use medibox_traits::{AudioCue, AudioSink, Clock, LinkEvent, SystemClock, Transport};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const AUDIO_DRAIN: Duration = Duration::from_secs(2);
/// When set, the simulated link starts disconnected. Used by the CLI tests.
const SIM_LINK_DOWN_ENV: &str = "MEDIBOX_SIM_LINK_DOWN";

// ── Shared wiring ────────────────────────────────────────────────────────────

/// Keeps the link's background threads alive; dropping it closes the event
/// channel so the ingest loop can finish.
struct LinkGuard {
    _sensors: Option<SimulatedSensors>,
    #[cfg(feature = "mqtt")]
    _mqtt: Option<Arc<medibox_hardware::MqttLink>>,
}

struct Link {
    transport: Arc<dyn Transport + Send + Sync>,
    simulated: Option<Arc<SimulatedTransport>>,
    _guard: LinkGuard,
}

impl Link {
    fn published(&self) -> Option<u64> {
        self.simulated.as_ref().map(|t| t.published())
    }
}

/// Open the broker link, or the simulated one. With `sim_feed` the simulated
/// sensors publish into `events` at that period.
fn open_link(
    cfg: &Config,
    simulate: bool,
    sim_feed: Option<Duration>,
    events: xch::Sender<LinkEvent>,
) -> eyre::Result<Link> {
    if simulate {
        let transport = Arc::new(SimulatedTransport::new());
        if std::env::var_os(SIM_LINK_DOWN_ENV).is_some() {
            tracing::warn!("simulated link starts disconnected");
            transport.set_connected(false);
        }
        let sensors = match sim_feed {
            Some(period) => Some(
                SimulatedSensors::spawn(&cfg.topics, period, None, events)
                    .wrap_err("start simulated sensor feed")?,
            ),
            None => None,
        };
        tracing::info!(feed = sensors.is_some(), "using simulated link");
        return Ok(Link {
            transport: transport.clone(),
            simulated: Some(transport),
            _guard: LinkGuard {
                _sensors: sensors,
                #[cfg(feature = "mqtt")]
                _mqtt: None,
            },
        });
    }
    open_broker(cfg, events)
}

#[cfg(feature = "mqtt")]
fn open_broker(cfg: &Config, events: xch::Sender<LinkEvent>) -> eyre::Result<Link> {
    let subscriptions = TopicMap::from(&cfg.topics)
        .topics()
        .into_iter()
        .map(str::to_owned)
        .collect();
    let mqtt = Arc::new(
        medibox_hardware::MqttLink::connect(&cfg.broker, subscriptions, events)
            .wrap_err("start broker link")?,
    );
    Ok(Link {
        transport: mqtt.clone(),
        simulated: None,
        _guard: LinkGuard {
            _sensors: None,
            _mqtt: Some(mqtt),
        },
    })
}

#[cfg(not(feature = "mqtt"))]
fn open_broker(_cfg: &Config, _events: xch::Sender<LinkEvent>) -> eyre::Result<Link> {
    eyre::bail!("this build has no broker support; pass --simulate or rebuild with --features mqtt")
}

/// Block until the link reports `Connected`. Only the broker link needs this;
/// the simulated transport is connected from the start.
fn await_connected(events: &xch::Receiver<LinkEvent>) -> eyre::Result<()> {
    let deadline = Instant::now() + CONNECT_TIMEOUT;
    let mut last_failure = None;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(left) {
            Ok(LinkEvent::Connected) => return Ok(()),
            Ok(LinkEvent::ConnectFailed(reason)) => {
                tracing::warn!(%reason, "broker connection attempt failed");
                last_failure = Some(reason);
            }
            Ok(LinkEvent::Message(_)) => {}
            Err(_) => break,
        }
    }
    match last_failure {
        Some(reason) => eyre::bail!("broker not reachable within {CONNECT_TIMEOUT:?}: {reason}"),
        None => eyre::bail!("broker not reachable within {CONNECT_TIMEOUT:?}"),
    }
}

fn audio_sink(cfg: &Config) -> Arc<dyn AudioSink + Send + Sync> {
    if Path::new(&cfg.audio.sounds_dir).is_dir() {
        Arc::new(CommandPlayer::from_config(&cfg.audio))
    } else {
        tracing::warn!(dir = %cfg.audio.sounds_dir, "sounds directory missing, cues are logged only");
        Arc::new(LogOnlyAudio)
    }
}

fn load_schedule_file(path: &Path) -> eyre::Result<ScheduleFileContents> {
    let contents = load_schedules_json(path).map_err(|e| StartupError::ScheduleFile {
        path: path.to_path_buf(),
        reason: format!("{e:#}"),
    })?;
    Ok(contents)
}

fn print_json(value: &serde_json::Value) {
    println!("{value}");
}

// ── run ──────────────────────────────────────────────────────────────────────

pub fn run(
    cfg: &Config,
    schedules: &Path,
    simulate: bool,
    duration: Option<Duration>,
    sim_period: Duration,
    json: bool,
) -> eyre::Result<()> {
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(SystemClock::new());
    let gate = Arc::new(AudioGate::new(audio_sink(cfg), PlaybackMode::Background));
    let evaluator = Arc::new(AlertEvaluator::new(
        (&cfg.thresholds).into(),
        (&cfg.alerts).into(),
        Arc::clone(&gate),
        Arc::clone(&clock),
    ));
    let telemetry = Arc::new(TelemetryStore::with_evaluator(Arc::clone(&evaluator)));
    let ingestor = Ingestor::new(
        TopicMap::from(&cfg.topics),
        Arc::clone(&telemetry),
        Arc::clone(&evaluator),
        Arc::clone(&clock),
    );

    let (tx, rx) = xch::unbounded::<LinkEvent>();
    let link = open_link(cfg, simulate, Some(sim_period), tx)?;
    let ingest = std::thread::Builder::new()
        .name("ingest".into())
        .spawn(move || ingestor.run(&rx))
        .wrap_err("spawn ingest thread")?;

    let dispatcher = Arc::new(ActuatorDispatcher::new(
        Arc::clone(&link.transport),
        Arc::clone(&gate),
        ActuatorCfg::from(cfg),
    ));
    let scheduler = DispenseScheduler::new(
        Arc::new(JsonFileSchedules::new(schedules)),
        Arc::clone(&dispatcher),
        Arc::clone(&gate),
        Arc::clone(&clock),
        SchedulerCfg::from(&cfg.dispense),
    );

    evaluator.announce_startup();
    scheduler.start()?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .wrap_err("install Ctrl-C handler")?;
    }
    let deadline = duration.map(|d| Instant::now() + d);
    tracing::info!(?duration, "running; Ctrl-C to stop");
    while !interrupted.load(Ordering::SeqCst) && deadline.is_none_or(|d| Instant::now() < d) {
        std::thread::sleep(Duration::from_millis(100));
    }

    tracing::info!("shutting down");
    scheduler.stop();
    dispatcher.shutdown();
    let published = link.published();
    // The dispatcher and scheduler share the transport; the link only closes
    // its event channel once the last handle is gone.
    drop(scheduler);
    drop(dispatcher);
    drop(link);
    let stats = match ingest.join() {
        Ok(stats) => stats,
        Err(_) => {
            tracing::warn!("ingest thread panicked");
            IngestStats::default()
        }
    };
    gate.wait_idle(AUDIO_DRAIN);

    if json {
        print_json(&serde_json::json!({
            "stored": stats.stored,
            "rejected": stats.rejected,
            "unknown": stats.unknown,
            "alerts": stats.alerts,
            "channels": telemetry.len(),
            "published": published,
        }));
    } else {
        println!(
            "ingested {} readings ({} rejected, {} unknown topic), {} alerts, {} channels live",
            stats.stored,
            stats.rejected,
            stats.unknown,
            stats.alerts,
            telemetry.len()
        );
    }
    Ok(())
}

// ── due ──────────────────────────────────────────────────────────────────────

fn parse_at(s: &str) -> eyre::Result<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%dT%H:%M:%S",
    ];
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s.trim(), f).ok())
        .ok_or_else(|| eyre::eyre!("--at {s:?}: expected \"YYYY-MM-DD HH:MM\""))
}

pub fn due(cfg: &Config, schedules: &Path, at: Option<&str>, json: bool) -> eyre::Result<()> {
    let now = match at {
        Some(s) => parse_at(s)?,
        None => SystemClock::new().local_now(),
    };
    let contents = load_schedule_file(schedules)?;
    for rejected in &contents.rejected {
        tracing::warn!(index = rejected.index, reason = %rejected.reason, "schedule record skipped");
    }
    let sched_cfg = SchedulerCfg::from(&cfg.dispense);
    let matcher = ScheduleMatcher::new(sched_cfg.tolerance_min);

    for record in &contents.records {
        let schedule = MedicationSchedule::from(record);
        let verdict = matcher.matching_times(&schedule, now);
        let hit = verdict
            .as_ref()
            .ok()
            .and_then(|times| times.first().copied())
            .map(|t| (t, sched_cfg.morning.motor_for(t)));
        if json {
            print_json(&serde_json::json!({
                "id": schedule.id,
                "medication": schedule.name,
                "due": hit.is_some(),
                "time": hit.map(|(t, _)| t.to_string()),
                "motor": hit.map(|(_, m)| m.as_str()),
                "error": verdict.as_ref().err().map(ToString::to_string),
            }));
            continue;
        }
        match (&verdict, hit) {
            (Err(e), _) => println!("{}\t{}\terror: {e}", schedule.id, schedule.name),
            (Ok(_), Some((t, motor))) => {
                println!("{}\t{}\tdue at {t} via {motor}", schedule.id, schedule.name);
            }
            (Ok(_), None) => println!("{}\t{}\tnot due", schedule.id, schedule.name),
        }
    }
    Ok(())
}

// ── dispense ─────────────────────────────────────────────────────────────────

pub fn dispense(
    cfg: &Config,
    motor: MotorArg,
    manual: ManualArgs,
    simulate: bool,
    json: bool,
) -> eyre::Result<()> {
    let command = match (motor, manual.angle) {
        (MotorArg::Servo, Some(angle)) => ManualCommand::ServoAngle(angle),
        (MotorArg::Servo, None) => ManualCommand::ServoDispense,
        (MotorArg::Stepper, Some(_)) => eyre::bail!("--angle applies to the servo only"),
        (MotorArg::Stepper, None) => ManualCommand::Stepper(StepperCommand {
            steps: manual.steps.unwrap_or(cfg.stepper.steps),
            direction: match manual.direction {
                Some(DirectionArg::Cw) => Direction::Cw,
                Some(DirectionArg::Ccw) => Direction::Ccw,
                None => cfg.stepper.direction.into(),
            },
        }),
    };

    let (tx, rx) = xch::unbounded::<LinkEvent>();
    let link = open_link(cfg, simulate, None, tx)?;
    if !simulate {
        await_connected(&rx)?;
    }
    let gate = Arc::new(AudioGate::new(audio_sink(cfg), PlaybackMode::Inline));
    let actuators = ActuatorCfg::from(cfg);
    let close_delay = actuators.close_delay;
    let dispatcher = ActuatorDispatcher::new(Arc::clone(&link.transport), gate, actuators);

    dispatcher.manual(command).map_err(DispenseError::from)?;
    if command == ManualCommand::ServoDispense {
        // Let the close fire on schedule rather than fast-forwarding it.
        std::thread::sleep(close_delay);
    }
    dispatcher.shutdown();

    let motor = match motor {
        MotorArg::Stepper => Motor::Stepper,
        MotorArg::Servo => Motor::Servo,
    };
    match (command, json) {
        (ManualCommand::ServoAngle(angle), true) => print_json(&serde_json::json!({
            "motor": motor.as_str(),
            "angle": angle,
            "published": link.published(),
        })),
        (ManualCommand::ServoAngle(angle), false) => println!("servo moved to {angle}"),
        (_, true) => print_json(&serde_json::json!({
            "motor": motor.as_str(),
            "published": link.published(),
        })),
        (_, false) => println!("dispensed via {motor}"),
    }
    Ok(())
}

// ── audio ────────────────────────────────────────────────────────────────────

/// Play one cue now and wait for the renderer.
pub fn play(cfg: &Config, category: &str, key: &str, json: bool) -> eyre::Result<()> {
    let Some(cue) = AudioCue::parse(category, key) else {
        eyre::bail!("unknown cue {category}/{key}; `medibox sounds` lists the catalogue");
    };
    let gate = AudioGate::new(audio_sink(cfg), PlaybackMode::Inline);
    let outcome = gate.play(cue);
    if outcome != PlayOutcome::Played {
        eyre::bail!("cue {category}/{key} was not played ({outcome:?})");
    }
    if json {
        print_json(&serde_json::json!({
            "category": category,
            "key": key,
            "sound": cue.sound_name(),
            "played": true,
        }));
    } else {
        println!("played {category}/{key}");
    }
    Ok(())
}

/// Cue catalogue with the sound file each resolves to.
pub fn sounds(cfg: &Config, json: bool) -> eyre::Result<()> {
    let player = CommandPlayer::from_config(&cfg.audio);
    let rows: Vec<_> = AudioCue::ALL
        .into_iter()
        .map(|cue| {
            let file = player
                .resolve(cue.category().as_str(), cue.key())
                .ok()
                .map(|p| p.display().to_string());
            (cue, file)
        })
        .collect();
    if json {
        let list: Vec<_> = rows
            .iter()
            .map(|(cue, file)| {
                serde_json::json!({
                    "category": cue.category().as_str(),
                    "key": cue.key(),
                    "sound": cue.sound_name(),
                    "file": file,
                })
            })
            .collect();
        print_json(&serde_json::json!({
            "sounds_dir": cfg.audio.sounds_dir,
            "cues": list,
        }));
    } else {
        for (cue, file) in &rows {
            println!(
                "{}/{}\t{}",
                cue.category().as_str(),
                cue.key(),
                file.as_deref().unwrap_or("missing")
            );
        }
    }
    Ok(())
}

// ── trigger ──────────────────────────────────────────────────────────────────

pub fn trigger(
    cfg: &Config,
    schedules: &Path,
    schedule_id: &str,
    simulate: bool,
    json: bool,
) -> eyre::Result<()> {
    let (tx, rx) = xch::unbounded::<LinkEvent>();
    let link = open_link(cfg, simulate, None, tx)?;
    if !simulate {
        await_connected(&rx)?;
    }
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(SystemClock::new());
    let gate = Arc::new(AudioGate::new(audio_sink(cfg), PlaybackMode::Inline));
    let actuators = ActuatorCfg::from(cfg);
    let close_delay = actuators.close_delay;
    let dispatcher = Arc::new(ActuatorDispatcher::new(
        Arc::clone(&link.transport),
        Arc::clone(&gate),
        actuators,
    ));
    let scheduler = DispenseScheduler::new(
        Arc::new(JsonFileSchedules::new(schedules)),
        Arc::clone(&dispatcher),
        gate,
        clock,
        SchedulerCfg::from(&cfg.dispense),
    );

    let event = scheduler.trigger(schedule_id)?;
    if event.motor == Motor::Servo {
        std::thread::sleep(close_delay);
    }
    dispatcher.shutdown();

    if json {
        print_json(&serde_json::to_value(&event)?);
    } else {
        println!(
            "dispensed {} ({}) via {} at {}",
            event.medication, event.schedule_id, event.motor, event.dispensed_at
        );
    }
    Ok(())
}

// ── self-check ───────────────────────────────────────────────────────────────

pub fn self_check(cfg: &Config, schedules: &Path, json: bool) -> eyre::Result<()> {
    let contents = load_schedule_file(schedules)?;
    if !contents.rejected.is_empty() {
        let detail = contents
            .rejected
            .iter()
            .map(|r| format!("#{}: {}", r.index, r.reason))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(StartupError::ScheduleFile {
            path: schedules.to_path_buf(),
            reason: format!("{} bad record(s): {detail}", contents.rejected.len()),
        }
        .into());
    }

    let mut bad: Vec<String> = Vec::new();
    for record in &contents.records {
        let schedule = MedicationSchedule::from(record);
        for raw in &schedule.scheduled_times {
            if raw.parse::<TimeOfDay>().is_err() {
                bad.push(
                    ConfigurationError::InvalidTime {
                        schedule_id: schedule.id.clone(),
                        value: raw.clone(),
                    }
                    .to_string(),
                );
            }
        }
        if let Frequency::SpecificWeekdays(days) = &schedule.frequency {
            for &day in days.iter().filter(|d| **d > 6) {
                bad.push(
                    ConfigurationError::InvalidWeekday {
                        schedule_id: schedule.id.clone(),
                        day,
                    }
                    .to_string(),
                );
            }
        }
    }
    if !bad.is_empty() {
        return Err(StartupError::ScheduleFile {
            path: schedules.to_path_buf(),
            reason: bad.join("; "),
        }
        .into());
    }

    let missing = if Path::new(&cfg.audio.sounds_dir).is_dir() {
        let missing = CommandPlayer::from_config(&cfg.audio).missing_sounds();
        for cue in &missing {
            tracing::warn!(category = cue.category().as_str(), key = cue.key(), "sound file missing");
        }
        Some(missing.len())
    } else {
        tracing::warn!(dir = %cfg.audio.sounds_dir, "sounds directory missing");
        None
    };

    if json {
        print_json(&serde_json::json!({
            "ok": true,
            "schedules": contents.records.len(),
            "missing_sounds": missing,
        }));
    } else {
        let sounds = missing.map_or_else(
            || "sounds directory missing".to_owned(),
            |n| format!("{n} sound file(s) missing"),
        );
        println!("ok: {} schedule(s), {sounds}", contents.records.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_at_accepts_both_separators() {
        let a = parse_at("2026-03-09 07:30").expect("space");
        let b = parse_at("2026-03-09T07:30:00").expect("T");
        assert_eq!(a, b);
        assert!(parse_at("07:30").is_err());
    }
}
