//! Human-readable error descriptions, exit codes and structured JSON errors.

use medibox_core::error::{ConfigurationError, DispatchError, DispenseError};
use std::path::PathBuf;
use thiserror::Error;

/// Failures before any command runs. Each maps to its own exit code.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot read config {path}: {reason}")]
    ConfigRead { path: PathBuf, reason: String },
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("schedule file {path}: {reason}")]
    ScheduleFile { path: PathBuf, reason: String },
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(se) = err.downcast_ref::<StartupError>() {
        return match se {
            StartupError::ConfigRead { path, reason } => format!(
                "What happened: Could not read the config file {} ({reason}).\nLikely causes: Wrong --config path or malformed TOML.\nHow to fix: Pass --config <FILE> pointing at a valid TOML file; every section is optional.",
                path.display()
            ),
            StartupError::ConfigInvalid(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range or inconsistent values in the TOML.\nHow to fix: Edit the config file, then rerun `medibox self-check`."
            ),
            StartupError::ScheduleFile { path, reason } => format!(
                "What happened: Schedule file {} is unusable ({reason}).\nLikely causes: Missing file, invalid JSON, or records with bad fields.\nHow to fix: Check [schedules].file in the config or --schedules, and fix the listed records.",
                path.display()
            ),
        };
    }

    if let Some(de) = err.downcast_ref::<DispenseError>() {
        return match de {
            DispenseError::CoolingDown(id) => format!(
                "What happened: Schedule {id} was dispensed recently.\nLikely causes: The dispense cooldown window has not elapsed.\nHow to fix: Wait for the cooldown (dispense.cooldown_s) and try again."
            ),
            DispenseError::Config(ConfigurationError::UnknownSchedule(id)) => format!(
                "What happened: No schedule with id {id}.\nLikely causes: Typo in the id or the schedule file changed.\nHow to fix: Run `medibox due` to list schedules."
            ),
            DispenseError::Config(ConfigurationError::Inactive(id)) => format!(
                "What happened: Schedule {id} is inactive.\nLikely causes: is_active is false in the schedule store.\nHow to fix: Activate the schedule first."
            ),
            DispenseError::Dispatch(DispatchError::LinkDown { topic }) => format!(
                "What happened: The broker link is down; nothing was published to {topic}.\nLikely causes: Broker unreachable or wrong [broker] host/port.\nHow to fix: Check the broker, or use --simulate."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(de) = err.downcast_ref::<DispatchError>() {
        return format!(
            "What happened: {de}.\nLikely causes: Broker unreachable, or a value outside the actuator's range.\nHow to fix: Check [broker], [servo] and [stepper] in the config."
        );
    }

    // String-based heuristics for errors coming from link setup
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("broker not reachable") {
        return format!(
            "What happened: {msg}.\nLikely causes: Broker down, wrong [broker] host/port, or rejected credentials.\nHow to fix: Check the broker and the [broker] section, or use --simulate."
        );
    }
    if lower.contains("no broker support") {
        return "What happened: This binary was built without broker support.\nLikely causes: The `mqtt` feature was not enabled.\nHow to fix: Pass --simulate, or rebuild with `--features mqtt`.".to_string();
    }

    let cause = err
        .chain()
        .nth(1)
        .map(|src| format!(" Cause: {src}"))
        .unwrap_or_default();
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 config, 3 schedule file, 4 dispense refused or not
/// delivered, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(se) = err.downcast_ref::<StartupError>() {
        return match se {
            StartupError::ConfigRead { .. } | StartupError::ConfigInvalid(_) => 2,
            StartupError::ScheduleFile { .. } => 3,
        };
    }
    if err.downcast_ref::<DispenseError>().is_some() || err.downcast_ref::<DispatchError>().is_some()
    {
        return 4;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(se) = err.downcast_ref::<StartupError>() {
        return match se {
            StartupError::ConfigRead { .. } => "ConfigRead",
            StartupError::ConfigInvalid(_) => "ConfigInvalid",
            StartupError::ScheduleFile { .. } => "ScheduleFile",
        };
    }
    match err.downcast_ref::<DispenseError>() {
        Some(DispenseError::CoolingDown(_)) => "CoolingDown",
        Some(DispenseError::Config(_)) => "Configuration",
        Some(DispenseError::Dispatch(_)) => "Dispatch",
        Some(DispenseError::Store(_)) => "Store",
        None if err.downcast_ref::<DispatchError>().is_some() => "Dispatch",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
