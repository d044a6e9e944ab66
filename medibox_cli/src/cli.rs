//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "medibox", version, about = "Medication box controller")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/medibox.toml")]
    pub config: PathBuf,

    /// Override the schedule file from the config
    #[arg(long, value_name = "FILE")]
    pub schedules: Option<PathBuf>,

    /// Log and print as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum MotorArg {
    Stepper,
    Servo,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum DirectionArg {
    Cw,
    Ccw,
}

/// Operator overrides for `dispense`.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct ManualArgs {
    /// Stepper steps (default from config)
    #[arg(long)]
    pub steps: Option<u32>,
    /// Stepper direction (default from config)
    #[arg(long, value_enum)]
    pub direction: Option<DirectionArg>,
    /// Move the servo to this angle (0..=180) and leave it there
    #[arg(long, value_name = "DEG", conflicts_with_all = ["steps", "direction"])]
    pub angle: Option<u16>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest telemetry and run the dispense scheduler until Ctrl-C
    Run {
        /// Use the simulated link and sensor feed instead of the broker
        #[arg(long, action = ArgAction::SetTrue)]
        simulate: bool,
        /// Stop by itself after this many seconds
        #[arg(long, value_name = "SECS")]
        duration_s: Option<u64>,
        /// Simulated feed period in milliseconds
        #[arg(long, value_name = "MS", default_value_t = 2000)]
        sim_period_ms: u64,
    },
    /// List which schedules are due at a local date-time and which motor each would use
    Due {
        /// Local time, "YYYY-MM-DD HH:MM" or "YYYY-MM-DDTHH:MM[:SS]"; defaults to now
        #[arg(long, value_name = "DATETIME")]
        at: Option<String>,
    },
    /// Drive one actuator directly
    Dispense {
        #[arg(long, value_enum)]
        motor: MotorArg,
        #[command(flatten)]
        manual: ManualArgs,
        #[arg(long, action = ArgAction::SetTrue)]
        simulate: bool,
    },
    /// Dispense one schedule now, motor chosen from the current time of day
    Trigger {
        /// Schedule id
        schedule_id: String,
        #[arg(long, action = ArgAction::SetTrue)]
        simulate: bool,
    },
    /// Play one audio cue now, e.g. `play health high_temp`
    Play {
        category: String,
        key: String,
    },
    /// List the audio cue catalogue and the sound file behind each cue
    Sounds,
    /// Validate config, schedule file and sound files
    SelfCheck,
}
