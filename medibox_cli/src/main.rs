#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `medibox`: operator CLI for the medication box.

mod cli;
mod commands;
mod error_fmt;
mod logging;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{StartupError, exit_code_for_error, format_error_json, humanize};
use clap::Parser;
use medibox_config::Config;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn load_config(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path).map_err(|e| StartupError::ConfigRead {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let cfg = toml::from_str::<Config>(&text).map_err(|e| StartupError::ConfigRead {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    cfg.validate()
        .map_err(|e| StartupError::ConfigInvalid(format!("{e:#}")))?;
    Ok(cfg)
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli.config)?;
    logging::init(cli.json, &cli.log_level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    let schedules = cli
        .schedules
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.schedules.file));

    match cli.cmd {
        Commands::Run {
            simulate,
            duration_s,
            sim_period_ms,
        } => commands::run(
            &cfg,
            &schedules,
            simulate,
            duration_s.map(Duration::from_secs),
            Duration::from_millis(sim_period_ms.max(1)),
            cli.json,
        ),
        Commands::Due { at } => commands::due(&cfg, &schedules, at.as_deref(), cli.json),
        Commands::Dispense {
            motor,
            manual,
            simulate,
        } => commands::dispense(&cfg, motor, manual, simulate, cli.json),
        Commands::Trigger {
            schedule_id,
            simulate,
        } => commands::trigger(&cfg, &schedules, &schedule_id, simulate, cli.json),
        Commands::Play { category, key } => commands::play(&cfg, &category, &key, cli.json),
        Commands::Sounds => commands::sounds(&cfg, cli.json),
        Commands::SelfCheck => commands::self_check(&cfg, &schedules, cli.json),
    }
}

fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("color-eyre: {e}");
    }
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}
