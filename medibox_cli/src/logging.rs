//! Tracing setup: a console layer on stderr plus an optional JSON-lines file.

use crate::cli::FILE_GUARD;
use eyre::WrapErr;
use medibox_config::Logging;
use std::path::Path;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry, fmt};

/// Console filter: `RUST_LOG` wins over `--log-level`.
fn console_filter(level: &str) -> eyre::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(f) => Ok(f),
        Err(_) => EnvFilter::try_new(level).wrap_err_with(|| format!("invalid log level {level:?}")),
    }
}

fn file_appender(path: &Path, rotation: &str) -> tracing_appender::rolling::RollingFileAppender {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map_or_else(|| "medibox.log".into(), |n| n.to_string_lossy().into_owned());
    match rotation {
        "daily" => tracing_appender::rolling::daily(dir, name),
        "hourly" => tracing_appender::rolling::hourly(dir, name),
        _ => tracing_appender::rolling::never(dir, name),
    }
}

pub fn init(json: bool, level: &str, cfg: &Logging) -> eyre::Result<()> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console = console_filter(level)?;
    if json {
        layers.push(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_filter(console)
                .boxed(),
        );
    } else {
        layers.push(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(console)
                .boxed(),
        );
    }

    if let Some(file) = cfg.file.as_deref() {
        let file_level = cfg.level.as_deref().unwrap_or(level);
        let filter = EnvFilter::try_new(file_level)
            .wrap_err_with(|| format!("invalid logging.level {file_level:?}"))?;
        let appender = file_appender(Path::new(file), cfg.rotation.as_deref().unwrap_or("never"));
        let (writer, guard) = tracing_appender::non_blocking(appender);
        // Keep the worker alive for the whole process; flushes on exit.
        let _ = FILE_GUARD.set(guard);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| eyre::eyre!("install tracing subscriber: {e}"))
}
