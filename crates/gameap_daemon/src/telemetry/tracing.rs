use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gameap_config::{DaemonConfig, LogLevel};

/// `RUST_LOG` wins over the configured level.
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()))
}

/// Installs the global subscriber: compact console output, plus a plain file
/// copy when `output_log` is set.
pub fn init_subscriber(cfg: &DaemonConfig) -> anyhow::Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer().compact().with_level(true);

    let file_layer = if cfg.output_log.is_empty() {
        None
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.output_log)
            .with_context(|| format!("failed to open log file {}", cfg.output_log))?;

        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
    };

    tracing_subscriber::registry()
        .with(env_filter(cfg.log_level()))
        .with(fmt_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}
