//! Logging and metrics setup

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::LoggingConfig;

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level: Level = config
        .level
        .parse()
        .with_context(|| format!("invalid log level {:?}", config.level))?;

    if config.json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .context("failed to set tracing subscriber")?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .context("failed to set tracing subscriber")?;
    }
    Ok(())
}

/// Install the global Prometheus recorder
pub fn install_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    metrics::describe_counter!("frames_sent_total", "Frames handed to the analyzer link");
    metrics::describe_counter!("frames_dropped_total", "Frames not delivered, by reason");
    metrics::describe_counter!("capture_errors_total", "Failed camera captures");
    metrics::describe_counter!("analyzer_signals_total", "Alert signals applied, by kind");
    metrics::describe_counter!("analyzer_reconnects_total", "Analyzer reconnect attempts");
    metrics::describe_gauge!("session_active", "1 while a monitoring session runs");
    Ok(handle)
}
