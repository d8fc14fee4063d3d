//! userwatch -- single-host user session behavior monitor.
//!
//! Polls logged-in sessions on a fixed interval, flags login bursts and high
//! resource usage, watches directories for changes, and appends anomalies to
//! a JSON-lines log, optionally forwarding each to a remote collector.

pub mod config;
pub mod detect;
pub mod forward;
pub mod monitor;
pub mod render;
pub mod session;
pub mod storage;
pub mod watch;

use anyhow::{Context, Result};
use std::future::Future;

use crate::config::MonitorConfig;
use crate::detect::SessionAnomalyDetector;
use crate::forward::Forwarder;
use crate::monitor::{Monitor, TickReport};
use crate::render::Console;
use crate::session::SessionSource;
use crate::storage::AnomalyLog;
use crate::watch::{FileChangeEvent, FileWatcher};

/// Assemble a [`Monitor`] from configuration.
///
/// Only the log file is mandatory. A collector or watcher that cannot be set
/// up is logged and left out.
pub async fn build_monitor<S: SessionSource>(
    config: &MonitorConfig,
    source: S,
    console: bool,
) -> Result<Monitor<S>> {
    // 1. Log sink
    let log = AnomalyLog::open(&config.log.path)
        .await
        .context("cannot start without an anomaly log")?;
    tracing::info!(path = %log.path().display(), "appending anomalies");

    // 2. Collector
    let forwarder = match &config.collector.url {
        Some(url) => match Forwarder::new(url.clone(), config.collector.timeout()) {
            Ok(f) => {
                tracing::info!(%url, "forwarding anomalies to collector");
                Some(f)
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "collector disabled");
                None
            }
        },
        None => None,
    };

    // 3. File watcher
    let watcher = if config.watch.paths.is_empty() {
        None
    } else {
        match FileWatcher::start(&config.watch.paths) {
            Ok(w) => Some(w),
            Err(e) => {
                tracing::warn!(error = %e, "file watching disabled");
                None
            }
        }
    };

    let detector =
        SessionAnomalyDetector::new().with_idle_eviction(config.detection.evict_idle_after_ticks);

    Ok(Monitor::new(source, log)
        .with_detector(detector)
        .with_forwarder(forwarder)
        .with_watcher(watcher)
        .with_console(console.then(|| Console::new(config.console.clear_screen)))
        .with_interval(config.monitor.tick_interval()))
}

/// Run the monitor until `shutdown` resolves. Returns the file changes that
/// arrived after the last tick; they have already been printed and logged.
pub async fn run<S, F>(
    config: &MonitorConfig,
    source: S,
    shutdown: F,
) -> Result<Vec<FileChangeEvent>>
where
    S: SessionSource,
    F: Future<Output = ()>,
{
    let monitor = build_monitor(config, source, true).await?;
    Ok(monitor.run_until(shutdown).await)
}

/// Run a single tick and tear down. Changes caught by the final drain are
/// folded into the report.
pub async fn run_once<S: SessionSource>(config: &MonitorConfig, source: S) -> Result<TickReport> {
    let mut monitor = build_monitor(config, source, true).await?;
    let mut report = monitor.tick().await;
    report.file_events.extend(monitor.shutdown());
    Ok(report)
}
