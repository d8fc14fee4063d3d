//! The sampling loop: snapshot, detect, persist/forward, render, sleep.

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::detect::{Anomaly, LoginHistories, SessionAnomalyDetector};
use crate::forward::Forwarder;
use crate::render::{Console, Frame};
use crate::session::{SessionSample, SessionSource};
use crate::storage::AnomalyLog;
use crate::watch::{FileChangeEvent, FileWatcher};

/// What one tick observed and produced.
#[derive(Debug, Default)]
pub struct TickReport {
    pub sessions: Vec<SessionSample>,
    pub anomalies: Vec<Anomaly>,
    pub file_events: Vec<FileChangeEvent>,
    /// The session source failed and detection was skipped.
    pub snapshot_failed: bool,
    pub persist_failures: usize,
    pub forward_failures: usize,
}

/// Owns every piece of per-process state the loop needs. Login histories
/// live here and are only touched from the loop's task.
pub struct Monitor<S: SessionSource> {
    source: S,
    detector: SessionAnomalyDetector,
    histories: LoginHistories,
    log: AnomalyLog,
    forwarder: Option<Forwarder>,
    watcher: Option<FileWatcher>,
    console: Option<Console>,
    interval: Duration,
}

impl<S: SessionSource> Monitor<S> {
    pub fn new(source: S, log: AnomalyLog) -> Self {
        Self {
            source,
            detector: SessionAnomalyDetector::new(),
            histories: LoginHistories::new(),
            log,
            forwarder: None,
            watcher: None,
            console: None,
            interval: Duration::from_secs(10),
        }
    }

    pub fn with_detector(mut self, detector: SessionAnomalyDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_forwarder(mut self, forwarder: Option<Forwarder>) -> Self {
        self.forwarder = forwarder;
        self
    }

    pub fn with_watcher(mut self, watcher: Option<FileWatcher>) -> Self {
        self.watcher = watcher;
        self
    }

    pub fn with_console(mut self, console: Option<Console>) -> Self {
        self.console = console;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn histories(&self) -> &LoginHistories {
        &self.histories
    }

    /// Run one complete tick. Never fails: every error is handled and
    /// logged where it happens.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        match self.source.snapshot() {
            Ok(sessions) => {
                report.anomalies = self.detector.evaluate(&sessions, &mut self.histories);
                report.sessions = sessions;
            }
            Err(e) => {
                warn!(error = %e, "session snapshot failed, skipping detection this tick");
                report.snapshot_failed = true;
            }
        }

        for anomaly in &report.anomalies {
            if let Err(e) = self.log.append(anomaly).await {
                error!(id = %anomaly.id, error = %e, "failed to persist anomaly");
                report.persist_failures += 1;
            }
        }

        if let Some(fwd) = &self.forwarder {
            report.forward_failures = forward_all(fwd, &report.anomalies).await;
        }

        if let Some(watcher) = &self.watcher {
            report.file_events = watcher.drain();
        }

        if let Some(console) = &self.console {
            console.draw_stdout(&Frame {
                sessions: &report.sessions,
                anomalies: &report.anomalies,
                file_events: &report.file_events,
            });
        }

        report
    }

    /// Tick until `shutdown` resolves. The shutdown future is only polled
    /// while sleeping between ticks, so a tick in progress always finishes.
    pub async fn run_until<F>(mut self, shutdown: F) -> Vec<FileChangeEvent>
    where
        F: Future<Output = ()>,
    {
        info!(interval_secs = self.interval.as_secs(), "monitor started");
        tokio::pin!(shutdown);

        loop {
            let report = self.tick().await;
            if !report.anomalies.is_empty() {
                info!(count = report.anomalies.len(), "anomalies recorded");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut shutdown => {
                    info!("interrupt received, shutting down");
                    break;
                }
            }
        }

        self.shutdown()
    }

    /// Final drain of the watcher buffer, then release the watcher. Drained
    /// events are shown on the console (when one is attached) and logged,
    /// then returned.
    pub fn shutdown(mut self) -> Vec<FileChangeEvent> {
        let remaining = match self.watcher.take() {
            Some(watcher) => {
                let events = watcher.drain();
                watcher.stop();
                events
            }
            None => Vec::new(),
        };

        for e in &remaining {
            info!(path = %e.path.display(), kind = %e.kind, "file change");
        }
        if let Some(console) = &self.console {
            console.draw_final_stdout(&remaining);
        }
        info!(late_file_events = remaining.len(), "monitor stopped");
        remaining
    }
}

/// Grace added on top of the request timeout before the whole batch is
/// abandoned.
const FORWARD_GRACE: Duration = Duration::from_secs(1);

/// Deliver a tick's anomalies concurrently. The batch shares one deadline of
/// a single request timeout plus [`FORWARD_GRACE`], so a hung collector
/// delays the tick by at most that much regardless of batch size. Returns
/// the number of anomalies that were not delivered.
async fn forward_all(fwd: &Forwarder, anomalies: &[Anomaly]) -> usize {
    if anomalies.is_empty() {
        return 0;
    }

    let deliveries = futures::future::join_all(anomalies.iter().map(|a| fwd.forward(a)));
    match tokio::time::timeout(fwd.timeout() + FORWARD_GRACE, deliveries).await {
        Ok(results) => {
            let mut failures = 0;
            for (anomaly, result) in anomalies.iter().zip(results) {
                if let Err(e) = result {
                    warn!(id = %anomaly.id, url = %fwd.url(), error = %e, "failed to forward anomaly");
                    failures += 1;
                }
            }
            failures
        }
        Err(_) => {
            warn!(
                url = %fwd.url(),
                count = anomalies.len(),
                "collector deadline exceeded, dropping undelivered anomalies"
            );
            anomalies.len()
        }
    }
}
