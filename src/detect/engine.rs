use crate::detect::anomaly::{Anomaly, Resource};
use crate::detect::history::LoginHistories;
use crate::session::SessionSample;
use chrono::Duration;
use tracing::{debug, warn};

/// Five logins closer together than this are a burst.
pub const BURST_WINDOW_SECS: i64 = 300;

/// Utilization strictly above this percentage is flagged.
pub const RESOURCE_THRESHOLD_PERCENT: f64 = 80.0;

/// Evaluates the burst-login and resource-usage rules over each tick's
/// session samples.
#[derive(Debug, Default)]
pub struct SessionAnomalyDetector {
    evict_idle_after_ticks: Option<u64>,
}

impl SessionAnomalyDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop identities unseen for more than `ticks` ticks at the end of each
    /// evaluation.
    pub fn with_idle_eviction(mut self, ticks: Option<u64>) -> Self {
        self.evict_idle_after_ticks = ticks;
        self
    }

    /// Run both rules for every sample, in order, updating `histories` for
    /// every identity observed.
    pub fn evaluate(
        &self,
        samples: &[SessionSample],
        histories: &mut LoginHistories,
    ) -> Vec<Anomaly> {
        histories.begin_tick();
        let mut anomalies = Vec::new();

        for sample in samples {
            let history = histories.record(&sample.identity, sample.started_at);

            if history.is_full() {
                if let Some(span) = history.span() {
                    if span >= Duration::zero() && span < Duration::seconds(BURST_WINDOW_SECS) {
                        warn!(
                            identity = %sample.identity,
                            terminal = %sample.terminal,
                            span_ms = span.num_milliseconds(),
                            "login burst detected"
                        );
                        anomalies.push(Anomaly::login_burst(sample));
                    }
                }
            }

            if sample.cpu_percent > RESOURCE_THRESHOLD_PERCENT {
                debug!(identity = %sample.identity, cpu = sample.cpu_percent, "high cpu");
                anomalies.push(Anomaly::resource_high(sample, Resource::Cpu));
            }
            if sample.memory_percent > RESOURCE_THRESHOLD_PERCENT {
                debug!(identity = %sample.identity, memory = sample.memory_percent, "high memory");
                anomalies.push(Anomaly::resource_high(sample, Resource::Memory));
            }
        }

        if let Some(ticks) = self.evict_idle_after_ticks {
            let evicted = histories.evict_idle(ticks);
            if evicted > 0 {
                debug!(evicted, "evicted idle login histories");
            }
        }

        anomalies
    }
}
