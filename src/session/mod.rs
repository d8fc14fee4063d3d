//! Logged-in session enumeration and machine-wide resource sampling.

#[cfg(target_os = "linux")]
pub mod linux;

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// No login database reader exists for this platform.
    #[error("session source is not supported on this platform")]
    Unsupported,
}

/// One observed login session at one tick.
///
/// `cpu_percent` and `memory_percent` are machine-wide utilization at the
/// moment the snapshot was taken, not per-session figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSample {
    /// Login name, the key login histories are tracked under.
    pub identity: String,
    /// Terminal line, e.g. `pts/0` or `tty1`.
    pub terminal: String,
    /// Remote host the session came from; empty for local logins.
    pub host: String,
    /// When the session began.
    pub started_at: DateTime<Utc>,
    /// Machine-wide CPU utilization, 0..=100.
    pub cpu_percent: f64,
    /// Machine-wide memory utilization, 0..=100.
    pub memory_percent: f64,
}

/// Supplier of the current session list.
pub trait SessionSource: Send {
    fn snapshot(&mut self) -> Result<Vec<SessionSample>, SessionError>;
}

/// Session source backed by the host's utmpx database and `sysinfo`.
pub struct SystemSessionSource {
    sys: sysinfo::System,
    last_cpu_refresh: Instant,
}

impl SystemSessionSource {
    pub fn new() -> Self {
        let mut sys = sysinfo::System::new();
        // CPU usage is a delta between two refreshes; prime the first one.
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        Self {
            sys,
            last_cpu_refresh: Instant::now(),
        }
    }

    fn utilization(&mut self) -> (f64, f64) {
        // A second refresh sooner than this reports 0% or garbage. Only the
        // first snapshot after construction ever waits; the loop's tick
        // interval is longer.
        let since = self.last_cpu_refresh.elapsed();
        if let Some(wait) = sysinfo::MINIMUM_CPU_UPDATE_INTERVAL.checked_sub(since) {
            std::thread::sleep(wait);
        }
        self.sys.refresh_cpu_usage();
        self.last_cpu_refresh = Instant::now();
        self.sys.refresh_memory();

        let cpu = self.sys.global_cpu_usage() as f64;
        let total = self.sys.total_memory();
        let memory = if total == 0 {
            0.0
        } else {
            self.sys.used_memory() as f64 / total as f64 * 100.0
        };
        (cpu, memory)
    }
}

impl Default for SystemSessionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSource for SystemSessionSource {
    fn snapshot(&mut self) -> Result<Vec<SessionSample>, SessionError> {
        let (cpu_percent, memory_percent) = self.utilization();
        let records = read_login_records()?;

        Ok(records
            .into_iter()
            .map(|r| SessionSample {
                identity: r.user,
                terminal: r.line,
                host: r.host,
                started_at: r.started_at,
                cpu_percent,
                memory_percent,
            })
            .collect())
    }
}

/// A raw login record as read from the OS.
#[derive(Debug, Clone)]
pub struct LoginRecord {
    /// `ut_user`
    pub user: String,
    /// `ut_line`
    pub line: String,
    /// `ut_host`
    pub host: String,
    /// `ut_tv`
    pub started_at: DateTime<Utc>,
}

#[cfg(target_os = "linux")]
fn read_login_records() -> Result<Vec<LoginRecord>, SessionError> {
    linux::read_utmpx()
}

#[cfg(not(target_os = "linux"))]
fn read_login_records() -> Result<Vec<LoginRecord>, SessionError> {
    Err(SessionError::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_fills_utilization_range() {
        let mut source = SystemSessionSource::new();
        match source.snapshot() {
            Ok(samples) => {
                for s in samples {
                    assert!(!s.identity.is_empty());
                    assert!((0.0..=100.0).contains(&s.memory_percent));
                    assert!(s.cpu_percent >= 0.0);
                }
            }
            // Containers and CI hosts may have no readable utmp database.
            Err(e) => println!("snapshot unavailable: {}", e),
        }
    }

    #[test]
    fn test_first_snapshot_waits_for_cpu_interval() {
        let mut source = SystemSessionSource::new();
        let start = Instant::now();
        let _ = source.snapshot();
        assert!(start.elapsed() >= sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    }
}
