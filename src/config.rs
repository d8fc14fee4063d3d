//! TOML configuration.
//!
//! Layered the usual way: an explicit path, then the `USERWATCH_CONFIG`
//! environment variable, then the system location, then compiled-in
//! defaults. Command-line flags are applied on top by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const CONFIG_ENV: &str = "USERWATCH_CONFIG";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/userwatch/userwatch.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub monitor: LoopConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MonitorConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve configuration. An explicit path must load; the environment
    /// and system locations fall through to defaults on failure.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "{} set but file could not be loaded, trying fallback",
                        CONFIG_ENV
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize configuration")
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Sampling cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Seconds between ticks. Zero is treated as one.
    pub tick_interval_secs: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 10,
        }
    }
}

impl LoopConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }
}

/// Directories watched recursively for changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Paths that do not exist at startup are skipped with a warning.
    pub paths: Vec<PathBuf>,
}

/// Local anomaly sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// JSON-lines file anomalies are appended to.
    pub path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("anomaly_log.json"),
        }
    }
}

/// Optional remote collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Endpoint anomalies are POSTed to. Unset disables forwarding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Per-request timeout. A tick waits at most about this long on the
    /// collector, however many anomalies it produced.
    pub timeout_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 5,
        }
    }
}

impl CollectorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Detector state tuning. The rule thresholds themselves are fixed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Forget identities unseen for this many ticks. Unset keeps them for
    /// the life of the process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evict_idle_after_ticks: Option<u64>,
}

/// Console summary printed by `run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Clear the terminal before each redraw.
    pub clear_screen: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { clear_screen: true }
    }
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

/// Diagnostic logging, written to stderr. `RUST_LOG` overrides `level`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// `text` or `json`.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.monitor.tick_interval_secs, 10);
        assert_eq!(cfg.monitor.tick_interval(), Duration::from_secs(10));
        assert!(cfg.watch.paths.is_empty());
        assert_eq!(cfg.log.path, PathBuf::from("anomaly_log.json"));
        assert!(cfg.collector.url.is_none());
        assert_eq!(cfg.collector.timeout(), Duration::from_secs(5));
        assert!(cfg.detection.evict_idle_after_ticks.is_none());
        assert!(cfg.console.clear_screen);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[monitor]
tick_interval_secs = 3

[watch]
paths = ["/etc", "/home/alice/.ssh"]

[log]
path = "/var/log/userwatch/anomalies.jsonl"

[collector]
url = "https://collector.example.net/ingest"
timeout_secs = 2

[detection]
evict_idle_after_ticks = 360

[console]
clear_screen = false

[logging]
level = "debug"
format = "json"
"#;
        let cfg: MonitorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.monitor.tick_interval_secs, 3);
        assert_eq!(cfg.watch.paths.len(), 2);
        assert_eq!(
            cfg.log.path,
            PathBuf::from("/var/log/userwatch/anomalies.jsonl")
        );
        assert_eq!(
            cfg.collector.url.as_deref(),
            Some("https://collector.example.net/ingest")
        );
        assert_eq!(cfg.collector.timeout_secs, 2);
        assert_eq!(cfg.detection.evict_idle_after_ticks, Some(360));
        assert!(!cfg.console.clear_screen);
        assert_eq!(cfg.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: MonitorConfig = toml::from_str("[watch]\npaths = [\"/tmp\"]\n").unwrap();
        assert_eq!(cfg.watch.paths, vec![PathBuf::from("/tmp")]);
        assert_eq!(cfg.monitor.tick_interval_secs, 10);
        assert_eq!(cfg.collector.timeout_secs, 5);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let cfg: MonitorConfig = toml::from_str("[monitor]\ntick_interval_secs = 0\n").unwrap();
        assert_eq!(cfg.monitor.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_resolve_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[log]\npath = \"custom.json\"\n").unwrap();
        let cfg = MonitorConfig::resolve(Some(file.path())).unwrap();
        assert_eq!(cfg.log.path, PathBuf::from("custom.json"));
    }

    #[test]
    fn test_resolve_explicit_missing_is_error() {
        assert!(MonitorConfig::resolve(Some(Path::new("/nonexistent/userwatch.toml"))).is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut cfg = MonitorConfig::default();
        cfg.collector.url = Some("http://127.0.0.1:9000/".to_string());
        cfg.watch.paths.push(PathBuf::from("/etc"));
        let text = cfg.to_toml().unwrap();
        let back: MonitorConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.collector.url, cfg.collector.url);
        assert_eq!(back.watch.paths, cfg.watch.paths);
    }
}
