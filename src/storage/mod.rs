//! Append-only anomaly log -- one JSON object per line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::detect::Anomaly;

// ---------------------------------------------------------------------------
// AnomalyLog
// ---------------------------------------------------------------------------

/// Anomaly sink backed by a JSON-lines file opened in append mode.
pub struct AnomalyLog {
    path: PathBuf,
    writer: Mutex<tokio::fs::File>,
}

impl AnomalyLog {
    /// Open (or create) the anomaly log at `path`, creating parent
    /// directories as needed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create log directory: {}", parent.display()))?;
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to open anomaly log: {}", path.display()))?;

        debug!(path = %path.display(), "anomaly log opened");

        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    /// Append a single anomaly as a JSON line.
    pub async fn append(&self, anomaly: &Anomaly) -> Result<()> {
        let mut line = serde_json::to_string(anomaly).context("failed to serialize anomaly")?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to write to anomaly log: {}", self.path.display()))?;
        writer
            .flush()
            .await
            .with_context(|| format!("failed to flush anomaly log: {}", self.path.display()))?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse every non-blank line of an anomaly log.
pub async fn read_all(path: &Path) -> Result<Vec<Anomaly>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read anomaly log: {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(n, l)| {
            serde_json::from_str(l)
                .with_context(|| format!("malformed anomaly at {}:{}", path.display(), n + 1))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Resource;
    use crate::session::SessionSample;
    use chrono::Utc;

    fn sample(identity: &str) -> SessionSample {
        SessionSample {
            identity: identity.to_string(),
            terminal: "tty1".to_string(),
            host: String::new(),
            started_at: Utc::now(),
            cpu_percent: 95.0,
            memory_percent: 12.5,
        }
    }

    #[tokio::test]
    async fn test_lines_in_file_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("anomaly_log.json");
        let log = AnomalyLog::open(&path).await.unwrap();

        let written: Vec<Anomaly> = (0..4)
            .map(|i| match i % 2 {
                0 => Anomaly::login_burst(&sample(&format!("user{}", i))),
                _ => Anomaly::resource_high(&sample(&format!("user{}", i)), Resource::Cpu),
            })
            .collect();
        for a in &written {
            log.append(a).await.unwrap();
        }

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = content.trim_end().split('\n').collect();
        assert_eq!(lines.len(), 4);
        for (line, expected) in lines.iter().zip(&written) {
            let parsed: Anomaly = serde_json::from_str(line).unwrap();
            assert_eq!(&parsed, expected);
        }
    }

    #[tokio::test]
    async fn test_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("var/log/userwatch/anomalies.jsonl");

        let log = AnomalyLog::open(&path).await.unwrap();
        log.append(&Anomaly::login_burst(&sample("root"))).await.unwrap();

        assert!(path.exists());
        assert_eq!(log.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_reopen_appends() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("anomaly_log.json");

        {
            let log = AnomalyLog::open(&path).await.unwrap();
            log.append(&Anomaly::login_burst(&sample("a"))).await.unwrap();
        }
        {
            let log = AnomalyLog::open(&path).await.unwrap();
            log.append(&Anomaly::resource_high(&sample("b"), Resource::Memory))
                .await
                .unwrap();
        }

        let all = read_all(&path).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "a");
        assert_eq!(all[1].name, "b");
        assert_eq!(all[1].resource(), Some(Resource::Memory));
    }

    #[tokio::test]
    async fn test_read_all_rejects_garbage() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, "{not json}\n").await.unwrap();
        assert!(read_all(&path).await.is_err());
    }
}
