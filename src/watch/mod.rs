//! Filesystem change watching.
//!
//! A [`FileWatcher`] wraps a `notify` watcher whose callback runs on a
//! background thread and appends to a shared buffer. The sampling loop calls
//! [`FileWatcher::drain`] once per tick to take whatever accumulated.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to initialize file watcher: {0}")]
    Init(#[from] notify::Error),
}

/// What happened to a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    /// Access and anything else notify reports.
    Other,
}

impl From<&EventKind> for ChangeKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Modify(_) => ChangeKind::Modified,
            EventKind::Remove(_) => ChangeKind::Deleted,
            _ => ChangeKind::Other,
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    /// When the event was received, not when the file changed.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// EventBuffer
// ---------------------------------------------------------------------------

/// Mutex-protected, ordered queue shared between the notify thread
/// (producer) and the sampling loop (consumer).
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    inner: Arc<Mutex<Vec<FileChangeEvent>>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic on the notify thread must not take the monitor down with it.
    fn lock(&self) -> MutexGuard<'_, Vec<FileChangeEvent>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, event: FileChangeEvent) {
        self.lock().push(event);
    }

    /// Take all buffered events, leaving the buffer empty.
    pub fn drain(&self) -> Vec<FileChangeEvent> {
        std::mem::take(&mut *self.lock())
    }

    fn record(&self, event: Event) {
        let kind = ChangeKind::from(&event.kind);
        let timestamp = Utc::now();
        let mut buf = self.lock();
        for path in event.paths {
            buf.push(FileChangeEvent {
                path,
                kind,
                timestamp,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// FileWatcher
// ---------------------------------------------------------------------------

/// Handle to a running recursive watcher over a set of directories.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    buffer: EventBuffer,
    watched: Vec<PathBuf>,
}

impl FileWatcher {
    /// Start watching every path in `paths` recursively.
    ///
    /// Paths that do not exist or cannot be watched are logged and skipped;
    /// only failing to create the watcher itself is an error.
    pub fn start<P: AsRef<Path>>(paths: &[P]) -> Result<Self, WatchError> {
        let buffer = EventBuffer::new();
        let producer = buffer.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => producer.record(event),
            Err(e) => warn!(error = %e, "file watch error"),
        })?;

        let mut watched = Vec::new();
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                warn!(path = %path.display(), "watch path does not exist, skipping");
                continue;
            }
            match watcher.watch(path, RecursiveMode::Recursive) {
                Ok(()) => {
                    info!(path = %path.display(), "watching");
                    watched.push(path.to_path_buf());
                }
                Err(e) => warn!(path = %path.display(), error = %e, "cannot watch path, skipping"),
            }
        }

        Ok(Self {
            watcher,
            buffer,
            watched,
        })
    }

    /// Non-blocking: return and clear everything accumulated so far.
    pub fn drain(&self) -> Vec<FileChangeEvent> {
        self.buffer.drain()
    }

    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Unwatch all paths and release the background watcher.
    pub fn stop(mut self) {
        for path in &self.watched {
            if let Err(e) = self.watcher.unwatch(path) {
                debug!(path = %path.display(), error = %e, "unwatch failed");
            }
        }
        debug!(count = self.watched.len(), "file watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(path: &str, kind: ChangeKind) -> FileChangeEvent {
        FileChangeEvent {
            path: PathBuf::from(path),
            kind,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_drain_clears_buffer() {
        let buf = EventBuffer::new();
        buf.push(event("/etc/passwd", ChangeKind::Modified));
        buf.push(event("/etc/shadow", ChangeKind::Modified));

        let first = buf.drain();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].path, PathBuf::from("/etc/passwd"));
        assert!(buf.drain().is_empty());
    }

    #[test]
    fn test_concurrent_push_and_drain() {
        let buf = EventBuffer::new();
        let producers: Vec<_> = (0..4)
            .map(|t| {
                let buf = buf.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        buf.push(event(&format!("/tmp/{}/{}", t, i), ChangeKind::Created));
                    }
                })
            })
            .collect();

        let mut total = 0;
        while producers.iter().any(|p| !p.is_finished()) {
            total += buf.drain().len();
        }
        for p in producers {
            p.join().unwrap();
        }
        total += buf.drain().len();
        assert_eq!(total, 1000);
    }

    #[test]
    fn test_change_kind_mapping() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind};
        assert_eq!(ChangeKind::from(&EventKind::Create(CreateKind::File)), ChangeKind::Created);
        assert_eq!(ChangeKind::from(&EventKind::Modify(ModifyKind::Any)), ChangeKind::Modified);
        assert_eq!(ChangeKind::from(&EventKind::Remove(RemoveKind::Folder)), ChangeKind::Deleted);
        assert_eq!(ChangeKind::from(&EventKind::Any), ChangeKind::Other);
    }

    #[test]
    fn test_missing_path_is_skipped() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let watcher = FileWatcher::start(&[dir.path().to_path_buf(), missing]).unwrap();
        assert_eq!(watcher.watched_paths(), &[dir.path().to_path_buf()]);
        watcher.stop();
    }

    #[test]
    fn test_file_creation_is_buffered() {
        let dir = tempfile::TempDir::new().unwrap();
        let watcher = FileWatcher::start(&[dir.path()]).unwrap();

        let file = dir.path().join("new.txt");
        std::fs::write(&file, b"hello").unwrap();

        let mut events = Vec::new();
        for _ in 0..50 {
            events.extend(watcher.drain());
            if events.iter().any(|e| e.path.ends_with("new.txt")) {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        assert!(events.iter().any(|e| e.path.ends_with("new.txt")));
        watcher.stop();
    }
}
