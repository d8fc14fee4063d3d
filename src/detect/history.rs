//! Per-identity sliding window of recent login timestamps.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

/// Number of login timestamps kept per identity.
pub const WINDOW_SIZE: usize = 5;

/// Bounded FIFO of the most recent `started_at` values for one identity,
/// oldest first.
#[derive(Debug, Clone, Default)]
pub struct LoginHistory {
    entries: VecDeque<DateTime<Utc>>,
    last_seen_tick: u64,
}

// A stored history always holds at least the login that created it.
#[allow(clippy::len_without_is_empty)]
impl LoginHistory {
    /// Append a login timestamp, evicting the oldest once the window is full.
    pub fn push(&mut self, started_at: DateTime<Utc>) {
        self.entries.push_back(started_at);
        while self.entries.len() > WINDOW_SIZE {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == WINDOW_SIZE
    }

    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.entries.front().copied()
    }

    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.entries.back().copied()
    }

    /// Elapsed time from the oldest to the newest entry.
    pub fn span(&self) -> Option<chrono::Duration> {
        Some(self.newest()? - self.oldest()?)
    }
}

/// All login histories, keyed by identity.
///
/// Owned by the sampling loop and lent to the detector for each tick. Grows
/// with the number of distinct identities observed, not with tick count.
#[derive(Debug, Default)]
pub struct LoginHistories {
    by_identity: HashMap<String, LoginHistory>,
    tick: u64,
}

impl LoginHistories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the tick counter used for idle tracking.
    pub fn begin_tick(&mut self) {
        self.tick += 1;
    }

    /// Record a login for `identity` and return its updated history.
    pub fn record(&mut self, identity: &str, started_at: DateTime<Utc>) -> &LoginHistory {
        let tick = self.tick;
        let history = self.by_identity.entry(identity.to_string()).or_default();
        history.push(started_at);
        history.last_seen_tick = tick;
        history
    }

    pub fn get(&self, identity: &str) -> Option<&LoginHistory> {
        self.by_identity.get(identity)
    }

    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }

    /// Drop identities not seen during the last `max_idle_ticks` ticks.
    /// Returns the number of identities removed.
    pub fn evict_idle(&mut self, max_idle_ticks: u64) -> usize {
        let now = self.tick;
        let before = self.by_identity.len();
        self.by_identity
            .retain(|_, h| now.saturating_sub(h.last_seen_tick) <= max_idle_ticks);
        before - self.by_identity.len()
    }
}
