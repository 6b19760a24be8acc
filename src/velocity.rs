//! Atomic per-key increment with a TTL equal to the window length, no
//! eviction logic beyond TTL. Grounded on the pack's fraud.rs
//! `velocity_cache: Arc<DashMap<String, VelocityData>>` pattern; here a KV
//! store contract (`bump`) that is in-process today and swappable for an
//! external fast store (Redis et al.) without changing callers.

use dashmap::DashMap;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    Minute,
    Hour,
    Day,
}

impl Window {
    pub fn duration(&self) -> Duration {
        match self {
            Window::Minute => Duration::from_secs(60),
            Window::Hour => Duration::from_secs(3600),
            Window::Day => Duration::from_secs(86_400),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Minute => write!(f, "minute"),
            Window::Hour => write!(f, "hour"),
            Window::Day => write!(f, "day"),
        }
    }
}

struct Counter {
    count: u64,
    expires_at: Instant,
}

/// `bump(kind, key, window) -> count`. Keyed by `(kind, keyed-hash, window)`.
#[derive(Default)]
pub struct VelocityCounters {
    counters: DashMap<(String, String, Window), Counter>,
}

impl VelocityCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic increment; sets TTL to the window length on first write; returns
    /// the post-increment value.
    pub fn bump(&self, kind: &str, key: &str, window: Window) -> u64 {
        let cache_key = (kind.to_string(), key.to_string(), window);
        let now = Instant::now();
        let mut entry = self
            .counters
            .entry(cache_key)
            .or_insert_with(|| Counter { count: 0, expires_at: now + window.duration() });
        if entry.expires_at <= now {
            entry.count = 0;
            entry.expires_at = now + window.duration();
        }
        entry.count += 1;
        entry.count
    }

    /// Current value without incrementing; 0 if absent or expired.
    pub fn peek(&self, kind: &str, key: &str, window: Window) -> u64 {
        let cache_key = (kind.to_string(), key.to_string(), window);
        match self.counters.get(&cache_key) {
            Some(entry) if entry.expires_at > Instant::now() => entry.count,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_increments_and_expires() {
        let counters = VelocityCounters::new();
        assert_eq!(counters.bump("ip", "k1", Window::Minute), 1);
        assert_eq!(counters.bump("ip", "k1", Window::Minute), 2);
        assert_eq!(counters.peek("ip", "k1", Window::Minute), 2);
    }

    #[test]
    fn windows_are_independent() {
        let counters = VelocityCounters::new();
        counters.bump("ip", "k1", Window::Minute);
        counters.bump("ip", "k1", Window::Hour);
        assert_eq!(counters.peek("ip", "k1", Window::Minute), 1);
        assert_eq!(counters.peek("ip", "k1", Window::Hour), 1);
    }

    #[test]
    fn different_keys_are_independent() {
        let counters = VelocityCounters::new();
        counters.bump("ip", "k1", Window::Minute);
        assert_eq!(counters.peek("ip", "k2", Window::Minute), 0);
    }
}
