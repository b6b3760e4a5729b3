use std::time::{Duration, Instant};

use dashmap::DashMap;
use url::Url;

/// Per-host request spacing.
///
/// Holds the next free start slot for every host. A slot is reserved while the
/// map entry guard is held, so two tasks racing on one host (on any number of
/// worker threads) always receive slots at least `interval` apart. The guard is
/// never held across an `.await`.
pub struct HostThrottle {
    interval: Duration,
    next_slot: DashMap<String, Instant>,
}

impl HostThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: DashMap::new(),
        }
    }

    /// Reserve the earliest start time for a request to `host`.
    pub fn reserve(&self, host: &str) -> Instant {
        let now = Instant::now();
        let mut slot = self.next_slot.entry(host.to_string()).or_insert(now);
        let start = (*slot).max(now);
        *slot = start + self.interval;
        start
    }

    /// Suspend until a reserved slot for `host` arrives.
    pub async fn wait(&self, host: &str) {
        let start = self.reserve(host);
        tokio::time::sleep_until(tokio::time::Instant::from_std(start)).await;
    }

    /// Record that a request to `host` just finished, successful or not.
    /// The next request may not start sooner than `interval` from now.
    pub fn mark(&self, host: &str) {
        let earliest = Instant::now() + self.interval;
        let mut slot = self.next_slot.entry(host.to_string()).or_insert(earliest);
        if *slot < earliest {
            *slot = earliest;
        }
    }

    pub fn tracked_hosts(&self) -> usize {
        self.next_slot.len()
    }
}

/// Throttle key for a URL: host, plus the port when one is explicit.
pub fn host_key(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    }
}
