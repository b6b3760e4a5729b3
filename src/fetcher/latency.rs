//! In-memory latency histogram for outbound marketplace requests.
//! Every attempt made by `PoliteClient` is recorded, retries included.

use std::sync::Mutex;
use std::time::Duration;

/// Values stored in milliseconds.
pub struct FetchLatency {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

impl FetchLatency {
    /// Tracks 1ms to 10 minutes, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 600_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, d: Duration) {
        let ms = d.as_millis().clamp(1, 600_000) as u64;
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(ms);
        }
    }

    /// Return (p50_ms, p95_ms, p99_ms). None if no samples.
    pub fn percentiles(&self) -> Option<(u64, u64, u64)> {
        let h = self.inner.lock().ok()?;
        if h.len() == 0 {
            return None;
        }
        Some((
            h.value_at_quantile(0.5),
            h.value_at_quantile(0.95),
            h.value_at_quantile(0.99),
        ))
    }

    /// Drop all samples, keeping the bounds.
    pub fn reset(&self) {
        if let Ok(mut h) = self.inner.lock() {
            h.reset();
        }
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FetchLatency {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let l = FetchLatency::new();
        assert!(l.is_empty());
        assert!(l.percentiles().is_none());
    }

    #[test]
    fn sub_millisecond_samples_are_clamped_up() {
        let l = FetchLatency::new();
        l.record(Duration::from_micros(10));
        l.record(Duration::from_millis(40));
        assert_eq!(l.len(), 2);
        let (p50, _, p99) = l.percentiles().unwrap();
        assert_eq!(p50, 1);
        assert!((39..=41).contains(&p99));
    }

    #[test]
    fn reset_clears_samples() {
        let l = FetchLatency::new();
        l.record(Duration::from_millis(900));
        l.reset();
        assert!(l.is_empty());
        l.record(Duration::from_millis(5));
        let (p50, p95, p99) = l.percentiles().unwrap();
        assert_eq!((p50, p95, p99), (5, 5, 5));
    }
}
