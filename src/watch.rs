use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{error, info};

use crate::error::Result;
use crate::types::MatchRow;

/// Re-runs the pipeline on an interval and reports each qualifying deal once.
///
/// A deal is reported the first time its url shows up with a discount at or
/// above `notify_threshold`. With a seen-TTL set, a url that has not been
/// observed as a qualifying deal for longer than the TTL is forgotten and
/// would be reported again.
pub struct WatchLoop {
    interval: Duration,
    notify_threshold: f64,
    max_iterations: Option<u32>,
    seen_ttl: Option<Duration>,
    seen: HashMap<String, Instant>,
    reported: Vec<MatchRow>,
}

impl WatchLoop {
    pub fn new(interval: Duration, notify_threshold: f64) -> Self {
        Self {
            interval,
            notify_threshold,
            max_iterations: None,
            seen_ttl: None,
            seen: HashMap::new(),
            reported: Vec::new(),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: Option<u32>) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_seen_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.seen_ttl = ttl;
        self
    }

    /// Loop until the iteration cap or until `shutdown` flips to `true`.
    /// A run in progress is allowed to finish. Returns every deal reported.
    pub async fn run<F, Fut>(mut self, mut run_once: F, mut shutdown: watch::Receiver<bool>) -> Vec<MatchRow>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Vec<MatchRow>>>,
    {
        info!(
            event = "WATCH_START",
            interval_secs = self.interval.as_secs_f64(),
            threshold = self.notify_threshold,
            "Starting watch mode with {}s interval",
            self.interval.as_secs()
        );
        let mut iteration: u32 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }
            iteration += 1;
            info!(event = "WATCH_ITERATION", iteration, "Watch iteration {iteration}");

            match run_once().await {
                Ok(rows) => {
                    let deals = self.find_new_deals(&rows, Instant::now());
                    for deal in &deals {
                        info!(
                            event = "DEAL",
                            source = %deal.source,
                            url = %deal.url,
                            price = deal.price,
                            discount_pct = deal.discount_vs_avg_pct,
                            "New deal: {} at {:.2} {}",
                            deal.title,
                            deal.price,
                            deal.currency
                        );
                    }
                    info!(iteration, new_deals = deals.len(), tracked = self.seen.len(), "Watch iteration done");
                    self.reported.extend(deals);
                }
                Err(e) => error!(iteration, error = %e, "Watch iteration {iteration} failed: {e}"),
            }

            if self.max_iterations.is_some_and(|max| iteration >= max) {
                info!(iteration, "Reached max iterations");
                break;
            }
            if self.pause(&mut shutdown).await {
                break;
            }
        }
        info!(event = "WATCH_STOP", iterations = iteration, reported = self.reported.len(), "Watch mode stopped");
        self.reported
    }

    /// Sleep one interval. Returns `true` if shutdown was requested meanwhile.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let sleep = tokio::time::sleep(self.interval);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                changed = shutdown.changed() => match changed {
                    Ok(()) if *shutdown.borrow() => return true,
                    Ok(()) => continue,
                    Err(_) => {
                        // Sender gone: no signal can arrive any more.
                        (&mut sleep).await;
                        return false;
                    }
                },
            }
        }
    }

    /// Qualifying rows whose url has not been reported yet. Marks them seen.
    pub fn find_new_deals(&mut self, rows: &[MatchRow], now: Instant) -> Vec<MatchRow> {
        if let Some(ttl) = self.seen_ttl {
            self.seen.retain(|_, last| now.saturating_duration_since(*last) < ttl);
        }
        let mut fresh = Vec::new();
        for row in rows {
            if !row.discount_vs_avg_pct.is_some_and(|d| d >= self.notify_threshold) {
                continue;
            }
            if self.seen.insert(row.url.clone(), now).is_none() {
                fresh.push(row.clone());
            }
        }
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn deal(url: &str, discount: f64) -> MatchRow {
        MatchRow {
            source: "shopgoodwill".into(),
            title: "Widget A".into(),
            url: url.into(),
            price: 70.0,
            currency: "USD".into(),
            best_match_key: Some("widget a".into()),
            similarity: 100.0,
            avg_price: Some(100.0),
            median_price: Some(100.0),
            comp_count: 3,
            discount_vs_avg_pct: Some(discount),
            discount_vs_median_pct: Some(discount),
        }
    }

    fn short_loop(max: u32) -> WatchLoop {
        WatchLoop::new(Duration::from_millis(10), 20.0).with_max_iterations(Some(max))
    }

    #[tokio::test]
    async fn same_deal_reported_once() {
        let (_tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let reported = short_loop(2)
            .run(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(vec![deal("https://sg/1", 30.0), deal("https://sg/2", 5.0)]) }
                },
                rx,
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].url, "https://sg/1");
    }

    #[tokio::test]
    async fn failed_iteration_does_not_stop_the_loop() {
        let (_tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let reported = short_loop(3)
            .run(
                move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(AppError::Provider("ebay down".into()))
                        } else {
                            Ok(vec![deal(&format!("https://sg/{n}"), 40.0)])
                        }
                    }
                },
                rx,
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(reported.len(), 2);
    }

    #[tokio::test]
    async fn shutdown_stops_during_sleep() {
        let (tx, rx) = watch::channel(false);
        let looped = WatchLoop::new(Duration::from_secs(3600), 20.0);
        let handle = tokio::spawn(looped.run(|| async { Ok(vec![deal("https://sg/1", 50.0)]) }, rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let reported = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop should stop promptly")
            .unwrap();
        assert_eq!(reported.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_before_start_runs_nothing() {
        let (_tx, rx) = watch::channel(true);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let reported = short_loop(5)
            .run(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(Vec::new()) }
                },
                rx,
            )
            .await;
        assert!(reported.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn seen_urls_expire_after_ttl_without_sightings() {
        let ttl = Duration::from_secs(100);
        let mut w = WatchLoop::new(Duration::from_secs(1), 20.0).with_seen_ttl(Some(ttl));
        let t0 = Instant::now();
        let rows = vec![deal("https://sg/1", 30.0)];

        assert_eq!(w.find_new_deals(&rows, t0).len(), 1);
        // Still listed: each sighting refreshes the entry.
        assert!(w.find_new_deals(&rows, t0 + Duration::from_secs(60)).is_empty());
        assert!(w.find_new_deals(&rows, t0 + Duration::from_secs(150)).is_empty());
        // Gone for longer than the TTL, then back.
        assert!(w.find_new_deals(&[], t0 + Duration::from_secs(300)).is_empty());
        assert_eq!(w.find_new_deals(&rows, t0 + Duration::from_secs(301)).len(), 1);
    }

    #[test]
    fn without_ttl_seen_urls_are_kept() {
        let mut w = WatchLoop::new(Duration::from_secs(1), 20.0);
        let t0 = Instant::now();
        let rows = vec![deal("https://sg/1", 30.0), deal("https://sg/1", 30.0)];
        assert_eq!(w.find_new_deals(&rows, t0).len(), 1);
        assert!(w.find_new_deals(&rows, t0 + Duration::from_secs(10_000_000)).is_empty());
    }
}
