use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::db::Store;
use crate::error::Result;
use crate::export::{export_csv, export_json};
use crate::fetcher::PoliteClient;
use crate::matching::{compute_comps, match_live};
use crate::providers::Provider;
use crate::types::{Listing, MatchRow};

/// Per-run parameters, normally taken from the command line.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub query: String,
    pub live_limit: usize,
    pub comp_limit: usize,
    pub sim_threshold: u8,
    /// Minimum `discount_vs_avg_pct` a row needs to be kept. `None` keeps all rows.
    pub threshold_pct: Option<f64>,
    pub csv: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Filtered and sorted, best discount first.
    pub rows: Vec<MatchRow>,
    pub sold_count: usize,
    pub live_count: usize,
    pub comp_groups: usize,
    pub failed_providers: Vec<String>,
}

/// One pass of: sold comps → clusters → live listings → matches → filter.
///
/// The sold-comps provider and the store are required; a failure in either
/// fails the run. Live providers are isolated from each other: one that
/// errors is logged and contributes nothing.
pub struct Pipeline {
    store: Store,
    comps_provider: Arc<dyn Provider>,
    live: Vec<Arc<dyn Provider>>,
    client: Option<Arc<PoliteClient>>,
}

impl Pipeline {
    pub fn new(store: Store, comps_provider: Arc<dyn Provider>, live: Vec<Arc<dyn Provider>>) -> Self {
        Self {
            store,
            comps_provider,
            live,
            client: None,
        }
    }

    /// Report this client's fetch latency for each run. The client's
    /// histogram is cleared when a run starts.
    pub fn with_client(mut self, client: Arc<PoliteClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub async fn run_once(&self, params: &RunParams) -> Result<RunReport> {
        let started = Instant::now();
        let query = params.query.as_str();
        if let Some(client) = &self.client {
            client.latency().reset();
        }
        info!(event = "RUN_START", query, live_providers = self.live.len(), "Searching sold listings for: {query}");

        let sold = self.comps_provider.search(query, params.comp_limit).await?;
        info!(source = self.comps_provider.name(), count = sold.len(), "Found {} sold listings", sold.len());
        self.store.upsert_listings(&sold).await?;

        let comps = compute_comps(&sold, params.sim_threshold);
        for comp in comps.iter() {
            self.store.upsert_comp(comp).await?;
        }
        info!(groups = comps.len(), "Computed {} comparable groups", comps.len());

        let (live, failed_providers) = self.fetch_live(params).await?;

        let rows = match_live(&live, &comps, params.sim_threshold);
        let matched = rows.iter().filter(|r| r.is_matched()).count();
        let rows = filter_and_sort(rows, params.threshold_pct);
        info!(
            event = "RUN_DONE",
            query,
            live = live.len(),
            matched,
            opportunities = rows.len(),
            failed = failed_providers.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Found {} opportunities after filtering",
            rows.len()
        );

        if let Some(path) = &params.csv {
            export_csv(&rows, path)?;
            info!(path = %path.display(), "Exported to CSV");
        }
        if let Some(path) = &params.json {
            export_json(&rows, path)?;
            info!(path = %path.display(), "Exported to JSON");
        }

        if let Some((p50, p95, p99)) = self.client.as_ref().and_then(|c| c.latency().percentiles()) {
            info!(p50_ms = p50, p95_ms = p95, p99_ms = p99, "fetch latency this run");
        }

        Ok(RunReport {
            rows,
            sold_count: sold.len(),
            live_count: live.len(),
            comp_groups: comps.len(),
            failed_providers,
        })
    }

    /// All live providers run concurrently; the fetch client bounds the
    /// number of requests actually in flight. Results are folded in provider
    /// order, each provider's listings persisted before the next is folded.
    async fn fetch_live(&self, params: &RunParams) -> Result<(Vec<Listing>, Vec<String>)> {
        let searches = self.live.iter().map(|provider| async move {
            info!(provider = provider.name(), "Searching provider: {}", provider.name());
            (provider.name(), provider.search(&params.query, params.live_limit).await)
        });
        let results = join_all(searches).await;

        let mut live = Vec::new();
        let mut failed = Vec::new();
        for (name, result) in results {
            match result {
                Ok(items) => {
                    info!(provider = name, count = items.len(), "Provider {name} returned {} results", items.len());
                    self.store.upsert_listings(&items).await?;
                    live.extend(items);
                }
                Err(e) => {
                    warn!(provider = name, error = %e, "Provider {name} failed: {e}");
                    failed.push(name.to_string());
                }
            }
        }
        Ok((live, failed))
    }
}

/// Drop rows below `threshold_pct` (a missing discount never passes), then
/// order by `discount_vs_avg_pct` descending with missing values last.
/// The sort is stable, so equal discounts keep their input order.
pub fn filter_and_sort(rows: Vec<MatchRow>, threshold_pct: Option<f64>) -> Vec<MatchRow> {
    let mut rows: Vec<MatchRow> = match threshold_pct {
        Some(min) => rows
            .into_iter()
            .filter(|r| r.discount_vs_avg_pct.is_some_and(|d| d >= min))
            .collect(),
        None => rows,
    };
    let key = |r: &MatchRow| r.discount_vs_avg_pct.unwrap_or(f64::NEG_INFINITY);
    rows.sort_by(|a, b| key(b).total_cmp(&key(a)));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use async_trait::async_trait;

    /// Provider returning a fixed set of listings, or always failing.
    struct FakeProvider {
        name: &'static str,
        items: Vec<Listing>,
        fail: bool,
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn search(&self, _query: &str, limit: usize) -> Result<Vec<Listing>> {
            if self.fail {
                return Err(AppError::Provider(format!("{} is down", self.name)));
            }
            Ok(self.items.iter().take(limit).cloned().collect())
        }
    }

    fn fake(name: &'static str, items: Vec<Listing>) -> Arc<dyn Provider> {
        Arc::new(FakeProvider { name, items, fail: false })
    }

    fn failing(name: &'static str) -> Arc<dyn Provider> {
        Arc::new(FakeProvider { name, items: Vec::new(), fail: true })
    }

    fn sold(title: &str, price: f64, n: usize) -> Listing {
        Listing::new("ebay_sold", format!("https://www.ebay.com/itm/{n}"), title, price)
            .with_condition("sold")
    }

    fn live(source: &str, title: &str, price: f64, n: usize) -> Listing {
        Listing::new(source, format!("https://{source}.test/item/{n}"), title, price)
            .with_condition("live")
    }

    fn widget_comps() -> Arc<dyn Provider> {
        fake(
            "ebay_sold",
            vec![sold("Widget A", 100.0, 1), sold("widget a!!", 110.0, 2), sold("Widget A", 90.0, 3)],
        )
    }

    fn params(query: &str) -> RunParams {
        RunParams {
            query: query.to_string(),
            live_limit: 80,
            comp_limit: 150,
            sim_threshold: 86,
            threshold_pct: Some(20.0),
            csv: None,
            json: None,
        }
    }

    async fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("arb.sqlite3").to_str().unwrap()).await.unwrap();
        (dir, store)
    }

    fn row(url: &str, discount: Option<f64>) -> MatchRow {
        MatchRow {
            source: "shopgoodwill".into(),
            title: "t".into(),
            url: url.into(),
            price: 1.0,
            currency: "USD".into(),
            best_match_key: None,
            similarity: 0.0,
            avg_price: None,
            median_price: None,
            comp_count: 0,
            discount_vs_avg_pct: discount,
            discount_vs_median_pct: None,
        }
    }

    #[test]
    fn filter_drops_missing_and_low_discounts() {
        let rows = vec![row("a", Some(10.0)), row("b", None), row("c", Some(20.0)), row("d", Some(45.5))];
        let kept = filter_and_sort(rows, Some(20.0));
        let urls: Vec<_> = kept.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["d", "c"]);
    }

    #[test]
    fn sort_without_threshold_puts_missing_last_and_is_stable() {
        let rows = vec![
            row("none", None),
            row("neg", Some(-5.0)),
            row("first30", Some(30.0)),
            row("second30", Some(30.0)),
        ];
        let sorted = filter_and_sort(rows, None);
        let urls: Vec<_> = sorted.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["first30", "second30", "neg", "none"]);
    }

    #[tokio::test]
    async fn widget_scenario_end_to_end() {
        let (dir, store) = temp_store().await;
        let live_provider = fake("shopgoodwill", vec![live("shopgoodwill", "Widget A", 70.0, 1)]);
        let pipeline = Pipeline::new(store.clone(), widget_comps(), vec![live_provider]);

        let mut p = params("widget");
        p.json = Some(dir.path().join("rows.json"));
        let report = pipeline.run_once(&p).await.unwrap();

        assert_eq!(report.sold_count, 3);
        assert_eq!(report.comp_groups, 1);
        assert_eq!(report.rows.len(), 1);
        let top = &report.rows[0];
        assert_eq!(top.best_match_key.as_deref(), Some("widget a"));
        assert_eq!(top.avg_price, Some(100.0));
        assert_eq!(top.median_price, Some(100.0));
        assert_eq!(top.comp_count, 3);
        assert_eq!(top.discount_vs_avg_pct, Some(30.0));

        let comp = store.get_comp("widget a").await.unwrap().unwrap();
        assert_eq!(comp.count, 3);
        assert_eq!(store.listing_count().await.unwrap(), 4);

        let exported: Vec<MatchRow> =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("rows.json")).unwrap()).unwrap();
        assert_eq!(exported, report.rows);
    }

    #[tokio::test]
    async fn one_failing_provider_does_not_sink_the_run() {
        let (_dir, store) = temp_store().await;
        let pipeline = Pipeline::new(
            store,
            widget_comps(),
            vec![
                fake("shopgoodwill", vec![live("shopgoodwill", "Widget A", 70.0, 1)]),
                failing("govdeals"),
                fake("governmentsurplus", vec![live("governmentsurplus", "widget a", 50.0, 2)]),
            ],
        );

        let report = pipeline.run_once(&params("widget")).await.unwrap();
        assert_eq!(report.failed_providers, vec!["govdeals".to_string()]);
        assert_eq!(report.live_count, 2);
        let sources: Vec<_> = report.rows.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["governmentsurplus", "shopgoodwill"]);
    }

    #[tokio::test]
    async fn latency_is_reported_per_run() {
        use crate::fetcher::tests::fast_settings;
        use std::time::Duration;

        let (_dir, store) = temp_store().await;
        let client = Arc::new(PoliteClient::new(fast_settings(Duration::ZERO)).unwrap());
        client.latency().record(Duration::from_millis(250));
        let pipeline = Pipeline::new(store, widget_comps(), Vec::new()).with_client(client.clone());

        pipeline.run_once(&params("widget")).await.unwrap();
        // Fake providers make no requests, so samples from before the run are gone.
        assert!(client.latency().is_empty());
    }

    #[tokio::test]
    async fn failing_comps_provider_fails_the_run() {
        let (_dir, store) = temp_store().await;
        let pipeline = Pipeline::new(store, failing("ebay_sold"), Vec::new());
        assert!(matches!(
            pipeline.run_once(&params("widget")).await,
            Err(AppError::Provider(_))
        ));
    }

    #[tokio::test]
    async fn unmatched_listings_are_filtered_out() {
        let (_dir, store) = temp_store().await;
        let pipeline = Pipeline::new(
            store,
            widget_comps(),
            vec![fake("shopgoodwill", vec![live("shopgoodwill", "Gizmo Z", 10.0, 1)])],
        );
        let report = pipeline.run_once(&params("widget")).await.unwrap();
        assert_eq!(report.live_count, 1);
        assert!(report.rows.is_empty());

        let mut keep_all = params("widget");
        keep_all.threshold_pct = None;
        let report = pipeline.run_once(&keep_all).await.unwrap();
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].discount_vs_avg_pct, None);
    }
}
