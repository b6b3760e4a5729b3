use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use arb_finder::config::{
    Config, APP_NAME, DEFAULT_COMP_LIMIT, DEFAULT_LIVE_LIMIT, DEFAULT_LIVE_PROVIDERS,
    DEFAULT_SIM_THRESHOLD, DEFAULT_THRESHOLD_PCT, DEFAULT_WATCH_INTERVAL_SECS,
};
use arb_finder::db::Store;
use arb_finder::error::{AppError, Result};
use arb_finder::fetcher::PoliteClient;
use arb_finder::pipeline::{Pipeline, RunParams, RunReport};
use arb_finder::providers::{parse_provider_list, Provider, ProviderKind};
use arb_finder::types::MatchRow;
use arb_finder::watch::WatchLoop;

const EXIT_FATAL: i32 = 1;
const EXIT_INTERRUPTED: i32 = 2;

/// Rows printed at the end of a single run.
const TOP_ROWS: usize = 20;

/// Find arbitrage deals against eBay sold comps.
#[derive(Debug, Parser)]
#[command(name = "arbfinder", version)]
struct Cli {
    /// Search query, e.g. "RTX 3060" or "Boss DS-1"
    query: Option<String>,

    /// SQLite database path (overrides ARB_DB_PATH)
    #[arg(long)]
    db: Option<String>,

    /// Max live listings per provider
    #[arg(long, default_value_t = DEFAULT_LIVE_LIMIT)]
    live_limit: usize,

    /// Max sold listings fetched for comps
    #[arg(long, default_value_t = DEFAULT_COMP_LIMIT)]
    comp_limit: usize,

    /// Title similarity threshold, 0-100
    #[arg(long, default_value_t = DEFAULT_SIM_THRESHOLD, value_parser = clap::value_parser!(u8).range(0..=100))]
    sim_threshold: u8,

    /// Minimum discount vs. comp average, in percent
    #[arg(long, default_value_t = DEFAULT_THRESHOLD_PCT)]
    threshold_pct: f64,

    /// Comma list: shopgoodwill,govdeals,governmentsurplus,manual
    #[arg(long)]
    providers: Option<String>,

    /// CSV or JSON file for the manual provider
    #[arg(long)]
    manual_path: Option<PathBuf>,

    /// Export results as CSV
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Export results as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Re-run on an interval and report new deals
    #[arg(short, long)]
    watch: bool,

    /// Seconds between watch iterations
    #[arg(long, default_value_t = DEFAULT_WATCH_INTERVAL_SECS)]
    watch_interval: u64,

    /// Stop watching after this many iterations
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print database statistics as JSON
    #[arg(long)]
    stats: bool,

    /// Delete stored listings older than N days
    #[arg(long)]
    prune_days: Option<u32>,
}

enum Outcome {
    Completed,
    Interrupted,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(EXIT_FATAL);
        }
    };

    let filter = if cli.verbose { "debug" } else { cfg.log_level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli, cfg).await {
        Ok(Outcome::Completed) => {}
        Ok(Outcome::Interrupted) => {
            warn!("Interrupted by user");
            std::process::exit(EXIT_INTERRUPTED);
        }
        Err(e) => {
            error!("Fatal error: {e}");
            std::process::exit(EXIT_FATAL);
        }
    }
}

async fn run(cli: Cli, mut cfg: Config) -> Result<Outcome> {
    if let Some(db) = &cli.db {
        cfg.db_path = db.clone();
    }

    // --- Maintenance ---
    if cli.stats || cli.prune_days.is_some() {
        let store = Store::open(&cfg.db_path).await?;
        if let Some(days) = cli.prune_days {
            let removed = store.prune_listings_older_than(days).await?;
            info!("Removed {removed} listings older than {days} days");
        }
        if cli.stats {
            println!("{}", serde_json::to_string_pretty(&store.stats().await?)?);
        }
        if cli.query.is_none() {
            return Ok(Outcome::Completed);
        }
    }

    // --- Validate before touching the network ---
    let query = cli
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::Config("a search query is required".to_string()))?
        .to_string();
    if !cli.threshold_pct.is_finite() {
        return Err(AppError::Config("--threshold-pct must be a finite number".to_string()));
    }
    let kinds = selected_providers(cli.providers.as_deref())?;

    // --- Wiring ---
    let client = Arc::new(PoliteClient::new(cfg.fetch_settings()?)?);
    let store = Store::open(&cfg.db_path).await?;
    let comps_provider = ProviderKind::EbaySold.build(Arc::clone(&client), None)?;
    let live = kinds
        .iter()
        .map(|kind| kind.build(Arc::clone(&client), cli.manual_path.clone()))
        .collect::<Result<Vec<Arc<dyn Provider>>>>()?;
    info!(
        "{APP_NAME} ready: query={query:?} providers={} db={}",
        kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(","),
        cfg.db_path,
    );

    let pipeline = Pipeline::new(store, comps_provider, live).with_client(client);
    let params = RunParams {
        query,
        live_limit: cli.live_limit,
        comp_limit: cli.comp_limit,
        sim_threshold: cli.sim_threshold,
        threshold_pct: Some(cli.threshold_pct),
        csv: cli.csv.clone(),
        json: cli.json.clone(),
    };

    if !cli.watch {
        return tokio::select! {
            report = pipeline.run_once(&params) => {
                log_report(&report?);
                Ok(Outcome::Completed)
            }
            _ = tokio::signal::ctrl_c() => Ok(Outcome::Interrupted),
        };
    }

    // --- Watch mode ---
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current iteration");
            let _ = stop_tx.send(true);
        }
    });

    let watcher = WatchLoop::new(Duration::from_secs(cli.watch_interval), cli.threshold_pct)
        .with_max_iterations(cli.max_iterations)
        .with_seen_ttl(cfg.watch_seen_ttl());
    let pipeline = &pipeline;
    let params = &params;
    let deals = watcher
        .run(
            move || async move { pipeline.run_once(params).await.map(|report| report.rows) },
            stop_rx.clone(),
        )
        .await;
    info!("Watch mode reported {} deals in total", deals.len());

    if *stop_rx.borrow() {
        Ok(Outcome::Interrupted)
    } else {
        Ok(Outcome::Completed)
    }
}

/// `--providers` if given, else the default live set. The sold-comps source
/// is not a live provider.
fn selected_providers(raw: Option<&str>) -> Result<Vec<ProviderKind>> {
    let kinds = match raw {
        Some(list) => parse_provider_list(list)?,
        None => parse_provider_list(&DEFAULT_LIVE_PROVIDERS.join(","))?,
    };
    if let Some(kind) = kinds.iter().find(|k| !k.is_live()) {
        return Err(AppError::Config(format!("{kind} supplies comps and cannot be a live provider")));
    }
    if kinds.is_empty() {
        return Err(AppError::Config("no live providers selected".to_string()));
    }
    Ok(kinds)
}

fn log_report(report: &RunReport) {
    for (i, row) in report.rows.iter().take(TOP_ROWS).enumerate() {
        log_row(i + 1, row);
    }
    info!(failed = report.failed_providers.len(), "{}", summary_line(report));
}

/// One-line run summary. Failed providers are listed by name only.
fn summary_line(report: &RunReport) -> String {
    let mut line = format!(
        "Sold listings: {} | Comparable groups: {} | Live listings: {} | Opportunities: {}",
        report.sold_count,
        report.comp_groups,
        report.live_count,
        report.rows.len(),
    );
    if !report.failed_providers.is_empty() {
        line.push_str(&format!(" | Failed providers: {}", report.failed_providers.join(", ")));
    }
    line
}

fn log_row(rank: usize, row: &MatchRow) {
    let title: String = row.title.chars().take(60).collect();
    info!(
        event = "OPPORTUNITY",
        rank,
        source = %row.source,
        url = %row.url,
        price = row.price,
        discount_pct = row.discount_vs_avg_pct,
        "#{rank:<2} {:>7.2}% | {:>9.2} {} | avg {:>9.2} | {} | {}",
        row.discount_vs_avg_pct.unwrap_or_default(),
        row.price,
        row.currency,
        row.avg_price.unwrap_or_default(),
        row.source,
        title,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_names_failed_providers() {
        let mut report = RunReport {
            sold_count: 3,
            comp_groups: 1,
            live_count: 2,
            ..RunReport::default()
        };
        assert_eq!(
            summary_line(&report),
            "Sold listings: 3 | Comparable groups: 1 | Live listings: 2 | Opportunities: 0"
        );

        report.failed_providers = vec!["govdeals".into(), "manual".into()];
        assert!(summary_line(&report).ends_with(" | Failed providers: govdeals, manual"));
    }

    #[test]
    fn sold_comps_source_is_not_a_live_provider() {
        assert!(matches!(selected_providers(Some("ebay_sold")), Err(AppError::Config(_))));
        assert!(matches!(selected_providers(Some(" , ")), Err(AppError::Config(_))));
        assert_eq!(selected_providers(Some("govdeals")).unwrap(), vec![ProviderKind::GovDeals]);
    }
}
