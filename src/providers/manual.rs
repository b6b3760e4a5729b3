use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::extract::parse_amount;
use super::Provider;
use crate::error::{AppError, Result};
use crate::types::Listing;

const SOURCE: &str = "manual";

/// Listings read from a local CSV or JSON file instead of the network.
///
/// CSV needs a header row naming `url`, `title` and `price`; `currency` and
/// `condition` are optional. JSON must be an array of objects with the same
/// keys. Rows without a url, title or usable price are skipped.
pub struct ManualImport {
    path: PathBuf,
}

impl ManualImport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Provider for ManualImport {
    fn name(&self) -> &'static str {
        SOURCE
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Listing>> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let records = match ext.as_deref() {
            Some("csv") => csv_records(&text)?,
            Some("json") => json_records(&text)?,
            _ => {
                return Err(AppError::Provider(format!(
                    "unsupported import file {} (expected .csv or .json)",
                    self.path.display()
                )))
            }
        };

        let file = self.path.display().to_string();
        let total = records.len();
        let items: Vec<Listing> = records
            .into_iter()
            .filter_map(|r| r.into_listing(query, &file))
            .take(limit)
            .collect();
        debug!(file, total, kept = items.len(), "import rows read");
        info!(source = SOURCE, query, count = items.len(), "imported listings");
        Ok(items)
    }
}

/// One import row before validation.
#[derive(Debug, Default)]
struct ImportRecord {
    url: String,
    title: String,
    price: Option<f64>,
    currency: String,
    condition: String,
}

impl ImportRecord {
    fn into_listing(self, query: &str, file: &str) -> Option<Listing> {
        let url = self.url.trim();
        let title = self.title.trim();
        if url.is_empty() || title.is_empty() {
            return None;
        }
        let price = self.price?;
        let currency = match self.currency.trim() {
            "" => "USD",
            c => c,
        };
        let condition = match self.condition.trim() {
            "" => "live",
            c => c,
        };
        Some(
            Listing::new(SOURCE, url, title, price)
                .with_currency(currency)
                .with_condition(condition)
                .with_meta("q", query)
                .with_meta("file", file),
        )
    }
}

fn csv_records(text: &str) -> Result<Vec<ImportRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    // Header problems fail the import; a malformed data row is skipped.
    reader.headers()?;
    let records = reader
        .deserialize::<HashMap<String, String>>()
        .filter_map(|row| row.ok())
        .map(|mut row| {
            let mut take = |key: &str| row.remove(key).unwrap_or_default();
            ImportRecord {
                url: take("url"),
                title: take("title"),
                price: parse_amount(&take("price")),
                currency: take("currency"),
                condition: take("condition"),
            }
        })
        .collect();
    Ok(records)
}

fn json_records(text: &str) -> Result<Vec<ImportRecord>> {
    let Value::Array(items) = serde_json::from_str::<Value>(text)? else {
        return Err(AppError::Provider("JSON import must be an array of objects".to_string()));
    };
    let text_field = |obj: &serde_json::Map<String, Value>, key: &str| {
        obj.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
    };
    let records = items
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| ImportRecord {
            url: text_field(obj, "url"),
            title: text_field(obj, "title"),
            price: match obj.get("price") {
                Some(Value::Number(n)) => n.as_f64().filter(|p| p.is_finite() && *p >= 0.0),
                Some(Value::String(s)) => parse_amount(s),
                _ => None,
            },
            currency: text_field(obj, "currency"),
            condition: text_field(obj, "condition"),
        })
        .collect();
    Ok(records)
}
