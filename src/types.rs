use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// One observed item at one source. `url` is the store-wide unique key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Provider identifier, e.g. `ebay_sold` or `shopgoodwill`.
    pub source: String,
    pub url: String,
    pub title: String,
    pub price: f64,
    pub currency: String,
    /// Free-text tag: `sold`, `live`, `unknown`.
    pub condition: String,
    /// Observation time, seconds since epoch.
    pub timestamp: f64,
    /// Provenance (query, page, import file).
    pub meta: Map<String, Value>,
}

impl Listing {
    pub fn new(
        source: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        price: f64,
    ) -> Self {
        Self {
            source: source.into(),
            url: url.into(),
            title: title.into(),
            price,
            currency: "USD".to_string(),
            condition: "unknown".to_string(),
            timestamp: now_secs(),
            meta: Map::new(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Comps
// ---------------------------------------------------------------------------

/// Price baseline for one cluster of similar sold listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comp {
    /// Normalized title of the listing that seeded the cluster.
    pub key_title: String,
    pub avg_price: f64,
    pub median_price: f64,
    pub count: usize,
}

/// Comps keyed by exemplar title, iterated in exemplar creation order.
/// The matcher's tie-breaking (first seen wins) depends on that order.
#[derive(Debug, Clone, Default)]
pub struct CompSet {
    comps: Vec<Comp>,
    index: HashMap<String, usize>,
}

impl CompSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by `key_title`. A replaced comp keeps its position.
    pub fn insert(&mut self, comp: Comp) {
        match self.index.get(&comp.key_title) {
            Some(&i) => self.comps[i] = comp,
            None => {
                self.index.insert(comp.key_title.clone(), self.comps.len());
                self.comps.push(comp);
            }
        }
    }

    pub fn get(&self, key_title: &str) -> Option<&Comp> {
        self.index.get(key_title).map(|&i| &self.comps[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Comp> {
        self.comps.iter()
    }

    pub fn len(&self) -> usize {
        self.comps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comps.is_empty()
    }
}

impl FromIterator<Comp> for CompSet {
    fn from_iter<I: IntoIterator<Item = Comp>>(iter: I) -> Self {
        let mut set = CompSet::new();
        for comp in iter {
            set.insert(comp);
        }
        set
    }
}

// ---------------------------------------------------------------------------
// Match rows
// ---------------------------------------------------------------------------

/// Similarity reported when there were no comps to compare against.
pub const NO_CANDIDATES: f64 = -1.0;

/// Result of scoring one live listing against the comp set. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRow {
    pub source: String,
    pub title: String,
    pub url: String,
    pub price: f64,
    pub currency: String,
    /// Best-scoring exemplar, set even when it scored below the threshold.
    pub best_match_key: Option<String>,
    /// 0–100, or [`NO_CANDIDATES`].
    pub similarity: f64,
    pub avg_price: Option<f64>,
    pub median_price: Option<f64>,
    pub comp_count: usize,
    pub discount_vs_avg_pct: Option<f64>,
    pub discount_vs_median_pct: Option<f64>,
}

impl MatchRow {
    pub fn is_matched(&self) -> bool {
        self.avg_price.is_some()
    }
}

pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
