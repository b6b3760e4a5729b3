//! Database row types matching `migrations/0001_init.sql`.
//! Used by sqlx for typed queries.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::{Comp, Listing};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ListingRow {
    pub id: i64,
    pub source: String,
    pub url: String,
    pub title: String,
    pub price: f64,
    pub currency: String,
    pub condition: String,
    pub ts: f64,
    pub meta_json: String,
}

impl ListingRow {
    /// Unparseable `meta_json` comes back as an empty map.
    pub fn into_listing(self) -> Listing {
        let meta = serde_json::from_str::<Map<String, Value>>(&self.meta_json).unwrap_or_default();
        Listing {
            source: self.source,
            url: self.url,
            title: self.title,
            price: self.price,
            currency: self.currency,
            condition: self.condition,
            timestamp: self.ts,
            meta,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompRow {
    pub key_title: String,
    pub avg_price: f64,
    pub median_price: f64,
    pub count: i64,
    pub ts: f64,
}

impl From<CompRow> for Comp {
    fn from(row: CompRow) -> Self {
        Comp {
            key_title: row.key_title,
            avg_price: row.avg_price,
            median_price: row.median_price,
            count: usize::try_from(row.count).unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PriceRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub tables: Vec<String>,
    pub listings_total: i64,
    pub listings_by_source: BTreeMap<String, i64>,
    /// Over listings with a positive price.
    pub price_range: PriceRange,
    pub comps_total: i64,
}
