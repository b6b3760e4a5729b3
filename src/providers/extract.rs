//! Pattern-based helpers shared by the HTML providers.
//!
//! Extraction is deliberately shallow: split the page into item blocks on a
//! marker, then pull title, link and price out of each block with regexes.
//! A block missing any of them is dropped. Markup changes on a target site
//! break its provider; that is accepted.

use std::future::Future;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::Result;
use crate::types::Listing;

static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static RE_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([$£€])\s*([0-9]+(?:\.[0-9]{1,2})?)").unwrap());

/// Remove tags, decode common entities, collapse whitespace.
pub fn clean_text(fragment: &str) -> String {
    let stripped = RE_TAG.replace_all(fragment, " ");
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

pub fn currency_for_symbol(symbol: &str) -> &'static str {
    match symbol {
        "£" => "GBP",
        "€" => "EUR",
        _ => "USD",
    }
}

/// First `<symbol><amount>` token in `text`, thousands separators ignored.
/// `"Sold  $1,299.99"` → `(1299.99, "USD")`.
pub fn parse_price(text: &str) -> Option<(f64, &'static str)> {
    let flat = text.replace(',', "");
    let caps = RE_PRICE.captures(&flat)?;
    let amount = caps.get(2)?.as_str().parse::<f64>().ok()?;
    let symbol = caps.get(1)?.as_str();
    (amount.is_finite() && amount >= 0.0).then(|| (amount, currency_for_symbol(symbol)))
}

/// Plain amount as found in import files: `"1,299.99"`, `"$45"`, `" 12.5 "`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches(['$', '£', '€'])
        .chars()
        .filter(|c| *c != ',')
        .collect();
    let amount = cleaned.trim().parse::<f64>().ok()?;
    (amount.is_finite() && amount >= 0.0).then_some(amount)
}

/// Text following each match of `marker`. Content before the first marker
/// is page chrome and is skipped.
pub fn split_blocks<'a>(html: &'a str, marker: &Regex) -> Vec<&'a str> {
    marker.split(html).skip(1).collect()
}

/// First capture group of `re` in `block`.
pub fn capture<'a>(re: &Regex, block: &'a str) -> Option<&'a str> {
    re.captures(block).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Fetch pages `1..=max_pages` until `limit` listings are collected or a page
/// comes back empty. A failed page fetch fails the whole search.
pub async fn collect_pages<F, Fut>(
    source: &str,
    max_pages: u32,
    limit: usize,
    mut fetch_page: F,
) -> Result<Vec<Listing>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<Listing>>>,
{
    let mut items = Vec::new();
    for page in 1..=max_pages {
        if items.len() >= limit {
            break;
        }
        let found = fetch_page(page).await?;
        if found.is_empty() {
            debug!(source, page, "no items on page, stopping");
            break;
        }
        let room = limit - items.len();
        items.extend(found.into_iter().take(room));
    }
    Ok(items)
}
