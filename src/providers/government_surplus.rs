use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::info;
use url::Url;

use super::extract::{capture, clean_text, collect_pages, decode_entities, parse_price, split_blocks};
use super::Provider;
use crate::config::page_caps;
use crate::error::Result;
use crate::fetcher::PoliteClient;
use crate::types::Listing;

const BASE_URL: &str = "https://www.governmentauctions.org";
const SOURCE: &str = "governmentsurplus";

static RE_CARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<div class="result-card[^>]*>"#).unwrap());
static RE_TITLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<h3[^>]*>(.*?)</h3>").unwrap());
static RE_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"href="(https?://[^"]+)""#).unwrap());

/// Aggregated government surplus listings. Result cards link off-site with
/// absolute URLs.
pub struct GovernmentSurplus {
    client: Arc<PoliteClient>,
    base_url: String,
}

impl GovernmentSurplus {
    pub fn new(client: Arc<PoliteClient>) -> Self {
        Self::with_base_url(client, BASE_URL)
    }

    pub fn with_base_url(client: Arc<PoliteClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self, query: &str, page: u32) -> Result<Url> {
        let page = page.to_string();
        let url = Url::parse_with_params(
            &format!("{}/search_results.asp", self.base_url),
            &[("Search", query), ("page", page.as_str())],
        )?;
        Ok(url)
    }

    async fn fetch_page(&self, query: &str, page: u32) -> Result<Vec<Listing>> {
        let url = self.search_url(query, page)?;
        let html = self.client.fetch_text(url.as_str()).await?;
        Ok(parse_page(&html, query, page))
    }
}

#[async_trait]
impl Provider for GovernmentSurplus {
    fn name(&self) -> &'static str {
        SOURCE
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Listing>> {
        let items = collect_pages(SOURCE, page_caps::GOVERNMENT_SURPLUS, limit, |page| {
            self.fetch_page(query, page)
        })
        .await?;
        info!(source = SOURCE, query, count = items.len(), "live listings fetched");
        Ok(items)
    }
}

/// The first price anywhere in the card is taken as the asking price.
pub(crate) fn parse_page(html: &str, query: &str, page: u32) -> Vec<Listing> {
    split_blocks(html, &RE_CARD)
        .into_iter()
        .filter_map(|block| {
            let title = clean_text(capture(&RE_TITLE, block)?);
            if title.is_empty() {
                return None;
            }
            let url = decode_entities(capture(&RE_LINK, block)?);
            let (price, currency) = parse_price(&clean_text(block))?;
            Some(
                Listing::new(SOURCE, url, title, price)
                    .with_currency(currency)
                    .with_condition("live")
                    .with_meta("q", query)
                    .with_meta("page", page),
            )
        })
        .collect()
}
