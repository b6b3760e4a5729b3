use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::info;
use url::Url;

use super::extract::{capture, clean_text, parse_price, split_blocks};
use super::Provider;
use crate::error::Result;
use crate::fetcher::PoliteClient;
use crate::types::Listing;

const BASE_URL: &str = "https://www.ebay.com";
const SOURCE: &str = "ebay_sold";

static RE_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"<li class="s-item[^>]*>"#).unwrap());
static RE_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)s-item__title[^>]*>(.*?)</(?:div|h3)>").unwrap());
static RE_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)s-item__price[^>]*>(.*?)</span>").unwrap());
static RE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href="(https?://www\.ebay\.com/itm/[^"]+)""#).unwrap());

/// Completed-and-sold eBay search results: the price history comps are
/// built from. One results page per query.
pub struct EbaySold {
    client: Arc<PoliteClient>,
    base_url: String,
}

impl EbaySold {
    pub fn new(client: Arc<PoliteClient>) -> Self {
        Self::with_base_url(client, BASE_URL)
    }

    pub fn with_base_url(client: Arc<PoliteClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self, query: &str) -> Result<String> {
        let url = Url::parse_with_params(
            &format!("{}/sch/i.html", self.base_url),
            &[("_nkw", query), ("LH_Sold", "1"), ("LH_Complete", "1")],
        )?;
        Ok(url.to_string())
    }
}

#[async_trait]
impl Provider for EbaySold {
    fn name(&self) -> &'static str {
        SOURCE
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Listing>> {
        let url = self.search_url(query)?;
        let html = self.client.fetch_text(&url).await?;
        let mut items = parse_page(&html, query, &url);
        items.truncate(limit);
        info!(source = SOURCE, query, count = items.len(), "sold listings fetched");
        Ok(items)
    }
}

/// Items without a direct `/itm/` link keep the search URL.
pub(crate) fn parse_page(html: &str, query: &str, search_url: &str) -> Vec<Listing> {
    split_blocks(html, &RE_ITEM)
        .into_iter()
        .filter_map(|block| {
            let title = clean_text(capture(&RE_TITLE, block)?);
            // eBay renders a placeholder card ahead of the real results.
            if title.is_empty() || title.eq_ignore_ascii_case("shop on ebay") {
                return None;
            }
            let (price, currency) = parse_price(&clean_text(capture(&RE_PRICE, block)?))?;
            let url = capture(&RE_LINK, block).unwrap_or(search_url);
            Some(
                Listing::new(SOURCE, url, title, price)
                    .with_currency(currency)
                    .with_condition("sold")
                    .with_meta("q", query),
            )
        })
        .collect()
}
