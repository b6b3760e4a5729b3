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

const BASE_URL: &str = "https://www.govdeals.com";
const SOURCE: &str = "govdeals";
const ROWS_PER_PAGE: u32 = 50;

static RE_CARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<div class="auction-card[^>]*>"#).unwrap());
static RE_TITLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)item-title[^>]*>(.*?)<").unwrap());
static RE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="(/index\.cfm\?fa=Main\.Item&(?:amp;)?itemid[^"]+)""#).unwrap()
});
static RE_BID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Current Bid:\s*(\$\s*[0-9][0-9,]*(?:\.[0-9]{1,2})?)").unwrap()
});

/// Municipal and agency surplus auctions. Results are paged by row offset.
pub struct GovDeals {
    client: Arc<PoliteClient>,
    base_url: String,
}

impl GovDeals {
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
        let rows = ROWS_PER_PAGE.to_string();
        let start_row = (ROWS_PER_PAGE * (page - 1) + 1).to_string();
        let url = Url::parse_with_params(
            &format!("{}/index.cfm", self.base_url),
            &[
                ("fa", "Main.AdvSearchResultsNew"),
                ("kWord", query),
                ("whichForm", "vehicle"),
                ("SearchPg", "Main"),
                ("kCatID", "0"),
                ("rowCount", rows.as_str()),
                ("startRow", start_row.as_str()),
            ],
        )?;
        Ok(url)
    }

    async fn fetch_page(&self, query: &str, page: u32) -> Result<Vec<Listing>> {
        let url = self.search_url(query, page)?;
        let html = self.client.fetch_text(url.as_str()).await?;
        Ok(parse_page(&html, &url, query, page))
    }
}

#[async_trait]
impl Provider for GovDeals {
    fn name(&self) -> &'static str {
        SOURCE
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Listing>> {
        let items = collect_pages(SOURCE, page_caps::GOVDEALS, limit, |page| {
            self.fetch_page(query, page)
        })
        .await?;
        info!(source = SOURCE, query, count = items.len(), "live listings fetched");
        Ok(items)
    }
}

pub(crate) fn parse_page(html: &str, page_url: &Url, query: &str, page: u32) -> Vec<Listing> {
    split_blocks(html, &RE_CARD)
        .into_iter()
        .filter_map(|block| {
            let title = clean_text(capture(&RE_TITLE, block)?);
            if title.is_empty() {
                return None;
            }
            let href = decode_entities(capture(&RE_LINK, block)?);
            let url = page_url.join(&href).ok()?;
            let (price, currency) = parse_price(capture(&RE_BID, block)?)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::tests::fast_settings;
    use std::time::Duration;

    const PAGE: &str = r#"
<section id="results">
<div class="auction-card card-lg" data-id="1">
  <p class="item-title">2012 Ford F-150</p>
  <a href="/index.cfm?fa=Main.Item&amp;itemid=4421&amp;acctid=77">details</a>
  <span>Current Bid: $3,250.00</span>
</div>
<div class="auction-card">
  <p class="item-title">Office chairs (lot of 12)</p>
  <a href="/index.cfm?fa=Main.Item&itemid=4500&acctid=9">details</a>
  <span>Current Bid:  $75</span>
</div>
<div class="auction-card">
  <p class="item-title">Sold out lot</p>
  <a href="/index.cfm?fa=Main.Item&itemid=4600">details</a>
  <span>Closed</span>
</div>
</section>"#;

    #[test]
    fn parses_auction_cards() {
        let page_url = Url::parse("https://www.govdeals.com/index.cfm?fa=Main.AdvSearchResultsNew").unwrap();
        let items = parse_page(PAGE, &page_url, "f-150", 2);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "2012 Ford F-150");
        assert_eq!(
            items[0].url,
            "https://www.govdeals.com/index.cfm?fa=Main.Item&itemid=4421&acctid=77"
        );
        assert_eq!(items[0].price, 3250.0);
        assert_eq!(items[0].meta.get("page").and_then(|v| v.as_u64()), Some(2));
        assert_eq!(items[1].price, 75.0);
    }

    #[test]
    fn pages_advance_by_row_offset() {
        let client = Arc::new(PoliteClient::new(fast_settings(Duration::ZERO)).unwrap());
        let provider = GovDeals::new(client);
        let first = provider.search_url("forklift", 1).unwrap();
        let second = provider.search_url("forklift", 2).unwrap();
        assert!(first.as_str().contains("startRow=1"));
        assert!(second.as_str().contains("startRow=51"));
        assert!(second.as_str().contains("kWord=forklift"));
        assert!(second.as_str().contains("rowCount=50"));
    }
}
