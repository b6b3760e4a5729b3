pub mod ebay;
pub mod extract;
pub mod govdeals;
pub mod government_surplus;
pub mod manual;
pub mod shopgoodwill;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::fetcher::PoliteClient;
use crate::types::Listing;

pub use ebay::EbaySold;
pub use govdeals::GovDeals;
pub use government_surplus::GovernmentSurplus;
pub use manual::ManualImport;
pub use shopgoodwill::ShopGoodwill;

/// A source of listings for a keyword query.
///
/// Implementations return at most `limit` listings, each with a non-empty
/// url and title and a finite price `>= 0`. An empty result is a valid
/// answer. Errors are reserved for failures that left the provider with
/// nothing to say (network exhaustion, unreadable import file).
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Listing>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    EbaySold,
    ShopGoodwill,
    GovDeals,
    GovernmentSurplus,
    Manual,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::EbaySold,
        ProviderKind::ShopGoodwill,
        ProviderKind::GovDeals,
        ProviderKind::GovernmentSurplus,
        ProviderKind::Manual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::EbaySold => "ebay_sold",
            ProviderKind::ShopGoodwill => "shopgoodwill",
            ProviderKind::GovDeals => "govdeals",
            ProviderKind::GovernmentSurplus => "governmentsurplus",
            ProviderKind::Manual => "manual",
        }
    }

    /// Everything except the sold-comps source can be searched for live listings.
    pub fn is_live(self) -> bool {
        self != ProviderKind::EbaySold
    }

    /// Construct the provider. `manual` needs an import file path.
    pub fn build(
        self,
        client: Arc<PoliteClient>,
        manual_path: Option<PathBuf>,
    ) -> Result<Arc<dyn Provider>> {
        let provider: Arc<dyn Provider> = match self {
            ProviderKind::EbaySold => Arc::new(EbaySold::new(client)),
            ProviderKind::ShopGoodwill => Arc::new(ShopGoodwill::new(client)),
            ProviderKind::GovDeals => Arc::new(GovDeals::new(client)),
            ProviderKind::GovernmentSurplus => Arc::new(GovernmentSurplus::new(client)),
            ProviderKind::Manual => {
                let path = manual_path.ok_or_else(|| {
                    AppError::Config("provider 'manual' requires --manual-path".to_string())
                })?;
                Arc::new(ManualImport::new(path))
            }
        };
        Ok(provider)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| AppError::UnknownProvider(s.trim().to_string()))
    }
}

/// Parse a comma-separated provider list. Blank entries are ignored and
/// duplicates keep their first position. Any unknown name fails the whole list.
pub fn parse_provider_list(raw: &str) -> Result<Vec<ProviderKind>> {
    let mut kinds = Vec::new();
    for name in raw.split(',').filter(|s| !s.trim().is_empty()) {
        let kind: ProviderKind = name.parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::tests::fast_settings;
    use std::time::Duration;

    #[test]
    fn names_round_trip() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
        assert_eq!(" ShopGoodwill ".parse::<ProviderKind>().unwrap(), ProviderKind::ShopGoodwill);
        assert!(!ProviderKind::EbaySold.is_live());
        assert!(ProviderKind::Manual.is_live());
    }

    #[test]
    fn list_parsing_dedupes_and_rejects_unknown() {
        let kinds = parse_provider_list("shopgoodwill, govdeals,,shopgoodwill").unwrap();
        assert_eq!(kinds, vec![ProviderKind::ShopGoodwill, ProviderKind::GovDeals]);

        match parse_provider_list("govdeals,craigslist") {
            Err(AppError::UnknownProvider(name)) => assert_eq!(name, "craigslist"),
            other => panic!("expected UnknownProvider, got {other:?}"),
        }
    }

    #[test]
    fn manual_requires_a_path() {
        let client = Arc::new(PoliteClient::new(fast_settings(Duration::ZERO)).unwrap());
        assert!(matches!(
            ProviderKind::Manual.build(client.clone(), None),
            Err(AppError::Config(_))
        ));
        let built = ProviderKind::Manual
            .build(client.clone(), Some(PathBuf::from("items.csv")))
            .unwrap();
        assert_eq!(built.name(), "manual");
        assert_eq!(ProviderKind::GovDeals.build(client, None).unwrap().name(), "govdeals");
    }
}
