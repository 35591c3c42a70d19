//! Marketplace price sources
//!
//! Each source translates an item identity into one price query against
//! an external marketplace. Sources do not retry; a batch caller decides
//! what a miss means.

pub mod steam_market;

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Source id used when an item does not name one explicitly
pub const DEFAULT_SOURCE: &str = "steam";

/// A single external marketplace
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Source ID (e.g. "steam")
    fn id(&self) -> &'static str;

    /// Source display name
    fn name(&self) -> &'static str;

    /// Query the current price of one item.
    ///
    /// `Ok(None)` means the upstream legitimately has no price right
    /// now. Network and timeout failures surface as errors; batch
    /// callers normalize them to a miss.
    async fn fetch_price(&self, market_hash_name: &str, app_id: u32) -> Result<Option<f64>>;
}

/// Registry of available price sources
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn PriceSource>>,
}

impl SourceRegistry {
    /// Create a registry with all supported sources
    pub fn new(fetch_timeout: Duration) -> Result<Self> {
        let mut sources: HashMap<String, Arc<dyn PriceSource>> = HashMap::new();
        sources.insert(
            DEFAULT_SOURCE.to_string(),
            Arc::new(steam_market::SteamMarketSource::new(fetch_timeout)?),
        );
        Ok(Self { sources })
    }

    /// Build a registry from explicit sources (used by tests and by
    /// callers wiring custom marketplaces)
    pub fn with_sources(sources: Vec<Arc<dyn PriceSource>>) -> Self {
        Self {
            sources: sources.into_iter().map(|s| (s.id().to_string(), s)).collect(),
        }
    }

    /// Get source by ID
    pub fn get(&self, id: &str) -> Option<Arc<dyn PriceSource>> {
        self.sources.get(id).cloned()
    }

    /// The default marketplace
    pub fn default_source(&self) -> Option<Arc<dyn PriceSource>> {
        self.get(DEFAULT_SOURCE)
    }
}

/// Result of one fetch within a batch
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub market_hash_name: String,
    pub price: Option<f64>,
    /// Present when the fetch failed rather than returning "no data"
    pub error: Option<String>,
}

/// Fetch prices for `items` strictly sequentially, sleeping
/// `inter_request_delay` between consecutive requests.
///
/// The pacing is deliberate rate-limiting against the marketplace's
/// anti-abuse limits, not a bottleneck to parallelize away. A failing
/// fetch is logged and recorded as a miss; it never aborts the batch.
pub async fn fetch_prices(
    source: &dyn PriceSource,
    items: &[(String, u32)],
    inter_request_delay: Duration,
) -> Vec<FetchOutcome> {
    let mut outcomes = Vec::with_capacity(items.len());

    for (index, (market_hash_name, app_id)) in items.iter().enumerate() {
        if index > 0 {
            sleep(inter_request_delay).await;
        }

        let outcome = match source.fetch_price(market_hash_name, *app_id).await {
            Ok(price) => FetchOutcome {
                market_hash_name: market_hash_name.clone(),
                price,
                error: None,
            },
            Err(e) => {
                warn!("Price fetch failed for '{}': {}", market_hash_name, e);
                FetchOutcome {
                    market_hash_name: market_hash_name.clone(),
                    price: None,
                    error: Some(e.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }

    outcomes
}
