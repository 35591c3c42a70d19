//! Steam Community Market price source
//!
//! Queries the public `priceoverview` endpoint. Prices come back as
//! currency-formatted strings ("$12.34", "12,34€"); both the comma and
//! dot decimal conventions appear depending on the currency the
//! endpoint was asked for, so parsing normalizes either.

use crate::error::{AppError, Result};
use crate::sources::PriceSource;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const BASE_URL: &str = "https://steamcommunity.com/market/priceoverview/";

/// USD on the priceoverview endpoint
const CURRENCY_USD: u32 = 1;

/// Price overview payload. All price fields are optional: low-volume
/// items regularly come back with `success: true` and no median.
#[derive(Debug, Deserialize)]
struct PriceOverviewResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    lowest_price: Option<String>,
    #[serde(default)]
    median_price: Option<String>,
}

/// Steam Community Market adapter
pub struct SteamMarketSource {
    client: Client,
    timeout_secs: u64,
}

impl SteamMarketSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AppError::Fetch)?;
        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }
}

#[async_trait]
impl PriceSource for SteamMarketSource {
    fn id(&self) -> &'static str {
        "steam"
    }

    fn name(&self) -> &'static str {
        "Steam Community Market"
    }

    async fn fetch_price(&self, market_hash_name: &str, app_id: u32) -> Result<Option<f64>> {
        let url = format!(
            "{}?currency={}&appid={}&market_hash_name={}",
            BASE_URL,
            CURRENCY_USD,
            app_id,
            urlencoding::encode(market_hash_name)
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::FetchTimeout {
                    item: market_hash_name.to_string(),
                    timeout_secs: self.timeout_secs,
                }
            } else {
                AppError::Fetch(e)
            }
        })?;

        if !response.status().is_success() {
            return Err(AppError::PriceUnavailable(format!(
                "{} (HTTP {})",
                market_hash_name,
                response.status()
            )));
        }

        let payload: PriceOverviewResponse = response.json().await?;

        if !payload.success {
            return Ok(None);
        }

        // Median is the steadier signal; fall back to lowest listing
        let raw = payload.median_price.or(payload.lowest_price);
        Ok(raw.as_deref().and_then(parse_price))
    }
}

/// Parse a currency-formatted price string into a number.
///
/// Handles "$12.34", "12,34€", "1 234,56 руб." and similar. Returns
/// `None` for strings with no digits.
fn parse_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    // Whichever separator appears last is the decimal point; any other
    // occurrences are thousands separators.
    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => {
            let no_dots: String = cleaned.chars().filter(|c| *c != '.').collect();
            no_dots.replace(',', ".")
        }
        (Some(_), Some(_)) | (Some(_), None) => cleaned.replace(',', ""),
        (None, Some(comma)) => {
            // A lone comma is the decimal separator unless it reads like
            // a thousands group ("1,234")
            let decimals = cleaned.len() - comma - 1;
            if decimals == 3 {
                cleaned.replace(',', "")
            } else {
                cleaned.replace(',', ".")
            }
        }
        (None, None) => cleaned,
    };

    normalized.parse().ok()
}
