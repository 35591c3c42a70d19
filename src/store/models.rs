//! Store data types
//!
//! Everything in here serializes into the single JSON document the store
//! persists: tracked items keyed by market hash name, the sold-items
//! archive, and capture metadata.

use crate::currency::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One point in an item's price history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    /// Capture timestamp (ISO-8601 in the persisted document)
    pub date: DateTime<Utc>,
    pub median_price: f64,
}

/// Alert thresholds on an item's live price
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Notify when the price rises to or above this value
    #[serde(default)]
    pub above: Option<f64>,
    /// Notify when the price falls to or below this value
    #[serde(default)]
    pub below: Option<f64>,
}

/// A sub-item attached to a tracked item (e.g. an applied sticker or
/// charm), carrying its own purchase price and price history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customization {
    pub name: String,
    /// Market hash name of the customization itself, when it is
    /// independently tradable
    #[serde(default)]
    pub market_hash_name: Option<String>,
    pub purchase_price: f64,
    #[serde(default)]
    pub price_history: Vec<PriceEntry>,
}

impl Customization {
    /// Latest known price, if any history has been captured
    pub fn latest_price(&self) -> Option<f64> {
        self.price_history.last().map(|e| e.median_price)
    }
}

/// An item actively being monitored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedItem {
    /// Unique identity, also the key in the items map
    pub market_hash_name: String,
    /// Display label
    pub label: String,
    /// Marketplace application id (e.g. 730 for CS2)
    pub app_id: u32,
    pub purchase_price: f64,
    pub purchase_currency: Currency,
    pub quantity: u32,
    #[serde(default)]
    pub customizations: Vec<Customization>,
    /// Include in aggregate inventory valuation
    #[serde(default = "default_true")]
    pub include_in_value: bool,
    /// Include in profit/loss aggregation
    #[serde(default = "default_true")]
    pub include_in_pnl: bool,
    #[serde(default)]
    pub alert: Option<AlertThresholds>,
    /// Ascending-sorted by date; duplicate dates are legal and retained
    #[serde(default)]
    pub price_history: Vec<PriceEntry>,
    pub added_at: DateTime<Utc>,
}

impl TrackedItem {
    /// Most recent captured price, if any
    pub fn latest_price(&self) -> Option<f64> {
        self.price_history.last().map(|e| e.median_price)
    }
}

/// Frozen view of a customization taken at sale time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomizationSnapshot {
    pub name: String,
    pub purchase_price: f64,
    /// Last captured price at the moment of sale
    pub last_price: Option<f64>,
}

/// Immutable record of a completed sale. Created exactly once when a
/// tracked item is sold; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoldItem {
    pub market_hash_name: String,
    pub label: String,
    pub app_id: u32,
    pub purchase_price: f64,
    pub purchase_currency: Currency,
    pub quantity: u32,
    #[serde(default)]
    pub customizations: Vec<CustomizationSnapshot>,
    /// Total purchase cost (item stack plus customizations) in USD at
    /// sale time
    pub purchase_cost_usd: f64,
    /// Total sale proceeds in the sale currency
    pub sold_price: f64,
    pub sold_currency: Currency,
    pub profit_loss_usd: f64,
    pub sold_at: DateTime<Utc>,
}

/// Aggregate capture bookkeeping, mutated only alongside price appends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureMetadata {
    #[serde(default)]
    pub last_capture: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_captures: u64,
    pub created_at: DateTime<Utc>,
}

impl Default for CaptureMetadata {
    fn default() -> Self {
        Self {
            last_capture: None,
            total_captures: 0,
            created_at: Utc::now(),
        }
    }
}

/// The full persisted state: one JSON document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub items: BTreeMap<String, TrackedItem>,
    #[serde(default)]
    pub sold_items: Vec<SoldItem>,
    #[serde(default)]
    pub metadata: CaptureMetadata,
}

/// Direction of a price spike
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpikeDirection {
    Up,
    Down,
}

/// A price movement that crossed the spike thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpikeEvent {
    pub market_hash_name: String,
    pub previous_price: f64,
    pub new_price: f64,
    pub change_amount: f64,
    pub change_percent: f64,
    pub direction: SpikeDirection,
    /// Minutes elapsed between the two samples that triggered the spike
    pub window_minutes: i64,
}

fn default_true() -> bool {
    true
}
