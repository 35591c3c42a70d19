//! Aggregate inventory valuation
//!
//! A pure fold over the current store state. Nothing here is cached;
//! callers recompute on demand.

use crate::currency::{convert, Currency};
use crate::store::models::{StoreDocument, TrackedItem};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Portfolio value on one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuePoint {
    pub date: NaiveDate,
    pub value_usd: f64,
}

/// Aggregate valuation of the tracked inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryValue {
    /// Total purchase cost in USD (items plus customizations)
    pub total_purchase_cost_usd: f64,
    /// Total current value in USD; items with no captured history fall
    /// back to their purchase price
    pub total_current_value_usd: f64,
    /// Portfolio value bucketed by calendar day, ascending
    pub timeline: Vec<ValuePoint>,
}

/// Purchase cost of one item stack in USD, customizations included
fn purchase_cost_usd(item: &TrackedItem) -> f64 {
    let base = convert(item.purchase_price, item.purchase_currency, Currency::Usd)
        * item.quantity as f64;
    let customizations: f64 = item
        .customizations
        .iter()
        .map(|c| convert(c.purchase_price, item.purchase_currency, Currency::Usd))
        .sum();
    base + customizations
}

/// Current value of one item stack in USD. Market prices are quoted in
/// USD; the purchase price is the fallback when no history exists.
fn current_value_usd(item: &TrackedItem) -> f64 {
    let unit = item
        .latest_price()
        .unwrap_or_else(|| convert(item.purchase_price, item.purchase_currency, Currency::Usd));
    let customizations: f64 = item
        .customizations
        .iter()
        .map(|c| {
            c.latest_price()
                .unwrap_or_else(|| convert(c.purchase_price, item.purchase_currency, Currency::Usd))
        })
        .sum();
    unit * item.quantity as f64 + customizations
}

/// Item value as of the end of `day`: the most recent entry on or before
/// that day, else the purchase-price fallback.
fn value_as_of(item: &TrackedItem, day: NaiveDate) -> f64 {
    let unit = item
        .price_history
        .iter()
        .rev()
        .find(|e| e.date.date_naive() <= day)
        .map(|e| e.median_price)
        .unwrap_or_else(|| convert(item.purchase_price, item.purchase_currency, Currency::Usd));
    unit * item.quantity as f64
}

/// Compute the aggregate valuation of all items flagged for inclusion.
pub fn compute_inventory_value(doc: &StoreDocument) -> InventoryValue {
    let included: Vec<&TrackedItem> = doc
        .items
        .values()
        .filter(|i| i.include_in_value)
        .collect();

    let total_purchase_cost_usd = included.iter().map(|i| purchase_cost_usd(i)).sum();
    let total_current_value_usd = included.iter().map(|i| current_value_usd(i)).sum();

    let days: BTreeSet<NaiveDate> = included
        .iter()
        .flat_map(|i| i.price_history.iter().map(|e| e.date.date_naive()))
        .collect();

    let timeline = days
        .into_iter()
        .map(|day| ValuePoint {
            date: day,
            value_usd: included.iter().map(|i| value_as_of(i, day)).sum(),
        })
        .collect();

    InventoryValue {
        total_purchase_cost_usd,
        total_current_value_usd,
        timeline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::PriceEntry;
    use chrono::{Datelike, TimeZone, Utc};

    fn item(key: &str, purchase: f64, history: Vec<(i64, f64)>) -> TrackedItem {
        TrackedItem {
            market_hash_name: key.to_string(),
            label: key.to_string(),
            app_id: 730,
            purchase_price: purchase,
            purchase_currency: Currency::Usd,
            quantity: 1,
            customizations: Vec::new(),
            include_in_value: true,
            include_in_pnl: true,
            alert: None,
            price_history: history
                .into_iter()
                .map(|(day, price)| PriceEntry {
                    date: Utc.with_ymd_and_hms(2025, 6, day as u32, 12, 0, 0).unwrap(),
                    median_price: price,
                })
                .collect(),
            added_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    fn doc_with(items: Vec<TrackedItem>) -> StoreDocument {
        let mut doc = StoreDocument::default();
        for item in items {
            doc.items.insert(item.market_hash_name.clone(), item);
        }
        doc
    }

    #[test]
    fn test_empty_store_values_to_zero() {
        let value = compute_inventory_value(&StoreDocument::default());
        assert_eq!(value.total_purchase_cost_usd, 0.0);
        assert_eq!(value.total_current_value_usd, 0.0);
        assert!(value.timeline.is_empty());
    }

    #[test]
    fn test_no_history_falls_back_to_purchase_price() {
        let doc = doc_with(vec![item("a", 25.0, vec![])]);
        let value = compute_inventory_value(&doc);
        assert!((value.total_current_value_usd - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_latest_price_wins_over_purchase() {
        let doc = doc_with(vec![item("a", 25.0, vec![(1, 30.0), (2, 40.0)])]);
        let value = compute_inventory_value(&doc);
        assert!((value.total_current_value_usd - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_excluded_items_do_not_count() {
        let mut excluded = item("b", 100.0, vec![]);
        excluded.include_in_value = false;
        let doc = doc_with(vec![item("a", 25.0, vec![]), excluded]);
        let value = compute_inventory_value(&doc);
        assert!((value.total_purchase_cost_usd - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_quantity_multiplies_value() {
        let mut stacked = item("a", 10.0, vec![(1, 12.0)]);
        stacked.quantity = 3;
        let doc = doc_with(vec![stacked]);
        let value = compute_inventory_value(&doc);
        assert!((value.total_current_value_usd - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_timeline_buckets_by_day_ascending() {
        let doc = doc_with(vec![
            item("a", 10.0, vec![(1, 10.0), (3, 20.0)]),
            item("b", 5.0, vec![(2, 8.0)]),
        ]);
        let value = compute_inventory_value(&doc);

        let days: Vec<u32> = value.timeline.iter().map(|p| p.date.day()).collect();
        assert_eq!(days, vec![1, 2, 3]);

        // Day 1: a=10 (captured), b falls back to purchase 5
        assert!((value.timeline[0].value_usd - 15.0).abs() < 1e-9);
        // Day 2: a still 10, b=8
        assert!((value.timeline[1].value_usd - 18.0).abs() < 1e-9);
        // Day 3: a=20, b=8
        assert!((value.timeline[2].value_usd - 28.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_usd_purchase_converts() {
        let mut foreign = item("a", 100.0, vec![]);
        foreign.purchase_currency = Currency::Eur;
        let doc = doc_with(vec![foreign]);
        let value = compute_inventory_value(&doc);
        assert!((value.total_purchase_cost_usd - 108.0).abs() < 1e-9);
    }
}
