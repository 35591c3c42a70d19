//! Price-history store
//!
//! Single source of truth for tracked items, their price histories, the
//! sold-items archive, and aggregate capture metadata. All writes pass
//! through one FIFO mutation lane; a tokio mutex is acquired in request
//! order, so no two mutations ever interleave and a manual capture can
//! never lose an update against a scheduled one. Reads bypass the lane
//! and may lag an in-flight write, but never observe a torn document.

pub mod document;
pub mod models;
pub mod spike;
pub mod valuation;

use crate::currency::{convert, Currency};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use models::{
    AlertThresholds, CustomizationSnapshot, PriceEntry, SoldItem, SpikeEvent, StoreDocument,
    TrackedItem,
};
use parking_lot::RwLock;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};
use valuation::InventoryValue;

/// Input for adding a tracked item
#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    pub market_hash_name: String,
    pub label: String,
    pub app_id: u32,
    pub purchase_price: f64,
    pub purchase_currency: Currency,
    pub quantity: u32,
    #[serde(default)]
    pub customizations: Vec<models::Customization>,
    #[serde(default)]
    pub alert: Option<AlertThresholds>,
}

/// Partial update of a tracked item; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemUpdate {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub purchase_price: Option<f64>,
    #[serde(default)]
    pub purchase_currency: Option<Currency>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub include_in_value: Option<bool>,
    #[serde(default)]
    pub include_in_pnl: Option<bool>,
    #[serde(default)]
    pub alert: Option<AlertThresholds>,
    #[serde(default)]
    pub clear_alert: bool,
}

/// Durable store for tracked items and their price histories
pub struct PriceHistoryStore {
    path: PathBuf,
    /// Single-lane FIFO mutation queue. Tokio's mutex hands the lock to
    /// waiters in acquisition order, which is the serialization
    /// guarantee everything above relies on.
    write_lane: Mutex<()>,
    /// Last durably written document, served to readers
    current: RwLock<StoreDocument>,
}

impl PriceHistoryStore {
    /// Open the store backed by `<data_dir>/inventory.json`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(document::STORE_FILE);
        let doc = document::load(&path)?;
        info!(
            "Store opened: {} tracked items, {} sold, {} captures",
            doc.items.len(),
            doc.sold_items.len(),
            doc.metadata.total_captures
        );
        Ok(Self {
            path,
            write_lane: Mutex::new(()),
            current: RwLock::new(doc),
        })
    }

    /// Current full state. Internally consistent; may lag a mutation
    /// that is still in the lane.
    pub fn read(&self) -> StoreDocument {
        self.current.read().clone()
    }

    /// All tracked items, in key order.
    pub fn tracked_items(&self) -> Vec<TrackedItem> {
        self.current.read().items.values().cloned().collect()
    }

    /// Aggregate valuation of the current state.
    pub fn inventory_value(&self) -> InventoryValue {
        valuation::compute_inventory_value(&self.current.read())
    }

    /// Apply `f` against a fresh snapshot, persist, then publish.
    ///
    /// Queued FIFO behind any in-flight mutation. If `f` fails, nothing
    /// is written and the durable state is untouched; the lane keeps
    /// processing subsequent mutations either way.
    pub async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut StoreDocument) -> Result<T> + Send,
        T: Send,
    {
        let _lane = self.write_lane.lock().await;

        let mut doc = self.current.read().clone();
        let value = f(&mut doc)?;

        document::save(&self.path, &doc)?;
        *self.current.write() = doc;

        Ok(value)
    }

    /// Add a new tracked item. Validation happens before the mutation
    /// enters the lane, so a rejected item is never partially applied.
    pub async fn add_item(&self, new: NewItem) -> Result<()> {
        validate_new_item(&new)?;

        self.mutate(move |doc| {
            if doc.items.contains_key(&new.market_hash_name) {
                return Err(AppError::Validation(format!(
                    "Item '{}' is already tracked",
                    new.market_hash_name
                )));
            }

            let item = TrackedItem {
                market_hash_name: new.market_hash_name.clone(),
                label: new.label,
                app_id: new.app_id,
                purchase_price: new.purchase_price,
                purchase_currency: new.purchase_currency,
                quantity: new.quantity,
                customizations: new.customizations,
                include_in_value: true,
                include_in_pnl: true,
                alert: new.alert,
                price_history: Vec::new(),
                added_at: Utc::now(),
            };

            info!("Tracking '{}'", item.market_hash_name);
            doc.items.insert(new.market_hash_name, item);
            Ok(())
        })
        .await
    }

    /// Edit a tracked item. `NotFound` if it does not exist.
    pub async fn update_item(&self, key: &str, update: ItemUpdate) -> Result<()> {
        validate_update(&update)?;

        let key = key.to_string();
        self.mutate(move |doc| {
            let item = doc
                .items
                .get_mut(&key)
                .ok_or_else(|| AppError::NotFound(format!("Item '{}'", key)))?;

            if let Some(label) = update.label {
                item.label = label;
            }
            if let Some(price) = update.purchase_price {
                item.purchase_price = price;
            }
            if let Some(currency) = update.purchase_currency {
                item.purchase_currency = currency;
            }
            if let Some(quantity) = update.quantity {
                item.quantity = quantity;
            }
            if let Some(include) = update.include_in_value {
                item.include_in_value = include;
            }
            if let Some(include) = update.include_in_pnl {
                item.include_in_pnl = include;
            }
            if update.clear_alert {
                item.alert = None;
            } else if let Some(alert) = update.alert {
                item.alert = Some(alert);
            }

            Ok(())
        })
        .await
    }

    /// Delete a tracked item. `NotFound` if it does not exist.
    pub async fn remove_item(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.mutate(move |doc| {
            doc.items
                .remove(&key)
                .map(|_| info!("Removed '{}'", key))
                .ok_or_else(|| AppError::NotFound(format!("Item '{}'", key)))
        })
        .await
    }

    /// Append a now-stamped price entry for `key`.
    ///
    /// Re-sorts the history, bumps the capture counter, updates the
    /// last-capture timestamp, and runs spike detection against the
    /// immediately preceding entry. Returns the spike, if any.
    ///
    /// A missing item is a silent no-op returning `Ok(None)`: the item
    /// may have been deleted while its fetch was in flight, and that
    /// race is tolerated.
    pub async fn append_price(&self, key: &str, price: f64) -> Result<Option<SpikeEvent>> {
        self.append_price_at(key, price, Utc::now()).await
    }

    async fn append_price_at(
        &self,
        key: &str,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<SpikeEvent>> {
        let key = key.to_string();
        self.mutate(move |doc| {
            let Some(item) = doc.items.get_mut(&key) else {
                debug!("append_price: '{}' no longer tracked, skipping", key);
                return Ok(None);
            };

            let prev = item.price_history.last().cloned();

            item.price_history.push(PriceEntry {
                date: now,
                median_price: price,
            });
            // Stable sort: duplicate timestamps keep their append order
            item.price_history.sort_by(|a, b| a.date.cmp(&b.date));

            doc.metadata.total_captures += 1;
            doc.metadata.last_capture = Some(now);

            Ok(prev.and_then(|p| spike::detect(&key, &p, price, now)))
        })
        .await
    }

    /// Sell a tracked item: freeze it into the sold archive and remove
    /// it from the active set. `sold_price` is the total proceeds for
    /// the stack. Fails with `NotFound` if the item does not exist.
    pub async fn mark_sold(
        &self,
        key: &str,
        sold_price: f64,
        sold_currency: Currency,
    ) -> Result<SoldItem> {
        if sold_price < 0.0 {
            return Err(AppError::Validation(
                "Sale price cannot be negative".to_string(),
            ));
        }

        let key = key.to_string();
        self.mutate(move |doc| {
            let item = doc
                .items
                .remove(&key)
                .ok_or_else(|| AppError::NotFound(format!("Item '{}'", key)))?;

            let purchase_cost_usd = convert(item.purchase_price, item.purchase_currency, Currency::Usd)
                * item.quantity as f64
                + item
                    .customizations
                    .iter()
                    .map(|c| convert(c.purchase_price, item.purchase_currency, Currency::Usd))
                    .sum::<f64>();

            let proceeds_usd = convert(sold_price, sold_currency, Currency::Usd);

            let sold = SoldItem {
                market_hash_name: item.market_hash_name,
                label: item.label,
                app_id: item.app_id,
                purchase_price: item.purchase_price,
                purchase_currency: item.purchase_currency,
                quantity: item.quantity,
                customizations: item
                    .customizations
                    .iter()
                    .map(|c| CustomizationSnapshot {
                        name: c.name.clone(),
                        purchase_price: c.purchase_price,
                        last_price: c.latest_price(),
                    })
                    .collect(),
                purchase_cost_usd,
                sold_price,
                sold_currency,
                profit_loss_usd: proceeds_usd - purchase_cost_usd,
                sold_at: Utc::now(),
            };

            info!(
                "Sold '{}' for {} {} (P/L {:.2} USD)",
                sold.market_hash_name, sold.sold_price, sold.sold_currency, sold.profit_loss_usd
            );

            doc.sold_items.push(sold.clone());
            Ok(sold)
        })
        .await
    }
}

fn validate_new_item(new: &NewItem) -> Result<()> {
    if new.market_hash_name.trim().is_empty() {
        return Err(AppError::Validation(
            "Market hash name cannot be empty".to_string(),
        ));
    }
    if new.purchase_price < 0.0 {
        return Err(AppError::Validation(
            "Purchase price cannot be negative".to_string(),
        ));
    }
    if new.quantity == 0 {
        return Err(AppError::Validation(
            "Quantity must be at least 1".to_string(),
        ));
    }
    if new.customizations.iter().any(|c| c.purchase_price < 0.0) {
        return Err(AppError::Validation(
            "Customization price cannot be negative".to_string(),
        ));
    }
    validate_alert(new.alert.as_ref())
}

fn validate_update(update: &ItemUpdate) -> Result<()> {
    if let Some(price) = update.purchase_price {
        if price < 0.0 {
            return Err(AppError::Validation(
                "Purchase price cannot be negative".to_string(),
            ));
        }
    }
    if update.quantity == Some(0) {
        return Err(AppError::Validation(
            "Quantity must be at least 1".to_string(),
        ));
    }
    validate_alert(update.alert.as_ref())
}

fn validate_alert(alert: Option<&AlertThresholds>) -> Result<()> {
    if let Some(alert) = alert {
        if alert.above.is_some_and(|v| v < 0.0) || alert.below.is_some_and(|v| v < 0.0) {
            return Err(AppError::Validation(
                "Alert thresholds cannot be negative".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn new_item(key: &str) -> NewItem {
        NewItem {
            market_hash_name: key.to_string(),
            label: key.to_string(),
            app_id: 730,
            purchase_price: 10.0,
            purchase_currency: Currency::Usd,
            quantity: 1,
            customizations: Vec::new(),
            alert: None,
        }
    }

    async fn store_with(keys: &[&str]) -> (tempfile::TempDir, PriceHistoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PriceHistoryStore::open(dir.path()).unwrap();
        for key in keys {
            store.add_item(new_item(key)).await.unwrap();
        }
        (dir, store)
    }

    #[tokio::test]
    async fn test_empty_store_reads_well_formed() {
        let dir = tempfile::tempdir().unwrap();
        let store = PriceHistoryStore::open(dir.path()).unwrap();
        let doc = store.read();
        assert!(doc.items.is_empty());
        assert_eq!(doc.metadata.total_captures, 0);
    }

    #[tokio::test]
    async fn test_append_preserves_ascending_order() {
        let (_dir, store) = store_with(&["a"]).await;
        let base = Utc::now();

        // Deliberately out of order, with one duplicate timestamp
        for minutes in [10i64, 2, 7, 2] {
            store
                .append_price_at("a", minutes as f64, base + Duration::minutes(minutes))
                .await
                .unwrap();
        }

        let history = store.read().items["a"].price_history.clone();
        assert_eq!(history.len(), 4);
        for pair in history.windows(2) {
            assert!(pair[0].date <= pair[1].date);
        }
    }

    #[tokio::test]
    async fn test_append_bumps_metadata() {
        let (_dir, store) = store_with(&["a"]).await;
        store.append_price("a", 12.0).await.unwrap();
        store.append_price("a", 13.0).await.unwrap();

        let meta = store.read().metadata;
        assert_eq!(meta.total_captures, 2);
        assert!(meta.last_capture.is_some());
    }

    #[tokio::test]
    async fn test_append_to_missing_item_is_silent_noop() {
        let (_dir, store) = store_with(&[]).await;
        let spike = store.append_price("ghost", 5.0).await.unwrap();
        assert!(spike.is_none());
        assert_eq!(store.read().metadata.total_captures, 0);
    }

    #[tokio::test]
    async fn test_rapid_jump_reports_spike() {
        let (_dir, store) = store_with(&["a"]).await;
        let base = Utc::now();
        store.append_price_at("a", 100.0, base).await.unwrap();
        let spike = store
            .append_price_at("a", 120.0, base + Duration::minutes(5))
            .await
            .unwrap()
            .expect("spike expected");
        assert_eq!(spike.market_hash_name, "a");
        assert_eq!(spike.direction, models::SpikeDirection::Up);
    }

    #[tokio::test]
    async fn test_concurrent_mutations_both_apply() {
        let (_dir, store) = store_with(&[]).await;
        let store = Arc::new(store);

        let a = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .mutate(|doc| {
                        doc.metadata.total_captures += 1;
                        Ok(())
                    })
                    .await
            })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .mutate(|doc| {
                        doc.metadata.total_captures += 1;
                        Ok(())
                    })
                    .await
            })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
        assert_eq!(store.read().metadata.total_captures, 2);
    }

    #[tokio::test]
    async fn test_failed_mutation_does_not_persist_or_poison() {
        let (_dir, store) = store_with(&[]).await;

        let result: Result<()> = store
            .mutate(|doc| {
                doc.metadata.total_captures = 99;
                Err(AppError::Internal("boom".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.read().metadata.total_captures, 0);

        // Lane still processes subsequent mutations
        store
            .mutate(|doc| {
                doc.metadata.total_captures += 1;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(store.read().metadata.total_captures, 1);
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PriceHistoryStore::open(dir.path()).unwrap();
            store.add_item(new_item("a")).await.unwrap();
            store.append_price("a", 11.0).await.unwrap();
        }

        let store = PriceHistoryStore::open(dir.path()).unwrap();
        let doc = store.read();
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.metadata.total_captures, 1);
    }

    #[tokio::test]
    async fn test_duplicate_add_rejected() {
        let (_dir, store) = store_with(&["a"]).await;
        let err = store.add_item(new_item("a")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_negative_threshold_rejected_before_queue() {
        let (_dir, store) = store_with(&["a"]).await;
        let update = ItemUpdate {
            alert: Some(AlertThresholds {
                above: Some(-5.0),
                below: None,
            }),
            ..Default::default()
        };
        let err = store.update_item("a", update).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_mark_sold_moves_item_to_archive() {
        let (_dir, store) = store_with(&["a"]).await;
        store.append_price("a", 14.0).await.unwrap();

        let sold = store.mark_sold("a", 15.0, Currency::Usd).await.unwrap();
        assert!((sold.profit_loss_usd - 5.0).abs() < 1e-9);

        let doc = store.read();
        assert!(!doc.items.contains_key("a"));
        assert_eq!(doc.sold_items.len(), 1);
        assert_eq!(doc.sold_items[0].market_hash_name, "a");
    }

    #[tokio::test]
    async fn test_mark_sold_freezes_customizations() {
        let dir = tempfile::tempdir().unwrap();
        let store = PriceHistoryStore::open(dir.path()).unwrap();
        let mut item = new_item("a");
        item.customizations.push(models::Customization {
            name: "Sticker | Crown (Foil)".to_string(),
            market_hash_name: None,
            purchase_price: 2.0,
            price_history: vec![PriceEntry {
                date: Utc::now(),
                median_price: 3.5,
            }],
        });
        store.add_item(item).await.unwrap();

        let sold = store.mark_sold("a", 20.0, Currency::Usd).await.unwrap();
        assert_eq!(sold.customizations.len(), 1);
        assert_eq!(sold.customizations[0].last_price, Some(3.5));
        // Purchase cost includes the customization
        assert!((sold.purchase_cost_usd - 12.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_mark_sold_missing_item_is_not_found() {
        let (_dir, store) = store_with(&[]).await;
        let err = store.mark_sold("ghost", 1.0, Currency::Usd).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
