//! Price-capture service
//!
//! Executes one capture pass, either for a single named item or for
//! every tracked item. Bulk captures fetch strictly sequentially with a
//! fixed inter-request delay, write each result through the store's
//! mutation lane, and finish by handing one summary event to the
//! notifier. Individual fetch failures never abort a batch; there is no
//! retry loop, a missed item is simply attempted again next cycle.

use crate::error::{AppError, Result};
use crate::notifications::{CaptureSummary, ItemDelta, NotificationEvent};
use crate::sources::{fetch_prices, FetchOutcome};
use crate::state::AppState;
use crate::store::models::SpikeEvent;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of one item within a bulk capture
#[derive(Debug, Clone, Serialize)]
pub struct CaptureOutcome {
    pub market_hash_name: String,
    pub price: Option<f64>,
    /// Present when the fetch failed rather than returning "no data"
    pub error: Option<String>,
    pub spike: Option<SpikeEvent>,
}

/// Report of one completed bulk capture cycle
#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub total_count: usize,
    pub success_count: usize,
    pub total_value_before: f64,
    pub total_value_after: f64,
    pub outcomes: Vec<CaptureOutcome>,
}

/// Clears the in-flight flag when the capture pass ends, including on
/// early error returns.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Capture service for the price-ingestion pipeline
pub struct CaptureService;

impl CaptureService {
    /// Capture the price of a single named item.
    ///
    /// Interactive path: a missing price is reported to the caller as
    /// `PriceUnavailable` rather than being merely logged.
    pub async fn capture_item(state: &AppState, key: &str) -> Result<f64> {
        let doc = state.store.read();
        let item = doc
            .items
            .get(key)
            .ok_or_else(|| AppError::NotFound(format!("Item '{}'", key)))?;

        let source = state
            .sources
            .default_source()
            .ok_or_else(|| AppError::Internal("No price source configured".to_string()))?;

        let price = source
            .fetch_price(key, item.app_id)
            .await?
            .ok_or_else(|| AppError::PriceUnavailable(key.to_string()))?;

        let spike = state.store.append_price(key, price).await?;
        if let Some(spike) = spike {
            state.notifier.notify(NotificationEvent::Spike(spike));
        }

        Ok(price)
    }

    /// Capture prices for every tracked item.
    ///
    /// Returns `Ok(None)` when another bulk capture is already
    /// executing; the racing call is skipped entirely, not queued.
    pub async fn capture_all(state: &AppState) -> Result<Option<CaptureReport>> {
        if state.capture_in_flight.swap(true, Ordering::SeqCst) {
            info!("Bulk capture already executing, skipping this trigger");
            return Ok(None);
        }
        let _guard = InFlightGuard(&state.capture_in_flight);

        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();

        let before = state.store.read();
        let value_before = state.store.inventory_value();

        let items: Vec<(String, u32)> = before
            .items
            .values()
            .map(|i| (i.market_hash_name.clone(), i.app_id))
            .collect();

        info!("Capture cycle {} starting: {} items", cycle_id, items.len());

        let source = state
            .sources
            .default_source()
            .ok_or_else(|| AppError::Internal("No price source configured".to_string()))?;

        let delay = Duration::from_millis(state.config.capture.fetch_delay_ms);
        let fetched = fetch_prices(source.as_ref(), &items, delay).await;

        let mut outcomes = Vec::with_capacity(fetched.len());
        let mut success_count = 0usize;

        for FetchOutcome {
            market_hash_name,
            price,
            error,
        } in fetched
        {
            let mut spike = None;
            if let Some(price) = price {
                match state.store.append_price(&market_hash_name, price).await {
                    Ok(s) => {
                        success_count += 1;
                        spike = s;
                    }
                    Err(e) => {
                        warn!("Failed to persist price for '{}': {}", market_hash_name, e);
                    }
                }
            }

            if let Some(spike_event) = &spike {
                state
                    .notifier
                    .notify(NotificationEvent::Spike(spike_event.clone()));
            }

            outcomes.push(CaptureOutcome {
                market_hash_name,
                price,
                error,
                spike,
            });
        }

        let value_after = state.store.inventory_value();

        let per_item_deltas = outcomes
            .iter()
            .map(|o| {
                let previous = before
                    .items
                    .get(&o.market_hash_name)
                    .and_then(|i| i.latest_price());
                let label = before
                    .items
                    .get(&o.market_hash_name)
                    .map(|i| i.label.clone())
                    .unwrap_or_else(|| o.market_hash_name.clone());
                ItemDelta {
                    market_hash_name: o.market_hash_name.clone(),
                    label,
                    previous_price: previous,
                    new_price: o.price,
                }
            })
            .collect();

        state
            .notifier
            .notify(NotificationEvent::CaptureSummary(CaptureSummary {
                cycle_id,
                timestamp: started_at,
                total_value_before: value_before.total_current_value_usd,
                total_value_after: value_after.total_current_value_usd,
                per_item_deltas,
            }));

        let report = CaptureReport {
            cycle_id,
            started_at,
            total_count: outcomes.len(),
            success_count,
            total_value_before: value_before.total_current_value_usd,
            total_value_after: value_after.total_current_value_usd,
            outcomes,
        };

        info!(
            "Capture cycle {} finished: {}/{} items captured",
            cycle_id, report.success_count, report.total_count
        );

        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::currency::Currency;
    use crate::notifications::{NotificationSink, Notifier};
    use crate::sources::{PriceSource, SourceRegistry};
    use crate::store::{NewItem, PriceHistoryStore};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// Scripted source: per-item behavior plus a shared call counter
    struct MockSource {
        calls: Arc<AtomicUsize>,
        /// key -> Ok(Some(price)) / Ok(None) / Err
        behaviors: HashMap<String, std::result::Result<Option<f64>, String>>,
        /// extra latency per fetch, for overlap tests
        latency: Duration,
    }

    impl MockSource {
        fn new(behaviors: Vec<(&str, std::result::Result<Option<f64>, String>)>) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                behaviors: behaviors
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                latency: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl PriceSource for MockSource {
        fn id(&self) -> &'static str {
            "steam"
        }

        fn name(&self) -> &'static str {
            "Mock"
        }

        async fn fetch_price(&self, market_hash_name: &str, _app_id: u32) -> Result<Option<f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            match self.behaviors.get(market_hash_name) {
                Some(Ok(price)) => Ok(*price),
                Some(Err(msg)) => Err(AppError::Internal(msg.clone())),
                None => Ok(None),
            }
        }
    }

    struct RecordingSink {
        tx: mpsc::UnboundedSender<NotificationEvent>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(&self, event: &NotificationEvent) -> Result<()> {
            let _ = self.tx.send(event.clone());
            Ok(())
        }
    }

    fn fast_config(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.data_dir = dir.to_path_buf();
        config.capture.fetch_delay_ms = 1;
        config
    }

    async fn state_with(
        dir: &std::path::Path,
        source: MockSource,
        keys: &[&str],
        notifier: Notifier,
    ) -> AppState {
        let store = Arc::new(PriceHistoryStore::open(dir).unwrap());
        for key in keys {
            store
                .add_item(NewItem {
                    market_hash_name: key.to_string(),
                    label: key.to_string(),
                    app_id: 730,
                    purchase_price: 10.0,
                    purchase_currency: Currency::Usd,
                    quantity: 1,
                    customizations: Vec::new(),
                    alert: None,
                })
                .await
                .unwrap();
        }
        let sources = Arc::new(SourceRegistry::with_sources(vec![Arc::new(source)]));
        AppState::with_parts(fast_config(dir), store, sources, notifier)
    }

    #[tokio::test]
    async fn test_partial_batch_still_appends_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockSource::new(vec![
            ("a", Ok(Some(1.0))),
            ("b", Ok(Some(2.0))),
            ("c", Err("connection reset".to_string())),
            ("d", Ok(Some(4.0))),
            ("e", Ok(Some(5.0))),
        ]);
        let state = state_with(
            dir.path(),
            source,
            &["a", "b", "c", "d", "e"],
            Notifier::disabled(),
        )
        .await;

        let report = CaptureService::capture_all(&state).await.unwrap().unwrap();

        assert_eq!(report.total_count, 5);
        assert_eq!(report.success_count, 4);

        let doc = state.store.read();
        assert_eq!(doc.items["a"].price_history.len(), 1);
        assert!(doc.items["c"].price_history.is_empty());
        assert_eq!(doc.metadata.total_captures, 4);
    }

    #[tokio::test]
    async fn test_concurrent_bulk_captures_run_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockSource::new(vec![("a", Ok(Some(1.0))), ("b", Ok(Some(2.0)))]);
        source.latency = Duration::from_millis(50);
        let calls = source.calls.clone();
        let state =
            Arc::new(state_with(dir.path(), source, &["a", "b"], Notifier::disabled()).await);

        let first = {
            let state = state.clone();
            tokio::spawn(async move { CaptureService::capture_all(&state).await })
        };
        // Give the first capture time to claim the in-flight flag
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = CaptureService::capture_all(&state).await.unwrap();

        assert!(second.is_none());
        let report = first.await.unwrap().unwrap().unwrap();
        assert_eq!(report.total_count, 2);
        // Only the winning capture touched the source
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_summary_event_carries_values_and_deltas() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockSource::new(vec![("a", Ok(Some(20.0)))]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = Notifier::spawn(Arc::new(RecordingSink { tx }));
        let state = state_with(dir.path(), source, &["a"], notifier).await;

        CaptureService::capture_all(&state).await.unwrap().unwrap();

        let mut summary = None;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(1), rx.recv()).await
        {
            if let NotificationEvent::CaptureSummary(s) = event {
                summary = Some(s);
                break;
            }
        }
        let summary = summary.expect("summary event expected");

        // Value before: purchase fallback $10; after: captured $20
        assert!((summary.total_value_before - 10.0).abs() < 1e-9);
        assert!((summary.total_value_after - 20.0).abs() < 1e-9);
        assert_eq!(summary.per_item_deltas.len(), 1);
        assert_eq!(summary.per_item_deltas[0].new_price, Some(20.0));
        assert_eq!(summary.per_item_deltas[0].previous_price, None);
    }

    #[tokio::test]
    async fn test_single_capture_miss_is_price_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockSource::new(vec![("a", Ok(None))]);
        let state = state_with(dir.path(), source, &["a"], Notifier::disabled()).await;

        let err = CaptureService::capture_item(&state, "a").await.unwrap_err();
        assert!(matches!(err, AppError::PriceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_single_capture_unknown_item_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockSource::new(vec![]);
        let state = state_with(dir.path(), source, &[], Notifier::disabled()).await;

        let err = CaptureService::capture_item(&state, "ghost").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_spike_is_notified_during_bulk_capture() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockSource::new(vec![("a", Ok(Some(50.0)))]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = Notifier::spawn(Arc::new(RecordingSink { tx }));
        let state = state_with(dir.path(), source, &["a"], notifier).await;

        // Seed a recent prior sample so the jump registers as a spike
        state.store.append_price("a", 10.0).await.unwrap();
        CaptureService::capture_all(&state).await.unwrap().unwrap();

        let mut saw_spike = false;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(1), rx.recv()).await
        {
            if matches!(event, NotificationEvent::Spike(_)) {
                saw_spike = true;
                break;
            }
        }
        assert!(saw_spike);
    }

    #[tokio::test]
    async fn test_empty_inventory_capture_completes() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockSource::new(vec![]);
        let state = state_with(dir.path(), source, &[], Notifier::disabled()).await;

        let report = CaptureService::capture_all(&state).await.unwrap().unwrap();
        assert_eq!(report.total_count, 0);
        assert_eq!(report.success_count, 0);
    }
}
