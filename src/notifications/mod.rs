//! Outbound notifications
//!
//! The capture pipeline never waits on notification delivery. Events go
//! into a bounded queue; a worker task drains the queue into the
//! configured sink. A full queue or a delivery failure is logged and the
//! event dropped; notifications are best-effort by contract.

pub mod discord;

use crate::error::Result;
use crate::store::models::SpikeEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

const QUEUE_SIZE: usize = 64;

/// Per-item price movement within one capture cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDelta {
    pub market_hash_name: String,
    pub label: String,
    pub previous_price: Option<f64>,
    pub new_price: Option<f64>,
}

/// Summary of one completed capture cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSummary {
    pub cycle_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub total_value_before: f64,
    pub total_value_after: f64,
    pub per_item_deltas: Vec<ItemDelta>,
}

/// Event pushed to the notification channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NotificationEvent {
    CaptureSummary(CaptureSummary),
    Spike(SpikeEvent),
}

/// A delivery channel for notification events
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &NotificationEvent) -> Result<()>;
}

/// Sink that discards everything; used when notifications are disabled
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn deliver(&self, _event: &NotificationEvent) -> Result<()> {
        Ok(())
    }
}

/// Handle for pushing events to the notification worker
#[derive(Clone)]
pub struct Notifier {
    tx: Option<mpsc::Sender<NotificationEvent>>,
}

impl Notifier {
    /// Spawn the delivery worker draining into `sink`.
    pub fn spawn(sink: Arc<dyn NotificationSink>) -> Self {
        let (tx, mut rx) = mpsc::channel::<NotificationEvent>(QUEUE_SIZE);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = sink.deliver(&event).await {
                    warn!("Notification delivery failed: {}", e);
                }
            }
        });

        Self { tx: Some(tx) }
    }

    /// A notifier that drops everything without spawning a worker
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Enqueue an event, fire-and-forget. Never blocks the caller; a
    /// full queue drops the event with a warning.
    pub fn notify(&self, event: NotificationEvent) {
        let Some(tx) = &self.tx else { return };
        if let Err(e) = tx.try_send(event) {
            warn!("Notification queue full, dropping event: {}", e);
        }
    }
}
