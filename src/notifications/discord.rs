//! Discord webhook sink

use crate::error::{AppError, Result};
use crate::notifications::{CaptureSummary, NotificationEvent, NotificationSink};
use crate::store::models::{SpikeDirection, SpikeEvent};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// Embed accent colors
const COLOR_UP: u32 = 0x2ECC71;
const COLOR_DOWN: u32 = 0xE74C3C;
const COLOR_SUMMARY: u32 = 0x3498DB;

/// Discord can render at most 25 fields per embed
const MAX_EMBED_FIELDS: usize = 25;

/// Posts capture summaries and spike alerts to a Discord webhook
pub struct DiscordWebhookSink {
    client: Client,
    webhook_url: String,
}

impl DiscordWebhookSink {
    pub fn new(webhook_url: String) -> Result<Self> {
        url::Url::parse(&webhook_url)
            .map_err(|e| AppError::Config(format!("Invalid webhook URL: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(AppError::Fetch)?;

        Ok(Self {
            client,
            webhook_url,
        })
    }

    fn summary_embed(summary: &CaptureSummary) -> Value {
        let change = summary.total_value_after - summary.total_value_before;

        let fields: Vec<Value> = summary
            .per_item_deltas
            .iter()
            .filter(|d| d.previous_price.is_some() || d.new_price.is_some())
            .take(MAX_EMBED_FIELDS)
            .map(|d| {
                let line = match (d.previous_price, d.new_price) {
                    (Some(prev), Some(new)) => format!("${:.2} → ${:.2}", prev, new),
                    (None, Some(new)) => format!("first capture: ${:.2}", new),
                    (Some(prev), None) => format!("${:.2} → no price this cycle", prev),
                    (None, None) => "no price this cycle".to_string(),
                };
                json!({ "name": d.label, "value": line, "inline": true })
            })
            .collect();

        json!({
            "title": "Capture summary",
            "color": COLOR_SUMMARY,
            "description": format!(
                "Portfolio: ${:.2} → ${:.2} ({}{:.2})",
                summary.total_value_before,
                summary.total_value_after,
                if change >= 0.0 { "+" } else { "-" },
                change.abs()
            ),
            "fields": fields,
            "timestamp": summary.timestamp.to_rfc3339(),
            "footer": { "text": format!("cycle {}", summary.cycle_id) }
        })
    }

    fn spike_embed(spike: &SpikeEvent) -> Value {
        let (arrow, color) = match spike.direction {
            SpikeDirection::Up => ("▲", COLOR_UP),
            SpikeDirection::Down => ("▼", COLOR_DOWN),
        };

        json!({
            "title": format!("{} Price spike: {}", arrow, spike.market_hash_name),
            "color": color,
            "description": format!(
                "${:.2} → ${:.2} ({:.1}%, ${:.2}) within {} min",
                spike.previous_price,
                spike.new_price,
                spike.change_percent,
                spike.change_amount,
                spike.window_minutes
            )
        })
    }
}

#[async_trait]
impl NotificationSink for DiscordWebhookSink {
    async fn deliver(&self, event: &NotificationEvent) -> Result<()> {
        let embed = match event {
            NotificationEvent::CaptureSummary(summary) => Self::summary_embed(summary),
            NotificationEvent::Spike(spike) => Self::spike_embed(spike),
        };

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&json!({ "embeds": [embed] }))
            .send()
            .await
            .map_err(|e| AppError::Notification(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Notification(format!(
                "Webhook returned HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }
}
