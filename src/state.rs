//! Application state management

use crate::config::AppConfig;
use crate::error::Result;
use crate::notifications::{discord::DiscordWebhookSink, Notifier, NullSink};
use crate::sources::SourceRegistry;
use crate::store::PriceHistoryStore;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across the capture pipeline
pub struct AppState {
    pub config: AppConfig,

    /// Price-history store (single source of truth)
    pub store: Arc<PriceHistoryStore>,

    /// Marketplace price sources
    pub sources: Arc<SourceRegistry>,

    /// Outbound notification handle
    pub notifier: Notifier,

    /// Set while a bulk capture is executing; a second bulk capture
    /// arriving meanwhile is skipped, not queued
    pub capture_in_flight: AtomicBool,
}

impl AppState {
    /// Create new application state from configuration
    pub fn new(config: AppConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        tracing::info!("Data directory: {:?}", config.data_dir);

        let store = Arc::new(PriceHistoryStore::open(&config.data_dir)?);

        let sources = Arc::new(SourceRegistry::new(Duration::from_secs(
            config.capture.fetch_timeout_secs,
        ))?);

        let notifier = if config.notifications.enabled {
            match &config.notifications.discord_webhook_url {
                Some(webhook) => {
                    Notifier::spawn(Arc::new(DiscordWebhookSink::new(webhook.clone())?))
                }
                None => Notifier::spawn(Arc::new(NullSink)),
            }
        } else {
            Notifier::disabled()
        };

        Ok(Self {
            config,
            store,
            sources,
            notifier,
            capture_in_flight: AtomicBool::new(false),
        })
    }

    /// Assemble state from pre-built parts. Tests use this to inject
    /// mock sources and recording sinks.
    pub fn with_parts(
        config: AppConfig,
        store: Arc<PriceHistoryStore>,
        sources: Arc<SourceRegistry>,
        notifier: Notifier,
    ) -> Self {
        Self {
            config,
            store,
            sources,
            notifier,
            capture_in_flight: AtomicBool::new(false),
        }
    }
}
