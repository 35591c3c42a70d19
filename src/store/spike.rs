//! Spike detection
//!
//! A spike compares the newly captured price against the single most
//! recent prior entry, not a window average. The time-window check keeps
//! low-frequency polling from raising alerts: when the gap since the
//! previous sample is large, a price move is expected. A real spike that
//! occurred and reverted between two distant samples goes undetected;
//! that is an accepted limitation of the single-sample comparison.

use crate::store::models::{PriceEntry, SpikeDirection, SpikeEvent};
use chrono::{DateTime, Duration, Utc};

/// Maximum age of the previous sample for a move to count as a spike
pub const SPIKE_WINDOW_MINUTES: i64 = 30;

/// Minimum absolute change in dollars
pub const SPIKE_MIN_DELTA: f64 = 1.0;

/// Minimum percentage change
pub const SPIKE_MIN_PERCENT: f64 = 15.0;

/// Check whether `new_price` at `now` is a spike relative to `prev`.
pub fn detect(
    market_hash_name: &str,
    prev: &PriceEntry,
    new_price: f64,
    now: DateTime<Utc>,
) -> Option<SpikeEvent> {
    // Full-resolution comparison: 30m59s is outside a 30-minute window,
    // which truncated minutes would miss
    let elapsed = now - prev.date;
    if elapsed > Duration::minutes(SPIKE_WINDOW_MINUTES) {
        return None;
    }

    let change_amount = (new_price - prev.median_price).abs();
    let change_percent = if prev.median_price == 0.0 {
        0.0
    } else {
        change_amount / prev.median_price * 100.0
    };

    if change_amount < SPIKE_MIN_DELTA && change_percent < SPIKE_MIN_PERCENT {
        return None;
    }

    let direction = if new_price >= prev.median_price {
        SpikeDirection::Up
    } else {
        SpikeDirection::Down
    };

    Some(SpikeEvent {
        market_hash_name: market_hash_name.to_string(),
        previous_price: prev.median_price,
        new_price,
        change_amount,
        change_percent,
        direction,
        window_minutes: elapsed.num_minutes(),
    })
}
