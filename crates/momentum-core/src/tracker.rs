//! Task completion tracking.
//!
//! Ties the store and the bus together for the one flow that crosses both:
//! logging a finished task appends a history record and publishes
//! [`EventKind::TaskCompleted`]; the [`DivergenceWatcher`] subscriber flags
//! learning when an actual duration diverges sharply from its estimate.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::bus::{BusEvent, EventBus, EventHandler, EventKind, HandlerResult};
use crate::calibration::UserSnapshot;
use crate::error::CoreError;
use crate::storage::Database;

/// State key the divergence watcher writes its flag under.
pub const LEARNING_FLAG_KEY: &str = "learning_flag";

/// Record a completed task and publish [`EventKind::TaskCompleted`].
///
/// Energy level and peak-window membership are captured from the snapshot
/// at completion time. Returns the actual/estimated ratio (1.0 for a zero
/// estimate, which is stored but never feeds multiplier math).
///
/// # Errors
/// Returns an error if the storage medium is unavailable.
pub async fn record_task_completion(
    db: &Database,
    bus: &EventBus,
    snapshot: &UserSnapshot,
    category: &str,
    estimated_minutes: u32,
    actual_minutes: u32,
) -> Result<f64, CoreError> {
    let in_peak_window = snapshot.is_in_peak_window(Utc::now());
    db.log_task_completion(
        category,
        estimated_minutes,
        actual_minutes,
        snapshot.energy_level,
        in_peak_window,
    )?;

    let ratio = if estimated_minutes > 0 {
        f64::from(actual_minutes) / f64::from(estimated_minutes)
    } else {
        1.0
    };

    bus.publish(
        EventKind::TaskCompleted,
        json!({
            "category": category,
            "estimated": estimated_minutes,
            "actual": actual_minutes,
            "ratio": ratio,
        }),
    )
    .await;

    Ok(ratio)
}

/// Subscriber that flags learning when a completion ratio exceeds its
/// threshold.
///
/// Subscribe it to [`EventKind::TaskCompleted`]. On a sharp divergence it
/// logs a warning and records the offending completion under
/// [`LEARNING_FLAG_KEY`] for the next calibration pass to pick up.
pub struct DivergenceWatcher {
    db: Arc<Database>,
    threshold: f64,
}

impl DivergenceWatcher {
    pub const DEFAULT_THRESHOLD: f64 = 1.5;

    pub fn new(db: Arc<Database>) -> Self {
        Self::with_threshold(db, Self::DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(db: Arc<Database>, threshold: f64) -> Self {
        Self { db, threshold }
    }
}

#[async_trait::async_trait]
impl EventHandler for DivergenceWatcher {
    async fn handle(&self, event: &BusEvent) -> HandlerResult {
        let ratio = event.payload["ratio"].as_f64().unwrap_or(1.0);
        if ratio <= self.threshold {
            return Ok(());
        }

        let category = event.payload["category"].as_str().unwrap_or("unknown");
        tracing::warn!(category, ratio, "task took far longer than estimated");
        self.db.save_state(
            LEARNING_FLAG_KEY,
            &json!({
                "category": category,
                "ratio": ratio,
                "flagged_at": event.timestamp,
            }),
        )?;
        Ok(())
    }
}
