//! Hyperfocus guardrail machine.
//!
//! Arms a hard stop at an absolute wall-clock deadline and escalates
//! warnings as it approaches: 30 minutes out, 10 minutes out, 5 minutes
//! out, and the stop itself. Warnings whose offset lands at or before
//! "now" for a short total duration are skipped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::MachineError;
use crate::bus::{EventBus, EventKind};

/// Confirmation returned by [`GuardrailMachine::set_hard_stop`].
#[derive(Debug, Clone, Serialize)]
pub struct GuardrailSet {
    pub hard_stop: DateTime<Utc>,
    pub reason: String,
    pub message: String,
}

/// Confirmation returned by [`GuardrailMachine::clear_guardrail`].
#[derive(Debug, Clone, Serialize)]
pub struct GuardrailCleared {
    pub was_armed: bool,
    pub message: String,
}

/// Pure status read.
#[derive(Debug, Clone, Serialize)]
pub struct GuardrailStatus {
    pub armed: bool,
    pub hard_stop: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

struct Inner {
    hard_stop: Option<DateTime<Utc>>,
    reason: Option<String>,
    warnings: Option<JoinHandle<()>>,
}

/// Deterministic hyperfocus guardrail.
///
/// Tracks only "armed" and "cleared". Construct once at process start and
/// share by reference.
pub struct GuardrailMachine {
    bus: Arc<EventBus>,
    tick: Duration,
    inner: Arc<Mutex<Inner>>,
    armed_tx: Arc<watch::Sender<bool>>,
}

impl GuardrailMachine {
    /// Wall-clock length of one scheduled minute.
    pub const DEFAULT_TICK: Duration = Duration::from_secs(60);

    /// Warning offsets in minutes before the stop, paired with their
    /// escalating messages. The final entry is the stop itself.
    const WARNINGS: [(u32, &'static str); 4] = [
        (30, "30 minutes until hard stop"),
        (10, "10 minutes until hard stop!"),
        (5, "5 minutes! Start wrapping up now."),
        (0, "Hard stop. Save your work and step away."),
    ];

    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_tick(bus, Self::DEFAULT_TICK)
    }

    /// Create a machine with a custom schedule granularity. Tests compress
    /// the tick to milliseconds.
    pub fn with_tick(bus: Arc<EventBus>, tick: Duration) -> Self {
        let (armed_tx, _) = watch::channel(false);
        Self {
            bus,
            tick,
            inner: Arc::new(Mutex::new(Inner {
                hard_stop: None,
                reason: None,
                warnings: None,
            })),
            armed_tx: Arc::new(armed_tx),
        }
    }

    /// Arm a hard stop `minutes` from now.
    ///
    /// Publishes [`EventKind::FocusBlockStarted`] and starts the warning
    /// schedule. Returns the computed stop time.
    ///
    /// # Errors
    /// Rejected while a hard stop is already armed (clear it first), and
    /// for a zero duration.
    pub async fn set_hard_stop(
        &self,
        minutes: u32,
        reason: &str,
    ) -> Result<GuardrailSet, MachineError> {
        if minutes == 0 {
            return Err(MachineError::Invalid("duration must be positive".into()));
        }

        let stop_time = {
            let mut inner = self.inner.lock().await;
            if let Some(stop_time) = inner.hard_stop {
                return Err(MachineError::AlreadyArmed { stop_time });
            }
            let stop_time = Utc::now()
                + chrono::Duration::milliseconds((self.tick.as_millis() as i64) * i64::from(minutes));
            inner.hard_stop = Some(stop_time);
            inner.reason = Some(reason.to_string());
            self.armed_tx.send_replace(true);

            inner.warnings = Some(tokio::spawn(run_warnings(
                Arc::clone(&self.inner),
                Arc::clone(&self.bus),
                Arc::clone(&self.armed_tx),
                self.tick,
                minutes,
                reason.to_string(),
            )));
            stop_time
        };

        tracing::info!(minutes, reason, "hard stop armed");
        self.bus
            .publish(
                EventKind::FocusBlockStarted,
                json!({
                    "hard_stop": stop_time,
                    "reason": reason,
                    "guardrail": true,
                }),
            )
            .await;

        Ok(GuardrailSet {
            hard_stop: stop_time,
            reason: reason.to_string(),
            message: format!(
                "Hard stop set for {} ({reason}). I'll warn you at 30, 10, and 5 minutes.",
                stop_time.format("%H:%M")
            ),
        })
    }

    /// Disarm the guardrail, cancelling pending warnings.
    ///
    /// Idempotent: clearing with nothing armed is not an error.
    pub async fn clear_guardrail(&self) -> GuardrailCleared {
        let was_armed = {
            let mut inner = self.inner.lock().await;
            if let Some(warnings) = inner.warnings.take() {
                warnings.abort();
            }
            inner.reason = None;
            inner.hard_stop.take().is_some()
        };
        self.armed_tx.send_replace(false);

        if was_armed {
            tracing::info!("guardrail cleared");
        }
        GuardrailCleared {
            was_armed,
            message: "Guardrail cleared.".to_string(),
        }
    }

    /// Current status.
    pub async fn status(&self) -> GuardrailStatus {
        let inner = self.inner.lock().await;
        GuardrailStatus {
            armed: inner.hard_stop.is_some(),
            hard_stop: inner.hard_stop,
            reason: inner.reason.clone(),
        }
    }

    /// Wait until the guardrail is cleared (hard stop reached or
    /// explicitly disarmed). Returns immediately when not armed.
    pub async fn wait_clear(&self) {
        let mut rx = self.armed_tx.subscribe();
        while *rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Warning schedule: strictly time-ordered, each firing re-checks that the
/// guardrail is still armed before acting.
async fn run_warnings(
    inner: Arc<Mutex<Inner>>,
    bus: Arc<EventBus>,
    armed_tx: Arc<watch::Sender<bool>>,
    tick: Duration,
    total_minutes: u32,
    reason: String,
) {
    let mut elapsed: u32 = 0;
    for (offset, message) in GuardrailMachine::WARNINGS {
        let Some(at) = total_minutes.checked_sub(offset).filter(|at| *at > 0) else {
            continue;
        };
        tokio::time::sleep(tick * (at - elapsed)).await;
        elapsed = at;

        {
            let inner = inner.lock().await;
            if inner.hard_stop.is_none() {
                return;
            }
        }

        tracing::warn!(%reason, "{message}");
        if offset == 0 {
            // The stop itself: disarm and notify.
            bus.publish(
                EventKind::FocusBlockEnded,
                json!({
                    "status": "hard_stop",
                    "reason": reason,
                    "message": message,
                }),
            )
            .await;
            let mut inner = inner.lock().await;
            inner.hard_stop = None;
            inner.reason = None;
            inner.warnings = None;
            armed_tx.send_replace(false);
        }
    }
}
