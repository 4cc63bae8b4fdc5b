//! Accountability session machine.
//!
//! Monitors one focus session at a time and fires scheduled check-in
//! prompts at a fixed interval. The machine is a singleton per process:
//! starting a second session while one is active is rejected, never an
//! implicit replacement.
//!
//! ## State transitions
//!
//! ```text
//! Idle -> Active -> (Paused | Completing) -> Idle
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::MachineError;
use crate::bus::{EventBus, EventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Active,
    Paused,
    Completing,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    Abandoned,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::Abandoned => "abandoned",
        }
    }
}

/// Confirmation returned by [`AccountabilityMachine::start_session`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionStarted {
    pub task: String,
    pub duration_minutes: u32,
    pub checkin_interval_minutes: u32,
    pub total_checkins: u32,
    pub message: String,
}

/// Confirmation returned by [`AccountabilityMachine::pause_session`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionPaused {
    pub task: String,
    pub reason: String,
    pub message: String,
}

/// Confirmation returned by [`AccountabilityMachine::end_session`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionEnded {
    pub outcome: SessionOutcome,
    pub task: String,
    pub checkins_completed: u32,
    pub message: String,
}

/// Pure status read.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AccountabilityStatus {
    Idle,
    InSession {
        state: SessionState,
        task: String,
        elapsed_minutes: u32,
        remaining_minutes: u32,
        checkins_completed: u32,
    },
}

struct Inner {
    state: SessionState,
    task: Option<String>,
    duration_min: u32,
    checkin_interval_min: u32,
    started_at: Option<DateTime<Utc>>,
    checkin_count: u32,
    schedule: Option<JoinHandle<()>>,
}

/// Deterministic accountability state machine.
///
/// Construct once at process start and share by reference.
pub struct AccountabilityMachine {
    bus: Arc<EventBus>,
    tick: Duration,
    inner: Arc<Mutex<Inner>>,
    state_tx: Arc<watch::Sender<SessionState>>,
}

impl AccountabilityMachine {
    /// Wall-clock length of one scheduled minute.
    pub const DEFAULT_TICK: Duration = Duration::from_secs(60);

    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_tick(bus, Self::DEFAULT_TICK)
    }

    /// Create a machine with a custom schedule granularity. Tests compress
    /// the tick to milliseconds.
    pub fn with_tick(bus: Arc<EventBus>, tick: Duration) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            bus,
            tick,
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Idle,
                task: None,
                duration_min: 0,
                checkin_interval_min: 0,
                started_at: None,
                checkin_count: 0,
                schedule: None,
            })),
            state_tx: Arc::new(state_tx),
        }
    }

    /// Start monitoring a focus session.
    ///
    /// Schedules `floor(duration / interval)` check-ins and publishes
    /// [`EventKind::FocusBlockStarted`].
    ///
    /// # Errors
    /// Rejected while a session is active, and for a zero duration or
    /// interval.
    pub async fn start_session(
        &self,
        task: &str,
        duration_minutes: u32,
        checkin_interval_minutes: u32,
    ) -> Result<SessionStarted, MachineError> {
        if duration_minutes == 0 {
            return Err(MachineError::Invalid("duration must be positive".into()));
        }
        if checkin_interval_minutes == 0 {
            return Err(MachineError::Invalid(
                "check-in interval must be positive".into(),
            ));
        }
        let total_checkins = duration_minutes / checkin_interval_minutes;

        {
            let mut inner = self.inner.lock().await;
            if inner.state == SessionState::Active {
                return Err(MachineError::AlreadyActive {
                    task: inner.task.clone().unwrap_or_default(),
                });
            }
            if let Some(stale) = inner.schedule.take() {
                stale.abort();
            }
            inner.state = SessionState::Active;
            inner.task = Some(task.to_string());
            inner.duration_min = duration_minutes;
            inner.checkin_interval_min = checkin_interval_minutes;
            inner.started_at = Some(Utc::now());
            inner.checkin_count = 0;
            self.state_tx.send_replace(SessionState::Active);

            inner.schedule = Some(tokio::spawn(run_schedule(
                Arc::clone(&self.inner),
                Arc::clone(&self.bus),
                Arc::clone(&self.state_tx),
                self.tick,
                checkin_interval_minutes,
                total_checkins,
            )));
        }

        tracing::info!(task, duration_minutes, "accountability session started");
        self.bus
            .publish(
                EventKind::FocusBlockStarted,
                json!({ "task": task, "duration": duration_minutes }),
            )
            .await;

        Ok(SessionStarted {
            task: task.to_string(),
            duration_minutes,
            checkin_interval_minutes,
            total_checkins,
            message: format!(
                "Got it! Monitoring '{task}' for {duration_minutes} minutes. \
                 I'll check in every {checkin_interval_minutes} minutes."
            ),
        })
    }

    /// Pause the active session, cancelling its pending check-ins.
    ///
    /// # Errors
    /// Rejected unless the machine is `Active`.
    pub async fn pause_session(&self, reason: &str) -> Result<SessionPaused, MachineError> {
        let task = {
            let mut inner = self.inner.lock().await;
            if inner.state != SessionState::Active {
                return Err(MachineError::NotActive);
            }
            inner.state = SessionState::Paused;
            self.state_tx.send_replace(SessionState::Paused);
            if let Some(schedule) = inner.schedule.take() {
                schedule.abort();
            }
            inner.task.clone().unwrap_or_default()
        };

        tracing::info!(%task, reason, "accountability session paused");
        Ok(SessionPaused {
            message: format!("Paused '{task}'. Start a new session when ready."),
            task,
            reason: reason.to_string(),
        })
    }

    /// End the session from any non-idle state, cancelling pending
    /// check-ins and publishing [`EventKind::FocusBlockEnded`].
    ///
    /// # Errors
    /// Rejected when the machine is already `Idle`.
    pub async fn end_session(&self, completed: bool) -> Result<SessionEnded, MachineError> {
        let (task, checkins_completed) = {
            let mut inner = self.inner.lock().await;
            if inner.state == SessionState::Idle {
                return Err(MachineError::NoSession);
            }
            if let Some(schedule) = inner.schedule.take() {
                schedule.abort();
            }
            let task = inner.task.take().unwrap_or_default();
            inner.state = SessionState::Idle;
            inner.started_at = None;
            self.state_tx.send_replace(SessionState::Idle);
            (task, inner.checkin_count)
        };

        let outcome = if completed {
            SessionOutcome::Completed
        } else {
            SessionOutcome::Abandoned
        };
        self.bus
            .publish(
                EventKind::FocusBlockEnded,
                json!({
                    "task": task,
                    "status": outcome.as_str(),
                    "checkins_completed": checkins_completed,
                }),
            )
            .await;

        Ok(SessionEnded {
            outcome,
            message: match outcome {
                SessionOutcome::Completed => format!("Nice work on '{task}'!"),
                SessionOutcome::Abandoned => "Session ended.".to_string(),
            },
            task,
            checkins_completed,
        })
    }

    /// Current status. Elapsed time is derived from the wall clock, scaled
    /// by the machine tick; remaining time floors at zero.
    pub async fn status(&self) -> AccountabilityStatus {
        let inner = self.inner.lock().await;
        if inner.state == SessionState::Idle {
            return AccountabilityStatus::Idle;
        }
        let elapsed_minutes = inner
            .started_at
            .map(|started| {
                let wall_ms = (Utc::now() - started).num_milliseconds().max(0) as u128;
                (wall_ms / self.tick.as_millis().max(1)) as u32
            })
            .unwrap_or(0);
        AccountabilityStatus::InSession {
            state: inner.state,
            task: inner.task.clone().unwrap_or_default(),
            elapsed_minutes,
            remaining_minutes: inner.duration_min.saturating_sub(elapsed_minutes),
            checkins_completed: inner.checkin_count,
        }
    }

    /// Wait until the machine returns to `Idle` (session completed or
    /// ended). Returns immediately when already idle.
    pub async fn wait_idle(&self) {
        let mut rx = self.state_tx.subscribe();
        while *rx.borrow_and_update() != SessionState::Idle {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Background check-in schedule.
///
/// Re-checks machine state before acting on every firing: once a pause or
/// end has been observed, no further check-ins fire even if a wait was
/// already in progress.
async fn run_schedule(
    inner: Arc<Mutex<Inner>>,
    bus: Arc<EventBus>,
    state_tx: Arc<watch::Sender<SessionState>>,
    tick: Duration,
    interval_min: u32,
    total_checkins: u32,
) {
    let wait = tick * interval_min;
    for _ in 0..total_checkins {
        tokio::time::sleep(wait).await;

        let (task, checkin_number) = {
            let mut inner = inner.lock().await;
            if inner.state != SessionState::Active {
                return;
            }
            inner.checkin_count += 1;
            (inner.task.clone().unwrap_or_default(), inner.checkin_count)
        };

        let prompt = checkin_prompt(&task, checkin_number, total_checkins, interval_min);
        bus.publish(
            EventKind::CheckinDue,
            json!({
                "task": task,
                "checkin_number": checkin_number,
                "total_checkins": total_checkins,
                "prompt": prompt,
            }),
        )
        .await;
    }

    // Every firing done: complete, unless someone ended the session while
    // the last publish was in flight.
    let (task, duration_min, checkins_completed) = {
        let mut inner = inner.lock().await;
        if inner.state != SessionState::Active {
            return;
        }
        inner.state = SessionState::Completing;
        state_tx.send_replace(SessionState::Completing);
        (
            inner.task.clone().unwrap_or_default(),
            inner.duration_min,
            inner.checkin_count,
        )
    };

    tracing::info!(%task, duration_min, "accountability session complete");
    bus.publish(
        EventKind::FocusBlockEnded,
        json!({
            "task": task,
            "duration": duration_min,
            "checkins_completed": checkins_completed,
            "status": "completed",
        }),
    )
    .await;

    let mut inner = inner.lock().await;
    inner.state = SessionState::Idle;
    inner.task = None;
    inner.started_at = None;
    inner.schedule = None;
    state_tx.send_replace(SessionState::Idle);
}

/// Rotating human-readable prompt, cycled by check-in count.
fn checkin_prompt(task: &str, checkin_number: u32, total_checkins: u32, interval_min: u32) -> String {
    match checkin_number % 3 {
        0 => format!("Check-in {checkin_number}/{total_checkins}: still on '{task}'?"),
        1 => format!(
            "{} minutes in. How's it going?",
            interval_min * checkin_number
        ),
        _ => format!("Checkpoint! Take a breath, then back to '{task}'."),
    }
}
