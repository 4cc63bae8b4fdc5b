//! Deterministic timer state machines.
//!
//! No model calls, no heuristics -- just predictable, low-latency schedules.
//! Two machines share one design: state behind a lock, a spawned background
//! schedule held as an abortable handle, and a state re-check before every
//! firing so a cancelled schedule can never act after cancellation.
//!
//! Schedules run on a configurable tick: one scheduled "minute" equals one
//! tick of wall-clock time (60 seconds by default). Tests compress the tick
//! to milliseconds instead of faking the clock.
//!
//! In-flight sessions are volatile by design: a process restart loses them.

mod accountability;
mod guardrail;

pub use accountability::{
    AccountabilityMachine, AccountabilityStatus, SessionEnded, SessionOutcome, SessionPaused,
    SessionStarted, SessionState,
};
pub use guardrail::{GuardrailCleared, GuardrailMachine, GuardrailSet, GuardrailStatus};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// A rejected transition. Always a structured result the caller can branch
/// on, never a panic.
#[derive(Error, Debug)]
pub enum MachineError {
    /// A session is already being monitored.
    #[error("already monitoring '{task}'")]
    AlreadyActive { task: String },

    /// Pause requested without an active session.
    #[error("no active session to pause")]
    NotActive,

    /// End requested while idle.
    #[error("no session in progress")]
    NoSession,

    /// A hard stop is already armed.
    #[error("hard stop already armed for {stop_time}")]
    AlreadyArmed { stop_time: DateTime<Utc> },

    /// Arguments that cannot form a schedule.
    #[error("{0}")]
    Invalid(String),
}
