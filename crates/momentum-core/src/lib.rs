//! # Momentum Core Library
//!
//! Core engine for the Momentum productivity assistant: a thread-safe
//! persistent store, an in-process event bus, deterministic timer state
//! machines, and the calibration math that corrects optimistic time
//! estimates.
//!
//! The assistant's conversational layers sit on top of this crate and stay
//! out of it: nothing here calls a model or renders UI.
//!
//! ## Key Components
//!
//! - [`Database`]: SQLite store for user state, sessions, task history, and
//!   the plan cache. One serialized writer, pooled readers, WAL mode.
//! - [`EventBus`]: typed publish/subscribe decoupling machines and
//!   completion logging from adaptive-behavior subscribers.
//! - [`UserSnapshot`]: pure time-estimation calibration from energy,
//!   medication timing, and time of day.
//! - [`PlanCache`]: hash-keyed decomposition cache with keyword-overlap
//!   similarity search.
//! - [`AccountabilityMachine`] / [`GuardrailMachine`]: cancellable
//!   background schedules for check-ins and hyperfocus hard stops.
//! - [`SessionService`]: session CRUD with atomic state patches.
//!
//! Every service is an explicit object constructed once at process start
//! and shared by handle; there are no ambient globals.

pub mod bus;
pub mod cache;
pub mod calibration;
pub mod config;
pub mod error;
pub mod machines;
pub mod session;
pub mod storage;
pub mod tracker;

pub use bus::{BusEvent, EventBus, EventHandler, EventKind, HandlerResult};
pub use cache::{CacheLookup, PlanCache};
pub use calibration::{calibrate, Calibration, MultiplierSource, PeakWindowStatus, UserSnapshot};
pub use config::Config;
pub use error::{ConfigError, CoreError, DatabaseError, Result, ValidationError};
pub use machines::{
    AccountabilityMachine, AccountabilityStatus, GuardrailMachine, GuardrailStatus, MachineError,
    SessionOutcome, SessionState,
};
pub use session::{Session, SessionEvent, SessionService};
pub use storage::{DashboardStats, Database, SessionSummary, TaskHistoryRecord};
pub use tracker::{record_task_completion, DivergenceWatcher};
