//! In-process asynchronous publish/subscribe with typed event kinds.
//!
//! Producers (timer machines, completion logging) and consumers
//! (adaptive-behavior subscribers, UI notifiers) are decoupled through the
//! bus without knowing each other's identity. Published events are also kept
//! in a bounded recent-events buffer for context queries.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Typed events flowing through the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskStarted,
    TaskCompleted,
    FocusBlockStarted,
    FocusBlockEnded,
    CheckinDue,
    EnergyUpdated,
    PatternDetected,
    SessionSummarized,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskStarted => "task_started",
            EventKind::TaskCompleted => "task_completed",
            EventKind::FocusBlockStarted => "focus_block_started",
            EventKind::FocusBlockEnded => "focus_block_ended",
            EventKind::CheckinDue => "checkin_due",
            EventKind::EnergyUpdated => "energy_updated",
            EventKind::PatternDetected => "pattern_detected",
            EventKind::SessionSummarized => "session_summarized",
        }
    }
}

/// A published event. Transient: retained only in the bounded recent-events
/// buffer after dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct BusEvent {
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one handler invocation; a failure is isolated at the bus
/// boundary and never aborts sibling handlers.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A subscriber. Handlers are registered by identity (the `Arc` pointer), so
/// subscribing the same handler twice for a kind is a no-op.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &BusEvent) -> HandlerResult;
}

/// Async event bus for decoupled component communication.
///
/// Handlers for a single publish run in registration order, each awaited in
/// turn. No cross-event ordering is guaranteed between concurrent publishes.
pub struct EventBus {
    subscribers: RwLock<HashMap<EventKind, Vec<Arc<dyn EventHandler>>>>,
    recent: RwLock<VecDeque<BusEvent>>,
    capacity: usize,
}

impl EventBus {
    /// Default capacity of the recent-events buffer.
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            recent: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Register a handler for an event kind.
    ///
    /// Idempotent: registering the same handler twice keeps one entry.
    pub async fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        let mut subscribers = self.subscribers.write().await;
        let entries = subscribers.entry(kind).or_default();
        if !entries.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            entries.push(handler);
        }
    }

    /// Remove a handler from an event kind. Removing a handler that was
    /// never registered is a no-op.
    pub async fn unsubscribe(&self, kind: EventKind, handler: &Arc<dyn EventHandler>) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(entries) = subscribers.get_mut(&kind) {
            entries.retain(|h| !Arc::ptr_eq(h, handler));
        }
    }

    /// Remove every handler for an event kind.
    pub async fn unsubscribe_all(&self, kind: EventKind) {
        self.subscribers.write().await.remove(&kind);
    }

    /// Publish an event: record it in the bounded buffer, then invoke every
    /// registered handler in registration order.
    ///
    /// A handler failure is logged and swallowed here so the remaining
    /// handlers for this publish still run.
    pub async fn publish(&self, kind: EventKind, payload: serde_json::Value) {
        let event = BusEvent {
            kind,
            payload,
            timestamp: Utc::now(),
        };

        {
            let mut recent = self.recent.write().await;
            if recent.len() == self.capacity {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }

        tracing::debug!(kind = kind.as_str(), "event published");

        // Snapshot under the read lock so handlers may themselves
        // subscribe/unsubscribe without deadlocking.
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let subscribers = self.subscribers.read().await;
            subscribers.get(&kind).cloned().unwrap_or_default()
        };

        for handler in handlers {
            if let Err(e) = handler.handle(&event).await {
                tracing::warn!(kind = kind.as_str(), error = %e, "event handler failed");
            }
        }
    }

    /// The last `count` published events, oldest first.
    pub async fn recent_events(&self, count: usize) -> Vec<BusEvent> {
        let recent = self.recent.read().await;
        let skip = recent.len().saturating_sub(count);
        recent.iter().skip(skip).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
