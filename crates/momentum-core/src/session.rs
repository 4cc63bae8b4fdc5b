//! Conversation session service.
//!
//! CRUD over sessions and their event logs. Session state lives as a JSON
//! blob; concurrent state patches go through the store's atomic
//! read-modify-write so two callers can never lose each other's changes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::CoreError;
use crate::storage::{Database, SessionRow, SessionSummary};

/// A conversation session and its ordered event log.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub app_name: String,
    pub state: Map<String, Value>,
    pub events: Vec<SessionEvent>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// One persisted session event. Append-only, ordered by insertion.
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

/// Session CRUD over the store.
pub struct SessionService {
    db: Arc<Database>,
}

impl SessionService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a session, generating a fresh id when none is supplied.
    ///
    /// # Errors
    /// Returns an error if the storage medium is unavailable.
    pub fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<Map<String, Value>>,
        session_id: Option<String>,
    ) -> Result<Session, CoreError> {
        let id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let state = state.unwrap_or_default();
        let now = Utc::now();

        self.db.insert_session(&SessionRow {
            id: id.clone(),
            user_id: user_id.to_string(),
            app_name: app_name.to_string(),
            created_at: now,
            last_updated_at: now,
            state_json: Value::Object(state.clone()).to_string(),
        })?;

        Ok(Session {
            id,
            user_id: user_id.to_string(),
            app_name: app_name.to_string(),
            state,
            events: Vec::new(),
            created_at: now,
            last_updated_at: now,
        })
    }

    /// Fetch a session with its events. An unknown id is a normal `None`.
    ///
    /// A state blob or event payload that fails to decode degrades (empty
    /// state / skipped event) with a logged warning rather than failing the
    /// whole read.
    pub fn get_session(&self, id: &str) -> Result<Option<Session>, CoreError> {
        let Some(row) = self.db.session_row(id)? else {
            return Ok(None);
        };

        let state = match serde_json::from_str::<Value>(&row.state_json) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                tracing::warn!(id, "session state failed to decode, using empty state");
                Map::new()
            }
        };

        let mut events = Vec::new();
        for event_row in self.db.session_events(id)? {
            match serde_json::from_str(&event_row.data_json) {
                Ok(data) => events.push(SessionEvent {
                    event_type: event_row.event_type,
                    data,
                    timestamp: event_row.timestamp,
                }),
                Err(e) => {
                    tracing::warn!(id, event_id = event_row.id, error = %e, "session event failed to decode, skipping");
                }
            }
        }

        Ok(Some(Session {
            id: row.id,
            user_id: row.user_id,
            app_name: row.app_name,
            state,
            events,
            created_at: row.created_at,
            last_updated_at: row.last_updated_at,
        }))
    }

    /// Sessions for a user, newest first.
    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, CoreError> {
        Ok(self.db.list_sessions(user_id)?)
    }

    /// Delete a session and its events. Returns `false` for an unknown id.
    pub fn delete_session(&self, id: &str) -> Result<bool, CoreError> {
        Ok(self.db.delete_session(id)?)
    }

    /// Append an event and bump the session's last-update timestamp in one
    /// logical step. Returns `None` for an unknown session.
    ///
    /// # Errors
    /// Returns an error if the storage medium is unavailable.
    pub fn append_event(
        &self,
        session_id: &str,
        event_type: &str,
        data: Value,
    ) -> Result<Option<SessionEvent>, CoreError> {
        let timestamp = Utc::now();
        let appended = self.db.append_session_event(
            session_id,
            event_type,
            &data.to_string(),
            timestamp,
        )?;
        if !appended {
            return Ok(None);
        }
        Ok(Some(SessionEvent {
            event_type: event_type.to_string(),
            data,
            timestamp,
        }))
    }

    /// Merge `patch` into the session's state blob under the store's atomic
    /// read-modify-write. Returns `false` for an unknown session.
    ///
    /// This is the only supported way to patch session state: a naive
    /// read-then-write from two callers loses updates.
    pub fn update_session_state(
        &self,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<bool, CoreError> {
        let session_id = id.to_string();
        let written = self.db.atomic_update(
            "SELECT state_json FROM sessions WHERE id = ?1",
            [id],
            "UPDATE sessions SET state_json = ?1, last_updated_at = ?2 WHERE id = ?3",
            move |row| {
                let raw: String = row.get(0)?;
                let mut state = match serde_json::from_str::<Value>(&raw) {
                    Ok(Value::Object(map)) => map,
                    Ok(_) | Err(_) => {
                        tracing::warn!(id = %session_id, "session state failed to decode, patching empty state");
                        Map::new()
                    }
                };
                for (key, value) in patch {
                    state.insert(key, value);
                }
                Ok(vec![
                    SqlValue::Text(Value::Object(state).to_string()),
                    SqlValue::Text(Utc::now().to_rfc3339()),
                    SqlValue::Text(session_id.clone()),
                ])
            },
        )?;
        Ok(written.is_some())
    }
}
