//! SQLite-backed store for user state, sessions, task history, and the
//! plan cache.
//!
//! Concurrency discipline: every mutation goes through one writer connection
//! behind a mutex; reads run on a small pool of read-only connections. The
//! database runs in WAL mode, so readers proceed while a write is in flight.
//! Reader connections are a read-throughput optimization only -- they can
//! never bypass the writer serialization for a mutation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{data_dir, migrations};
use crate::error::{CoreError, DatabaseError};

/// Reader connections kept around after use.
const MAX_POOLED_READERS: usize = 4;

/// Milliseconds a connection waits on a locked database before giving up.
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Upper bound on a single task-history page.
const MAX_HISTORY_PAGE: u32 = 100;

/// One immutable task completion record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHistoryRecord {
    pub id: i64,
    pub category: String,
    pub estimated_minutes: u32,
    pub actual_minutes: u32,
    pub energy_level: u8,
    pub in_peak_window: bool,
    pub timestamp: DateTime<Utc>,
}

/// Raw row from the task_cache table. The plan payload stays serialized;
/// decoding is the cache layer's concern.
#[derive(Debug, Clone)]
pub struct CachedPlanRow {
    pub hash: String,
    pub task_description: String,
    pub plan_json: String,
    pub energy_level: u8,
    pub created_at: DateTime<Utc>,
}

/// Raw row from the sessions table.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub user_id: String,
    pub app_name: String,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub state_json: String,
}

/// Raw row from the events table, ordered by insertion.
#[derive(Debug, Clone)]
pub struct SessionEventRow {
    pub id: i64,
    pub event_type: String,
    pub data_json: String,
    pub timestamp: DateTime<Utc>,
}

/// Listing entry for the dashboard's recent-sessions projection.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// Aggregate stats projection consumed by the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub current_energy: u8,
    pub base_multiplier: f64,
    pub tasks_completed_today: u64,
}

/// The single durable source of truth.
///
/// Cheap to share: wrap in an `Arc` and hand clones to every consumer.
pub struct Database {
    path: PathBuf,
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
}

impl Database {
    /// Open the database at `~/.config/momentum/momentum.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("momentum.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open the database at an explicit path (tests use a temp dir).
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let writer = Self::new_conn(path, false)?;
        migrations::migrate(&writer)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
            readers: Mutex::new(Vec::new()),
        })
    }

    fn new_conn(path: &Path, read_only: bool) -> Result<Connection, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.pragma_update(None, "journal_mode", "wal")?;
        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
        if read_only {
            conn.pragma_update(None, "query_only", true)?;
        }
        Ok(conn)
    }

    /// Run a closure on the writer connection. All mutations funnel here.
    fn with_writer<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T, DatabaseError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut writer).map_err(Into::into)
    }

    /// Run a closure on a pooled read-only connection.
    fn with_reader<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, DatabaseError> {
        let pooled = {
            let mut pool = self.readers.lock().unwrap_or_else(PoisonError::into_inner);
            pool.pop()
        };
        let conn = match pooled {
            Some(conn) => conn,
            None => Self::new_conn(&self.path, true)?,
        };
        let result = f(&conn).map_err(Into::into);
        let mut pool = self.readers.lock().unwrap_or_else(PoisonError::into_inner);
        if pool.len() < MAX_POOLED_READERS {
            pool.push(conn);
        }
        result
    }

    // ── User state ───────────────────────────────────────────────────

    /// Upsert a JSON-serializable value under `key`, recording the write time.
    ///
    /// # Errors
    /// Returns an error only if the value cannot be serialized or the
    /// storage medium is unavailable.
    pub fn save_state<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CoreError> {
        let encoded = serde_json::to_string(value)?;
        self.with_writer(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO user_state (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, encoded, Utc::now()],
            )
        })?;
        Ok(())
    }

    /// Fetch and decode the value stored under `key`.
    ///
    /// A value that fails to decode is treated as absent: the field is
    /// typically reconstructible from defaults, so the corruption is logged
    /// rather than propagated.
    pub fn get_state<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DatabaseError> {
        let raw: Option<String> = self.with_reader(|conn| {
            conn.query_row(
                "SELECT value FROM user_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })?;
        match raw {
            Some(text) => match serde_json::from_str(&text) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    tracing::warn!(key, error = %e, "stored state failed to decode, treating as absent");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Like [`get_state`](Self::get_state) but with a fallback value.
    pub fn get_state_or<T: DeserializeOwned>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, DatabaseError> {
        Ok(self.get_state(key)?.unwrap_or(default))
    }

    // ── Task history ─────────────────────────────────────────────────

    /// Append one immutable completion record.
    ///
    /// A zero estimate is accepted here and excluded from multiplier math
    /// downstream.
    pub fn log_task_completion(
        &self,
        category: &str,
        estimated_minutes: u32,
        actual_minutes: u32,
        energy_level: u8,
        in_peak_window: bool,
    ) -> Result<(), DatabaseError> {
        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO task_history
                 (category, estimated_minutes, actual_minutes, energy_level, in_peak_window, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    category,
                    estimated_minutes,
                    actual_minutes,
                    energy_level,
                    in_peak_window,
                    Utc::now()
                ],
            )
        })?;
        Ok(())
    }

    /// Mean of actual/estimated over the most recent `limit` records for a
    /// category, restricted to records with a positive estimate.
    ///
    /// Returns `None` below 3 qualifying records -- a single noisy sample
    /// must not become a correction.
    pub fn category_multiplier(
        &self,
        category: &str,
        limit: u32,
    ) -> Result<Option<f64>, DatabaseError> {
        let ratios: Vec<f64> = self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT estimated_minutes, actual_minutes
                 FROM task_history
                 WHERE category = ?1 AND estimated_minutes > 0
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![category, limit], |row| {
                let estimated: f64 = row.get(0)?;
                let actual: f64 = row.get(1)?;
                Ok(actual / estimated)
            })?;
            rows.collect()
        })?;

        if ratios.len() < 3 {
            return Ok(None);
        }
        Ok(Some(ratios.iter().sum::<f64>() / ratios.len() as f64))
    }

    /// The most recent `limit` completion records, most recent first.
    pub fn recent_history(&self, limit: u32) -> Result<Vec<TaskHistoryRecord>, DatabaseError> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, category, estimated_minutes, actual_minutes, energy_level, in_peak_window, timestamp
                 FROM task_history
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], Self::history_record)?;
            rows.collect()
        })
    }

    /// Paginated task history for the dashboard, page size bounded.
    pub fn history_page(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<TaskHistoryRecord>, DatabaseError> {
        let limit = limit.min(MAX_HISTORY_PAGE);
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, category, estimated_minutes, actual_minutes, energy_level, in_peak_window, timestamp
                 FROM task_history
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt.query_map(params![limit, offset], Self::history_record)?;
            rows.collect()
        })
    }

    fn history_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskHistoryRecord> {
        Ok(TaskHistoryRecord {
            id: row.get(0)?,
            category: row.get(1)?,
            estimated_minutes: row.get(2)?,
            actual_minutes: row.get(3)?,
            energy_level: row.get(4)?,
            in_peak_window: row.get(5)?,
            timestamp: row.get(6)?,
        })
    }

    // ── Plan cache ───────────────────────────────────────────────────

    /// Upsert a cached decomposition plan keyed by content hash.
    pub fn cache_plan(
        &self,
        hash: &str,
        description: &str,
        plan_json: &str,
        energy_level: u8,
    ) -> Result<(), DatabaseError> {
        self.with_writer(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO task_cache
                 (hash, task_description, plan_json, energy_level, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![hash, description, plan_json, energy_level, Utc::now()],
            )
        })?;
        Ok(())
    }

    /// Exact cache lookup; a miss is a normal `None`, not an error.
    pub fn cached_plan(&self, hash: &str) -> Result<Option<CachedPlanRow>, DatabaseError> {
        self.with_reader(|conn| {
            conn.query_row(
                "SELECT hash, task_description, plan_json, energy_level, created_at
                 FROM task_cache WHERE hash = ?1",
                params![hash],
                |row| {
                    Ok(CachedPlanRow {
                        hash: row.get(0)?,
                        task_description: row.get(1)?,
                        plan_json: row.get(2)?,
                        energy_level: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Every cached description in insertion order.
    ///
    /// Full scan by design: the similarity search iterates all entries, and
    /// the volumes this system targets don't justify an index.
    pub fn all_cached_descriptions(&self) -> Result<Vec<String>, DatabaseError> {
        self.with_reader(|conn| {
            let mut stmt =
                conn.prepare("SELECT task_description FROM task_cache ORDER BY rowid ASC")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect()
        })
    }

    // ── Atomic update ────────────────────────────────────────────────

    /// Read-modify-write under the writer lock, in one transaction.
    ///
    /// `transform` maps the row returned by `read_sql` to the parameters for
    /// `write_sql`. Two concurrent state patches serialized through here
    /// cannot lose each other's changes.
    ///
    /// Returns `None` when the read finds no row (nothing written).
    pub fn atomic_update<P, F>(
        &self,
        read_sql: &str,
        read_params: P,
        write_sql: &str,
        transform: F,
    ) -> Result<Option<usize>, DatabaseError>
    where
        P: rusqlite::Params,
        F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<Vec<SqlValue>>,
    {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = writer.transaction()?;
        let written = match tx.query_row(read_sql, read_params, transform) {
            Ok(write_params) => {
                Some(tx.execute(write_sql, rusqlite::params_from_iter(write_params))?)
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };
        tx.commit()?;
        Ok(written)
    }

    // ── Sessions ─────────────────────────────────────────────────────

    /// Insert a new session row.
    pub fn insert_session(&self, row: &SessionRow) -> Result<(), DatabaseError> {
        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, app_name, created_at, last_updated_at, state_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    row.id,
                    row.user_id,
                    row.app_name,
                    row.created_at,
                    row.last_updated_at,
                    row.state_json
                ],
            )
        })?;
        Ok(())
    }

    /// Fetch a session row by id.
    pub fn session_row(&self, id: &str) -> Result<Option<SessionRow>, DatabaseError> {
        self.with_reader(|conn| {
            conn.query_row(
                "SELECT id, user_id, app_name, created_at, last_updated_at, state_json
                 FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok(SessionRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        app_name: row.get(2)?,
                        created_at: row.get(3)?,
                        last_updated_at: row.get(4)?,
                        state_json: row.get(5)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Events for a session in insertion order.
    pub fn session_events(&self, session_id: &str) -> Result<Vec<SessionEventRow>, DatabaseError> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, type, data_json, timestamp FROM events
                 WHERE session_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![session_id], |row| {
                Ok(SessionEventRow {
                    id: row.get(0)?,
                    event_type: row.get(1)?,
                    data_json: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Append an event and bump the session's last-update timestamp as one
    /// transaction. Returns `false` if the session doesn't exist.
    pub fn append_session_event(
        &self,
        session_id: &str,
        event_type: &str,
        data_json: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = writer.transaction()?;
        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM sessions WHERE id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(false);
        }
        tx.execute(
            "INSERT INTO events (session_id, type, data_json, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, event_type, data_json, timestamp],
        )?;
        tx.execute(
            "UPDATE sessions SET last_updated_at = ?1 WHERE id = ?2",
            params![Utc::now(), session_id],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Session ids and creation times for a user, newest first.
    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, DatabaseError> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, created_at, last_updated_at FROM sessions
                 WHERE user_id = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map(params![user_id], Self::session_summary)?;
            rows.collect()
        })
    }

    /// Delete a session and its events. Returns `false` if nothing existed.
    pub fn delete_session(&self, id: &str) -> Result<bool, DatabaseError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = writer.transaction()?;
        tx.execute("DELETE FROM events WHERE session_id = ?1", params![id])?;
        let deleted = tx.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    fn session_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionSummary> {
        Ok(SessionSummary {
            id: row.get(0)?,
            created_at: row.get(1)?,
            last_active: row.get(2)?,
        })
    }

    // ── Dashboard projections ────────────────────────────────────────

    /// Aggregate stats: current energy, base multiplier, tasks completed
    /// today. Pure read projection; missing state falls back to defaults.
    pub fn dashboard_stats(&self) -> Result<DashboardStats, DatabaseError> {
        let current_energy = self.get_state_or("energy_level", 5u8)?;
        let base_multiplier = self.get_state_or("base_multiplier", 1.5f64)?;

        let today_start = format!("{}T00:00:00+00:00", Utc::now().format("%Y-%m-%d"));
        let tasks_completed_today: u64 = self.with_reader(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM task_history WHERE timestamp >= ?1",
                params![today_start],
                |row| row.get(0),
            )
        })?;

        Ok(DashboardStats {
            current_energy,
            base_multiplier,
            tasks_completed_today,
        })
    }

    /// The most recently active sessions, for the dashboard listing.
    pub fn recent_sessions(&self, limit: u32) -> Result<Vec<SessionSummary>, DatabaseError> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, created_at, last_updated_at FROM sessions
                 ORDER BY last_updated_at DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], Self::session_summary)?;
            rows.collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn save_and_get_state_round_trips() {
        let (_dir, db) = temp_db();
        db.save_state("name", &"Alice").unwrap();
        assert_eq!(db.get_state::<String>("name").unwrap().unwrap(), "Alice");

        db.save_state("energy", &7).unwrap();
        assert_eq!(db.get_state::<i64>("energy").unwrap().unwrap(), 7);
    }

    #[test]
    fn get_missing_key_returns_none() {
        let (_dir, db) = temp_db();
        assert!(db.get_state::<String>("missing").unwrap().is_none());
        assert_eq!(db.get_state_or("missing", 42).unwrap(), 42);
    }

    #[test]
    fn overwrite_keeps_last_write() {
        let (_dir, db) = temp_db();
        db.save_state("key", &"old").unwrap();
        db.save_state("key", &"new").unwrap();
        assert_eq!(db.get_state::<String>("key").unwrap().unwrap(), "new");
    }

    #[test]
    fn malformed_state_degrades_to_absent() {
        let (_dir, db) = temp_db();
        // Bypass save_state to plant a value that is not valid JSON.
        db.with_writer(|conn| {
            conn.execute(
                "INSERT INTO user_state (key, value, updated_at) VALUES ('bad', '{not json', ?1)",
                params![Utc::now()],
            )
        })
        .unwrap();
        assert!(db.get_state::<serde_json::Value>("bad").unwrap().is_none());
    }

    #[test]
    fn multiplier_needs_minimum_samples() {
        let (_dir, db) = temp_db();
        assert!(db.category_multiplier("coding", 20).unwrap().is_none());
        db.log_task_completion("coding", 30, 45, 7, true).unwrap();
        assert!(db.category_multiplier("coding", 20).unwrap().is_none());
        db.log_task_completion("coding", 20, 25, 5, false).unwrap();
        assert!(db.category_multiplier("coding", 20).unwrap().is_none());
        db.log_task_completion("coding", 15, 22, 6, true).unwrap();

        let mult = db.category_multiplier("coding", 20).unwrap().unwrap();
        let expected = (45.0 / 30.0 + 25.0 / 20.0 + 22.0 / 15.0) / 3.0;
        assert!((mult - expected).abs() < 0.01);
    }

    #[test]
    fn zero_estimates_are_stored_but_excluded() {
        let (_dir, db) = temp_db();
        for _ in 0..5 {
            db.log_task_completion("admin", 0, 10, 5, false).unwrap();
        }
        assert!(db.category_multiplier("admin", 20).unwrap().is_none());
        assert_eq!(db.recent_history(10).unwrap().len(), 5);
    }

    #[test]
    fn recent_history_is_most_recent_first() {
        let (_dir, db) = temp_db();
        db.log_task_completion("coding", 30, 45, 7, true).unwrap();
        db.log_task_completion("admin", 10, 15, 5, false).unwrap();

        let history = db.recent_history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].category, "admin");
        assert_eq!(history[1].category, "coding");
    }

    #[test]
    fn recent_history_respects_limit() {
        let (_dir, db) = temp_db();
        for i in 0..5 {
            db.log_task_completion(&format!("task_{i}"), 10, 15, 5, false)
                .unwrap();
        }
        assert_eq!(db.recent_history(3).unwrap().len(), 3);
    }

    #[test]
    fn plan_cache_round_trip_and_miss() {
        let (_dir, db) = temp_db();
        db.cache_plan("abc123", "test task", r#"{"steps":[]}"#, 5)
            .unwrap();
        let row = db.cached_plan("abc123").unwrap().unwrap();
        assert_eq!(row.task_description, "test task");
        assert_eq!(row.energy_level, 5);
        assert!(db.cached_plan("nonexistent").unwrap().is_none());
    }

    #[test]
    fn cached_descriptions_keep_insertion_order() {
        let (_dir, db) = temp_db();
        db.cache_plan("h1", "write unit tests", "{}", 5).unwrap();
        db.cache_plan("h2", "fix database bug", "{}", 5).unwrap();
        assert_eq!(
            db.all_cached_descriptions().unwrap(),
            vec!["write unit tests", "fix database bug"]
        );
    }

    #[test]
    fn atomic_update_read_modify_write() {
        let (_dir, db) = temp_db();
        let now = Utc::now();
        db.insert_session(&SessionRow {
            id: "sess1".into(),
            user_id: "user1".into(),
            app_name: "app".into(),
            created_at: now,
            last_updated_at: now,
            state_json: r#"{"count":0}"#.into(),
        })
        .unwrap();

        let written = db
            .atomic_update(
                "SELECT state_json FROM sessions WHERE id = ?1",
                params!["sess1"],
                "UPDATE sessions SET state_json = ?1 WHERE id = ?2",
                |row| {
                    let state: String = row.get(0)?;
                    let mut value: serde_json::Value = serde_json::from_str(&state)
                        .unwrap_or_else(|_| json!({}));
                    let count = value["count"].as_i64().unwrap_or(0);
                    value["count"] = json!(count + 1);
                    Ok(vec![
                        SqlValue::Text(value.to_string()),
                        SqlValue::Text("sess1".into()),
                    ])
                },
            )
            .unwrap();
        assert_eq!(written, Some(1));

        let row = db.session_row("sess1").unwrap().unwrap();
        let state: serde_json::Value = serde_json::from_str(&row.state_json).unwrap();
        assert_eq!(state["count"], 1);
    }

    #[test]
    fn atomic_update_missing_row_is_noop() {
        let (_dir, db) = temp_db();
        let written = db
            .atomic_update(
                "SELECT state_json FROM sessions WHERE id = ?1",
                params!["nonexistent"],
                "UPDATE sessions SET state_json = ?1 WHERE id = ?2",
                |_row| Ok(vec![SqlValue::Text("x".into())]),
            )
            .unwrap();
        assert_eq!(written, None);
    }

    #[test]
    fn append_event_bumps_session_and_missing_session_is_false() {
        let (_dir, db) = temp_db();
        let now = Utc::now();
        db.insert_session(&SessionRow {
            id: "s1".into(),
            user_id: "u".into(),
            app_name: "a".into(),
            created_at: now,
            last_updated_at: now,
            state_json: "{}".into(),
        })
        .unwrap();

        assert!(db
            .append_session_event("s1", "note", r#"{"text":"hi"}"#, Utc::now())
            .unwrap());
        assert!(!db
            .append_session_event("ghost", "note", "{}", Utc::now())
            .unwrap());

        let events = db.session_events("s1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "note");
    }

    #[test]
    fn delete_session_cascades_events() {
        let (_dir, db) = temp_db();
        let now = Utc::now();
        db.insert_session(&SessionRow {
            id: "s1".into(),
            user_id: "u".into(),
            app_name: "a".into(),
            created_at: now,
            last_updated_at: now,
            state_json: "{}".into(),
        })
        .unwrap();
        db.append_session_event("s1", "note", "{}", now).unwrap();

        assert!(db.delete_session("s1").unwrap());
        assert!(db.session_row("s1").unwrap().is_none());
        assert!(db.session_events("s1").unwrap().is_empty());
        assert!(!db.delete_session("s1").unwrap());
    }

    #[test]
    fn dashboard_stats_uses_defaults_and_counts_today() {
        let (_dir, db) = temp_db();
        let stats = db.dashboard_stats().unwrap();
        assert_eq!(stats.current_energy, 5);
        assert!((stats.base_multiplier - 1.5).abs() < f64::EPSILON);
        assert_eq!(stats.tasks_completed_today, 0);

        db.save_state("energy_level", &8).unwrap();
        db.log_task_completion("coding", 30, 40, 8, true).unwrap();
        let stats = db.dashboard_stats().unwrap();
        assert_eq!(stats.current_energy, 8);
        assert_eq!(stats.tasks_completed_today, 1);
    }
}
