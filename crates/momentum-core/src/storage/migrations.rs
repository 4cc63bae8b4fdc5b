//! Database schema migrations for momentum.
//!
//! Migrations are versioned and applied automatically when opening the
//! database. The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Apply all pending migrations to bring the database to the current schema
/// version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist.
fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or(0)
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: initial schema.
///
/// Key-value user state, conversation sessions with their event logs,
/// append-only task history, and the decomposition plan cache.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_state (
            key        TEXT PRIMARY KEY,
            value      TEXT,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            app_name        TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            last_updated_at TEXT NOT NULL,
            state_json      TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS events (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            type       TEXT NOT NULL,
            data_json  TEXT NOT NULL,
            timestamp  TEXT NOT NULL,
            FOREIGN KEY(session_id) REFERENCES sessions(id)
        );

        CREATE TABLE IF NOT EXISTS task_history (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            category          TEXT NOT NULL,
            estimated_minutes INTEGER NOT NULL,
            actual_minutes    INTEGER NOT NULL,
            energy_level      INTEGER NOT NULL,
            in_peak_window    INTEGER NOT NULL,
            timestamp         TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS task_cache (
            hash             TEXT PRIMARY KEY,
            task_description TEXT NOT NULL,
            plan_json        TEXT NOT NULL,
            energy_level     INTEGER NOT NULL,
            created_at       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_events_session_id ON events(session_id);
        CREATE INDEX IF NOT EXISTS idx_task_history_category ON task_history(category);
        CREATE INDEX IF NOT EXISTS idx_task_history_timestamp ON task_history(timestamp);
        CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);",
    )?;
    set_schema_version(conn, 1)?;
    Ok(())
}
