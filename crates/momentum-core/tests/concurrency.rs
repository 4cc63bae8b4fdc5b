//! Concurrency behavior of the store: parallel writers through the
//! serialized writer region, and lost-update prevention via atomic updates.

use std::sync::Arc;
use std::thread;

use momentum_core::session::SessionService;
use momentum_core::storage::Database;
use serde_json::{json, Map, Value};

const WRITER_THREADS: usize = 4;
const WRITES_PER_THREAD: usize = 20;

fn temp_db() -> (tempfile::TempDir, Arc<Database>) {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open_at(&dir.path().join("test.db")).unwrap());
    (dir, db)
}

#[test]
fn concurrent_writers_do_not_corrupt() {
    let (_dir, db) = temp_db();

    let handles: Vec<_> = (0..WRITER_THREADS)
        .map(|thread_id| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..WRITES_PER_THREAD {
                    db.save_state(&format!("thread_{thread_id}_key_{i}"), &i)
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Every write from every thread must be readable afterward.
    for thread_id in 0..WRITER_THREADS {
        for i in 0..WRITES_PER_THREAD {
            let value: usize = db
                .get_state(&format!("thread_{thread_id}_key_{i}"))
                .unwrap()
                .unwrap();
            assert_eq!(value, i);
        }
    }
}

#[test]
fn concurrent_reads_during_writes() {
    let (_dir, db) = temp_db();
    db.save_state("shared", &0).unwrap();

    let writer = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            for i in 1..=50 {
                db.save_state("shared", &i).unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for _ in 0..50 {
                    // Readers always observe some committed value.
                    let value: i64 = db.get_state("shared").unwrap().unwrap();
                    assert!((0..=50).contains(&value));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    let final_value: i64 = db.get_state("shared").unwrap().unwrap();
    assert_eq!(final_value, 50);
}

#[test]
fn atomic_updates_do_not_lose_increments() {
    let (_dir, db) = temp_db();
    let service = Arc::new(SessionService::new(Arc::clone(&db)));

    let mut initial = Map::new();
    initial.insert("count".to_string(), json!(0));
    service
        .create_session("app", "user", Some(initial), Some("counter".into()))
        .unwrap();

    let increments_per_thread = 25;
    let handles: Vec<_> = (0..WRITER_THREADS)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for _ in 0..increments_per_thread {
                    let written = db
                        .atomic_update(
                            "SELECT state_json FROM sessions WHERE id = ?1",
                            ["counter"],
                            "UPDATE sessions SET state_json = ?1 WHERE id = ?2",
                            |row| {
                                let raw: String = row.get(0)?;
                                let mut state: Value =
                                    serde_json::from_str(&raw).unwrap_or_else(|_| json!({}));
                                let count = state["count"].as_i64().unwrap_or(0);
                                state["count"] = json!(count + 1);
                                Ok(vec![
                                    rusqlite::types::Value::Text(state.to_string()),
                                    rusqlite::types::Value::Text("counter".into()),
                                ])
                            },
                        )
                        .unwrap();
                    assert_eq!(written, Some(1));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let session = service.get_session("counter").unwrap().unwrap();
    assert_eq!(
        session.state["count"],
        json!((WRITER_THREADS * increments_per_thread) as i64)
    );
}

#[test]
fn concurrent_session_state_patches_both_land() {
    let (_dir, db) = temp_db();
    let service = Arc::new(SessionService::new(db));
    service
        .create_session("app", "user", None, Some("s".into()))
        .unwrap();

    let handles: Vec<_> = (0..WRITER_THREADS)
        .map(|thread_id| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let mut patch = Map::new();
                patch.insert(format!("field_{thread_id}"), json!(thread_id));
                assert!(service.update_session_state("s", patch).unwrap());
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let session = service.get_session("s").unwrap().unwrap();
    for thread_id in 0..WRITER_THREADS {
        assert_eq!(session.state[&format!("field_{thread_id}")], json!(thread_id));
    }
}
