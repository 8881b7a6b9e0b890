//! The append-only event journal. SQLite-backed, hash-chained, with
//! idempotent append via a dedupe key. This is the one place in the crate
//! allowed to open a write transaction against `events.sqlite3`.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use uuid::Uuid;

use crate::events::{compute_event_hash, Event, EventType, GENESIS_PREV_HASH};

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(
        "dedupe key {dedupe_key:?} already used by event {existing_event_id} with a different payload"
    )]
    DedupeConflict {
        dedupe_key: String,
        existing_event_id: String,
    },
    #[error("unknown event type {0:?} stored in journal")]
    UnknownEventType(String),
}

pub struct AppendRequest {
    pub event_type: EventType,
    pub ts: chrono::DateTime<chrono::Utc>,
    pub observed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub source: Option<String>,
    pub trace_id: Option<String>,
    pub schema_version: String,
    pub dedupe_key: Option<String>,
    pub payload: serde_json::Value,
}

impl AppendRequest {
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        AppendRequest {
            event_type,
            ts: crate::time::utc_now(),
            observed_at: None,
            source: None,
            trace_id: None,
            schema_version: "1".to_string(),
            dedupe_key: None,
            payload,
        }
    }

    pub fn with_dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

#[derive(Clone)]
pub struct Journal {
    conn: Arc<Mutex<Connection>>,
}

impl Journal {
    pub fn open(path: &Path) -> Result<Self, JournalError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Journal {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, JournalError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Journal {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), JournalError> {
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=5000;
            PRAGMA foreign_keys=ON;
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                type TEXT NOT NULL,
                ts TEXT NOT NULL,
                observed_at TEXT,
                source TEXT,
                trace_id TEXT,
                schema_version TEXT NOT NULL,
                dedupe_key TEXT,
                payload TEXT NOT NULL,
                prev_hash TEXT NOT NULL,
                hash TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_events_dedupe_key
                ON events(dedupe_key) WHERE dedupe_key IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_events_type ON events(type);
            CREATE INDEX IF NOT EXISTS idx_events_source ON events(source);
            CREATE INDEX IF NOT EXISTS idx_events_ts ON events(ts);
            ",
        )?;
        crate::store::init_side_tables(conn).map_err(JournalError::Sqlite)?;
        Ok(())
    }

    /// Gives bookkeeping side-tables (positions, orders, karma, learning
    /// weights, ...) access to the same single-writer connection the event
    /// log uses. These tables are projections/bookkeeping, never the source
    /// of truth — but they still go through the one mutex every event
    /// append goes through, matching the single-logical-writer invariant.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T, JournalError>) -> Result<T, JournalError> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// True when another holder currently has the write lock. `parking_lot`
    /// mutexes are not re-entrant-checkable from the same thread, so this
    /// is a best-effort `try_lock` probe, matching the spec's ask for "a
    /// probe returning true when another holder currently has a write
    /// lock" rather than a strict proof.
    pub fn is_write_locked_by_other(&self) -> bool {
        self.conn.try_lock().is_none()
    }

    pub fn replay_by_source(&self, source: &str) -> Result<Vec<Event>, JournalError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM events WHERE source = ?1 ORDER BY seq ASC")?;
        let ids: Vec<String> = stmt
            .query_map(params![source], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        ids.iter().map(|id| row_to_event(&conn, id)).collect()
    }

    pub fn replay_by_time_range(
        &self,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Event>, JournalError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM events WHERE ts >= ?1 AND ts <= ?2 ORDER BY seq ASC")?;
        let ids: Vec<String> = stmt
            .query_map(params![start.to_rfc3339(), end.to_rfc3339()], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        ids.iter().map(|id| row_to_event(&conn, id)).collect()
    }

    pub fn replay_by_id_range(&self, ids: &[String]) -> Result<Vec<Event>, JournalError> {
        let conn = self.conn.lock();
        ids.iter().map(|id| row_to_event(&conn, id)).collect()
    }

    /// Appends a single event atomically. `prev_hash` is re-read inside the
    /// write transaction, never cached by the caller — two concurrent
    /// appends always chain correctly regardless of interleaving.
    pub fn append(&self, req: AppendRequest) -> Result<Event, JournalError> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;

        if let Some(dedupe_key) = &req.dedupe_key {
            let existing: Option<(String, String)> = tx
                .query_row(
                    "SELECT id, payload FROM events WHERE dedupe_key = ?1",
                    params![dedupe_key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            if let Some((existing_id, existing_payload)) = existing {
                let existing_value: serde_json::Value = serde_json::from_str(&existing_payload)?;
                if existing_value == req.payload {
                    return row_to_event(&tx, &existing_id);
                }
                return Err(JournalError::DedupeConflict {
                    dedupe_key: dedupe_key.clone(),
                    existing_event_id: existing_id,
                });
            }
        }

        let prev_hash: Option<String> = tx
            .query_row("SELECT hash FROM events ORDER BY seq DESC LIMIT 1", [], |row| row.get(0))
            .optional()?;
        let prev_hash_str = prev_hash.clone().unwrap_or_else(|| GENESIS_PREV_HASH.to_string());
        let hash = compute_event_hash(Some(&prev_hash_str), req.event_type, &req.payload);
        let id = Uuid::new_v4().to_string();
        let payload_str = serde_json::to_string(&req.payload)?;

        tx.execute(
            "INSERT INTO events (id, type, ts, observed_at, source, trace_id, schema_version, dedupe_key, payload, prev_hash, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                req.event_type.as_str(),
                req.ts.to_rfc3339(),
                req.observed_at.map(|t| t.to_rfc3339()),
                req.source,
                req.trace_id,
                req.schema_version,
                req.dedupe_key,
                payload_str,
                prev_hash,
                hash,
            ],
        )?;
        tx.commit()?;

        Ok(Event {
            id,
            event_type: req.event_type,
            ts: req.ts,
            observed_at: req.observed_at,
            source: req.source,
            trace_id: req.trace_id,
            schema_version: req.schema_version,
            dedupe_key: req.dedupe_key,
            payload: req.payload,
            prev_hash,
            hash,
        })
    }

    /// Appends a batch of events as a single atomic commit. If any request
    /// in the batch conflicts on dedupe key, none of the batch is applied.
    pub fn append_batch(&self, requests: Vec<AppendRequest>) -> Result<Vec<Event>, JournalError> {
        let mut out = Vec::with_capacity(requests.len());
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        for req in requests {
            let prev_hash: Option<String> = tx
                .query_row("SELECT hash FROM events ORDER BY seq DESC LIMIT 1", [], |row| row.get(0))
                .optional()?;
            let prev_hash_str = prev_hash.clone().unwrap_or_else(|| GENESIS_PREV_HASH.to_string());
            let hash = compute_event_hash(Some(&prev_hash_str), req.event_type, &req.payload);
            let id = Uuid::new_v4().to_string();
            let payload_str = serde_json::to_string(&req.payload)?;
            tx.execute(
                "INSERT INTO events (id, type, ts, observed_at, source, trace_id, schema_version, dedupe_key, payload, prev_hash, hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    id,
                    req.event_type.as_str(),
                    req.ts.to_rfc3339(),
                    req.observed_at.map(|t| t.to_rfc3339()),
                    req.source,
                    req.trace_id,
                    req.schema_version,
                    req.dedupe_key,
                    payload_str,
                    prev_hash,
                    hash,
                ],
            )?;
            out.push(Event {
                id,
                event_type: req.event_type,
                ts: req.ts,
                observed_at: req.observed_at,
                source: req.source,
                trace_id: req.trace_id,
                schema_version: req.schema_version,
                dedupe_key: req.dedupe_key,
                payload: req.payload,
                prev_hash,
                hash,
            });
        }
        tx.commit()?;
        Ok(out)
    }

    /// Replays every event in ascending insertion order — the only order
    /// in which projections are allowed to fold the journal.
    pub fn replay_all(&self) -> Result<Vec<Event>, JournalError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM events ORDER BY seq ASC")?;
        let ids: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        ids.iter().map(|id| row_to_event(&conn, id)).collect()
    }

    pub fn replay_by_type(&self, event_type: EventType) -> Result<Vec<Event>, JournalError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM events WHERE type = ?1 ORDER BY seq ASC")?;
        let ids: Vec<String> = stmt
            .query_map(params![event_type.as_str()], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        ids.iter().map(|id| row_to_event(&conn, id)).collect()
    }

    pub fn latest_by_type(&self, event_type: EventType) -> Result<Option<Event>, JournalError> {
        let conn = self.conn.lock();
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM events WHERE type = ?1 ORDER BY seq DESC LIMIT 1",
                params![event_type.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => Ok(Some(row_to_event(&conn, &id)?)),
            None => Ok(None),
        }
    }

    /// Re-walks the whole chain verifying each event's stored hash matches
    /// a recomputation from its own `prev_hash` and payload, and that each
    /// event's `prev_hash` matches the previous event's `hash`.
    pub fn verify_chain(&self) -> Result<(), ChainVerificationError> {
        let events = self.replay_all().map_err(ChainVerificationError::Journal)?;
        let mut expected_prev: Option<String> = None;
        for event in &events {
            let recomputed = compute_event_hash(event.prev_hash.as_deref(), event.event_type, &event.payload);
            if recomputed != event.hash {
                return Err(ChainVerificationError::HashMismatch {
                    event_id: event.id.clone(),
                });
            }
            let actual_prev = event.prev_hash.clone().unwrap_or_else(|| GENESIS_PREV_HASH.to_string());
            let expected = expected_prev.clone().unwrap_or_else(|| GENESIS_PREV_HASH.to_string());
            if actual_prev != expected {
                return Err(ChainVerificationError::BrokenLink {
                    event_id: event.id.clone(),
                });
            }
            expected_prev = Some(event.hash.clone());
        }
        Ok(())
    }
}

fn row_to_event(conn: &Connection, id: &str) -> Result<Event, JournalError> {
    conn.query_row(
        "SELECT id, type, ts, observed_at, source, trace_id, schema_version, dedupe_key, payload, prev_hash, hash
         FROM events WHERE id = ?1",
        params![id],
        |row| {
            let type_str: String = row.get(1)?;
            let ts_str: String = row.get(2)?;
            let observed_at_str: Option<String> = row.get(3)?;
            let payload_str: String = row.get(8)?;
            Ok((type_str, ts_str, observed_at_str, payload_str, row.get::<_, String>(0)?, row.get::<_, Option<String>>(4)?, row.get::<_, Option<String>>(5)?, row.get::<_, String>(6)?, row.get::<_, Option<String>>(7)?, row.get::<_, Option<String>>(9)?, row.get::<_, String>(10)?))
        },
    )
    .map_err(JournalError::from)
    .and_then(|(type_str, ts_str, observed_at_str, payload_str, id, source, trace_id, schema_version, dedupe_key, prev_hash, hash)| {
        let event_type = EventType::from_str_opt(&type_str).ok_or(JournalError::UnknownEventType(type_str))?;
        let ts = crate::time::parse_dt(&ts_str).unwrap_or_else(crate::time::utc_now);
        let observed_at = observed_at_str.and_then(|s| crate::time::parse_dt(&s));
        let payload: serde_json::Value = serde_json::from_str(&payload_str)?;
        Ok(Event {
            id,
            event_type,
            ts,
            observed_at,
            source,
            trace_id,
            schema_version,
            dedupe_key,
            payload,
            prev_hash,
            hash,
        })
    })
}

#[derive(Debug, Error)]
pub enum ChainVerificationError {
    #[error("journal error: {0}")]
    Journal(JournalError),
    #[error("event {event_id} has a hash that does not match its own prev_hash and payload")]
    HashMismatch { event_id: String },
    #[error("event {event_id} does not chain from the preceding event's hash")]
    BrokenLink { event_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn appends_and_chains_hashes() {
        let journal = Journal::open_in_memory().unwrap();
        let e1 = journal
            .append(AppendRequest::new(EventType::SignalTaV1, json!({"x": 1})))
            .unwrap();
        let e2 = journal
            .append(AppendRequest::new(EventType::SignalTaV1, json!({"x": 2})))
            .unwrap();
        assert_eq!(e1.prev_hash, None);
        assert_eq!(e2.prev_hash, Some(e1.hash));
        journal.verify_chain().unwrap();
    }

    #[test]
    fn dedupe_key_is_idempotent_for_identical_payload() {
        let journal = Journal::open_in_memory().unwrap();
        let req1 = AppendRequest::new(EventType::SignalTaV1, json!({"x": 1})).with_dedupe_key("k1");
        let req2 = AppendRequest::new(EventType::SignalTaV1, json!({"x": 1})).with_dedupe_key("k1");
        let e1 = journal.append(req1).unwrap();
        let e2 = journal.append(req2).unwrap();
        assert_eq!(e1.id, e2.id);
        assert_eq!(journal.replay_all().unwrap().len(), 1);
    }

    #[test]
    fn dedupe_key_conflict_on_divergent_payload_is_rejected() {
        let journal = Journal::open_in_memory().unwrap();
        let req1 = AppendRequest::new(EventType::SignalTaV1, json!({"x": 1})).with_dedupe_key("k1");
        let req2 = AppendRequest::new(EventType::SignalTaV1, json!({"x": 2})).with_dedupe_key("k1");
        journal.append(req1).unwrap();
        let err = journal.append(req2).unwrap_err();
        assert!(matches!(err, JournalError::DedupeConflict { .. }));
    }

    #[test]
    fn verify_chain_detects_tampering() {
        let journal = Journal::open_in_memory().unwrap();
        journal
            .append(AppendRequest::new(EventType::SignalTaV1, json!({"x": 1})))
            .unwrap();
        {
            let conn = journal.conn.lock();
            conn.execute("UPDATE events SET payload = '{\"x\":999}' WHERE seq = 1", [])
                .unwrap();
        }
        assert!(journal.verify_chain().is_err());
    }
}
