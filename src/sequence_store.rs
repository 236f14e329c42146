//! Persistence contract for the reference code generator, plus an
//! in-memory implementation for tests and a durable SQLite-backed one,
//! grounded on the teacher's `SqliteTaskQueue` (one connection opened per
//! call, every query run via `tokio::task::spawn_blocking`).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::error::{RuntimeError, RuntimeResult};

/// `{load() -> (date, n), save(date, n)}` per the bus-external persistence
/// contract. Implementations need not be internally synchronised — the
/// reference code service serialises its own critical section.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    async fn load(&self) -> RuntimeResult<Option<(NaiveDate, u16)>>;
    async fn save(&self, date: NaiveDate, sequence: u16) -> RuntimeResult<()>;
}

#[derive(Default)]
pub struct InMemorySequenceStore {
    state: Mutex<Option<(NaiveDate, u16)>>,
}

impl InMemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SequenceStore for InMemorySequenceStore {
    async fn load(&self) -> RuntimeResult<Option<(NaiveDate, u16)>> {
        Ok(*self.state.lock().await)
    }

    async fn save(&self, date: NaiveDate, sequence: u16) -> RuntimeResult<()> {
        *self.state.lock().await = Some((date, sequence));
        Ok(())
    }
}

/// Durable `SequenceStore` backed by a single-row SQLite table. On corrupt
/// or missing persisted state, callers see `Ok(None)` and restart the
/// sequence at 1 for today, per the service's own corruption policy.
#[derive(Clone)]
pub struct SqliteSequenceStore {
    db_path: PathBuf,
}

impl SqliteSequenceStore {
    pub async fn new(db_path: impl AsRef<Path>) -> RuntimeResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let path_clone = path.clone();

        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path_clone)?;
            conn.execute(
                r#"
                CREATE TABLE IF NOT EXISTS reference_sequence (
                    id INTEGER PRIMARY KEY CHECK (id = 0),
                    date TEXT NOT NULL,
                    sequence INTEGER NOT NULL
                );
                "#,
                [],
            )?;
            Ok::<_, rusqlite::Error>(())
        })
        .await
        .map_err(|e| RuntimeError::Persistence(e.to_string()))?
        .map_err(|e| RuntimeError::Persistence(e.to_string()))?;

        Ok(Self { db_path: path })
    }
}

#[async_trait]
impl SequenceStore for SqliteSequenceStore {
    async fn load(&self) -> RuntimeResult<Option<(NaiveDate, u16)>> {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            let row: Option<(String, i64)> = conn
                .query_row(
                    "SELECT date, sequence FROM reference_sequence WHERE id = 0",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok::<_, rusqlite::Error>(row)
        })
        .await
        .map_err(|e| RuntimeError::Persistence(e.to_string()))?
        .map_err(|e| RuntimeError::Persistence(e.to_string()))
        .map(|row| {
            row.and_then(|(date, seq)| {
                NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .ok()
                    .map(|d| (d, seq as u16))
            })
        })
    }

    async fn save(&self, date: NaiveDate, sequence: u16) -> RuntimeResult<()> {
        let path = self.db_path.clone();
        let date_str = date.format("%Y-%m-%d").to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            conn.execute(
                "INSERT INTO reference_sequence (id, date, sequence) VALUES (0, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET date = excluded.date, sequence = excluded.sequence",
                params![date_str, sequence as i64],
            )?;
            Ok::<_, rusqlite::Error>(())
        })
        .await
        .map_err(|e| RuntimeError::Persistence(e.to_string()))?
        .map_err(|e| RuntimeError::Persistence(e.to_string()))
    }
}
