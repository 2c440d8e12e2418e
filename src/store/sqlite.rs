use super::{
    CheckpointMeta, CheckpointSource, MessageStore, StoreError, StoreResult, now_rfc3339,
    parse_rfc3339,
};
use crate::types::{ChatMessage, ThreadId};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior, params};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id TEXT NOT NULL,
    step INTEGER NOT NULL,
    source TEXT CHECK(source IN ('input', 'loop')) NOT NULL,
    created_at TEXT NOT NULL,
    messages TEXT NOT NULL,
    UNIQUE(thread_id, step)
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_thread ON checkpoints(thread_id, step);
"#;

/// Checkpoint store backed by a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened checkpoint database");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn latest_snapshot(conn: &Connection, thread_id: &ThreadId) -> StoreResult<Option<(i64, String)>> {
    Ok(conn
        .query_row(
            "SELECT step, messages FROM checkpoints
             WHERE thread_id = ?1 ORDER BY step DESC LIMIT 1",
            params![thread_id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?)
}

impl MessageStore for SqliteStore {
    fn append(&self, thread_id: &ThreadId, messages: &[ChatMessage]) -> StoreResult<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (step, mut snapshot) = match latest_snapshot(&tx, thread_id)? {
            Some((step, json)) => (step + 1, serde_json::from_str::<Vec<ChatMessage>>(&json)?),
            None => (0, Vec::new()),
        };
        snapshot.extend_from_slice(messages);

        tx.execute(
            "INSERT INTO checkpoints (thread_id, step, source, created_at, messages)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                thread_id.as_str(),
                step,
                CheckpointSource::for_messages(messages).as_str(),
                now_rfc3339()?,
                serde_json::to_string(&snapshot)?,
            ],
        )?;
        tx.commit()?;

        debug!(thread = %thread_id, step, total = snapshot.len(), "checkpoint written");
        Ok(())
    }

    fn load(&self, thread_id: &ThreadId) -> StoreResult<Vec<ChatMessage>> {
        let conn = self.conn()?;
        match latest_snapshot(&conn, thread_id)? {
            Some((_, json)) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn list_thread_ids(&self) -> StoreResult<Vec<ThreadId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT thread_id FROM checkpoints
             GROUP BY thread_id
             ORDER BY MIN(id)",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|row| row.map(ThreadId::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn checkpoints(&self, thread_id: &ThreadId) -> StoreResult<Vec<CheckpointMeta>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT step, source, created_at, json_array_length(messages)
             FROM checkpoints WHERE thread_id = ?1 ORDER BY step",
        )?;
        let rows = stmt
            .query_map(params![thread_id.as_str()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(step, source, created_at, count)| {
                Ok(CheckpointMeta {
                    step,
                    source: CheckpointSource::parse(&source)?,
                    created_at: parse_rfc3339(&created_at)?,
                    message_count: usize::try_from(count).unwrap_or_default(),
                })
            })
            .collect()
    }

    fn remove(&self, thread_id: &ThreadId) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM checkpoints WHERE thread_id = ?1",
            params![thread_id.as_str()],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }
}
