//! Thread-keyed checkpoint persistence.
//!
//! Every append writes a new checkpoint holding the full message snapshot of
//! the thread; reads only ever look at the latest one.
//!
//! - `memory` - in-process store used by tests and the wasm build
//! - `sqlite` - embedded SQLite store for native targets
mod memory;
#[cfg(not(target_arch = "wasm32"))]
mod sqlite;

pub use memory::MemoryStore;
#[cfg(not(target_arch = "wasm32"))]
pub use sqlite::SqliteStore;

use crate::types::{ChatMessage, Role, ThreadId};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[cfg(not(target_arch = "wasm32"))]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid timestamp: {0}")]
    Timestamp(String),

    #[error("corrupt checkpoint: {0}")]
    Corrupt(String),

    #[error("store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// What produced a checkpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointSource {
    /// The user message of a turn.
    Input,
    /// The assistant reply of a turn.
    Loop,
}

impl CheckpointSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointSource::Input => "input",
            CheckpointSource::Loop => "loop",
        }
    }

    pub fn parse(raw: &str) -> StoreResult<Self> {
        match raw {
            "input" => Ok(CheckpointSource::Input),
            "loop" => Ok(CheckpointSource::Loop),
            other => Err(StoreError::Corrupt(format!("unknown source `{other}`"))),
        }
    }

    fn for_messages(messages: &[ChatMessage]) -> Self {
        match messages.last().map(|msg| msg.role) {
            Some(Role::Assistant) => CheckpointSource::Loop,
            _ => CheckpointSource::Input,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointMeta {
    pub step: i64,
    pub source: CheckpointSource,
    pub created_at: OffsetDateTime,
    pub message_count: usize,
}

pub trait MessageStore: Send + Sync {
    /// Append `messages` to the thread, writing a new checkpoint.
    fn append(&self, thread_id: &ThreadId, messages: &[ChatMessage]) -> StoreResult<()>;

    /// Messages of the latest checkpoint; empty for unknown threads.
    fn load(&self, thread_id: &ThreadId) -> StoreResult<Vec<ChatMessage>>;

    /// Every thread with at least one checkpoint, oldest thread first.
    fn list_thread_ids(&self) -> StoreResult<Vec<ThreadId>>;

    /// Checkpoint history of a thread, oldest first.
    fn checkpoints(&self, thread_id: &ThreadId) -> StoreResult<Vec<CheckpointMeta>>;

    /// Remove every checkpoint of the thread in one transaction.
    fn remove(&self, thread_id: &ThreadId) -> StoreResult<bool>;

    /// Like [`MessageStore::remove`], but storage failures are logged and
    /// reported as `false`.
    fn delete(&self, thread_id: &ThreadId) -> bool {
        match self.remove(thread_id) {
            Ok(removed) => {
                if removed {
                    info!(thread = %thread_id, "thread deleted");
                }
                removed
            }
            Err(err) => {
                error!(thread = %thread_id, error = %err, "failed to delete thread");
                false
            }
        }
    }
}

pub(crate) fn now_rfc3339() -> StoreResult<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|err| StoreError::Timestamp(err.to_string()))
}

pub(crate) fn parse_rfc3339(raw: &str) -> StoreResult<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339).map_err(|err| StoreError::Timestamp(err.to_string()))
}
