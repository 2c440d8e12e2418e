use super::{CheckpointMeta, CheckpointSource, MessageStore, StoreError, StoreResult};
use crate::types::{ChatMessage, ThreadId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;
use tracing::debug;

struct StoredCheckpoint {
    seq: u64,
    meta: CheckpointMeta,
    messages: Vec<ChatMessage>,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    threads: HashMap<ThreadId, Vec<StoredCheckpoint>>,
}

/// Volatile store; nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl MessageStore for MemoryStore {
    fn append(&self, thread_id: &ThreadId, messages: &[ChatMessage]) -> StoreResult<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let created_at = OffsetDateTime::now_utc();
        let mut inner = self.inner()?;
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let history = inner.threads.entry(thread_id.clone()).or_default();
        let (step, mut snapshot) = match history.last() {
            Some(latest) => (latest.meta.step + 1, latest.messages.clone()),
            None => (0, Vec::new()),
        };
        snapshot.extend_from_slice(messages);

        debug!(thread = %thread_id, step, total = snapshot.len(), "checkpoint written");
        history.push(StoredCheckpoint {
            seq,
            meta: CheckpointMeta {
                step,
                source: CheckpointSource::for_messages(messages),
                created_at,
                message_count: snapshot.len(),
            },
            messages: snapshot,
        });
        Ok(())
    }

    fn load(&self, thread_id: &ThreadId) -> StoreResult<Vec<ChatMessage>> {
        let inner = self.inner()?;
        Ok(inner
            .threads
            .get(thread_id)
            .and_then(|history| history.last())
            .map(|latest| latest.messages.clone())
            .unwrap_or_default())
    }

    fn list_thread_ids(&self) -> StoreResult<Vec<ThreadId>> {
        let inner = self.inner()?;
        let mut ids: Vec<(u64, ThreadId)> = inner
            .threads
            .iter()
            .filter_map(|(id, history)| history.first().map(|first| (first.seq, id.clone())))
            .collect();
        ids.sort_by_key(|(seq, _)| *seq);
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    fn checkpoints(&self, thread_id: &ThreadId) -> StoreResult<Vec<CheckpointMeta>> {
        let inner = self.inner()?;
        Ok(inner
            .threads
            .get(thread_id)
            .map(|history| history.iter().map(|cp| cp.meta.clone()).collect())
            .unwrap_or_default())
    }

    fn remove(&self, thread_id: &ThreadId) -> StoreResult<bool> {
        let mut inner = self.inner()?;
        Ok(inner
            .threads
            .remove(thread_id)
            .is_some_and(|history| !history.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_returns_latest_snapshot_in_append_order() {
        let store = MemoryStore::new();
        let id = ThreadId::generate();
        store.append(&id, &[ChatMessage::user("one")]).unwrap();
        store.append(&id, &[ChatMessage::assistant("two")]).unwrap();
        store
            .append(&id, &[ChatMessage::user("three"), ChatMessage::assistant("four")])
            .unwrap();

        let contents: Vec<_> = store
            .load(&id)
            .unwrap()
            .into_iter()
            .map(|msg| msg.content)
            .collect();
        assert_eq!(contents, ["one", "two", "three", "four"]);

        let steps: Vec<_> = store
            .checkpoints(&id)
            .unwrap()
            .iter()
            .map(|cp| (cp.step, cp.source, cp.message_count))
            .collect();
        assert_eq!(
            steps,
            [
                (0, CheckpointSource::Input, 1),
                (1, CheckpointSource::Loop, 2),
                (2, CheckpointSource::Loop, 4),
            ]
        );
    }

    #[test]
    fn list_orders_by_first_checkpoint() {
        let store = MemoryStore::new();
        let first = ThreadId::from("first");
        let second = ThreadId::from("second");
        store.append(&first, &[ChatMessage::user("a")]).unwrap();
        store.append(&second, &[ChatMessage::user("b")]).unwrap();
        store.append(&first, &[ChatMessage::assistant("c")]).unwrap();

        assert_eq!(store.list_thread_ids().unwrap(), [first, second]);
    }

    #[test]
    fn empty_append_creates_nothing() {
        let store = MemoryStore::new();
        let id = ThreadId::generate();
        store.append(&id, &[]).unwrap();
        assert!(store.list_thread_ids().unwrap().is_empty());
        assert!(!store.remove(&id).unwrap());
    }
}
