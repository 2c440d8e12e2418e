use crate::store::MessageStore;
use crate::types::{ChatMessage, Role, ThreadId, ThreadInfo, ThreadSummary};
use std::sync::Arc;
use tracing::{error, info};

/// Longest topic shown before truncation, in characters.
pub const TOPIC_MAX_CHARS: usize = 30;

/// Display label for a thread: its first user message, cut to
/// [`TOPIC_MAX_CHARS`] with `...` appended, or the id when there is none.
pub fn derive_topic(thread_id: &ThreadId, messages: &[ChatMessage]) -> String {
    let Some(first) = messages.iter().find(|msg| msg.role == Role::User) else {
        return thread_id.to_string();
    };

    match first.content.char_indices().nth(TOPIC_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &first.content[..cut]),
        None => first.content.clone(),
    }
}

#[derive(Clone)]
pub struct ThreadRegistry {
    store: Arc<dyn MessageStore>,
}

impl ThreadRegistry {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Summaries of every stored thread, newest first.
    pub fn list(&self) -> Vec<ThreadSummary> {
        let ids = match self.store.list_thread_ids() {
            Ok(ids) => ids,
            Err(err) => {
                error!(error = %err, "failed to list threads");
                return Vec::new();
            }
        };

        ids.into_iter()
            .rev()
            .filter_map(|thread_id| self.info(&thread_id).map(|info| info.summary))
            .collect()
    }

    /// Summary and messages of one thread; `None` when it has no messages.
    pub fn info(&self, thread_id: &ThreadId) -> Option<ThreadInfo> {
        let messages = match self.store.load(thread_id) {
            Ok(messages) => messages,
            Err(err) => {
                error!(thread = %thread_id, error = %err, "failed to load thread");
                return None;
            }
        };
        if messages.is_empty() {
            return None;
        }

        Some(ThreadInfo {
            summary: ThreadSummary {
                thread_id: thread_id.clone(),
                topic: derive_topic(thread_id, &messages),
                message_count: messages.len(),
            },
            messages,
        })
    }

    pub fn delete(&self, thread_id: &ThreadId) -> bool {
        self.store.delete(thread_id)
    }

    /// Fresh id; nothing is stored until the first message is appended.
    pub fn create(&self) -> ThreadId {
        let thread_id = ThreadId::generate();
        info!(thread = %thread_id, "thread created");
        thread_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CheckpointMeta, MemoryStore, StoreError, StoreResult};

    struct Unreachable;

    impl MessageStore for Unreachable {
        fn append(&self, _: &ThreadId, _: &[ChatMessage]) -> StoreResult<()> {
            Err(StoreError::Poisoned)
        }

        fn load(&self, _: &ThreadId) -> StoreResult<Vec<ChatMessage>> {
            Err(StoreError::Poisoned)
        }

        fn list_thread_ids(&self) -> StoreResult<Vec<ThreadId>> {
            Err(StoreError::Poisoned)
        }

        fn checkpoints(&self, _: &ThreadId) -> StoreResult<Vec<CheckpointMeta>> {
            Err(StoreError::Poisoned)
        }

        fn remove(&self, _: &ThreadId) -> StoreResult<bool> {
            Err(StoreError::Poisoned)
        }
    }

    #[test]
    fn short_topics_are_kept_verbatim() {
        let id = ThreadId::from("t-1");
        let exactly_thirty = "a".repeat(TOPIC_MAX_CHARS);
        assert_eq!(derive_topic(&id, &[ChatMessage::user("Hello")]), "Hello");
        assert_eq!(
            derive_topic(&id, &[ChatMessage::user(exactly_thirty.clone())]),
            exactly_thirty
        );
    }

    #[test]
    fn long_topics_are_truncated_by_characters() {
        let id = ThreadId::from("t-1");
        let long = "é".repeat(31);
        let topic = derive_topic(&id, &[ChatMessage::user(long)]);
        assert_eq!(topic, format!("{}...", "é".repeat(30)));
    }

    #[test]
    fn topic_skips_leading_assistant_messages() {
        let id = ThreadId::from("t-1");
        let messages = [ChatMessage::assistant("Welcome"), ChatMessage::user("Question")];
        assert_eq!(derive_topic(&id, &messages), "Question");
        assert_eq!(derive_topic(&id, &[ChatMessage::assistant("Welcome")]), "t-1");
    }

    #[test]
    fn lists_newest_thread_first() {
        let store = Arc::new(MemoryStore::new());
        let registry = ThreadRegistry::new(store.clone());
        let older = registry.create();
        let newer = registry.create();
        store.append(&older, &[ChatMessage::user("older")]).unwrap();
        store.append(&newer, &[ChatMessage::user("newer")]).unwrap();

        let ids: Vec<ThreadId> = registry.list().into_iter().map(|s| s.thread_id).collect();
        assert_eq!(ids, vec![newer, older]);
    }

    #[test]
    fn unknown_thread_has_no_info() {
        let registry = ThreadRegistry::new(Arc::new(MemoryStore::new()));
        assert!(registry.info(&ThreadId::generate()).is_none());
        assert!(!registry.delete(&ThreadId::generate()));
    }

    #[test]
    fn storage_failures_read_as_empty() {
        let registry = ThreadRegistry::new(Arc::new(Unreachable));
        let id = ThreadId::generate();
        assert!(registry.list().is_empty());
        assert!(registry.info(&id).is_none());
        assert!(!registry.delete(&id));
    }
}
