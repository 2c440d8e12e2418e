//! Per-session UI state and the services it drives.

use crate::ai::{ChatClient, CompletionBackend};
use crate::config::AppConfig;
use crate::pipeline::{Pipeline, TurnError};
use crate::registry::ThreadRegistry;
use crate::store::MessageStore;
use crate::types::{ChatMessage, ThreadId, ThreadSummary};
use anyhow::Context as _;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Error(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Info(message) | Notice::Error(message) => message,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notice::Error(_))
    }
}

/// What one window shows: the active thread, its transcript and the cached
/// sidebar list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatSession {
    pub active: ThreadId,
    pub transcript: Vec<ChatMessage>,
    pub threads: Vec<ThreadSummary>,
    pub notice: Option<Notice>,
}

impl ChatSession {
    pub fn new(registry: &ThreadRegistry) -> Self {
        Self {
            active: registry.create(),
            transcript: Vec::new(),
            threads: registry.list(),
            notice: None,
        }
    }

    pub fn new_chat(&mut self, registry: &ThreadRegistry) {
        self.active = registry.create();
        self.transcript.clear();
        self.notice = None;
    }

    pub fn refresh_threads(&mut self, registry: &ThreadRegistry) {
        self.threads = registry.list();
    }

    pub fn is_active(&self, thread_id: &ThreadId) -> bool {
        &self.active == thread_id
    }

    /// Switch to a stored thread. Unknown threads leave the session as is
    /// and drop out of the cached list.
    pub fn select(&mut self, registry: &ThreadRegistry, thread_id: &ThreadId) -> bool {
        match registry.info(thread_id) {
            Some(info) => {
                self.active = thread_id.clone();
                self.transcript = info.messages;
                self.notice = None;
                true
            }
            None => {
                self.threads.retain(|summary| &summary.thread_id != thread_id);
                self.notice = Some(Notice::Error("Conversation not found".to_string()));
                false
            }
        }
    }

    pub fn delete_thread(&mut self, registry: &ThreadRegistry, thread_id: &ThreadId) -> bool {
        if !registry.delete(thread_id) {
            self.notice = Some(Notice::Error("Could not delete conversation".to_string()));
            return false;
        }

        self.threads.retain(|summary| &summary.thread_id != thread_id);
        if self.is_active(thread_id) {
            self.new_chat(registry);
        }
        self.notice = Some(Notice::Info("Conversation deleted".to_string()));
        true
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.transcript.push(ChatMessage::user(content));
        self.notice = None;
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.transcript.push(ChatMessage::assistant(content));
    }

    pub fn fail_turn(&mut self, err: &TurnError) {
        self.notice = Some(Notice::Error(format!("Reply failed: {err}")));
    }
}

/// Services shared by every view.
#[derive(Clone)]
pub struct AppContext {
    pub registry: ThreadRegistry,
    pub pipeline: Pipeline,
}

impl AppContext {
    pub fn new(store: Arc<dyn MessageStore>, backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            registry: ThreadRegistry::new(Arc::clone(&store)),
            pipeline: Pipeline::new(store, backend),
        }
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let store = open_store(&config.db_path)?;
        let client = ChatClient::from_config(&config.provider, config.system_prompt.clone());
        info!(
            provider = config.provider.label(),
            db = %config.db_path.display(),
            "app context ready"
        );
        Ok(Self::new(store, Arc::new(client)))
    }

    pub fn session(&self) -> ChatSession {
        ChatSession::new(&self.registry)
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn open_store(path: &Path) -> anyhow::Result<Arc<dyn MessageStore>> {
    let store = crate::store::SqliteStore::open(path)
        .with_context(|| format!("failed to open chat database at {}", path.display()))?;
    Ok(Arc::new(store))
}

#[cfg(target_arch = "wasm32")]
fn open_store(_path: &Path) -> anyhow::Result<Arc<dyn MessageStore>> {
    Ok(Arc::new(crate::store::MemoryStore::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry_with(threads: &[&str]) -> (ThreadRegistry, Vec<ThreadId>) {
        let store = Arc::new(MemoryStore::new());
        let registry = ThreadRegistry::new(store.clone());
        let ids = threads
            .iter()
            .map(|text| {
                let id = registry.create();
                store.append(&id, &[ChatMessage::user(*text)]).unwrap();
                id
            })
            .collect();
        (registry, ids)
    }

    #[test]
    fn deleting_active_thread_starts_a_fresh_one() {
        let (registry, ids) = registry_with(&["first", "second"]);
        let mut session = ChatSession::new(&registry);
        assert!(session.select(&registry, &ids[0]));
        assert_eq!(session.transcript, vec![ChatMessage::user("first")]);

        assert!(session.delete_thread(&registry, &ids[0]));
        assert_ne!(session.active, ids[0]);
        assert!(session.transcript.is_empty());
        assert!(session.threads.iter().all(|s| s.thread_id != ids[0]));
        assert_eq!(session.threads.len(), 1);
        assert!(registry.info(&session.active).is_none());
    }

    #[test]
    fn deleting_another_thread_keeps_the_active_one() {
        let (registry, ids) = registry_with(&["first", "second"]);
        let mut session = ChatSession::new(&registry);
        session.select(&registry, &ids[1]);

        assert!(session.delete_thread(&registry, &ids[0]));
        assert_eq!(session.active, ids[1]);
        assert_eq!(session.transcript, vec![ChatMessage::user("second")]);
    }

    #[test]
    fn failed_delete_records_an_error_notice() {
        let (registry, _) = registry_with(&[]);
        let mut session = ChatSession::new(&registry);
        let active = session.active.clone();

        assert!(!session.delete_thread(&registry, &ThreadId::generate()));
        assert!(session.notice.as_ref().is_some_and(Notice::is_error));
        assert_eq!(session.active, active);
    }

    #[test]
    fn selecting_unknown_thread_changes_nothing() {
        let (registry, _) = registry_with(&["only"]);
        let mut session = ChatSession::new(&registry);
        let active = session.active.clone();

        assert!(!session.select(&registry, &ThreadId::from("missing")));
        assert_eq!(session.active, active);
        assert_eq!(session.threads.len(), 1);
    }

    #[test]
    fn failed_turn_keeps_user_message_and_shows_notice() {
        let (registry, _) = registry_with(&[]);
        let mut session = ChatSession::new(&registry);
        session.push_user("Hi");
        session.fail_turn(&TurnError::Completion(crate::ai::ChatError::new("quota exceeded")));

        assert_eq!(session.transcript, vec![ChatMessage::user("Hi")]);
        let notice = session.notice.unwrap();
        assert!(notice.is_error());
        assert!(notice.message().contains("quota exceeded"));
    }
}
