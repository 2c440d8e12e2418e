//! One conversation turn: persist the user message, ask the model with the
//! full history, persist the reply.
//!
//! Turns on the same thread are serialized; the lock is taken in
//! [`Pipeline::begin_turn`] and released when the [`Turn`] is committed or
//! dropped.

use crate::ai::{ChatError, CompletionBackend, FragmentStream};
use crate::store::{MessageStore, StoreError};
use crate::types::{ChatMessage, Thread, ThreadId};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{Mutex as TurnLock, OwnedMutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("message is empty")]
    EmptyInput,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("completion failed: {0}")]
    Completion(#[from] ChatError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    UserAppended,
    AwaitingCompletion,
    AssistantAppended,
    Failed,
}

/// Single-writer lock per thread. Entries nobody holds or waits on are
/// pruned on the next acquisition.
#[derive(Default)]
struct ThreadLocks {
    locks: Mutex<HashMap<ThreadId, Arc<TurnLock<()>>>>,
}

impl ThreadLocks {
    async fn acquire(&self, thread_id: &ThreadId) -> Result<OwnedMutexGuard<()>, StoreError> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| StoreError::Poisoned)?;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(thread_id.clone()).or_default().clone()
        };
        Ok(lock.lock_owned().await)
    }
}

#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn MessageStore>,
    backend: Arc<dyn CompletionBackend>,
    locks: Arc<ThreadLocks>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn MessageStore>, backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            store,
            backend,
            locks: Arc::new(ThreadLocks::default()),
        }
    }

    /// Persist the user message and open the reply stream.
    ///
    /// If the model cannot be reached the user message stays persisted and
    /// [`TurnError::Completion`] is returned.
    pub async fn begin_turn(
        &self,
        thread_id: &ThreadId,
        user_text: &str,
    ) -> Result<Turn, TurnError> {
        if user_text.trim().is_empty() {
            return Err(TurnError::EmptyInput);
        }

        let guard = self.locks.acquire(thread_id).await?;

        self.store.append(thread_id, &[ChatMessage::user(user_text)])?;
        debug!(thread = %thread_id, state = ?TurnState::UserAppended, "turn advanced");

        let history = self.store.load(thread_id)?;
        debug!(
            thread = %thread_id,
            state = ?TurnState::AwaitingCompletion,
            history = history.len(),
            "turn advanced"
        );

        let fragments = match self.backend.stream(&history).await {
            Ok(fragments) => fragments,
            Err(err) => {
                warn!(thread = %thread_id, error = %err, "turn failed before streaming");
                return Err(TurnError::Completion(err));
            }
        };

        Ok(Turn {
            thread_id: thread_id.clone(),
            store: Arc::clone(&self.store),
            fragments: Some(fragments),
            partial: String::new(),
            state: TurnState::AwaitingCompletion,
            error: None,
            _guard: guard,
        })
    }

    /// Run a whole turn and return the persisted assistant message.
    pub async fn submit(
        &self,
        thread_id: &ThreadId,
        user_text: &str,
    ) -> Result<ChatMessage, TurnError> {
        self.begin_turn(thread_id, user_text).await?.commit().await
    }

    /// Run a whole turn and return the thread as persisted afterwards.
    pub async fn advance_turn(
        &self,
        thread_id: &ThreadId,
        user_text: &str,
    ) -> Result<Thread, TurnError> {
        self.submit(thread_id, user_text).await?;
        let messages = self.store.load(thread_id)?;
        Ok(Thread {
            id: thread_id.clone(),
            messages,
        })
    }
}

/// A turn whose user message is persisted and whose reply is streaming in.
pub struct Turn {
    thread_id: ThreadId,
    store: Arc<dyn MessageStore>,
    fragments: Option<FragmentStream>,
    partial: String,
    state: TurnState,
    error: Option<ChatError>,
    _guard: OwnedMutexGuard<()>,
}

impl Turn {
    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Reply text received so far.
    pub fn partial(&self) -> &str {
        &self.partial
    }

    /// Next reply fragment; `None` once the reply is complete or failed.
    pub async fn next_fragment(&mut self) -> Option<Result<String, TurnError>> {
        let fragments = self.fragments.as_mut()?;
        match fragments.next().await {
            Some(Ok(piece)) => {
                self.partial.push_str(&piece);
                Some(Ok(piece))
            }
            Some(Err(err)) => {
                self.fragments = None;
                self.state = TurnState::Failed;
                self.error = Some(err.clone());
                Some(Err(TurnError::Completion(err)))
            }
            None => {
                self.fragments = None;
                None
            }
        }
    }

    /// Drain the rest of the reply and persist it. A failed turn persists
    /// nothing and returns the completion error.
    pub async fn commit(mut self) -> Result<ChatMessage, TurnError> {
        while let Some(fragment) = self.next_fragment().await {
            if fragment.is_err() {
                break;
            }
        }

        if let Some(err) = self.error.take() {
            warn!(
                thread = %self.thread_id,
                state = ?self.state,
                error = %err,
                "turn failed, reply discarded"
            );
            return Err(TurnError::Completion(err));
        }

        let reply = ChatMessage::assistant(std::mem::take(&mut self.partial));
        self.store.append(&self.thread_id, std::slice::from_ref(&reply))?;
        self.state = TurnState::AssistantAppended;
        debug!(
            thread = %self.thread_id,
            state = ?self.state,
            chars = reply.content.chars().count(),
            "turn advanced"
        );
        Ok(reply)
    }
}
