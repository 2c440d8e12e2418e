#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use threadline::ai::{ChatError, ChatResult, CompletionBackend, FragmentStream};
use threadline::session::AppContext;
use threadline::store::{MemoryStore, MessageStore};
use threadline::types::ChatMessage;

/// One scripted model response.
pub enum Reply {
    Fragments(Vec<&'static str>),
    FailToStart(&'static str),
    FailMidStream(Vec<&'static str>, &'static str),
}

/// Backend that plays back queued replies and records every history it was
/// asked to complete. An empty queue answers `"ok"`.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn seen(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().expect("seen lock").clone()
    }
}

fn owned(fragments: Vec<&'static str>) -> Vec<ChatResult<String>> {
    fragments.into_iter().map(|f| Ok(f.to_string())).collect()
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, history: &[ChatMessage]) -> ChatResult<String> {
        self.stream(history).await?.collect_text().await
    }

    async fn stream(&self, history: &[ChatMessage]) -> ChatResult<FragmentStream> {
        self.seen.lock().expect("seen lock").push(history.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self.replies.lock().expect("replies lock").pop_front();
        match reply {
            None => Ok(FragmentStream::once("ok".to_string())),
            Some(Reply::Fragments(fragments)) => {
                Ok(FragmentStream::from_fragments(owned(fragments)))
            }
            Some(Reply::FailToStart(message)) => Err(ChatError::new(message)),
            Some(Reply::FailMidStream(fragments, message)) => {
                let mut items = owned(fragments);
                items.push(Err(ChatError::new(message)));
                Ok(FragmentStream::from_fragments(items))
            }
        }
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub backend: Arc<ScriptedBackend>,
    pub ctx: AppContext,
}

pub fn harness(backend: ScriptedBackend) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(backend);
    let ctx = AppContext::new(
        Arc::clone(&store) as Arc<dyn MessageStore>,
        Arc::clone(&backend) as Arc<dyn CompletionBackend>,
    );
    Harness { store, backend, ctx }
}
