use super::providers::connect;
use super::{ChatResult, CompletionBackend, FragmentStream};
use crate::config::ProviderConfig;
use crate::types::ChatMessage;
use async_trait::async_trait;
use std::time::Instant;
use tracing::debug;

/// Unified completion client for threadline
/// Handles provider selection and forwards every call to the chosen backend
pub struct ChatClient {
    backend: Box<dyn CompletionBackend>,
}

impl ChatClient {
    /// Create the client for a configured provider
    pub fn from_config(provider: &ProviderConfig, system_prompt: Option<String>) -> Self {
        let backend = connect(provider, system_prompt);
        debug!(backend = backend.name(), "completion client ready");
        Self { backend }
    }

    /// Wrap an already constructed backend
    pub fn with_backend(backend: Box<dyn CompletionBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl CompletionBackend for ChatClient {
    fn name(&self) -> &str {
        self.backend.name()
    }

    async fn complete(&self, history: &[ChatMessage]) -> ChatResult<String> {
        let started = Instant::now();
        let reply = self.backend.complete(history).await;
        debug!(
            backend = self.backend.name(),
            history = history.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = reply.is_ok(),
            "completion finished"
        );
        reply
    }

    async fn stream(&self, history: &[ChatMessage]) -> ChatResult<FragmentStream> {
        let started = Instant::now();
        let stream = self.backend.stream(history).await;
        debug!(
            backend = self.backend.name(),
            history = history.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = stream.is_ok(),
            "completion stream opened"
        );
        stream
    }
}
