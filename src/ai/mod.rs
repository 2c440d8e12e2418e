//! Completion client for threadline
//!
//! This module wraps the single remote call a conversation turn needs: given
//! the ordered history of a thread, produce the next assistant message, either
//! whole or as a stream of text fragments.
//!
//! # Architecture
//!
//! - `client` - `ChatClient`, the provider-agnostic facade used by the pipeline
//! - `providers` - rig-backed hosted models plus raw HTTP streaming backends
//! - `stream` - `FragmentStream` and the line / SSE decoders feeding it
//!
//! # Usage
//!
//! ```rust,no_run
//! use threadline::ai::{ChatClient, CompletionBackend};
//! use threadline::config::AppConfig;
//! use threadline::types::ChatMessage;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AppConfig::from_env()?;
//! let client = ChatClient::from_config(&config.provider, config.system_prompt.clone());
//! let reply = client.complete(&[ChatMessage::user("Hello!")]).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod providers;
mod stream;

pub use client::ChatClient;
pub use providers::{
    EndpointBackend, OllamaBackend, RigBackend, parse_ollama_stream_line, parse_sse_data,
};
pub use stream::{FragmentStream, LineBuffer, SseDecoder};

use crate::types::ChatMessage;
use async_trait::async_trait;

// ============================================
// Error Types
// ============================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatError(String);

impl ChatError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ChatError {}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::new(err.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::new(err.to_string())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

// ============================================
// Backend Trait
// ============================================

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Produce the next assistant reply for the full `history`.
    async fn complete(&self, history: &[ChatMessage]) -> ChatResult<String>;

    /// Stream the next assistant reply. Backends without native streaming
    /// yield the whole reply as a single fragment.
    async fn stream(&self, history: &[ChatMessage]) -> ChatResult<FragmentStream> {
        let content = self.complete(history).await?;
        Ok(FragmentStream::once(content))
    }
}
