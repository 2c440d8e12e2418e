use super::{WireMessage, wire_messages};
use crate::ai::stream::LineBuffer;
use crate::ai::{ChatError, ChatResult, CompletionBackend, FragmentStream};
use crate::types::ChatMessage;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub struct OllamaBackend {
    client: Client,
    model: String,
    endpoint: String,
    system_prompt: Option<String>,
}

impl OllamaBackend {
    pub fn new(host: &str, model: String, system_prompt: Option<String>) -> Self {
        Self {
            client: Client::new(),
            model,
            endpoint: format!("{}/api/chat", host.trim_end_matches('/')),
            system_prompt,
        }
    }

    async fn send(&self, history: &[ChatMessage], stream: bool) -> ChatResult<Response> {
        let messages = wire_messages(self.system_prompt.as_deref(), history);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&OllamaChatRequest {
                model: &self.model,
                messages: &messages,
                stream,
            })
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ChatError::new(format!("Ollama error {status}: {body}")))
        }
    }
}

#[derive(serde::Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage<'a>],
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaMessage>,
}

#[derive(Deserialize, Debug)]
pub struct StreamChunkMessage {
    pub content: String,
}

#[derive(Deserialize, Debug)]
pub struct StreamChunk {
    pub message: Option<StreamChunkMessage>,
    pub done: Option<bool>,
    pub error: Option<String>,
}

/// Parse one JSONL line of an Ollama chat stream into `(fragment, done)`.
/// Lines that are not valid chunks are logged and skipped.
pub fn parse_ollama_stream_line(line_with_ws: &str) -> Option<ChatResult<(String, bool)>> {
    let line = line_with_ws.trim();
    if line.is_empty() {
        return None;
    }
    let parsed = match serde_json::from_str::<StreamChunk>(line) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(error = %err, line, "skipping malformed ollama stream line");
            return None;
        }
    };
    if let Some(error) = parsed.error {
        return Some(Err(ChatError::new(format!("Ollama error: {error}"))));
    }
    let piece = parsed.message.map(|msg| msg.content).unwrap_or_default();
    Some(Ok((piece, parsed.done.unwrap_or(false))))
}

async fn pump_jsonl(
    response: Response,
    tx: &mpsc::UnboundedSender<ChatResult<String>>,
) -> ChatResult<()> {
    let mut lines = LineBuffer::default();
    let mut body = response.bytes_stream();

    while let Some(item) = body.next().await {
        lines.push(&item?);
        while let Some(line) = lines.next_line() {
            if let Some(parsed) = parse_ollama_stream_line(&line) {
                let (piece, done) = parsed?;
                if !piece.is_empty() && tx.send(Ok(piece)).is_err() {
                    return Ok(());
                }
                if done {
                    return Ok(());
                }
            }
        }
    }

    if let Some(line) = lines.finish()
        && let Some(parsed) = parse_ollama_stream_line(&line)
    {
        let (piece, _) = parsed?;
        if !piece.is_empty() {
            let _ = tx.send(Ok(piece));
        }
    }
    Ok(())
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, history: &[ChatMessage]) -> ChatResult<String> {
        let response = self.send(history, false).await?;
        let body = response.text().await?;
        match serde_json::from_str::<OllamaChatResponse>(&body) {
            Ok(parsed) => Ok(parsed.message.map(|msg| msg.content).unwrap_or(body)),
            Err(_) => Ok(body),
        }
    }

    async fn stream(&self, history: &[ChatMessage]) -> ChatResult<FragmentStream> {
        let response = self.send(history, true).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            if let Err(err) = pump_jsonl(response, &tx).await {
                debug!(error = %err, "ollama stream failed");
                let _ = tx.send(Err(err));
            }
        });
        Ok(FragmentStream::from_channel(rx))
    }
}
