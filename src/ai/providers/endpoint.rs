use super::{WireMessage, wire_messages};
use crate::ai::stream::{LineBuffer, SseDecoder};
use crate::ai::{ChatError, ChatResult, CompletionBackend, FragmentStream};
use crate::types::ChatMessage;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Any OpenAI-compatible chat completions endpoint.
pub struct EndpointBackend {
    client: Client,
    url: String,
    model: Option<String>,
    api_key: Option<String>,
    system_prompt: Option<String>,
}

impl EndpointBackend {
    pub fn new(
        url: String,
        model: Option<String>,
        api_key: Option<String>,
        system_prompt: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            url,
            model,
            api_key,
            system_prompt,
        }
    }

    async fn send(&self, history: &[ChatMessage], stream: bool) -> ChatResult<Response> {
        let messages = wire_messages(self.system_prompt.as_deref(), history);
        let mut request = self.client.post(&self.url).json(&EndpointRequest {
            model: self.model.as_deref(),
            messages: &messages,
            stream,
        });
        if stream {
            request = request.header("accept", "text/event-stream");
        }
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ChatError::new(format!("LLM endpoint error {status}: {body}")))
        }
    }
}

#[derive(Serialize)]
struct EndpointRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [WireMessage<'a>],
    stream: bool,
}

#[derive(Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct ChoiceDelta {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
    #[serde(default)]
    pub delta: Option<ChoiceDelta>,
}

#[derive(Deserialize)]
pub struct OpenAIShape {
    pub choices: Vec<Choice>,
}

#[derive(Deserialize)]
pub struct ContentOnly {
    pub content: String,
}

/// Describe an `error` member, which servers send either as a string or as
/// an object carrying `message`.
fn error_message(error: &Value) -> String {
    error
        .as_str()
        .or_else(|| error.get("message").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}

/// Parse one SSE `data:` payload into `(fragment, done)`.
///
/// An `error` member ends the reply with `Err`. Payloads that are not JSON or
/// match no known shape are logged and skipped.
pub fn parse_sse_data(data: &str) -> Option<ChatResult<(String, bool)>> {
    let trimmed = data.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed == "[DONE]" {
        return Some(Ok((String::new(), true)));
    }

    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, payload = trimmed, "skipping malformed stream event");
            return None;
        }
    };

    if let Some(error) = value.get("error").filter(|error| !error.is_null()) {
        return Some(Err(ChatError::new(format!(
            "LLM endpoint error: {}",
            error_message(error)
        ))));
    }

    if let Ok(parsed) = OpenAIShape::deserialize(&value) {
        let piece = parsed.choices.into_iter().next().and_then(|first| {
            first
                .delta
                .and_then(|delta| delta.content)
                .or_else(|| first.message.and_then(|msg| msg.content))
        });
        return Some(Ok((piece.unwrap_or_default(), false)));
    }

    if let Ok(parsed) = ContentOnly::deserialize(&value) {
        return Some(Ok((parsed.content, false)));
    }

    warn!(payload = trimmed, "skipping unrecognized stream event");
    None
}

fn parse_complete_body(body: String) -> String {
    if let Ok(parsed) = serde_json::from_str::<OpenAIShape>(&body)
        && let Some(content) = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|msg| msg.content)
    {
        return content;
    }
    if let Ok(parsed) = serde_json::from_str::<ContentOnly>(&body) {
        return parsed.content;
    }
    body
}

/// Forward every fragment of an SSE body; returns once `[DONE]` arrives or
/// the body ends, and fails on the first error event.
async fn pump_sse(
    response: Response,
    tx: &mpsc::UnboundedSender<ChatResult<String>>,
) -> ChatResult<()> {
    let mut lines = LineBuffer::default();
    let mut events = SseDecoder::default();
    let mut body = response.bytes_stream();

    // `Ok(true)` once the reply is over or nobody is listening.
    let forward = |data: String| -> ChatResult<bool> {
        let Some(parsed) = parse_sse_data(&data) else {
            return Ok(false);
        };
        let (piece, done) = parsed?;
        if !piece.is_empty() && tx.send(Ok(piece)).is_err() {
            return Ok(true);
        }
        Ok(done)
    };

    while let Some(item) = body.next().await {
        let bytes = item?;
        lines.push(&bytes);
        while let Some(line) = lines.next_line() {
            if let Some(data) = events.push_line(&line)
                && forward(data)?
            {
                return Ok(());
            }
        }
    }

    if let Some(line) = lines.finish()
        && let Some(data) = events.push_line(&line)
        && forward(data)?
    {
        return Ok(());
    }
    if let Some(data) = events.finish() {
        forward(data)?;
    }
    Ok(())
}

#[async_trait]
impl CompletionBackend for EndpointBackend {
    fn name(&self) -> &str {
        "endpoint"
    }

    async fn complete(&self, history: &[ChatMessage]) -> ChatResult<String> {
        let response = self.send(history, false).await?;
        let body = response.text().await?;
        Ok(parse_complete_body(body))
    }

    async fn stream(&self, history: &[ChatMessage]) -> ChatResult<FragmentStream> {
        let response = self.send(history, true).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            if let Err(err) = pump_sse(response, &tx).await {
                debug!(error = %err, "endpoint stream failed");
                let _ = tx.send(Err(err));
            }
        });
        Ok(FragmentStream::from_channel(rx))
    }
}
