use crate::ai::{ChatError, ChatResult, CompletionBackend};
use crate::types::{ChatMessage, Role};
use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Chat;
use rig::message::Message;
use rig::providers::{anthropic, gemini, openai};

const MAX_TOKENS: u64 = 4096;
const TEMPERATURE: f64 = 0.7;

pub enum RigProvider {
    Gemini(gemini::Client),
    OpenAI(openai::Client),
    Anthropic(anthropic::Client),
}

/// Hosted models reached through Rig. Replies arrive whole, so streaming
/// falls back to a single fragment.
pub struct RigBackend {
    provider: RigProvider,
    model: String,
    preamble: Option<String>,
}

impl RigBackend {
    pub fn gemini(api_key: &str, model: String, preamble: Option<String>) -> Self {
        Self {
            provider: RigProvider::Gemini(gemini::Client::new(api_key)),
            model,
            preamble,
        }
    }

    pub fn openai(api_key: &str, model: String, preamble: Option<String>) -> Self {
        Self {
            provider: RigProvider::OpenAI(openai::Client::new(api_key)),
            model,
            preamble,
        }
    }

    pub fn anthropic(api_key: &str, model: String, preamble: Option<String>) -> Self {
        Self {
            provider: RigProvider::Anthropic(anthropic::Client::new(api_key)),
            model,
            preamble,
        }
    }
}

/// Split the history into the pending user prompt and the earlier turns in
/// Rig's message format.
fn split_prompt(history: &[ChatMessage]) -> ChatResult<(&str, Vec<Message>)> {
    let (last, earlier) = history
        .split_last()
        .ok_or_else(|| ChatError::new("No messages provided"))?;
    if last.role != Role::User {
        return Err(ChatError::new("The last message must come from the user"));
    }

    let rig_history = earlier
        .iter()
        .map(|msg| match msg.role {
            Role::User => Message::user(&msg.content),
            Role::Assistant => Message::assistant(&msg.content),
        })
        .collect();
    Ok((&last.content, rig_history))
}

#[async_trait]
impl CompletionBackend for RigBackend {
    fn name(&self) -> &str {
        match self.provider {
            RigProvider::Gemini(_) => "gemini",
            RigProvider::OpenAI(_) => "openai",
            RigProvider::Anthropic(_) => "anthropic",
        }
    }

    async fn complete(&self, history: &[ChatMessage]) -> ChatResult<String> {
        let (prompt, rig_history) = split_prompt(history)?;

        let reply = match &self.provider {
            RigProvider::Gemini(client) => {
                let mut builder = client.agent(&self.model).max_tokens(MAX_TOKENS);
                if let Some(preamble) = &self.preamble {
                    builder = builder.preamble(preamble);
                }
                builder.build().chat(prompt, rig_history).await
            }
            RigProvider::OpenAI(client) => {
                let mut builder = client
                    .agent(&self.model)
                    .max_tokens(MAX_TOKENS)
                    .temperature(TEMPERATURE);
                if let Some(preamble) = &self.preamble {
                    builder = builder.preamble(preamble);
                }
                builder.build().chat(prompt, rig_history).await
            }
            RigProvider::Anthropic(client) => {
                let mut builder = client
                    .agent(&self.model)
                    .max_tokens(MAX_TOKENS)
                    .temperature(TEMPERATURE);
                if let Some(preamble) = &self.preamble {
                    builder = builder.preamble(preamble);
                }
                builder.build().chat(prompt, rig_history).await
            }
        };

        reply.map_err(|err| ChatError::new(format!("{} error: {err}", self.name())))
    }
}
