mod endpoint;
mod ollama;
mod rig;
#[cfg(test)]
mod testing;

pub use endpoint::{EndpointBackend, parse_sse_data};
pub use ollama::{OllamaBackend, parse_ollama_stream_line};
pub use rig::RigBackend;

use super::CompletionBackend;
use crate::config::ProviderConfig;
use crate::types::ChatMessage;
use serde::Serialize;

/// `{role, content}` pair as sent over the wire; unlike [`ChatMessage`] it
/// can carry the system preamble.
#[derive(Debug, Serialize)]
pub(crate) struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

pub(crate) fn wire_messages<'a>(
    system_prompt: Option<&'a str>,
    history: &'a [ChatMessage],
) -> Vec<WireMessage<'a>> {
    let system = system_prompt.map(|content| WireMessage {
        role: "system",
        content,
    });
    system
        .into_iter()
        .chain(history.iter().map(|msg| WireMessage {
            role: msg.role.as_str(),
            content: &msg.content,
        }))
        .collect()
}

/// Build the backend selected by the configuration.
pub(crate) fn connect(
    provider: &ProviderConfig,
    system_prompt: Option<String>,
) -> Box<dyn CompletionBackend> {
    match provider {
        ProviderConfig::Endpoint {
            url,
            model,
            api_key,
        } => Box::new(EndpointBackend::new(
            url.clone(),
            model.clone(),
            api_key.clone(),
            system_prompt,
        )),
        ProviderConfig::Gemini { api_key, model } => {
            Box::new(RigBackend::gemini(api_key, model.clone(), system_prompt))
        }
        ProviderConfig::OpenAI { api_key, model } => {
            Box::new(RigBackend::openai(api_key, model.clone(), system_prompt))
        }
        ProviderConfig::Anthropic { api_key, model } => {
            Box::new(RigBackend::anthropic(api_key, model.clone(), system_prompt))
        }
        ProviderConfig::Ollama { host, model } => {
            Box::new(OllamaBackend::new(host, model.clone(), system_prompt))
        }
    }
}
