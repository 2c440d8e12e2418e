//! Start-up configuration read from the process environment.
//!
//! Values come from real environment variables first (a `.env` file is
//! loaded into the environment by [`load_dotenv`]) and fall back to the
//! bundled `assets/config.env`. Empty values count as unset.

use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Bundled defaults for builds without a writable environment (wasm, mobile)
const BUNDLED_CONFIG: &str = include_str!("../assets/config.env");

const DB_FILE_NAME: &str = "chatbot.db";

pub const GEMINI_DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const ANTHROPIC_DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const OLLAMA_DEFAULT_MODEL: &str = "llama3.1:latest";
pub const OLLAMA_DEFAULT_HOST: &str = "http://127.0.0.1:11434";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "No AI provider configured. Set LLM_ENDPOINT, GOOGLE_API_KEY, OPENAI_API_KEY, ANTHROPIC_API_KEY, or LLM_USE_OLLAMA=true"
    )]
    NoProvider,
}

/// Which completion backend to talk to, with its credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    Endpoint {
        url: String,
        api_key: Option<String>,
        model: Option<String>,
    },
    Gemini {
        api_key: String,
        model: String,
    },
    OpenAI {
        api_key: String,
        model: String,
    },
    Anthropic {
        api_key: String,
        model: String,
    },
    Ollama {
        host: String,
        model: String,
    },
}

impl ProviderConfig {
    /// Pick a provider. Priority order:
    /// 1. LLM_ENDPOINT → OpenAI-compatible endpoint
    /// 2. GOOGLE_API_KEY → Gemini
    /// 3. OPENAI_API_KEY → OpenAI
    /// 4. ANTHROPIC_API_KEY → Claude
    /// 5. LLM_USE_OLLAMA=true → Ollama
    pub fn detect(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let model_or =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        if let Some(url) = lookup("LLM_ENDPOINT") {
            return Ok(Self::Endpoint {
                url,
                api_key: lookup("LLM_API_KEY"),
                model: lookup("LLM_MODEL"),
            });
        }

        if let Some(api_key) = lookup("GOOGLE_API_KEY") {
            return Ok(Self::Gemini {
                api_key,
                model: model_or("GEMINI_MODEL", GEMINI_DEFAULT_MODEL),
            });
        }

        if let Some(api_key) = lookup("OPENAI_API_KEY") {
            return Ok(Self::OpenAI {
                api_key,
                model: model_or("OPENAI_MODEL", OPENAI_DEFAULT_MODEL),
            });
        }

        if let Some(api_key) = lookup("ANTHROPIC_API_KEY") {
            return Ok(Self::Anthropic {
                api_key,
                model: model_or("ANTHROPIC_MODEL", ANTHROPIC_DEFAULT_MODEL),
            });
        }

        let use_ollama = lookup("LLM_USE_OLLAMA")
            .unwrap_or_default()
            .to_ascii_lowercase();
        if matches!(use_ollama.as_str(), "1" | "true" | "yes" | "on") {
            return Ok(Self::Ollama {
                host: model_or("OLLAMA_HOST", OLLAMA_DEFAULT_HOST),
                model: model_or("LLM_MODEL", OLLAMA_DEFAULT_MODEL),
            });
        }

        Err(ConfigError::NoProvider)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Endpoint { .. } => "endpoint",
            Self::Gemini { .. } => "gemini",
            Self::OpenAI { .. } => "openai",
            Self::Anthropic { .. } => "anthropic",
            Self::Ollama { .. } => "ollama",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub provider: ProviderConfig,
    pub system_prompt: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bundled = parse_env_file(BUNDLED_CONFIG);
        Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .or_else(|| bundled.get(key).cloned())
        })
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let provider = ProviderConfig::detect(&lookup)?;
        let db_path = lookup("CHAT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);

        Ok(Self {
            db_path,
            provider,
            system_prompt: lookup("CHAT_SYSTEM_PROMPT"),
        })
    }
}

/// `<local data dir>/threadline/chatbot.db`, or `./chatbot.db` when the
/// platform has no such directory.
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("threadline").join(DB_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(DB_FILE_NAME))
}

/// Parse `KEY=VALUE` lines, skipping blanks and `#` comments.
pub fn parse_env_file(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim().trim_matches('"');
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

/// Load a `.env` file into the process environment when one exists.
#[cfg(not(target_arch = "wasm32"))]
pub fn load_dotenv() -> bool {
    dotenvy::dotenv().is_ok()
}

#[cfg(target_arch = "wasm32")]
pub fn load_dotenv() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn endpoint_wins_over_hosted_keys() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("LLM_ENDPOINT", "http://localhost:8080/v1/chat/completions"),
            ("LLM_API_KEY", "secret"),
            ("OPENAI_API_KEY", "sk-test"),
        ]))
        .unwrap();
        assert_eq!(
            config.provider,
            ProviderConfig::Endpoint {
                url: "http://localhost:8080/v1/chat/completions".to_string(),
                api_key: Some("secret".to_string()),
                model: None,
            }
        );
    }

    #[test]
    fn hosted_providers_fill_default_models() {
        let config =
            AppConfig::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(
            config.provider,
            ProviderConfig::OpenAI {
                api_key: "sk-test".to_string(),
                model: OPENAI_DEFAULT_MODEL.to_string(),
            }
        );

        let config = AppConfig::from_lookup(lookup_from(&[
            ("GOOGLE_API_KEY", "g-key"),
            ("ANTHROPIC_API_KEY", "a-key"),
            ("GEMINI_MODEL", "gemini-2.0-flash"),
        ]))
        .unwrap();
        assert_eq!(config.provider.label(), "gemini");
        assert!(matches!(
            config.provider,
            ProviderConfig::Gemini { ref model, .. } if model == "gemini-2.0-flash"
        ));
    }

    #[test]
    fn ollama_requires_truthy_flag() {
        let err = AppConfig::from_lookup(lookup_from(&[("LLM_USE_OLLAMA", "no")])).unwrap_err();
        assert_eq!(err, ConfigError::NoProvider);

        let config = AppConfig::from_lookup(lookup_from(&[("LLM_USE_OLLAMA", "Yes")])).unwrap();
        assert_eq!(
            config.provider,
            ProviderConfig::Ollama {
                host: OLLAMA_DEFAULT_HOST.to_string(),
                model: OLLAMA_DEFAULT_MODEL.to_string(),
            }
        );
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("LLM_ENDPOINT", "  "),
            ("ANTHROPIC_API_KEY", "a-key"),
            ("CHAT_SYSTEM_PROMPT", ""),
            ("CHAT_DB_PATH", "/tmp/threads.db"),
        ]))
        .unwrap();
        assert_eq!(config.provider.label(), "anthropic");
        assert_eq!(config.system_prompt, None);
        assert_eq!(config.db_path, PathBuf::from("/tmp/threads.db"));
    }

    #[test]
    fn default_db_path_ends_with_file_name() {
        let config = AppConfig::from_lookup(lookup_from(&[("OPENAI_API_KEY", "k")])).unwrap();
        assert!(config.db_path.ends_with(DB_FILE_NAME));
    }

    #[test]
    fn parses_env_file_lines() {
        let parsed = parse_env_file(
            "# comment\n\nLLM_MODEL = llama3.1:latest\nCHAT_SYSTEM_PROMPT=\"Be brief.\"\nnot a pair\n",
        );
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["LLM_MODEL"], "llama3.1:latest");
        assert_eq!(parsed["CHAT_SYSTEM_PROMPT"], "Be brief.");
    }
}
