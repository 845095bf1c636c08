use std::{fmt, str::FromStr};

use crate::error_handler::ConfigError;

/// Represents the provider (backend) used for chat-completion inference.
///
/// DeepSeek and OpenAI share the OpenAI-compatible `/chat/completions`
/// wire format; Ollama uses its native `/api/chat` endpoint.
///
/// # Examples
///
/// ```
/// use ai_llm_service::LlmProvider;
///
/// let provider: LlmProvider = "deepseek".parse().unwrap();
/// assert_eq!(provider.default_model(), "deepseek-chat");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmProvider {
    /// DeepSeek hosted API (OpenAI-compatible).
    DeepSeek,
    /// OpenAI's ChatGPT API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

impl LlmProvider {
    /// Base URL used when `LLM_ENDPOINT` is not set.
    pub fn default_endpoint(self) -> &'static str {
        match self {
            LlmProvider::DeepSeek => "https://api.deepseek.com/v1",
            LlmProvider::OpenAI => "https://api.openai.com/v1",
            LlmProvider::Ollama => "http://localhost:11434",
        }
    }

    /// Model used when `LLM_MODEL` is not set.
    pub fn default_model(self) -> &'static str {
        match self {
            LlmProvider::DeepSeek => "deepseek-chat",
            LlmProvider::OpenAI => "gpt-4",
            LlmProvider::Ollama => "qwen3:14b",
        }
    }

    /// Provider-specific API key variable consulted after `LLM_API_KEY`.
    pub fn api_key_var(self) -> Option<&'static str> {
        match self {
            LlmProvider::DeepSeek => Some("DEEPSEEK_API_KEY"),
            LlmProvider::OpenAI => Some("OPENAI_API_KEY"),
            LlmProvider::Ollama => None,
        }
    }

    /// Whether requests must carry a bearer token.
    pub fn requires_api_key(self) -> bool {
        !matches!(self, LlmProvider::Ollama)
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LlmProvider::DeepSeek => "deepseek",
            LlmProvider::OpenAI => "openai",
            LlmProvider::Ollama => "ollama",
        };
        f.write_str(s)
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deepseek" => Ok(LlmProvider::DeepSeek),
            "openai" | "chatgpt" => Ok(LlmProvider::OpenAI),
            "ollama" => Ok(LlmProvider::Ollama),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}
