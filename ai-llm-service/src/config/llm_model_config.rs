use crate::config::llm_provider::LlmProvider;

/// Configuration for a chat-completion model.
///
/// # Fields
///
/// - `provider`: Which backend to use (DeepSeek, OpenAI, Ollama).
/// - `model`: The model identifier (e.g., `"deepseek-chat"`, `"gpt-4"`).
/// - `endpoint`: Base URL; the client appends the provider's chat path.
/// - `api_key`: Bearer token for hosted providers.
/// - `max_tokens`: Maximum number of tokens to generate.
/// - `temperature`: Controls randomness (0.0 = deterministic).
/// - `top_p`: Nucleus sampling cutoff.
/// - `timeout_secs`: Request timeout in seconds.
///
/// # Examples
///
/// ```
/// use ai_llm_service::{LlmModelConfig, LlmProvider};
///
/// let cfg = LlmModelConfig::for_provider(LlmProvider::DeepSeek, Some("sk-...".into()))
///     .with_temperature(0.7);
/// assert_eq!(cfg.endpoint, "https://api.deepseek.com/v1");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LlmModelConfig {
    /// The LLM provider/backend.
    pub provider: LlmProvider,

    /// Model identifier string.
    pub model: String,

    /// Inference endpoint base URL.
    pub endpoint: String,

    /// Optional API key for authentication.
    pub api_key: Option<String>,

    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,

    /// Optional request timeout (in seconds).
    pub timeout_secs: Option<u64>,
}

impl LlmModelConfig {
    /// Default extraction settings for `provider`: low temperature, 4000 output
    /// tokens and a 120 second timeout.
    pub fn for_provider(provider: LlmProvider, api_key: Option<String>) -> Self {
        Self {
            provider,
            model: provider.default_model().to_string(),
            endpoint: provider.default_endpoint().to_string(),
            api_key,
            max_tokens: Some(4000),
            temperature: Some(0.3),
            top_p: None,
            timeout_secs: Some(120),
        }
    }

    /// Returns a copy with a different sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Returns a copy with a different request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}
