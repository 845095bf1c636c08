use serde::Deserialize;

/// Per-request LLM credentials. Both fall back to the server environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmOverrides {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_provider: Option<String>,
}
