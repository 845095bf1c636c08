//! LLM config resolved from environment variables, with optional per-request overrides.
//!
//! # Environment variables
//!
//! - `LLM_PROVIDER`     = `deepseek` (default), `openai`/`chatgpt`, `ollama`
//! - `LLM_API_KEY`      = API key; falls back to `DEEPSEEK_API_KEY` / `OPENAI_API_KEY`
//! - `LLM_MODEL`        = model name (provider default otherwise)
//! - `LLM_ENDPOINT`     = base URL (provider default otherwise)
//! - `LLM_MAX_TOKENS`   = optional max tokens (u32, default 4000)
//! - `LLM_TEMPERATURE`  = optional temperature (f32, default 0.3)
//! - `LLM_TIMEOUT_SECS` = optional request timeout (u64, default 120)

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{
        ConfigError, Result, env_opt_f32, env_opt_u32, env_opt_u64, opt_env,
        validate_http_endpoint, validate_range_f32,
    },
};

/// Builds the config purely from environment variables.
///
/// # Errors
/// See [`config_with_overrides`].
pub fn config_from_env() -> Result<LlmModelConfig> {
    config_with_overrides(None, None)
}

/// Builds the config from environment variables, letting the caller override the
/// provider name and API key (CLI flags, request bodies).
///
/// An explicitly supplied key wins over every environment variable. Missing keys
/// are not rejected here; the hosted clients reject them on construction so a
/// server can start without a key and receive one per request.
///
/// # Errors
/// - [`ConfigError::UnsupportedProvider`] for an unknown provider name
/// - [`ConfigError::InvalidNumber`] for unparsable numeric variables
/// - [`ConfigError::InvalidFormat`] if `LLM_ENDPOINT` is not an http(s) URL
/// - [`ConfigError::OutOfRange`] if the temperature is outside `[0, 2]`
/// - [`ConfigError::EmptyModel`] if the resolved model name is blank
pub fn config_with_overrides(
    provider: Option<&str>,
    api_key: Option<String>,
) -> Result<LlmModelConfig> {
    let provider: LlmProvider = match provider.map(str::to_owned).or_else(|| opt_env("LLM_PROVIDER")) {
        Some(name) => name.parse()?,
        None => LlmProvider::DeepSeek,
    };

    let api_key = api_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| opt_env("LLM_API_KEY"))
        .or_else(|| provider.api_key_var().and_then(opt_env));

    let mut cfg = LlmModelConfig::for_provider(provider, api_key);

    if let Some(model) = std::env::var("LLM_MODEL").ok() {
        if model.trim().is_empty() {
            return Err(ConfigError::EmptyModel.into());
        }
        cfg.model = model.trim().to_string();
    }

    if let Some(endpoint) = opt_env("LLM_ENDPOINT") {
        validate_http_endpoint("LLM_ENDPOINT", endpoint.trim())?;
        cfg.endpoint = endpoint.trim().to_string();
    }

    if let Some(max_tokens) = env_opt_u32("LLM_MAX_TOKENS")? {
        cfg.max_tokens = Some(max_tokens);
    }

    if let Some(temperature) = env_opt_f32("LLM_TEMPERATURE")? {
        validate_range_f32("temperature", temperature, 0.0, 2.0)?;
        cfg.temperature = Some(temperature);
    }

    if let Some(timeout) = env_opt_u64("LLM_TIMEOUT_SECS")? {
        cfg.timeout_secs = Some(timeout);
    }

    Ok(cfg)
}
