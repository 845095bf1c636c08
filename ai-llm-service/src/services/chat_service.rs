//! Provider-agnostic chat entry point.
//!
//! Dispatches to the concrete client chosen by `LlmModelConfig::provider`.

use tracing::instrument;

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::AiLlmError,
    services::{
        chat_message::ChatMessage, ollama_service::OllamaService, open_ai_service::OpenAiService,
    },
};

/// Chat client for whichever provider the config names.
#[derive(Debug, Clone)]
pub enum ChatService {
    OpenAi(OpenAiService),
    Ollama(OllamaService),
}

impl ChatService {
    /// Builds the provider-specific client.
    ///
    /// # Errors
    /// Propagates constructor validation of the selected client.
    pub fn new(cfg: LlmModelConfig) -> Result<Self, AiLlmError> {
        match cfg.provider {
            LlmProvider::DeepSeek | LlmProvider::OpenAI => Ok(Self::OpenAi(OpenAiService::new(cfg)?)),
            LlmProvider::Ollama => Ok(Self::Ollama(OllamaService::new(cfg)?)),
        }
    }

    /// Sends the complete message list and returns the reply text.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String, AiLlmError> {
        match self {
            Self::OpenAi(s) => s.chat(messages).await,
            Self::Ollama(s) => s.chat(messages).await,
        }
    }

    /// Convenience for the `[system, ...history, user]` layout used by every caller.
    #[instrument(level = "debug", skip_all, fields(history = history.len(), user_chars = user.chars().count()))]
    pub async fn complete(
        &self,
        system: &str,
        history: &[ChatMessage],
        user: &str,
    ) -> Result<String, AiLlmError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(user));
        self.chat(&messages).await
    }

    pub fn config(&self) -> &LlmModelConfig {
        match self {
            Self::OpenAi(s) => s.config(),
            Self::Ollama(s) => s.config(),
        }
    }
}
