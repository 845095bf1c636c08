//! Shared LLM client used by the novel analysis pipeline and the creative agent.
//!
//! - [`config`] builds an [`LlmModelConfig`] from environment variables or explicit overrides.
//! - [`services::chat_service::ChatService`] dispatches chat completions to the configured provider.
//! - [`error_handler`] holds the unified [`AiLlmError`] type.
//! - [`telemetry`] installs the process-wide tracing subscriber for binaries.

pub mod config;
pub mod error_handler;
pub mod services;
pub mod telemetry;

pub use config::llm_model_config::LlmModelConfig;
pub use config::llm_provider::LlmProvider;
pub use error_handler::{AiLlmError, Result};
pub use services::chat_message::{ChatMessage, ChatRole};
pub use services::chat_service::ChatService;
