pub mod chat_message;
pub mod chat_service;
pub mod ollama_service;
pub mod open_ai_service;
