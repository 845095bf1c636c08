pub mod llm_overrides;
pub mod response_envelope;
pub mod user_key;
