use ai_llm_service::{
    AiLlmError,
    error_handler::{ProviderError, ProviderErrorKind},
};
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use game_store::StoreError;
use novel_analysis::{
    AnalysisError,
    error::{OracleError, PathError},
};
use thiserror::Error;
use tracing::error;

use crate::core::{
    app_state::ConfigError,
    http::response_envelope::{ApiErrorDetail, ApiResponse},
};

/// Public application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // --- Boot / config ---
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind listener")]
    Bind(#[source] std::io::Error),

    #[error("server error")]
    Server(#[source] std::io::Error),

    // --- Request / routing ---
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    // --- Lower layers ---
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Llm(#[from] AiLlmError),

    #[error("invalid upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("failed to store upload: {0}")]
    Upload(#[source] std::io::Error),

    /// The analyzer call for one chunk failed; the chunk stays pending.
    #[error("chunk {index} failed: {message}")]
    ChunkFailed { index: u64, message: String },
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Multipart(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::Store(StoreError::NotFound { .. }) => {
                StatusCode::NOT_FOUND
            }
            AppError::Analysis(AnalysisError::Path(_) | AnalysisError::Decode(_)) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Analysis(AnalysisError::Oracle(OracleError::Timeout(_))) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            AppError::Analysis(AnalysisError::Oracle(_)) => StatusCode::BAD_GATEWAY,
            AppError::Llm(AiLlmError::Config(_)) => StatusCode::BAD_REQUEST,
            AppError::Llm(AiLlmError::Provider(ProviderError { kind, .. })) => match kind {
                ProviderErrorKind::MissingApiKey
                | ProviderErrorKind::InvalidEndpoint(_)
                | ProviderErrorKind::InvalidProvider => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            },
            AppError::Llm(_) | AppError::ChunkFailed { .. } => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::Bind(_)
            | AppError::Server(_)
            | AppError::Store(_)
            | AppError::Analysis(_)
            | AppError::Upload(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Bind(_) => "BIND_ERROR",
            AppError::Server(_) => "SERVER_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Store(StoreError::NotFound { .. }) => "NOT_FOUND",
            AppError::Store(_) => "STORE_ERROR",
            AppError::Analysis(AnalysisError::Path(_)) => "INVALID_PATH",
            AppError::Analysis(AnalysisError::Decode(_)) => "UNSUPPORTED_ENCODING",
            AppError::Analysis(AnalysisError::Oracle(_)) => "LLM_ERROR",
            AppError::Analysis(_) => "ANALYSIS_ERROR",
            AppError::Llm(AiLlmError::Config(_)) => "LLM_CONFIG_ERROR",
            AppError::Llm(AiLlmError::Provider(ProviderError {
                kind: ProviderErrorKind::MissingApiKey,
                ..
            })) => "API_KEY_REQUIRED",
            AppError::Llm(_) => "LLM_ERROR",
            AppError::Multipart(_) => "INVALID_UPLOAD",
            AppError::Upload(_) => "UPLOAD_ERROR",
            AppError::ChunkFailed { .. } => "CHUNK_FAILED",
        }
    }

    fn details(&self) -> Vec<ApiErrorDetail> {
        match self {
            AppError::Analysis(AnalysisError::Path(err)) => {
                let hint = match err {
                    PathError::UnknownRoot(_) | PathError::Empty => {
                        "Path must start with world_setting, characters, story_tree, attributes, items or exploration.".to_string()
                    }
                    other => other.to_string(),
                };
                vec![ApiErrorDetail::field("modification.target_path", hint)]
            }
            AppError::Llm(AiLlmError::Provider(ProviderError {
                kind: ProviderErrorKind::MissingApiKey,
                ..
            })) => vec![ApiErrorDetail::field("api_key", "需要提供API Key")],
            AppError::ChunkFailed { index, .. } => vec![ApiErrorDetail::hint(format!(
                "Chunk {index} is still pending; continue the analysis to retry it."
            ))],
            _ => Vec::new(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, code = self.error_code(), "request failed");
        }
        ApiResponse::<()>::failure(self.error_code(), self.to_string(), self.details())
            .into_response_with_status(status)
    }
}

/// Handy result alias used across handlers.
pub type AppResult<T> = Result<T, AppError>;

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(err: axum::extract::rejection::JsonRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for AppError {
    fn from(err: axum::extract::rejection::QueryRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}
