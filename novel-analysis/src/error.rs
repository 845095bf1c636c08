//! Error types for the analysis pipeline.
//!
//! [`AnalysisError`] is the crate-wide error. The nested kinds map to the failure
//! classes of a run:
//! - [`DecodeError`]: the novel bytes match none of the supported encodings (fatal).
//! - [`OracleError`]: transport failure, timeout or cancellation of an LLM call.
//! - [`ShapeError`]: the LLM replied with JSON of an unexpected shape (recoverable).
//! - [`ProgressError`]: the on-disk progress file could not be read or written.
//! - [`PathError`]: a dotted-path modification was rejected.

use std::{path::PathBuf, time::Duration};

use ai_llm_service::AiLlmError;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Root error for `novel-analysis`.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    Path(#[from] PathError),

    /// Failure reported by the persistence layer.
    #[error("[Novel Analysis] repository error: {0}")]
    Repository(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Reading the novel file failed.
    #[error("[Novel Analysis] cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AnalysisError {
    pub fn repository<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AnalysisError::Repository(Box::new(err))
    }
}

/// None of the candidate encodings decoded the input without errors.
#[derive(Debug, Error)]
#[error("[Novel Analysis] unable to decode novel text, tried: {}", tried.join(", "))]
pub struct DecodeError {
    pub tried: Vec<&'static str>,
}

/// Failure of a single oracle call.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error(transparent)]
    Transport(#[from] AiLlmError),

    #[error("[Novel Analysis] oracle call timed out after {0:?}")]
    Timeout(Duration),

    #[error("[Novel Analysis] oracle call cancelled")]
    Cancelled,

    /// The oracle could not be reached or refused the request.
    #[error("[Novel Analysis] oracle unavailable: {0}")]
    Unavailable(String),
}

/// A structured reply whose keys do not match the discovery schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("[Novel Analysis] unexpected analysis shape at `{path}`: {reason}")]
pub struct ShapeError {
    pub path: String,
    pub reason: String,
}

impl ShapeError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Progress file I/O.
#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("[Novel Analysis] progress file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[Novel Analysis] progress file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Rejected dotted-path access.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("[Novel Analysis] target path is empty")]
    Empty,

    #[error("[Novel Analysis] `{0}` is not an editable project field")]
    UnknownRoot(String),

    #[error("[Novel Analysis] invalid list index `{segment}` in `{path}`")]
    InvalidIndex { path: String, segment: String },

    #[error("[Novel Analysis] `{segment}` in `{path}` does not address an object or list")]
    NotContainer { path: String, segment: String },

    /// The edited document no longer deserializes into a project.
    #[error("[Novel Analysis] modification produces an invalid project: {0}")]
    Invalid(#[from] serde_json::Error),
}
