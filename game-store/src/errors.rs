use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("[Game Store] sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("[Game Store] stored JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("[Game Store] cannot prepare database directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[Game Store] {entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },

    #[error("[Game Store] connection lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
