//! Persistence for novel game projects.
//!
//! One SQLite file holds every project: the accumulated game design, the
//! per-chunk analysis cache the processor resumes from, player save slots,
//! creative chat sessions, author-defined custom content and the audit log of
//! creative edits.

pub mod errors;
pub mod models;
pub mod store;

pub use errors::{Result, StoreError};
pub use models::{
    ANONYMOUS_USER, CreativeSession, CustomContent, GameSave, ModificationLog, NewCustomContent,
    NewModificationLog, NewProject, ProjectRecord, ProjectSummary, SaveRequest, SaveSummary,
};
pub use store::Store;
