//! Novel → game design pipeline.
//!
//! The pipeline is a strictly sequential loop over the chunks of one novel:
//!
//! 1) **Segmenter** ([`segment`]) splits the decoded text ([`text`]) into fixed
//!    character windows or chapter-heading chunks.
//! 2) **Context accumulator** ([`context`]) threads a rolling context value through
//!    every step; updates are pure so a resumed run can replay cached results.
//! 3) **Extraction oracle** ([`oracle`]) asks the LLM for a JSON analysis of the chunk.
//!    Replies are validated at the boundary ([`discovery`]).
//! 4) **Merge** ([`merge`]) folds discoveries into the durable [`state::ProjectState`].
//! 5) **Progress tracker** ([`progress`]) advances the cursor and gates review checkpoints.
//!
//! [`processor::NovelProcessor`] drives steps 1–5, [`finalize`] turns the accumulated
//! design into story/attribute/item/exploration systems, [`creative`] backs the chat
//! assistant and [`edit`] applies dotted-path modifications to a project document.
//!
//! Chunk N's oracle call always completes and merges before chunk N+1 is sent, because
//! the accumulated context of N feeds the prompt of N+1.

pub mod config;
pub mod context;
pub mod creative;
pub mod discovery;
pub mod edit;
pub mod error;
pub mod finalize;
pub mod merge;
pub mod oracle;
pub mod processor;
pub mod progress;
pub mod prompts;
pub mod repository;
pub mod segment;
pub mod state;
pub mod text;

pub use config::AnalysisConfig;
pub use context::{AccumulatedContext, NarrativeStage};
pub use discovery::{ChunkAnalysis, Discovery, OracleReply};
pub use error::{AnalysisError, Result};
pub use oracle::{LlmOracle, SharedOracle};
pub use processor::{NovelProcessor, RunOutcome, StepOutcome};
pub use progress::{NextTask, ProgressTracker};
pub use repository::AnalysisRepository;
pub use segment::{Chunk, SegmentMode, Segments};
pub use state::{AnalysisStatus, ProjectState};
