//! Resume cursor and review gate, persisted as a small JSON file.
//!
//! ```json
//! {
//!     "current_chapter": 10,
//!     "total_chapters": 120,
//!     "auto_mode": false,
//!     "review_milestone": 10,
//!     "last_success": true,
//!     "needs_review": true
//! }
//! ```
//!
//! `current_chapter` counts completed chunks, so it is also the index of the next chunk.
//! Every mutation is written through when the tracker has a backing file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use tracing::{debug, info, warn};

use crate::error::ProgressError;

pub const DEFAULT_REVIEW_MILESTONE: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressFile {
    pub current_chapter: u64,
    pub total_chapters: u64,
    pub auto_mode: bool,
    pub review_milestone: u64,
    pub last_success: bool,
    #[serde(default)]
    pub needs_review: bool,
    /// Checkpoints passed without confirmation in auto mode.
    #[serde(default)]
    pub reviews_completed: u64,
}

impl ProgressFile {
    pub fn new(total_chapters: u64) -> Self {
        Self {
            current_chapter: 0,
            total_chapters,
            auto_mode: false,
            review_milestone: DEFAULT_REVIEW_MILESTONE,
            last_success: true,
            needs_review: false,
            reviews_completed: 0,
        }
    }
}

/// A review milestone that was reached by the last completed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    /// Chunks completed when the milestone was hit.
    pub processed: u64,
    /// `false` when auto mode passed it through.
    pub awaiting_review: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    Idle,
    Processing,
    PausedForReview,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextTask {
    Process { chunk_index: u64 },
    AwaitReview { checkpoint: u64 },
    Finished,
}

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    path: Option<PathBuf>,
    state: ProgressFile,
    started: bool,
}

impl ProgressTracker {
    /// In-memory tracker, nothing is written to disk.
    pub fn new(total_chapters: u64) -> Self {
        Self {
            path: None,
            state: ProgressFile::new(total_chapters),
            started: false,
        }
    }

    /// Loads `path` if it exists, otherwise starts a fresh cursor for `total_chapters`
    /// chunks and writes it.
    pub fn load_or_init(path: impl Into<PathBuf>, total_chapters: u64) -> Result<Self, ProgressError> {
        let path = path.into();
        let state = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| ProgressError::Io {
                path: path.clone(),
                source,
            })?;
            let mut state: ProgressFile =
                serde_json::from_str(&raw).map_err(|source| ProgressError::Json {
                    path: path.clone(),
                    source,
                })?;
            if total_chapters > 0 {
                state.total_chapters = total_chapters;
            }
            debug!(path = %path.display(), cursor = state.current_chapter, "progress file loaded");
            state
        } else {
            info!(path = %path.display(), total_chapters, "creating progress file");
            ProgressFile::new(total_chapters)
        };
        let tracker = Self {
            path: Some(path),
            state,
            started: false,
        };
        tracker.save()?;
        Ok(tracker)
    }

    /// Writes the state as four-space indented JSON, creating parent directories.
    pub fn save(&self) -> Result<(), ProgressError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_pretty(path, &self.state)
    }

    pub fn state(&self) -> &ProgressFile {
        &self.state
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Chunks completed so far; the index of the next chunk.
    pub fn cursor(&self) -> u64 {
        self.state.current_chapter
    }

    pub fn set_auto_mode(&mut self, enabled: bool) -> Result<(), ProgressError> {
        self.state.auto_mode = enabled;
        self.save()
    }

    pub fn set_review_milestone(&mut self, milestone: u64) -> Result<(), ProgressError> {
        self.state.review_milestone = milestone;
        self.save()
    }

    pub fn set_total_chapters(&mut self, total: u64) -> Result<(), ProgressError> {
        if self.state.total_chapters == total {
            return Ok(());
        }
        self.state.total_chapters = total;
        self.save()
    }

    /// Moves the cursor without evaluating milestones, e.g. when restarting a run.
    pub fn sync_cursor(&mut self, cursor: u64) -> Result<(), ProgressError> {
        self.state.current_chapter = cursor;
        self.state.needs_review = false;
        self.state.last_success = true;
        self.save()
    }

    pub fn mark_started(&mut self) {
        self.started = true;
    }

    /// Records the outcome of chunk `index`.
    ///
    /// On success the cursor becomes `index + 1`; reaching a positive multiple of the
    /// review milestone returns a [`Checkpoint`]. On failure the cursor stays put and
    /// the chunk is not retried by the tracker.
    pub fn complete_chunk(
        &mut self,
        index: u64,
        success: bool,
    ) -> Result<Option<Checkpoint>, ProgressError> {
        self.started = true;
        if !success {
            self.state.last_success = false;
            warn!(chunk = index, "chunk failed");
            self.save()?;
            return Ok(None);
        }

        self.state.last_success = true;
        let checkpoint = self.advance(index);
        self.save()?;
        Ok(checkpoint)
    }

    /// Records a failed chunk that the run moves past instead of retrying.
    ///
    /// The cursor becomes `index + 1` and a milestone at that position still counts,
    /// while `last_success` reports the failure.
    pub fn pass_failed_chunk(&mut self, index: u64) -> Result<Option<Checkpoint>, ProgressError> {
        self.started = true;
        warn!(chunk = index, "chunk failed, moving on");
        let checkpoint = self.advance(index);
        self.state.last_success = false;
        self.save()?;
        Ok(checkpoint)
    }

    fn advance(&mut self, index: u64) -> Option<Checkpoint> {
        self.state.current_chapter = index + 1;
        let current = self.state.current_chapter;
        let milestone = self.state.review_milestone;
        if milestone == 0 || current % milestone != 0 {
            return None;
        }
        if self.state.auto_mode {
            self.state.reviews_completed += 1;
            info!(processed = current, "checkpoint passed in auto mode");
            Some(Checkpoint {
                processed: current,
                awaiting_review: false,
            })
        } else {
            self.state.needs_review = true;
            info!(processed = current, "checkpoint reached, waiting for review");
            Some(Checkpoint {
                processed: current,
                awaiting_review: true,
            })
        }
    }

    /// Clears the review gate.
    pub fn approve(&mut self) -> Result<(), ProgressError> {
        if self.state.needs_review {
            self.state.reviews_completed += 1;
        }
        self.state.needs_review = false;
        info!(processed = self.state.current_chapter, "milestone approved");
        self.save()
    }

    pub fn next_task(&self) -> NextTask {
        if self.state.needs_review {
            NextTask::AwaitReview {
                checkpoint: self.state.current_chapter,
            }
        } else if self.is_finished() {
            NextTask::Finished
        } else {
            NextTask::Process {
                chunk_index: self.state.current_chapter,
            }
        }
    }

    pub fn phase(&self) -> TrackerPhase {
        if self.state.needs_review {
            TrackerPhase::PausedForReview
        } else if !self.state.last_success {
            TrackerPhase::Failed
        } else if self.is_finished() {
            TrackerPhase::Completed
        } else if self.started {
            TrackerPhase::Processing
        } else {
            TrackerPhase::Idle
        }
    }

    fn is_finished(&self) -> bool {
        self.state.total_chapters > 0 && self.state.current_chapter >= self.state.total_chapters
    }
}

fn write_pretty(path: &Path, state: &ProgressFile) -> Result<(), ProgressError> {
    let io_err = |source| ProgressError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    state
        .serialize(&mut ser)
        .map_err(|source| ProgressError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    fs::write(path, buf).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_gate_at_interval_ten() {
        let mut tracker = ProgressTracker::new(30);
        for i in 0..9 {
            assert_eq!(tracker.complete_chunk(i, true).unwrap(), None);
            assert!(!tracker.state().needs_review);
        }
        let cp = tracker.complete_chunk(9, true).unwrap();
        assert_eq!(
            cp,
            Some(Checkpoint {
                processed: 10,
                awaiting_review: true
            })
        );
        assert!(tracker.state().needs_review);
        assert_eq!(tracker.next_task(), NextTask::AwaitReview { checkpoint: 10 });
        assert_eq!(tracker.phase(), TrackerPhase::PausedForReview);

        tracker.approve().unwrap();
        assert!(!tracker.state().needs_review);
        assert_eq!(tracker.next_task(), NextTask::Process { chunk_index: 10 });
    }

    #[test]
    fn auto_mode_records_checkpoint_without_gate() {
        let mut tracker = ProgressTracker::new(20);
        tracker.set_auto_mode(true).unwrap();
        for i in 0..20 {
            let cp = tracker.complete_chunk(i, true).unwrap();
            if let Some(cp) = cp {
                assert!(!cp.awaiting_review);
            }
        }
        assert_eq!(tracker.state().reviews_completed, 2);
        assert!(!tracker.state().needs_review);
        assert_eq!(tracker.next_task(), NextTask::Finished);
        assert_eq!(tracker.phase(), TrackerPhase::Completed);
    }

    #[test]
    fn failure_keeps_cursor() {
        let mut tracker = ProgressTracker::new(5);
        assert_eq!(tracker.phase(), TrackerPhase::Idle);
        tracker.complete_chunk(0, true).unwrap();
        tracker.complete_chunk(1, false).unwrap();
        assert_eq!(tracker.cursor(), 1);
        assert_eq!(tracker.phase(), TrackerPhase::Failed);
        assert_eq!(tracker.next_task(), NextTask::Process { chunk_index: 1 });
    }

    #[test]
    fn passed_failure_still_counts_milestone() {
        let mut tracker = ProgressTracker::new(4);
        tracker.set_auto_mode(true).unwrap();
        tracker.set_review_milestone(2).unwrap();
        tracker.complete_chunk(0, true).unwrap();
        let cp = tracker.pass_failed_chunk(1).unwrap();
        assert_eq!(
            cp,
            Some(Checkpoint {
                processed: 2,
                awaiting_review: false
            })
        );
        assert!(!tracker.state().last_success);
        assert_eq!(tracker.cursor(), 2);

        tracker.complete_chunk(2, true).unwrap();
        tracker.complete_chunk(3, true).unwrap();
        assert_eq!(tracker.state().reviews_completed, 2);
    }

    #[test]
    fn file_round_trip_and_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools").join("progress.json");

        let mut tracker = ProgressTracker::load_or_init(&path, 12).unwrap();
        tracker.complete_chunk(2, true).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("    \"current_chapter\": 3"));

        let reloaded = ProgressTracker::load_or_init(&path, 0).unwrap();
        assert_eq!(reloaded.state(), tracker.state());

        fs::write(
            &path,
            r#"{"current_chapter": 4, "total_chapters": 9, "auto_mode": true, "review_milestone": 2, "last_success": true}"#,
        )
        .unwrap();
        let legacy = ProgressTracker::load_or_init(&path, 0).unwrap();
        assert!(!legacy.state().needs_review);
        assert_eq!(legacy.next_task(), NextTask::Process { chunk_index: 4 });
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            ProgressTracker::load_or_init(&path, 1),
            Err(ProgressError::Json { .. })
        ));
    }
}
