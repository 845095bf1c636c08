//! Runtime configuration loaded from environment variables.

use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::segment::{DEFAULT_WINDOW_CHARS, SegmentMode};

/// Knobs for one analysis run. All fields have defaults via [`AnalysisConfig::from_env`].
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisConfig {
    /// Characters per chunk in fixed-window mode (`CHUNK_SIZE`).
    pub chunk_size: usize,
    /// Chunks between periodic summaries in fixed-window mode (`SUMMARY_INTERVAL`).
    pub summary_interval: usize,
    /// Chunks between review checkpoints (`REVIEW_INTERVAL`).
    pub review_interval: u64,
    /// Split by chapter headings instead of fixed windows.
    pub chapter_mode: bool,
    /// Pass checkpoints without operator confirmation and skip failed chunks.
    pub auto_approve: bool,
    /// Directory with prompt overrides (`PROMPT_DIR`).
    pub prompt_dir: Option<PathBuf>,
    /// Upper bound for one oracle call (`LLM_TIMEOUT_SECS`).
    pub oracle_timeout: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_WINDOW_CHARS,
            summary_interval: 10,
            review_interval: 10,
            chapter_mode: false,
            auto_approve: false,
            prompt_dir: None,
            oracle_timeout: Duration::from_secs(120),
        }
    }
}

impl AnalysisConfig {
    /// Build from environment variables, falling back to defaults for unset or
    /// unparsable values.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            chunk_size: parse("CHUNK_SIZE", d.chunk_size).max(1),
            summary_interval: parse("SUMMARY_INTERVAL", d.summary_interval).max(1),
            review_interval: parse("REVIEW_INTERVAL", d.review_interval),
            chapter_mode: env("CHAPTER_MODE", "false") == "true",
            auto_approve: env("AUTO_APPROVE", "false") == "true",
            prompt_dir: std::env::var("PROMPT_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            oracle_timeout: Duration::from_secs(parse("LLM_TIMEOUT_SECS", 120u64)),
        }
    }

    pub fn segment_mode(&self) -> SegmentMode {
        if self.chapter_mode {
            SegmentMode::Chapter
        } else {
            SegmentMode::FixedWindow {
                window: self.chunk_size,
            }
        }
    }
}

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
