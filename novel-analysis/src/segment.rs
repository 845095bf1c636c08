//! Novel segmentation.
//!
//! Two modes:
//! - **Fixed window**: whitespace runs are collapsed to a single space, then the text is
//!   cut into windows of `window` characters. Every window but the last is full.
//! - **Chapter**: chunk 0 is the preface (text before the first heading, possibly
//!   empty), then each chunk is one heading plus everything up to the next heading.
//!   Chapters are never split further, so chunk size is unbounded in this mode.
//!
//! [`Segments`] reports blank chunks as they are; skipping them is the caller's job.

use lazy_static::lazy_static;
use regex::Regex;

/// Default fixed-window size in characters.
pub const DEFAULT_WINDOW_CHARS: usize = 3000;

lazy_static! {
    /// `第十二章 …` / `第3回 …` / `Chapter 12 …`, up to the end of the heading line.
    static ref CHAPTER_HEADING: Regex = Regex::new(
        r"(?:第[0-9零一二三四五六七八九十百千万两〇]+[章回]|Chapter\s+[0-9]+)[^\n]*"
    )
    .unwrap();
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentMode {
    FixedWindow { window: usize },
    Chapter,
}

impl Default for SegmentMode {
    fn default() -> Self {
        SegmentMode::FixedWindow {
            window: DEFAULT_WINDOW_CHARS,
        }
    }
}

/// One unit of text sent to the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub content: String,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Collapses every whitespace run (including full-width spaces and newlines) to one space.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").into_owned()
}

/// Total number of chunks `text` yields in `mode`, without materializing them.
pub fn count_chunks(text: &str, mode: SegmentMode) -> usize {
    match mode {
        SegmentMode::FixedWindow { window } => {
            let chars = normalize_whitespace(text).chars().count();
            chars.div_ceil(window.max(1))
        }
        SegmentMode::Chapter => 1 + CHAPTER_HEADING.find_iter(text).count(),
    }
}

/// Lazy, finite chunk sequence over an owned copy of the text.
#[derive(Debug, Clone)]
pub struct Segments {
    text: String,
    mode: SegmentMode,
    /// Byte offset of the next chunk.
    cursor: usize,
    next_index: usize,
    done: bool,
}

impl Segments {
    pub fn new(text: &str, mode: SegmentMode) -> Self {
        let text = match mode {
            SegmentMode::FixedWindow { .. } => normalize_whitespace(text),
            SegmentMode::Chapter => text.to_string(),
        };
        Self {
            text,
            mode,
            cursor: 0,
            next_index: 0,
            done: false,
        }
    }

    /// Sequence positioned so that the first yielded chunk has `index`.
    pub fn resume_at(text: &str, mode: SegmentMode, index: usize) -> Self {
        let mut segments = Self::new(text, mode);
        for _ in 0..index {
            if segments.next().is_none() {
                break;
            }
        }
        segments
    }

    /// Index the next call to `next()` will yield.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    fn next_window(&mut self, window: usize) -> Option<String> {
        if self.cursor >= self.text.len() {
            return None;
        }
        let rest = &self.text[self.cursor..];
        let end = rest
            .char_indices()
            .nth(window.max(1))
            .map(|(i, _)| self.cursor + i)
            .unwrap_or(self.text.len());
        let piece = self.text[self.cursor..end].to_string();
        self.cursor = end;
        Some(piece)
    }

    fn next_chapter(&mut self) -> Option<String> {
        if self.next_index == 0 {
            // Preface: always emitted, even when empty.
            let end = CHAPTER_HEADING
                .find(&self.text)
                .map(|m| m.start())
                .unwrap_or(self.text.len());
            let piece = self.text[..end].to_string();
            self.cursor = end;
            return Some(piece);
        }

        if self.cursor >= self.text.len() {
            return None;
        }
        let heading = CHAPTER_HEADING.find_at(&self.text, self.cursor)?;
        let end = CHAPTER_HEADING
            .find_at(&self.text, heading.end())
            .map(|m| m.start())
            .unwrap_or(self.text.len());
        let piece = self.text[self.cursor..end].to_string();
        self.cursor = end;
        Some(piece)
    }
}

impl Iterator for Segments {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }
        let content = match self.mode {
            SegmentMode::FixedWindow { window } => self.next_window(window),
            SegmentMode::Chapter => self.next_chapter(),
        };
        match content {
            Some(content) => {
                let chunk = Chunk {
                    index: self.next_index,
                    content,
                };
                self.next_index += 1;
                Some(chunk)
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}
