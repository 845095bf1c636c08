//! Novel text decoding.
//!
//! Uploaded novels come in whatever encoding the author's editor used. Candidates are
//! tried in a fixed order and the first one that decodes without malformed sequences
//! wins:
//!
//! 1. byte-order mark (UTF-8, UTF-16LE, UTF-16BE)
//! 2. UTF-8
//! 3. GBK (also covers GB2312, which it extends)
//! 4. UTF-16LE, then UTF-16BE

use std::{borrow::Cow, path::Path};

use encoding_rs::{Encoding, GBK, UTF_8, UTF_16BE, UTF_16LE};
use tracing::debug;

use crate::error::{AnalysisError, DecodeError};

fn candidates() -> [(&'static str, &'static Encoding); 4] {
    [
        ("utf-8", UTF_8),
        ("gbk", GBK),
        ("utf-16le", UTF_16LE),
        ("utf-16be", UTF_16BE),
    ]
}

/// Decodes raw novel bytes into text.
///
/// # Errors
/// Returns [`DecodeError`] listing every encoding that was tried.
pub fn decode_novel(bytes: &[u8]) -> Result<String, DecodeError> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        if let Some(text) = strict_decode(encoding, &bytes[bom_len..]) {
            debug!(encoding = encoding.name(), "decoded novel via BOM");
            return Ok(text.into_owned());
        }
    }

    for (name, encoding) in candidates() {
        if let Some(text) = strict_decode(encoding, bytes) {
            debug!(encoding = name, bytes = bytes.len(), "decoded novel");
            return Ok(text.into_owned());
        }
    }

    Err(DecodeError {
        tried: candidates().iter().map(|(name, _)| *name).collect(),
    })
}

/// Reads and decodes a novel file.
pub fn read_novel(path: &Path) -> Result<String, AnalysisError> {
    let bytes = std::fs::read(path).map_err(|source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(decode_novel(&bytes)?)
}

fn strict_decode<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
    if encoding == UTF_16LE || encoding == UTF_16BE {
        // Odd byte counts cannot be UTF-16.
        if bytes.len() % 2 != 0 {
            return None;
        }
    }
    encoding.decode_without_bom_handling_and_without_replacement(bytes)
}
