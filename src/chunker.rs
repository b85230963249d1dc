//! Fixed-size overlapping chunker.
//!
//! Splits text into windows of `size` units where each window repeats the
//! last `overlap` units of the previous one. Units are bytes by default and
//! Unicode scalar values when [`ChunkUnit::Chars`] is selected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default chunk size, ~300 tokens of English text
pub const DEFAULT_CHUNK_SIZE: usize = 1200;

/// Default number of units repeated between neighbouring chunks
pub const DEFAULT_OVERLAP: usize = 200;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Unit in which `size`, `overlap`, `start` and `end` are measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkUnit {
    /// Raw UTF-8 bytes. A boundary may fall inside a multi-byte character.
    #[default]
    Bytes,
    /// Unicode scalar values. Boundaries never split a character.
    Chars,
}

impl ChunkUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkUnit::Bytes => "bytes",
            ChunkUnit::Chars => "chars",
        }
    }
}

impl fmt::Display for ChunkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkUnit {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bytes" | "byte" => Ok(ChunkUnit::Bytes),
            "chars" | "char" => Ok(ChunkUnit::Chars),
            other => Err(ChunkError::InvalidArgument(format!(
                "unknown chunk unit '{}', expected 'bytes' or 'chars'",
                other
            ))),
        }
    }
}

/// Coarse language tag attached to every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Auto,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub language: Language,
}

/// Validated chunking parameters. Checked once, at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    size: usize,
    overlap: usize,
    unit: ChunkUnit,
}

impl ChunkParams {
    /// Validate `size` and `overlap`.
    ///
    /// `size` must be positive and `overlap` smaller than `size`. A negative
    /// `overlap` is clamped to zero.
    pub fn new(size: i64, overlap: i64) -> Result<Self, ChunkError> {
        if size <= 0 {
            return Err(ChunkError::InvalidArgument(format!(
                "size must be positive, got {}",
                size
            )));
        }
        let overlap = overlap.max(0);
        if overlap >= size {
            return Err(ChunkError::InvalidArgument(format!(
                "overlap ({}) must be smaller than size ({})",
                overlap, size
            )));
        }
        let size = usize::try_from(size).map_err(|_| {
            ChunkError::InvalidArgument(format!("size {} does not fit this platform", size))
        })?;
        let overlap = usize::try_from(overlap).map_err(|_| {
            ChunkError::InvalidArgument(format!("overlap {} does not fit this platform", overlap))
        })?;
        Ok(Self {
            size,
            overlap,
            unit: ChunkUnit::Bytes,
        })
    }

    pub fn with_unit(mut self, unit: ChunkUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn unit(&self) -> ChunkUnit {
        self.unit
    }
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            unit: ChunkUnit::Bytes,
        }
    }
}

/// Iterator over the `[start, end)` windows of one chunking run over an
/// input of `len` units.
#[derive(Debug, Clone)]
pub struct Windows {
    len: usize,
    size: usize,
    overlap: usize,
    cursor: usize,
    done: bool,
}

impl Windows {
    pub fn new(len: usize, params: &ChunkParams) -> Self {
        Self {
            len,
            size: params.size,
            overlap: params.overlap,
            cursor: 0,
            done: len == 0,
        }
    }
}

impl Iterator for Windows {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.cursor >= self.len {
            return None;
        }
        let start = self.cursor;
        let end = start.saturating_add(self.size).min(self.len);
        if end == self.len {
            self.done = true;
        } else {
            // overlap < size, so the cursor strictly advances
            self.cursor = end.saturating_sub(self.overlap);
        }
        Some((start, end))
    }
}

/// Tag a chunk `en` when it is pure ASCII, `auto` otherwise.
pub fn detect_language(text: impl AsRef<[u8]>) -> Language {
    if text.as_ref().is_ascii() {
        Language::En
    } else {
        Language::Auto
    }
}

fn chunk_id(index: usize) -> String {
    format!("c-{}", index)
}

/// Split `text` into overlapping chunks.
///
/// Empty input yields no chunks. In [`ChunkUnit::Bytes`] mode a boundary that
/// falls inside a multi-byte character leaves the partial bytes rendered as
/// U+FFFD in `Chunk::text`; offsets and the language tag still reflect the
/// raw bytes.
pub fn chunk(text: &str, params: &ChunkParams) -> Vec<Chunk> {
    match params.unit {
        ChunkUnit::Bytes => chunk_bytes(text, params),
        ChunkUnit::Chars => chunk_chars(text, params),
    }
}

/// Validate `size`/`overlap` and chunk `text` in bytes.
pub fn chunk_text(text: &str, size: i64, overlap: i64) -> Result<Vec<Chunk>, ChunkError> {
    let params = ChunkParams::new(size, overlap)?;
    Ok(chunk(text, &params))
}

fn chunk_bytes(text: &str, params: &ChunkParams) -> Vec<Chunk> {
    let bytes = text.as_bytes();
    Windows::new(bytes.len(), params)
        .enumerate()
        .map(|(index, (start, end))| {
            let slice = &bytes[start..end];
            Chunk {
                id: chunk_id(index),
                text: String::from_utf8_lossy(slice).into_owned(),
                start,
                end,
                language: detect_language(slice),
            }
        })
        .collect()
}

fn chunk_chars(text: &str, params: &ChunkParams) -> Vec<Chunk> {
    // Byte offset of every char boundary, end of text included
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = boundaries.len() - 1;

    Windows::new(len, params)
        .enumerate()
        .map(|(index, (start, end))| {
            let slice = &text[boundaries[start]..boundaries[end]];
            Chunk {
                id: chunk_id(index),
                text: slice.to_string(),
                start,
                end,
                language: detect_language(slice),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(size: i64, overlap: i64) -> ChunkParams {
        ChunkParams::new(size, overlap).unwrap()
    }

    #[test]
    fn test_empty_input() {
        assert!(chunk("", &ChunkParams::default()).is_empty());
        assert!(chunk("", &ChunkParams::default().with_unit(ChunkUnit::Chars)).is_empty());
    }

    #[test]
    fn test_single_short_input() {
        let chunks = chunk_text("hello", 1200, 200).unwrap();
        assert_eq!(
            chunks,
            vec![Chunk {
                id: "c-0".to_string(),
                text: "hello".to_string(),
                start: 0,
                end: 5,
                language: Language::En,
            }]
        );
    }

    #[test]
    fn test_two_chunks_with_overlap() {
        let text = "a".repeat(1400);
        let chunks = chunk_text(&text, 1200, 200).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].start, chunks[0].end), (0, 1200));
        assert_eq!((chunks[1].start, chunks[1].end), (1000, 1400));
        assert_eq!(chunks[1].id, "c-1");
    }

    #[test]
    fn test_exact_multiple_terminates() {
        // The final window ends exactly at the input end and must not repeat
        let chunks = chunk_text("abcdef", 4, 2).unwrap();
        let spans: Vec<_> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(spans, vec![(0, 4), (2, 6)]);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            ChunkParams::new(0, 0),
            Err(ChunkError::InvalidArgument(_))
        ));
        assert!(matches!(
            ChunkParams::new(-10, 0),
            Err(ChunkError::InvalidArgument(_))
        ));
        assert!(matches!(
            ChunkParams::new(5, 5),
            Err(ChunkError::InvalidArgument(_))
        ));
        assert!(chunk_text("hello", 3, 7).is_err());
    }

    #[test]
    fn test_negative_overlap_is_clamped() {
        let p = params(4, -3);
        assert_eq!(p.overlap(), 0);
        let chunks = chunk("abcdefghij", &p);
        let spans: Vec<_> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(spans, vec![(0, 4), (4, 8), (8, 10)]);
    }

    #[test]
    fn test_size_one_no_overlap() {
        let chunks = chunk("abc", &params(1, 0));
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(chunks[2].id, "c-2");
    }

    #[test]
    fn test_maximal_overlap_advances_by_one() {
        let chunks = chunk("abcde", &params(3, 2));
        let spans: Vec<_> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(spans, vec![(0, 3), (1, 4), (2, 5)]);
    }

    #[test]
    fn test_language_tagging() {
        assert_eq!(detect_language("Plain text, with punctuation!\n\t"), Language::En);
        assert_eq!(detect_language("naïve"), Language::Auto);
        assert_eq!(detect_language("“quoted”"), Language::Auto);
        assert_eq!(detect_language([0x41u8, 0x80]), Language::Auto);
    }

    #[test]
    fn test_language_is_per_chunk() {
        let chunks = chunk("abcdé", &params(4, 0));
        assert_eq!(chunks[0].language, Language::En);
        assert_eq!(chunks[1].language, Language::Auto);
    }

    #[test]
    fn test_byte_mode_split_character() {
        // 'é' is two bytes; a 2-byte window splits it
        let chunks = chunk("aé", &params(2, 0));
        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].start, chunks[0].end), (0, 2));
        assert_eq!(chunks[0].text, "a\u{FFFD}");
        assert_eq!(chunks[0].language, Language::Auto);
        assert_eq!((chunks[1].start, chunks[1].end), (2, 3));
        assert_eq!(chunks[1].language, Language::Auto);
    }

    #[test]
    fn test_char_mode_offsets() {
        let p = params(4, 1).with_unit(ChunkUnit::Chars);
        let chunks = chunk("héllo wörld", &p);
        let spans: Vec<_> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(spans, vec![(0, 4), (3, 7), (6, 10), (9, 11)]);
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["héll", "lo w", "wörl", "ld"]);
        let langs: Vec<_> = chunks.iter().map(|c| c.language).collect();
        assert_eq!(
            langs,
            vec![Language::Auto, Language::En, Language::Auto, Language::En]
        );
    }

    #[test]
    fn test_char_mode_reconstruction() {
        let text = "Ünïcödé text spanning chunks, with straße and ümlauts.";
        let p = params(7, 3).with_unit(ChunkUnit::Chars);
        let chunks = chunk(text, &p);
        let mut rebuilt = chunks[0].text.clone();
        for c in &chunks[1..] {
            rebuilt.extend(c.text.chars().skip(3));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_windows_iterator() {
        let p = params(5, 2);
        let spans: Vec<_> = Windows::new(12, &p).collect();
        assert_eq!(spans, vec![(0, 5), (3, 8), (6, 11), (9, 12)]);
        assert_eq!(Windows::new(0, &p).count(), 0);
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("bytes".parse::<ChunkUnit>().unwrap(), ChunkUnit::Bytes);
        assert_eq!("CHARS".parse::<ChunkUnit>().unwrap(), ChunkUnit::Chars);
        assert!("words".parse::<ChunkUnit>().is_err());
    }

    #[test]
    fn test_chunk_serializes_wire_shape() {
        let chunks = chunk_text("hi", 10, 0).unwrap();
        let value = serde_json::to_value(&chunks[0]).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": "c-0",
                "text": "hi",
                "start": 0,
                "end": 2,
                "language": "en"
            })
        );
    }
}
