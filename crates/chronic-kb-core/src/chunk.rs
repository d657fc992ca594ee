//! Sentence-aware overlapping text chunker.
//!
//! Splits long knowledge documents into bounded windows that are stored as
//! independent retrievable units. Consecutive chunks overlap by a fixed
//! number of characters so that a sentence cut at a boundary still appears
//! whole in at least one unit.
//!
//! # Algorithm
//!
//! Positions are counted in characters, never bytes, so multi-byte text
//! (CJK, symbols) is never split inside a code point.
//!
//! 1. Take a window of `chunk_size` characters starting at the cursor.
//! 2. If the window reaches the end of the text, emit the remainder and stop.
//! 3. Otherwise pick the cut point, in order of preference:
//!    - just after the last sentence terminator (`.!?` or `。！？`) in the
//!      back half of the window, plus any whitespace that follows it;
//!    - at the last whitespace more than half-way into the window;
//!    - at the hard window boundary.
//! 4. Emit `[cursor, cut)` and move the cursor to `cut - overlap`.
//!
//! A boundary is only accepted if moving to `cut - overlap` still advances
//! the cursor; otherwise the hard boundary is used. Together with the
//! `overlap < chunk_size` invariant enforced by [`Chunker::new`] this
//! guarantees termination.
//!
//! # Example
//!
//! ```rust
//! use chronic_kb_core::chunk::chunk_text;
//!
//! let text = "This is a test. ".repeat(50);
//! let chunks = chunk_text(&text, 100, 20).unwrap();
//! assert!(chunks.len() > 1);
//! assert!(chunks.iter().all(|c| c.chars().count() <= 100));
//! ```

use crate::error::ChunkError;

const SENTENCE_TERMINATORS: [char; 6] = ['.', '!', '?', '。', '！', '？'];

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker.
    ///
    /// # Errors
    ///
    /// Rejects `chunk_size == 0` and `overlap >= chunk_size`, which could
    /// never advance past the first window.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if chunk_size == 0 {
            return Err(ChunkError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkError::OverlapTooLarge {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into ordered, overlapping chunks.
    ///
    /// Returns an empty vector for empty input and exactly one chunk for
    /// input of at most `chunk_size` characters.
    pub fn split(&self, text: &str) -> Result<Vec<String>, ChunkError> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut chunks = Vec::new();
        if len == 0 {
            return Ok(chunks);
        }

        let mut start = 0usize;
        loop {
            let window_end = start + self.chunk_size;
            if window_end >= len {
                chunks.push(chars[start..].iter().collect());
                break;
            }

            let end = self.cut_point(&chars, start, window_end);
            chunks.push(chars[start..end].iter().collect());

            let next = end - self.overlap;
            if next <= start {
                return Err(ChunkError::Stalled(start));
            }
            start = next;
        }

        Ok(chunks)
    }

    /// Choose where the window `[start, window_end)` should end.
    fn cut_point(&self, chars: &[char], start: usize, window_end: usize) -> usize {
        let half = self.chunk_size as f64 * 0.5;
        let advances = |end: usize| end > start + self.overlap;

        let sentence_end = (start..window_end)
            .rev()
            .take_while(|&p| (p - start) as f64 >= half)
            .find(|&p| SENTENCE_TERMINATORS.contains(&chars[p]))
            .map(|p| {
                let mut end = p + 1;
                while end < window_end && chars[end].is_whitespace() {
                    end += 1;
                }
                end
            });
        if let Some(end) = sentence_end.filter(|&e| advances(e)) {
            return end;
        }

        let word_end = (start..window_end)
            .rev()
            .take_while(|&p| (p - start) as f64 > half)
            .find(|&p| chars[p].is_whitespace());
        if let Some(end) = word_end.filter(|&e| advances(e)) {
            return end;
        }

        window_end
    }
}

/// Convenience wrapper: validate parameters and split in one call.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, ChunkError> {
    Chunker::new(chunk_size, overlap)?.split(text)
}
