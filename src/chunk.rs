//! Fixed-size character chunker.
//!
//! Splits document text into windows of at most `max_chars` characters,
//! each starting `max_chars - overlap` characters after the previous one,
//! so consecutive chunks share exactly `overlap` characters. Positions are
//! counted in Unicode scalar values, never bytes, so slices always land on
//! character boundaries.
//!
//! Splitting is purely positional: there is no sentence or paragraph
//! awareness.
//!
//! # Example
//!
//! ```rust
//! use docqa::chunk::CharSplitter;
//!
//! let splitter = CharSplitter::new(4, 1).unwrap();
//! let chunks: Vec<&str> = splitter.split("abcdefghij").collect();
//! assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
//! ```

use sha2::{Digest, Sha256};

use crate::models::{Chunk, Document};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk size must be > 0")]
    ZeroSize,
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({max_chars})")]
    OverlapTooLarge { max_chars: usize, overlap: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct CharSplitter {
    max_chars: usize,
    overlap: usize,
}

impl CharSplitter {
    pub fn new(max_chars: usize, overlap: usize) -> Result<Self, ChunkError> {
        if max_chars == 0 {
            return Err(ChunkError::ZeroSize);
        }
        if overlap >= max_chars {
            return Err(ChunkError::OverlapTooLarge { max_chars, overlap });
        }
        Ok(Self { max_chars, overlap })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily split `text`. Empty text yields nothing.
    pub fn split<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            text,
            start: 0,
            max_chars: self.max_chars,
            step: self.max_chars - self.overlap,
            done: text.is_empty(),
        }
    }

    /// Split a document into [`Chunk`]s carrying a copy of its metadata.
    pub fn split_document<'a>(&self, doc: &'a Document) -> impl Iterator<Item = Chunk> + 'a {
        self.split(&doc.text)
            .enumerate()
            .map(move |(index, text)| make_chunk(index, text, doc))
    }
}

/// Iterator returned by [`CharSplitter::split`].
pub struct Chunks<'a> {
    text: &'a str,
    /// Byte offset of the next chunk.
    start: usize,
    max_chars: usize,
    step: usize,
    done: bool,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.done {
            return None;
        }
        let rest = &self.text[self.start..];
        let end = char_offset(rest, self.max_chars);
        if end == rest.len() {
            self.done = true;
        } else {
            self.start += char_offset(rest, self.step);
        }
        Some(&rest[..end])
    }
}

/// Byte offset of the `n`th character of `s`, or `s.len()` if it is shorter.
fn char_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

fn make_chunk(index: usize, text: &str, doc: &Document) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        index,
        text: text.to_string(),
        hash,
        metadata: doc.metadata.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter() -> CharSplitter {
        CharSplitter::new(500, 50).unwrap()
    }

    fn sample_text(len: usize) -> String {
        "The quick brown fox jumps over the lazy dog. "
            .chars()
            .cycle()
            .take(len)
            .collect()
    }

    fn reconstruct(chunks: &[&str], overlap: usize) -> String {
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(c);
            } else {
                out.extend(c.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert_eq!(CharSplitter::new(0, 0).unwrap_err(), ChunkError::ZeroSize);
        assert!(matches!(
            CharSplitter::new(10, 10),
            Err(ChunkError::OverlapTooLarge { .. })
        ));
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert_eq!(splitter().split("").count(), 0);
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks: Vec<&str> = splitter().split("Hello, world!").collect();
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn test_exact_length_single_chunk() {
        let text = sample_text(500);
        assert_eq!(splitter().split(&text).count(), 1);
    }

    #[test]
    fn test_1200_chars_three_windows() {
        let text = sample_text(1200);
        let chunks: Vec<&str> = splitter().split(&text).collect();
        let lens: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
        assert_eq!(lens, vec![500, 500, 300]);
        assert_eq!(chunks[1], &text[450..950]);
        assert_eq!(chunks[2], &text[900..1200]);
    }

    #[test]
    fn test_bounds_overlap_and_reconstruction() {
        for (len, max, overlap) in [(1, 3, 0), (37, 10, 3), (1000, 100, 99), (2503, 500, 50)] {
            let text = sample_text(len);
            let s = CharSplitter::new(max, overlap).unwrap();
            let chunks: Vec<&str> = s.split(&text).collect();

            for c in &chunks {
                assert!(c.chars().count() <= max);
            }
            for pair in chunks.windows(2) {
                let prev: Vec<char> = pair[0].chars().collect();
                let next: Vec<char> = pair[1].chars().collect();
                assert_eq!(prev.len(), max, "only the last chunk may be short");
                assert_eq!(&prev[prev.len() - overlap..], &next[..overlap]);
            }
            assert_eq!(reconstruct(&chunks, overlap), text);
        }
    }

    #[test]
    fn test_multibyte_characters_counted_as_chars() {
        let text: String = "日本語のテキスト".chars().cycle().take(25).collect();
        let s = CharSplitter::new(10, 2).unwrap();
        let chunks: Vec<&str> = s.split(&text).collect();
        assert_eq!(
            chunks.iter().map(|c| c.chars().count()).collect::<Vec<_>>(),
            vec![10, 10, 9]
        );
        assert_eq!(reconstruct(&chunks, 2), text);
    }

    #[test]
    fn test_split_document_copies_metadata_and_hashes() {
        let doc = Document::new("a.txt", "txt", sample_text(600)).with_meta("row", 1);
        let chunks: Vec<Chunk> = splitter().split_document(&doc).collect();
        assert_eq!(chunks.len(), 2);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
            assert_eq!(c.metadata["source"], "a.txt");
            assert_eq!(c.metadata["row"], 1);
            assert_eq!(c.hash.len(), 64);
        }
        assert_ne!(chunks[0].hash, chunks[1].hash);
    }
}
