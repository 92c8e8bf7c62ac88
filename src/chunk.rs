//! Recursive boundary-aware text chunker.
//!
//! Splits a [`NormalizedDocument`] into [`Chunk`]s of at most `chunk_size`
//! characters, each repeating the trailing `chunk_overlap` characters of its
//! predecessor.
//!
//! # Algorithm
//!
//! 1. Open a window of `chunk_size` chars at the current start.
//! 2. If the rest of the text fits, emit it and stop.
//! 3. Otherwise cut after the last paragraph break (`\n\n`) in the window;
//!    failing that after the last sentence end (`.`/`!`/`?` + whitespace);
//!    failing that after the last whitespace; failing that at the window end.
//!    Cuts are only considered past `start + chunk_overlap`, so every step
//!    makes progress.
//! 4. The next chunk starts `chunk_overlap` chars before the cut.
//!
//! Lengths are counted in `char`s. Nothing is trimmed, so dropping each
//! chunk's leading overlap and concatenating reproduces the input exactly.
//!
//! Chunk ids are derived from the source path, the document's content hash,
//! the chunk index, and the chunk text. Re-chunking an unchanged file yields
//! the same ids; two files with identical text keep separate chunks.
//!
//! # Example
//!
//! ```rust
//! use docassist::chunk::{chunk_document, ChunkParams};
//! use docassist::loader::normalized;
//!
//! let doc = normalized("notes.md".into(), "Hello world.\n\nSecond paragraph.".into());
//! let chunks = chunk_document(&doc, &ChunkParams::new(1000, 200).unwrap());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].index, 0);
//! ```

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{PipelineError, Result};
use crate::models::{Chunk, NormalizedDocument};

/// Validated chunking parameters: `0 <= overlap < size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    size: usize,
    overlap: usize,
}

impl ChunkParams {
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(PipelineError::InvalidRequest(
                "chunk size must be > 0".to_string(),
            ));
        }
        if overlap >= size {
            return Err(PipelineError::InvalidRequest(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, size
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            size: 1000,
            overlap: 200,
        }
    }
}

/// Chunks one document. Empty text yields no chunks.
pub fn chunk_document(doc: &NormalizedDocument, params: &ChunkParams) -> Vec<Chunk> {
    let text = doc.text.as_str();
    let chars: Vec<char> = text.chars().collect();
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();

    split_spans(&chars, params)
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| {
            let piece = &text[offsets[start]..offsets[end]];
            Chunk {
                id: chunk_id(&doc.source_path, &doc.content_hash, index, piece),
                source_path: doc.source_path.clone(),
                index,
                text: piece.to_string(),
                overlap: if index == 0 { 0 } else { params.overlap },
            }
        })
        .collect()
}

/// Chunks documents in order; within a document, chunks keep sequence order.
pub fn chunk_documents<I>(docs: I, params: &ChunkParams) -> Vec<Chunk>
where
    I: IntoIterator<Item = NormalizedDocument>,
{
    docs.into_iter()
        .flat_map(|doc| chunk_document(&doc, params))
        .collect()
}

/// Char-index spans `[start, end)` of each chunk.
fn split_spans(chars: &[char], params: &ChunkParams) -> Vec<(usize, usize)> {
    let n = chars.len();
    let mut spans = Vec::new();
    if n == 0 {
        return spans;
    }

    let mut start = 0;
    loop {
        let limit = (start + params.size).min(n);
        if limit == n {
            spans.push((start, n));
            break;
        }
        let cut = find_cut(chars, start + params.overlap, limit);
        spans.push((start, cut));
        start = cut - params.overlap;
    }
    spans
}

/// Best cut position `c` in `(floor, limit]`; the chunk ends before `chars[c]`.
fn find_cut(chars: &[char], floor: usize, limit: usize) -> usize {
    let is_paragraph = |c: usize| c >= 2 && chars[c - 2] == '\n' && chars[c - 1] == '\n';
    let is_sentence = |c: usize| {
        c >= 2 && matches!(chars[c - 2], '.' | '!' | '?') && chars[c - 1].is_whitespace()
    };
    let is_space = |c: usize| c >= 1 && chars[c - 1].is_whitespace();

    let last = |pred: &dyn Fn(usize) -> bool| ((floor + 1)..=limit).rev().find(|&c| pred(c));

    last(&is_paragraph)
        .or_else(|| last(&is_sentence))
        .or_else(|| last(&is_space))
        .unwrap_or(limit)
}

fn chunk_id(source_path: &Path, content_hash: &str, index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.to_string_lossy().as_bytes());
    hasher.update([0u8]);
    hasher.update(content_hash.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(32);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::normalized;

    fn doc(text: &str) -> NormalizedDocument {
        normalized("doc.txt".into(), text.to_string())
    }

    fn params(size: usize, overlap: usize) -> ChunkParams {
        ChunkParams::new(size, overlap).unwrap()
    }

    fn reconstruct(chunks: &[Chunk]) -> String {
        chunks
            .iter()
            .map(|c| c.text.chars().skip(c.overlap).collect::<String>())
            .collect()
    }

    fn sample_text() -> String {
        let mut s = String::new();
        for i in 0..40 {
            s.push_str(&format!(
                "Paragraph {} talks about survey results. Students answered questions! Did they? ",
                i
            ));
            if i % 3 == 0 {
                s.push_str("\n\n");
            }
            if i % 7 == 0 {
                s.push_str("averyveryverylongtokenwithoutanyspacesinsideitatall");
            }
        }
        s
    }

    #[test]
    fn empty_document_has_no_chunks() {
        assert!(chunk_document(&doc(""), &params(10, 2)).is_empty());
    }

    #[test]
    fn small_document_is_one_chunk() {
        let chunks = chunk_document(&doc("Hello, world!"), &params(1000, 200));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].overlap, 0);
    }

    #[test]
    fn no_boundaries_2500_chars_gives_three_chunks() {
        let text: String = "abcdefghij".repeat(250);
        assert_eq!(text.chars().count(), 2500);
        let chunks = chunk_document(&doc(&text), &params(1000, 200));
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert!(c.text.chars().count() <= 1000);
        }
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].text.chars().collect();
            let tail: String = prev[prev.len() - 200..].iter().collect();
            assert!(pair[1].text.starts_with(&tail));
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn words_without_paragraphs_2500_chars_gives_three_chunks() {
        let text: String = "lorem ipsum dolor sit amet ".repeat(100)[..2500].to_string();
        let chunks = chunk_document(&doc(&text), &params(1000, 200));
        assert_eq!(chunks.len(), 3);
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn size_and_overlap_invariants_hold() {
        let text = sample_text();
        for (size, overlap) in [(50, 0), (64, 10), (120, 40), (300, 299), (1000, 200)] {
            let chunks = chunk_document(&doc(&text), &params(size, overlap));
            assert!(!chunks.is_empty());
            for (i, c) in chunks.iter().enumerate() {
                assert_eq!(c.index, i);
                assert!(c.text.chars().count() <= size, "size {} overlap {}", size, overlap);
            }
            for pair in chunks.windows(2) {
                let prev: Vec<char> = pair[0].text.chars().collect();
                let tail: String = prev[prev.len() - overlap..].iter().collect();
                let head: String = pair[1].text.chars().take(overlap).collect();
                assert_eq!(head, tail);
                assert_eq!(pair[1].overlap, overlap);
            }
            assert_eq!(reconstruct(&chunks), text, "size {} overlap {}", size, overlap);
        }
    }

    #[test]
    fn prefers_paragraph_then_sentence_then_space() {
        let text = "First para here.\n\nSecond para is a bit longer. It has two sentences and more words";
        let chunks = chunk_document(&doc(text), &params(40, 0));
        assert_eq!(chunks[0].text, "First para here.\n\n");

        let text = "One sentence. Another sentence goes on and on";
        let chunks = chunk_document(&doc(text), &params(30, 0));
        assert_eq!(chunks[0].text, "One sentence. ");

        let text = "alpha beta gamma delta epsilon";
        let chunks = chunk_document(&doc(text), &params(12, 0));
        assert_eq!(chunks[0].text, "alpha beta ");
    }

    #[test]
    fn counts_chars_not_bytes() {
        let text = "é".repeat(30);
        let chunks = chunk_document(&doc(&text), &params(10, 3));
        for c in &chunks {
            assert!(c.text.chars().count() <= 10);
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn ids_are_deterministic_per_source() {
        let text = sample_text();
        let a = chunk_document(&doc(&text), &params(200, 50));
        let again = chunk_document(&doc(&text), &params(200, 50));
        let ids_a: Vec<&str> = a.iter().map(|c| c.id.as_str()).collect();
        let ids_again: Vec<&str> = again.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids_a, ids_again);

        let mut unique = ids_a.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ids_a.len());

        let other = chunk_document(&doc("different content entirely"), &params(200, 50));
        assert!(!ids_a.contains(&other[0].id.as_str()));
    }

    #[test]
    fn identical_text_under_another_name_gets_its_own_ids() {
        let text = sample_text();
        let a = chunk_document(&doc(&text), &params(200, 50));
        let copy = chunk_document(&normalized("copy_of_doc.txt".into(), text.clone()), &params(200, 50));
        assert_eq!(a.len(), copy.len());
        for (x, y) in a.iter().zip(&copy) {
            assert_eq!(x.text, y.text);
            assert_ne!(x.id, y.id);
        }
    }

    #[test]
    fn chunk_documents_preserves_document_order() {
        let docs = vec![
            normalized("1.txt".into(), "one ".repeat(30)),
            normalized("2.txt".into(), "two ".repeat(30)),
        ];
        let chunks = chunk_documents(docs, &params(50, 10));
        let first_two = chunks.iter().position(|c| c.source_path.ends_with("2.txt")).unwrap();
        assert!(chunks[..first_two].iter().all(|c| c.source_path.ends_with("1.txt")));
        assert!(chunks[first_two..].iter().all(|c| c.source_path.ends_with("2.txt")));
        assert_eq!(chunks[first_two].index, 0);
    }

    #[test]
    fn invalid_params_rejected() {
        assert!(ChunkParams::new(0, 0).is_err());
        assert!(ChunkParams::new(100, 100).is_err());
        assert!(ChunkParams::new(100, 99).is_ok());
    }
}
