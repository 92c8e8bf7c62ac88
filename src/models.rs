//! Core data models used throughout the assistant.
//!
//! These types represent the files, documents, chunks, and retrieval
//! results that flow through the ingestion and query pipeline.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Format tag detected from a file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    OfficeDocument,
    Pdf,
    Presentation,
    Spreadsheet,
    PlainText,
    Markdown,
}

/// Extensions accepted by discovery, lowercase, without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "pdf", "docx", "doc", "pptx", "ppt", "xlsx", "xls", "txt", "md",
];

impl SourceFormat {
    /// Detects the format from a lowercase-insensitive extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "docx" | "doc" => Some(SourceFormat::OfficeDocument),
            "pdf" => Some(SourceFormat::Pdf),
            "pptx" | "ppt" => Some(SourceFormat::Presentation),
            "xlsx" | "xls" => Some(SourceFormat::Spreadsheet),
            "txt" => Some(SourceFormat::PlainText),
            "md" => Some(SourceFormat::Markdown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::OfficeDocument => "office_document",
            SourceFormat::Pdf => "pdf",
            SourceFormat::Presentation => "presentation",
            SourceFormat::Spreadsheet => "spreadsheet",
            SourceFormat::PlainText => "plain_text",
            SourceFormat::Markdown => "markdown",
        }
    }
}

/// A file discovered under the ingestion root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub format: SourceFormat,
    /// Pre-OOXML binary variant (`.doc`, `.ppt`, `.xls`).
    pub legacy: bool,
}

impl SourceFile {
    /// Classifies a path; returns `None` for extensions outside the allow-list.
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let format = SourceFormat::from_extension(&ext)?;
        Some(Self {
            path: path.to_path_buf(),
            format,
            legacy: matches!(ext.as_str(), "doc" | "ppt" | "xls"),
        })
    }
}

/// Plain text extracted from one source file.
#[derive(Debug, Clone)]
pub struct NormalizedDocument {
    /// Originating path, for diagnostics only.
    pub source_path: PathBuf,
    pub text: String,
    /// Hex SHA-256 of `text`.
    pub content_hash: String,
}

/// A bounded slice of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Stable identifier derived from the document content and position.
    pub id: String,
    pub source_path: PathBuf,
    /// Sequence index within the parent document, starting at 0.
    pub index: usize,
    pub text: String,
    /// Number of leading chars repeated from the previous chunk.
    pub overlap: usize,
}

/// A chunk with its embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

impl EmbeddedChunk {
    pub fn id(&self) -> &str {
        &self.chunk.id
    }
}

/// A stored chunk ranked against a query vector.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub id: String,
    pub source_path: PathBuf,
    pub index: usize,
    pub text: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// A source chunk cited by an [`Answer`].
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub chunk_id: String,
    pub source_path: PathBuf,
    pub index: usize,
    pub score: f32,
}

/// A generated answer plus the context it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
    /// Retrieved chunks dropped to fit the context budget.
    pub dropped_chunks: usize,
}

/// A file that failed to load.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub code: String,
    pub error: String,
}

/// A chunk that failed to embed.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkFailure {
    pub chunk_id: String,
    pub source_path: PathBuf,
    pub index: usize,
    pub error: String,
}

/// Summary of one indexing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub files_discovered: usize,
    pub files_loaded: usize,
    pub file_failures: Vec<FileFailure>,
    pub chunks_total: usize,
    /// Chunks already present in the store and not re-embedded.
    pub chunks_skipped: usize,
    pub chunks_indexed: usize,
    pub chunk_failures: Vec<ChunkFailure>,
    pub cancelled: bool,
}

impl IndexReport {
    pub fn files_failed(&self) -> usize {
        self.file_failures.len()
    }

    pub fn chunks_failed(&self) -> usize {
        self.chunk_failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_formats_case_insensitively() {
        let f = SourceFile::detect(Path::new("Uploads/Deck.PPTX")).unwrap();
        assert_eq!(f.format, SourceFormat::Presentation);
        assert!(!f.legacy);

        let f = SourceFile::detect(Path::new("old.xls")).unwrap();
        assert_eq!(f.format, SourceFormat::Spreadsheet);
        assert!(f.legacy);
    }

    #[test]
    fn rejects_unknown_extensions() {
        assert!(SourceFile::detect(Path::new("image.png")).is_none());
        assert!(SourceFile::detect(Path::new("Makefile")).is_none());
    }

    #[test]
    fn every_supported_extension_has_a_format() {
        for ext in SUPPORTED_EXTENSIONS {
            assert!(SourceFormat::from_extension(ext).is_some(), "{}", ext);
        }
    }
}
