//! Pipeline error taxonomy.
//!
//! Per-item failures ([`PipelineError::UnsupportedFormat`],
//! [`PipelineError::ConversionFailure`], [`PipelineError::EmbeddingFailure`])
//! are isolated by the indexer and aggregated into an
//! [`IndexReport`](crate::models::IndexReport). Everything else is fatal to
//! the single operation that raised it and is returned to the caller.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the ingestion and query pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// File extension is not in the ingestion allow-list.
    #[error("unsupported format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// A single file could not be converted to text.
    #[error("conversion failed for {}: {reason}", path.display())]
    ConversionFailure { path: PathBuf, reason: String },

    /// A single chunk could not be embedded.
    #[error("embedding failed for chunk {chunk_id} ({}): {reason}", source_path.display())]
    EmbeddingFailure {
        chunk_id: String,
        source_path: PathBuf,
        reason: String,
    },

    /// The vector store directory cannot be read or written.
    #[error("vector store unavailable at {}: {reason}", path.display())]
    StoreUnavailable { path: PathBuf, reason: String },

    /// The store holds no chunks, so there is nothing to ground an answer on.
    #[error("knowledge base is empty: index some documents before asking questions")]
    RetrievalEmpty,

    /// The generation call errored or timed out.
    #[error("generation failed ({provider}): {reason}")]
    GenerationFailure { provider: String, reason: String },

    /// The store was built with a different embedding model.
    #[error(
        "embedding model mismatch: store was indexed with '{store_model}' but the provider is '{provider_model}'; re-index or switch providers"
    )]
    ModelMismatch {
        store_model: String,
        provider_model: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Stable machine-readable code, used in HTTP error bodies and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::UnsupportedFormat { .. } => "unsupported_format",
            PipelineError::ConversionFailure { .. } => "conversion_failure",
            PipelineError::EmbeddingFailure { .. } => "embedding_failure",
            PipelineError::StoreUnavailable { .. } => "store_unavailable",
            PipelineError::RetrievalEmpty => "retrieval_empty",
            PipelineError::GenerationFailure { .. } => "generation_failure",
            PipelineError::ModelMismatch { .. } => "model_mismatch",
            PipelineError::InvalidRequest(_) => "bad_request",
            PipelineError::Cancelled => "cancelled",
        }
    }

    /// Whether the error only affects one item of a batch.
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            PipelineError::UnsupportedFormat { .. }
                | PipelineError::ConversionFailure { .. }
                | PipelineError::EmbeddingFailure { .. }
        )
    }

    pub(crate) fn store(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        PipelineError::StoreUnavailable {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn conversion(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        PipelineError::ConversionFailure {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(PipelineError::RetrievalEmpty.code(), "retrieval_empty");
        assert_eq!(
            PipelineError::conversion("a.pdf", "bad xref").code(),
            "conversion_failure"
        );
    }

    #[test]
    fn conversion_message_names_the_file() {
        let err = PipelineError::conversion("uploads/report.pdf", "bad xref");
        let msg = err.to_string();
        assert!(msg.contains("uploads/report.pdf"));
        assert!(msg.contains("bad xref"));
        assert!(err.is_per_item());
    }

    #[test]
    fn fatal_errors_are_not_per_item() {
        assert!(!PipelineError::RetrievalEmpty.is_per_item());
        assert!(!PipelineError::store("/tmp/x", "read-only").is_per_item());
    }
}
