//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the only shared mutable resource in the
//! pipeline. Appends are **staged**: nothing is visible to [`count`] or
//! [`search`] until [`flush`] commits the staged batch as a unit. Readers
//! therefore never observe a half-written indexing run.
//!
//! Each store is stamped with the embedding model that produced its
//! vectors ([`StoreStamp`]). Mixing vectors from different models makes
//! similarity scores meaningless, so a mismatch is refused with
//! [`PipelineError::ModelMismatch`].
//!
//! | Implementation | Backing |
//! |----------------|---------|
//! | [`SqliteVectorStore`] | `store.sqlite` in the store directory (WAL) |
//! | [`InMemoryVectorStore`] | process memory; tests and one-shot runs |
//!
//! [`count`]: VectorStore::count
//! [`search`]: VectorStore::search
//! [`flush`]: VectorStore::flush

pub mod memory;
pub mod sqlite;

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::models::{EmbeddedChunk, ScoredChunk};

pub use memory::InMemoryVectorStore;
pub use sqlite::SqliteVectorStore;

/// Identity of the embedding model a store was built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStamp {
    pub model: String,
    pub dims: usize,
}

impl StoreStamp {
    pub fn new(model: impl Into<String>, dims: usize) -> Self {
        Self {
            model: model.into(),
            dims,
        }
    }
}

impl fmt::Display for StoreStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} dims)", self.model, self.dims)
    }
}

/// Number of committed chunks per source file.
#[derive(Debug, Clone, Serialize)]
pub struct SourceCount {
    pub source_path: PathBuf,
    pub chunks: usize,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The recorded model identity, if any vectors were ever stamped.
    async fn stamp(&self) -> Result<Option<StoreStamp>>;

    /// Records `stamp`, replacing any previous one.
    async fn set_stamp(&self, stamp: &StoreStamp) -> Result<()>;

    /// Ids among `ids` that are already committed.
    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>>;

    /// Stages chunks for the next [`flush`](VectorStore::flush).
    async fn append(&self, chunks: Vec<EmbeddedChunk>) -> Result<()>;

    /// Commits everything staged. Returns the number of new chunks; chunks
    /// whose id is already committed are ignored.
    async fn flush(&self) -> Result<usize>;

    /// Number of committed chunks.
    async fn count(&self) -> Result<usize>;

    /// Top `k` committed chunks by cosine similarity to `query`, best first.
    /// Equal scores keep insertion order.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Committed chunk counts grouped by source file, sorted by path.
    async fn sources(&self) -> Result<Vec<SourceCount>>;

    /// Fails with [`PipelineError::ModelMismatch`] if the store was stamped
    /// with a different model.
    async fn check_model(&self, model: &str, dims: usize) -> Result<()> {
        let wanted = StoreStamp::new(model, dims);
        match self.stamp().await? {
            Some(found) if found != wanted => Err(PipelineError::ModelMismatch {
                store_model: found.to_string(),
                provider_model: wanted.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Stamps an empty store with `model`; for a non-empty store behaves
    /// like [`check_model`](VectorStore::check_model).
    async fn ensure_model(&self, model: &str, dims: usize) -> Result<()> {
        let wanted = StoreStamp::new(model, dims);
        if self.count().await? == 0 {
            return self.set_stamp(&wanted).await;
        }
        match self.stamp().await? {
            None => self.set_stamp(&wanted).await,
            Some(_) => self.check_model(model, dims).await,
        }
    }
}

/// Sorts candidates (given in insertion order) best first and keeps `k`.
pub(crate) fn rank(mut scored: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(id: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            id: id.to_string(),
            source_path: PathBuf::from("a.txt"),
            index: 0,
            text: String::new(),
            score,
        }
    }

    #[test]
    fn rank_is_stable_on_ties() {
        let ranked = rank(
            vec![scored("a", 0.5), scored("b", 0.9), scored("c", 0.5), scored("d", 0.5)],
            3,
        );
        let ids: Vec<&str> = ranked.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn stamp_display() {
        assert_eq!(
            StoreStamp::new("gemini-embedding-001", 3072).to_string(),
            "gemini-embedding-001 (3072 dims)"
        );
    }
}
