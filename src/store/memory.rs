//! In-memory [`VectorStore`] for tests and one-shot runs.
//!
//! Vectors live in a `Vec` in insertion order behind a `tokio` lock.
//! Search is brute-force cosine similarity over all committed vectors.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use super::{rank, SourceCount, StoreStamp, VectorStore};
use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::models::{EmbeddedChunk, ScoredChunk};

#[derive(Default)]
struct Committed {
    chunks: Vec<EmbeddedChunk>,
    ids: HashSet<String>,
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    committed: RwLock<Committed>,
    staged: Mutex<Vec<EmbeddedChunk>>,
    stamp: RwLock<Option<StoreStamp>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn stamp(&self) -> Result<Option<StoreStamp>> {
        Ok(self.stamp.read().await.clone())
    }

    async fn set_stamp(&self, stamp: &StoreStamp) -> Result<()> {
        *self.stamp.write().await = Some(stamp.clone());
        Ok(())
    }

    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        let committed = self.committed.read().await;
        Ok(ids
            .iter()
            .filter(|id| committed.ids.contains(*id))
            .cloned()
            .collect())
    }

    async fn append(&self, chunks: Vec<EmbeddedChunk>) -> Result<()> {
        self.staged.lock().await.extend(chunks);
        Ok(())
    }

    async fn flush(&self) -> Result<usize> {
        let staged = std::mem::take(&mut *self.staged.lock().await);
        let mut committed = self.committed.write().await;
        let mut added = 0;
        for chunk in staged {
            if committed.ids.insert(chunk.id().to_string()) {
                committed.chunks.push(chunk);
                added += 1;
            }
        }
        Ok(added)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.committed.read().await.chunks.len())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let committed = self.committed.read().await;
        let scored = committed
            .chunks
            .iter()
            .map(|ec| ScoredChunk {
                id: ec.chunk.id.clone(),
                source_path: ec.chunk.source_path.clone(),
                index: ec.chunk.index,
                text: ec.chunk.text.clone(),
                score: cosine_similarity(query, &ec.vector),
            })
            .collect();
        Ok(rank(scored, k))
    }

    async fn sources(&self) -> Result<Vec<SourceCount>> {
        let committed = self.committed.read().await;
        let mut counts = BTreeMap::new();
        for ec in &committed.chunks {
            *counts.entry(ec.chunk.source_path.clone()).or_insert(0) += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(source_path, chunks)| SourceCount {
                source_path,
                chunks,
            })
            .collect())
    }
}
