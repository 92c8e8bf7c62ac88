//! Indexer: embeds chunks and appends them to the vector store.
//!
//! # Pipeline
//!
//! ```text
//! discover ──▶ load (blocking pool) ──▶ chunk ──▶ skip known ids ──▶ embed batches ──▶ append ──▶ flush
//! ```
//!
//! Failures are isolated per item:
//! - a file that cannot be converted becomes a [`FileFailure`] and the run
//!   moves on to the next file;
//! - a batch whose embedding call fails is retried chunk by chunk, so only
//!   the chunks that fail on their own become [`ChunkFailure`]s.
//!
//! Up to `embedding.concurrency` batches are in flight at once. Appends are
//! staged and committed by a single flush at the end of the run, including a
//! cancelled run, so the store only ever gains whole runs.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::chunk::{chunk_documents, ChunkParams};
use crate::config::Config;
use crate::embedding::{check_batch, EmbeddingProvider};
use crate::error::{PipelineError, Result};
use crate::loader::DocumentLoader;
use crate::models::{Chunk, ChunkFailure, EmbeddedChunk, FileFailure, IndexReport};
use crate::progress::{IndexProgressEvent, NoProgress, ProgressReporter};
use crate::store::VectorStore;

/// Cooperative cancellation shared between a run and whoever may stop it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of [`Indexer::index_chunks`].
#[derive(Debug, Default)]
pub struct IndexOutcome {
    pub indexed: usize,
    /// Chunks already in the store (or repeated in the input).
    pub skipped: usize,
    pub failures: Vec<ChunkFailure>,
    pub cancelled: bool,
}

struct BatchOutcome {
    embedded: Vec<EmbeddedChunk>,
    failures: Vec<ChunkFailure>,
    attempted: usize,
    cancelled: bool,
}

pub struct Indexer<'a> {
    provider: &'a dyn EmbeddingProvider,
    store: &'a dyn VectorStore,
    batch_size: usize,
    concurrency: usize,
    cancel: CancelFlag,
    progress: &'a dyn ProgressReporter,
}

impl<'a> Indexer<'a> {
    pub fn new(provider: &'a dyn EmbeddingProvider, store: &'a dyn VectorStore) -> Self {
        Self {
            provider,
            store,
            batch_size: 32,
            concurrency: 1,
            cancel: CancelFlag::new(),
            progress: &NoProgress,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Embeds `chunks` and commits them to the store.
    ///
    /// Chunks whose id is already stored are skipped without an embedding
    /// call. Fails only on store errors, a model mismatch, or a disabled
    /// provider; per-chunk embedding errors are returned in the outcome.
    pub async fn index_chunks(&self, chunks: Vec<Chunk>) -> Result<IndexOutcome> {
        let mut outcome = IndexOutcome::default();
        if chunks.is_empty() {
            return Ok(outcome);
        }
        if self.provider.dims() == 0 {
            return Err(PipelineError::InvalidRequest(format!(
                "embedding provider '{}' cannot index documents",
                self.provider.model_name()
            )));
        }
        self.store
            .ensure_model(self.provider.model_name(), self.provider.dims())
            .await?;

        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let mut seen = self.store.existing_ids(&ids).await?;
        let total = chunks.len();
        let pending: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| seen.insert(c.id.clone()))
            .collect();
        outcome.skipped = total - pending.len();

        let pending_total = pending.len() as u64;
        let batches: Vec<Vec<Chunk>> = pending
            .chunks(self.batch_size)
            .map(|b| b.to_vec())
            .collect();

        let mut results = stream::iter(batches)
            .map(|batch| self.embed_batch(batch))
            .buffer_unordered(self.concurrency);

        let mut done = 0u64;
        while let Some(batch) = results.next().await {
            if batch.cancelled {
                outcome.cancelled = true;
                continue;
            }
            done += batch.attempted as u64;
            self.progress.report(IndexProgressEvent::Embedding {
                n: done,
                total: pending_total,
            });
            outcome.failures.extend(batch.failures);
            self.store.append(batch.embedded).await?;
        }

        outcome.indexed = self.store.flush().await?;
        Ok(outcome)
    }

    async fn embed_batch(&self, batch: Vec<Chunk>) -> BatchOutcome {
        let mut out = BatchOutcome {
            embedded: Vec::with_capacity(batch.len()),
            failures: Vec::new(),
            attempted: batch.len(),
            cancelled: false,
        };
        if self.cancel.is_cancelled() {
            out.cancelled = true;
            return out;
        }

        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let first_try = self.embed_checked(&texts).await;

        match first_try {
            Ok(vectors) => {
                out.embedded = batch
                    .into_iter()
                    .zip(vectors)
                    .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
                    .collect();
            }
            Err(e) if batch.len() == 1 => {
                out.failures.extend(batch.into_iter().map(|c| failure(c, &e)));
            }
            Err(e) => {
                tracing::warn!(
                    chunks = batch.len(),
                    error = %e,
                    "embedding batch failed, retrying chunks individually"
                );
                for chunk in batch {
                    match self.embed_checked(std::slice::from_ref(&chunk.text)).await {
                        Ok(mut vectors) => {
                            let vector = vectors.remove(0);
                            out.embedded.push(EmbeddedChunk { chunk, vector });
                        }
                        Err(e) => out.failures.push(failure(chunk, &e)),
                    }
                }
            }
        }
        out
    }

    async fn embed_checked(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let vectors = self.provider.embed(texts).await?;
        check_batch(self.provider, texts.len(), &vectors)?;
        Ok(vectors)
    }

    /// Full run over a directory: discover, load, chunk, embed, flush.
    pub async fn run(
        &self,
        dir: &Path,
        params: &ChunkParams,
        max_file_bytes: u64,
    ) -> Result<IndexReport> {
        let loader = DocumentLoader::from_dir(dir, max_file_bytes)?;
        let mut report = IndexReport {
            files_discovered: loader.paths().len(),
            ..Default::default()
        };

        let total = loader.paths().len() as u64;
        let mut docs = Vec::new();
        for (i, path) in loader.paths().iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            self.progress.report(IndexProgressEvent::Loading {
                path: path.display().to_string(),
                n: i as u64 + 1,
                total,
            });

            match loader.load(path).await {
                Ok(doc) => {
                    report.files_loaded += 1;
                    docs.push(doc);
                }
                Err(e) => report.file_failures.push(FileFailure {
                    path: path.clone(),
                    code: e.code().to_string(),
                    error: e.to_string(),
                }),
            }
        }

        let chunks = chunk_documents(docs, params);
        report.chunks_total = chunks.len();
        let outcome = self.index_chunks(chunks).await?;
        report.chunks_skipped = outcome.skipped;
        report.chunks_indexed = outcome.indexed;
        report.chunk_failures = outcome.failures;
        report.cancelled |= outcome.cancelled || self.cancel.is_cancelled();

        tracing::info!(
            dir = %dir.display(),
            files = report.files_discovered,
            loaded = report.files_loaded,
            files_failed = report.files_failed(),
            chunks = report.chunks_total,
            indexed = report.chunks_indexed,
            skipped = report.chunks_skipped,
            chunks_failed = report.chunks_failed(),
            cancelled = report.cancelled,
            "index run finished"
        );
        Ok(report)
    }
}

fn failure(chunk: Chunk, err: &anyhow::Error) -> ChunkFailure {
    let error = PipelineError::EmbeddingFailure {
        chunk_id: chunk.id.clone(),
        source_path: chunk.source_path.clone(),
        reason: err.to_string(),
    };
    tracing::warn!(error = %error, "chunk not indexed");
    ChunkFailure {
        chunk_id: chunk.id,
        source_path: chunk.source_path,
        index: chunk.index,
        error: err.to_string(),
    }
}

/// Indexes `config.ingest.dir` with the configured chunking and batching.
pub async fn run_index(
    config: &Config,
    provider: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    cancel: CancelFlag,
    progress: &dyn ProgressReporter,
) -> Result<IndexReport> {
    let params = ChunkParams::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
    Indexer::new(provider, store)
        .batch_size(config.embedding.batch_size)
        .concurrency(config.embedding.concurrency)
        .cancel_flag(cancel)
        .progress(progress)
        .run(&config.ingest.dir, &params, config.ingest.max_file_bytes)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_document;
    use crate::embedding::HashProvider;
    use crate::loader::normalized;
    use crate::store::InMemoryVectorStore;
    use async_trait::async_trait;

    /// Fails any batch containing the marker, and the marker chunk alone.
    struct PoisonProvider {
        inner: HashProvider,
    }

    #[async_trait]
    impl EmbeddingProvider for PoisonProvider {
        fn model_name(&self) -> &str {
            self.inner.model_name()
        }
        fn dims(&self) -> usize {
            self.inner.dims()
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("POISON")) {
                anyhow::bail!("upstream rejected input");
            }
            self.inner.embed(texts).await
        }
    }

    fn chunks_for(text: &str) -> Vec<Chunk> {
        chunk_document(
            &normalized("notes.md".into(), text.to_string()),
            &ChunkParams::new(40, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn indexes_and_skips_on_rerun() {
        let provider = HashProvider::new(16);
        let store = InMemoryVectorStore::new();
        let chunks = chunks_for(&"alpha beta gamma delta ".repeat(10));
        let n = chunks.len();

        let indexer = Indexer::new(&provider, &store).batch_size(2);
        let first = indexer.index_chunks(chunks.clone()).await.unwrap();
        assert_eq!(first.indexed, n);
        assert_eq!(first.skipped, 0);

        let second = indexer.index_chunks(chunks).await.unwrap();
        assert_eq!(second.indexed, 0);
        assert_eq!(second.skipped, n);
        assert_eq!(store.count().await.unwrap(), n);
    }

    #[tokio::test]
    async fn one_bad_chunk_does_not_sink_its_batch() {
        let provider = PoisonProvider {
            inner: HashProvider::new(16),
        };
        let store = InMemoryVectorStore::new();
        let text = "first safe sentence here. second POISON sentence. third safe one too ok.";
        let chunks = chunks_for(text);
        assert!(chunks.len() >= 2);
        let poisoned = chunks.iter().filter(|c| c.text.contains("POISON")).count();

        let outcome = Indexer::new(&provider, &store)
            .batch_size(8)
            .index_chunks(chunks.clone())
            .await
            .unwrap();
        assert_eq!(outcome.failures.len(), poisoned);
        assert_eq!(outcome.indexed, chunks.len() - poisoned);
        assert!(outcome.failures[0].error.contains("upstream rejected"));
    }

    #[tokio::test]
    async fn cancelled_run_embeds_nothing_new() {
        let provider = HashProvider::new(8);
        let store = InMemoryVectorStore::new();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let outcome = Indexer::new(&provider, &store)
            .cancel_flag(cancel)
            .index_chunks(chunks_for("some words to index"))
            .await
            .unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.indexed, 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn wrong_dimensions_are_chunk_failures() {
        struct Liar;
        #[async_trait]
        impl EmbeddingProvider for Liar {
            fn model_name(&self) -> &str {
                "liar"
            }
            fn dims(&self) -> usize {
                8
            }
            async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
                Ok(texts.iter().map(|_| vec![0.5; 4]).collect())
            }
        }

        let store = InMemoryVectorStore::new();
        let chunks = chunks_for("tiny");
        let outcome = Indexer::new(&Liar, &store).index_chunks(chunks).await.unwrap();
        assert_eq!(outcome.indexed, 0);
        assert_eq!(outcome.failures.len(), 1);
    }

    #[tokio::test]
    async fn disabled_provider_is_rejected() {
        let store = InMemoryVectorStore::new();
        let err = Indexer::new(&crate::embedding::DisabledProvider, &store)
            .index_chunks(chunks_for("text"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }
}
