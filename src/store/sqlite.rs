//! SQLite-backed [`VectorStore`].
//!
//! The store directory holds a single `store.sqlite` database in WAL mode:
//!
//! ```text
//! chunks(seq INTEGER PK, id TEXT UNIQUE, source_path, chunk_index, text, embedding BLOB, indexed_at)
//! meta(key TEXT PK, value TEXT)        -- embedding_model, embedding_dims
//! ```
//!
//! `seq` records insertion order for tie-breaking. Staged chunks are held in
//! memory and written by [`flush`](VectorStore::flush) inside one
//! transaction, so a crash mid-run leaves the previous state intact.
//! Vectors are stored as little-endian `f32` BLOBs and scored by brute-force
//! cosine similarity.

use std::collections::{HashSet, BTreeMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tokio::sync::Mutex;

use super::{rank, SourceCount, StoreStamp, VectorStore};
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{PipelineError, Result};
use crate::models::{EmbeddedChunk, ScoredChunk};

pub const DB_FILE: &str = "store.sqlite";

pub struct SqliteVectorStore {
    dir: PathBuf,
    pool: SqlitePool,
    staged: Mutex<Vec<EmbeddedChunk>>,
}

impl SqliteVectorStore {
    /// Opens the store in `dir`, creating the directory and schema if absent.
    pub async fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| PipelineError::store(dir, e))?;
        let db_path = dir.join(DB_FILE);

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .map_err(|e| PipelineError::store(dir, e))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| PipelineError::store(dir, e))?;

        let store = Self {
            dir: dir.to_path_buf(),
            pool,
            staged: Mutex::new(Vec::new()),
        };
        store.migrate().await?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn err(&self, e: impl std::fmt::Display) -> PipelineError {
        PipelineError::store(&self.dir, e)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                source_path TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                indexed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| self.err(e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| self.err(e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_path)")
            .execute(&self.pool)
            .await
            .map_err(|e| self.err(e))?;

        Ok(())
    }

    async fn meta(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT value FROM meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.err(e))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn stamp(&self) -> Result<Option<StoreStamp>> {
        let model = self.meta("embedding_model").await?;
        let dims = self.meta("embedding_dims").await?;
        match (model, dims) {
            (Some(model), Some(dims)) => {
                let dims = dims
                    .parse()
                    .map_err(|_| self.err(format!("corrupt embedding_dims '{}'", dims)))?;
                Ok(Some(StoreStamp { model, dims }))
            }
            _ => Ok(None),
        }
    }

    async fn set_stamp(&self, stamp: &StoreStamp) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| self.err(e))?;
        for (key, value) in [
            ("embedding_model", stamp.model.clone()),
            ("embedding_dims", stamp.dims.to_string()),
        ] {
            sqlx::query(
                "INSERT INTO meta (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(|e| self.err(e))?;
        }
        tx.commit().await.map_err(|e| self.err(e))?;
        Ok(())
    }

    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        let mut found = HashSet::new();
        // Stay well under SQLite's bound-parameter limit.
        for batch in ids.chunks(500) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!("SELECT id FROM chunks WHERE id IN ({})", placeholders);
            let mut query = sqlx::query_scalar::<_, String>(&sql);
            for id in batch {
                query = query.bind(id);
            }
            found.extend(
                query
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| self.err(e))?,
            );
        }
        Ok(found)
    }

    async fn append(&self, chunks: Vec<EmbeddedChunk>) -> Result<()> {
        self.staged.lock().await.extend(chunks);
        Ok(())
    }

    async fn flush(&self) -> Result<usize> {
        let mut staged = self.staged.lock().await;
        if staged.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(|e| self.err(e))?;
        let mut added = 0u64;
        for ec in staged.iter() {
            let result = sqlx::query(
                r#"
                INSERT INTO chunks (id, source_path, chunk_index, text, embedding, indexed_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&ec.chunk.id)
            .bind(ec.chunk.source_path.to_string_lossy().to_string())
            .bind(ec.chunk.index as i64)
            .bind(&ec.chunk.text)
            .bind(vec_to_blob(&ec.vector))
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| self.err(e))?;
            added += result.rows_affected();
        }
        tx.commit().await.map_err(|e| self.err(e))?;

        // Only drop the staged batch once it is durable.
        staged.clear();
        tracing::debug!(store = %self.dir.display(), added, "flushed vector store");
        Ok(added as usize)
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.err(e))?;
        Ok(n as usize)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            "SELECT id, source_path, chunk_index, text, embedding FROM chunks ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| self.err(e))?;

        let scored = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let source: String = row.get("source_path");
                let index: i64 = row.get("chunk_index");
                ScoredChunk {
                    id: row.get("id"),
                    source_path: PathBuf::from(source),
                    index: index as usize,
                    text: row.get("text"),
                    score: cosine_similarity(query, &blob_to_vec(&blob)),
                }
            })
            .collect();

        Ok(rank(scored, k))
    }

    async fn sources(&self) -> Result<Vec<SourceCount>> {
        let rows = sqlx::query(
            "SELECT source_path, COUNT(*) AS n FROM chunks GROUP BY source_path",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| self.err(e))?;

        let counts: BTreeMap<PathBuf, usize> = rows
            .iter()
            .map(|row| {
                let source: String = row.get("source_path");
                let n: i64 = row.get("n");
                (PathBuf::from(source), n as usize)
            })
            .collect();
        Ok(counts
            .into_iter()
            .map(|(source_path, chunks)| SourceCount {
                source_path,
                chunks,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use tempfile::TempDir;

    fn embedded(id: &str, source: &str, index: usize, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk {
                id: id.to_string(),
                source_path: source.into(),
                index,
                text: format!("chunk {}", id),
                overlap: 0,
            },
            vector,
        }
    }

    #[tokio::test]
    async fn creates_directory_and_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("store");

        let store = SqliteVectorStore::open(&dir).await.unwrap();
        store.ensure_model("hash-4", 4).await.unwrap();
        store
            .append(vec![
                embedded("a", "one.md", 0, vec![1.0, 0.0, 0.0, 0.0]),
                embedded("b", "two.md", 0, vec![0.0, 1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.flush().await.unwrap(), 2);
        store.close().await;

        assert!(dir.join(DB_FILE).exists());
        let reopened = SqliteVectorStore::open(&dir).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);
        assert_eq!(
            reopened.stamp().await.unwrap(),
            Some(StoreStamp::new("hash-4", 4))
        );

        let hits = reopened.search(&[0.0, 1.0, 0.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].id, "b");
        assert_eq!(hits[0].source_path, PathBuf::from("two.md"));
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn flush_dedupes_by_id() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteVectorStore::open(tmp.path()).await.unwrap();
        store
            .append(vec![embedded("a", "x.md", 0, vec![1.0])])
            .await
            .unwrap();
        store.flush().await.unwrap();
        store
            .append(vec![
                embedded("a", "x.md", 0, vec![1.0]),
                embedded("c", "x.md", 1, vec![1.0]),
            ])
            .await
            .unwrap();
        assert_eq!(store.flush().await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 2);

        let ids: Vec<String> = vec!["a".into(), "c".into(), "zzz".into()];
        let existing = store.existing_ids(&ids).await.unwrap();
        assert_eq!(existing.len(), 2);
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteVectorStore::open(tmp.path()).await.unwrap();
        store
            .append(vec![
                embedded("first", "x.md", 0, vec![1.0, 0.0]),
                embedded("second", "x.md", 1, vec![1.0, 0.0]),
                embedded("third", "x.md", 2, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();
        store.flush().await.unwrap();

        let hits = store.search(&[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn sources_are_grouped() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteVectorStore::open(tmp.path()).await.unwrap();
        store
            .append(vec![
                embedded("a", "b.md", 0, vec![1.0]),
                embedded("b", "a.md", 0, vec![1.0]),
                embedded("c", "a.md", 1, vec![1.0]),
            ])
            .await
            .unwrap();
        store.flush().await.unwrap();
        let sources = store.sources().await.unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].source_path, PathBuf::from("a.md"));
        assert_eq!(sources[0].chunks, 2);
    }

    #[tokio::test]
    async fn unusable_directory_is_store_unavailable() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();
        let err = SqliteVectorStore::open(&file).await.err().unwrap();
        assert_eq!(err.code(), "store_unavailable");
    }
}
