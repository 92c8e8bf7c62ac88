//! Knowledge base statistics.
//!
//! Provides a quick summary of what's indexed: chunk counts, the embedding
//! model the store is stamped with, and a per-source breakdown. Used by
//! `docassist status` to confirm that index runs are landing.

use anyhow::Result;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::store::sqlite::DB_FILE;
use crate::store::{SqliteVectorStore, VectorStore};

/// Run the status command: open the store and print a summary.
pub async fn run_status(config: &Config) -> Result<()> {
    let store = SqliteVectorStore::open(&config.store.dir).await?;
    let total_chunks = store.count().await?;
    let stamp = store.stamp().await?;
    let sources = store.sources().await?;

    let db_path = store.dir().join(DB_FILE);
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    println!("docassist knowledge base");
    println!("========================");
    println!();
    println!("  Store:       {}", db_path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Ingest dir:  {}", config.ingest.dir.display());
    println!();
    println!("  Sources:     {}", sources.len());
    println!("  Chunks:      {}", total_chunks);
    match &stamp {
        Some(stamp) => println!("  Embeddings:  {}", stamp),
        None => println!("  Embeddings:  none"),
    }

    // The configured provider only needs to be constructible to compare stamps.
    if let (Some(stamp), Ok(provider)) = (&stamp, create_provider(&config.embedding)) {
        if stamp.model != provider.model_name() || stamp.dims != provider.dims() {
            println!();
            println!(
                "  warning: configured provider is {} ({} dims); questions will fail until the store is rebuilt",
                provider.model_name(),
                provider.dims()
            );
        }
    }

    if !sources.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<56} {:>8}", "SOURCE", "CHUNKS");
        println!("  {}", "-".repeat(65));
        for s in &sources {
            println!("  {:<56} {:>8}", s.source_path.display().to_string(), s.chunks);
        }
    }

    println!();

    store.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_byte_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
