//! CLI command implementations.
//!
//! Each `run_*` function opens what it needs from the configuration, does
//! one job and prints the result to stdout. Diagnostics go through
//! `tracing` to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::error::PipelineError;
use crate::generate::{generate_document, GenerateRequest};
use crate::generation::create_generator;
use crate::index::{run_index, CancelFlag};
use crate::models::IndexReport;
use crate::progress::ProgressMode;
use crate::query::QueryEngine;
use crate::store::{SqliteVectorStore, VectorStore};
use crate::templates::TemplateCatalog;
use crate::validate::{validate_request, ValidationRequest};

/// Creates the ingestion directory and an empty store.
pub async fn run_init(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.ingest.dir).with_context(|| {
        format!(
            "Failed to create ingest directory: {}",
            config.ingest.dir.display()
        )
    })?;
    let store = SqliteVectorStore::open(&config.store.dir).await?;
    store.close().await;
    println!("Knowledge base initialized.");
    println!("  Ingest dir:  {}", config.ingest.dir.display());
    println!("  Store:       {}", config.store.dir.display());
    Ok(())
}

/// Indexes the ingestion directory. Ctrl-C stops the run between files and
/// batches; whatever was embedded by then is still committed.
pub async fn run_index_command(config: &Config, progress: ProgressMode) -> Result<()> {
    let provider = create_provider(&config.embedding)?;
    let store = SqliteVectorStore::open(&config.store.dir).await?;

    let cancel = CancelFlag::new();
    let on_signal = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current batch");
            on_signal.cancel();
        }
    });

    let reporter = progress.reporter();
    let result = run_index(config, provider.as_ref(), &store, cancel, reporter.as_ref()).await;
    watcher.abort();
    store.close().await;

    let report = result?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &IndexReport) {
    if report.cancelled {
        println!("Indexing cancelled.");
    } else {
        println!("Indexing complete.");
    }
    println!(
        "  Files:   {} discovered, {} loaded, {} failed",
        report.files_discovered,
        report.files_loaded,
        report.files_failed()
    );
    println!(
        "  Chunks:  {} total, {} indexed, {} skipped, {} failed",
        report.chunks_total,
        report.chunks_indexed,
        report.chunks_skipped,
        report.chunks_failed()
    );
    for f in &report.file_failures {
        println!("  ! {} [{}] {}", f.path.display(), f.code, f.error);
    }
    for f in &report.chunk_failures {
        println!(
            "  ! {}#{} [embedding_failure] {}",
            f.source_path.display(),
            f.index,
            f.error
        );
    }
}

async fn open_engine(config: &Config) -> Result<(QueryEngine, Arc<SqliteVectorStore>)> {
    let provider = create_provider(&config.embedding)?;
    let generator = create_generator(&config.generation)?;
    let store = Arc::new(SqliteVectorStore::open(&config.store.dir).await?);
    let engine = QueryEngine::new(
        provider,
        store.clone() as Arc<dyn VectorStore>,
        generator,
        &config.retrieval,
        &config.generation,
    );
    Ok((engine, store))
}

/// Answers one question from the indexed documents. Ctrl-C abandons the
/// question with [`PipelineError::Cancelled`].
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let (engine, store) = open_engine(config).await?;

    let answer = tokio::select! {
        answer = engine.ask(question) => answer,
        _ = tokio::signal::ctrl_c() => Err(PipelineError::Cancelled),
    };
    store.close().await;
    let answer = answer?;

    println!("{}", answer.text.trim());
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for s in &answer.sources {
            println!(
                "  [{:.3}] {} (chunk {})",
                s.score,
                s.source_path.display(),
                s.index
            );
        }
    }
    if answer.dropped_chunks > 0 {
        println!(
            "  ({} lower-ranked chunk{} left out to fit the context budget)",
            answer.dropped_chunks,
            if answer.dropped_chunks == 1 { "" } else { "s" }
        );
    }
    Ok(())
}

/// Lists the template catalog, or the templates of one document type.
pub fn run_templates(config: &Config, doc_type: Option<&str>) -> Result<()> {
    let catalog = TemplateCatalog::load(config.templates.path.as_deref())?;
    let types: Vec<&str> = match doc_type {
        Some(t) if catalog.templates(t).is_none() => {
            return Err(PipelineError::InvalidRequest(format!(
                "Document type '{}' not found. Available types: {}",
                t,
                catalog.doc_types().join(", ")
            ))
            .into());
        }
        Some(t) => vec![t],
        None => catalog.doc_types(),
    };

    for doc_type in types {
        let Some(set) = catalog.templates(doc_type) else {
            continue;
        };
        println!("{}", doc_type);
        for (key, template) in set {
            println!("  {:<14} {}", key, template.name);
            println!("  {:<14} {}", "", template.parts().join(", "));
        }
        println!();
    }
    println!("{} templates", catalog.total());
    Ok(())
}

/// Validates a JSON document read from `path` and prints the report.
pub fn run_validate(config: &Config, path: &Path) -> Result<()> {
    let catalog = TemplateCatalog::load(config.templates.path.as_deref())?;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document: {}", path.display()))?;
    let request: ValidationRequest = serde_json::from_str(&content)
        .with_context(|| format!("Invalid validation request: {}", path.display()))?;

    let report = validate_request(&catalog, &request)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Generates a document and prints it as JSON.
pub async fn run_generate(
    config: &Config,
    doc_type: &str,
    template: Option<String>,
    inputs: Vec<(String, String)>,
    inputs_file: Option<PathBuf>,
) -> Result<()> {
    let catalog = TemplateCatalog::load(config.templates.path.as_deref())?;

    let mut map = match inputs_file {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read inputs: {}", path.display()))?;
            serde_json::from_str::<Map<String, Value>>(&content)
                .with_context(|| format!("Inputs must be a JSON object: {}", path.display()))?
        }
        None => Map::new(),
    };
    for (key, value) in inputs {
        map.insert(key, Value::String(value));
    }
    let request = GenerateRequest {
        template,
        inputs: map,
    };

    let (engine, store) = open_engine(config).await?;
    let document = tokio::select! {
        doc = generate_document(&engine, &catalog, doc_type, &request) => doc,
        _ = tokio::signal::ctrl_c() => Err(PipelineError::Cancelled),
    };
    store.close().await;

    println!("{}", serde_json::to_string_pretty(&document?)?);
    Ok(())
}

/// Parse a `key=value` pair for `--input` arguments.
pub fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_pairs() {
        assert_eq!(
            parse_key_val("client_name=Acme=Corp").unwrap(),
            ("client_name".to_string(), "Acme=Corp".to_string())
        );
        assert!(parse_key_val("no-separator").is_err());
    }
}
