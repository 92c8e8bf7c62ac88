//! Query engine: question in, grounded answer out.
//!
//! # Steps
//!
//! 1. Reject blank questions.
//! 2. Refuse an empty store with [`PipelineError::RetrievalEmpty`] before any
//!    remote call, and a store built by another embedding model with
//!    [`PipelineError::ModelMismatch`].
//! 3. Embed the question and take the top-K chunks by cosine similarity.
//! 4. Join chunk texts best-first with blank lines, within
//!    `max_context_chars`. Lower-ranked chunks that would overflow are
//!    dropped; a top chunk that alone overflows is truncated.
//! 5. Render [`PROMPT_TEMPLATE`] and call the generator under the
//!    query-wide time budget.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{GenerationConfig, RetrievalConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{PipelineError, Result};
use crate::generation::Generator;
use crate::models::{Answer, ScoredChunk, SourceRef};
use crate::store::VectorStore;

/// Grounding prompt. `{context}` and `{question}` are substituted verbatim.
pub const PROMPT_TEMPLATE: &str = "\nYou are a helpful AI assistant that answers questions based on provided documents. \n\n\
Here is the relevant information from the documents:\n{context}\n\n\
Based on the information above, please answer the following question. \
If the answer is not found in the provided context, please say so clearly. \
Be specific and cite relevant details when possible.\n\n\
Question: {question}\n\n\
Answer: ";

const CONTEXT_SEPARATOR: &str = "\n\n";

/// Substitutes both placeholders in one pass, so braces inside the
/// document text are never re-expanded.
pub fn render_prompt(context: &str, question: &str) -> String {
    let mut out = String::with_capacity(PROMPT_TEMPLATE.len() + context.len() + question.len());
    let mut rest = PROMPT_TEMPLATE;
    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix("{context}") {
            out.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{question}") {
            out.push_str(question);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Context assembled from ranked chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetedContext {
    pub text: String,
    /// How many leading ranked chunks made it in.
    pub used: usize,
    pub dropped: usize,
}

/// Joins ranked chunk texts within `max_chars` (counted in chars).
pub fn assemble_context(chunks: &[ScoredChunk], max_chars: usize) -> BudgetedContext {
    let sep_len = CONTEXT_SEPARATOR.chars().count();
    let mut text = String::new();
    let mut len = 0usize;
    let mut used = 0usize;

    for chunk in chunks {
        let chunk_len = chunk.text.chars().count();
        if used == 0 {
            if chunk_len > max_chars {
                text = chunk.text.chars().take(max_chars).collect();
            } else {
                text.push_str(&chunk.text);
            }
            len = chunk_len.min(max_chars);
            used = 1;
            continue;
        }
        if len + sep_len + chunk_len > max_chars {
            break;
        }
        text.push_str(CONTEXT_SEPARATOR);
        text.push_str(&chunk.text);
        len += sep_len + chunk_len;
        used += 1;
    }

    BudgetedContext {
        text,
        used,
        dropped: chunks.len() - used,
    }
}

#[derive(Clone)]
pub struct QueryEngine {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn Generator>,
    top_k: usize,
    max_context_chars: usize,
    timeout: Duration,
}

impl QueryEngine {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
        retrieval: &RetrievalConfig,
        generation: &GenerationConfig,
    ) -> Self {
        Self {
            provider,
            store,
            generator,
            top_k: retrieval.top_k.max(1),
            max_context_chars: retrieval.max_context_chars.max(1),
            timeout: Duration::from_secs(generation.timeout_secs),
        }
    }

    /// Top-K retrieval only; no generation.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "question must not be empty".to_string(),
            ));
        }
        if self.store.count().await? == 0 {
            return Err(PipelineError::RetrievalEmpty);
        }
        self.store
            .check_model(self.provider.model_name(), self.provider.dims())
            .await?;

        let query_vec = self
            .provider
            .embed_query(question)
            .await
            .map_err(|e| PipelineError::EmbeddingFailure {
                chunk_id: "query".to_string(),
                source_path: "<question>".into(),
                reason: e.to_string(),
            })?;
        self.store.search(&query_vec, self.top_k).await
    }

    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let ranked = self.retrieve(question).await?;
        let context = assemble_context(&ranked, self.max_context_chars);
        if context.dropped > 0 {
            tracing::debug!(
                used = context.used,
                dropped = context.dropped,
                budget = self.max_context_chars,
                "context budget exceeded, dropping lowest-ranked chunks"
            );
        }

        let prompt = render_prompt(&context.text, question.trim());
        let text = self.generate(&prompt).await?;

        let sources = ranked
            .into_iter()
            .take(context.used)
            .map(|c| SourceRef {
                chunk_id: c.id,
                source_path: c.source_path,
                index: c.index,
                score: c.score,
            })
            .collect();

        Ok(Answer {
            text,
            sources,
            dropped_chunks: context.dropped,
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let provider = self.generator.model_name().to_string();
        match tokio::time::timeout(self.timeout, self.generator.generate(prompt)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => {
                tracing::warn!(provider = %provider, error = %e, "generation failed");
                Err(PipelineError::GenerationFailure {
                    provider,
                    reason: e.to_string(),
                })
            }
            Err(_) => Err(PipelineError::GenerationFailure {
                provider,
                reason: format!("timed out after {}s", self.timeout.as_secs()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(text: &str) -> ScoredChunk {
        ScoredChunk {
            id: text.to_string(),
            source_path: "a.md".into(),
            index: 0,
            text: text.to_string(),
            score: 1.0,
        }
    }

    #[test]
    fn prompt_is_rendered_verbatim() {
        let prompt = render_prompt("CTX", "Q?");
        assert!(prompt.starts_with("\nYou are a helpful AI assistant"));
        assert!(prompt.contains("documents:\nCTX\n\nBased on"));
        assert!(prompt.contains("please say so clearly"));
        assert!(prompt.ends_with("Question: Q?\n\nAnswer: "));
    }

    #[test]
    fn placeholders_in_documents_stay_literal() {
        let prompt = render_prompt("see {question} below", "real?");
        assert!(prompt.contains("see {question} below"));
        assert!(prompt.contains("Question: real?"));
    }

    #[test]
    fn context_fits_everything_under_budget() {
        let ctx = assemble_context(&[scored("one"), scored("two")], 100);
        assert_eq!(ctx.text, "one\n\ntwo");
        assert_eq!(ctx.used, 2);
        assert_eq!(ctx.dropped, 0);
    }

    #[test]
    fn context_drops_lowest_ranked_first() {
        let ctx = assemble_context(&[scored("aaaa"), scored("bbbb"), scored("cc")], 11);
        assert_eq!(ctx.text, "aaaa\n\nbbbb");
        assert_eq!(ctx.used, 2);
        assert_eq!(ctx.dropped, 1);
    }

    #[test]
    fn oversized_top_chunk_is_truncated() {
        let ctx = assemble_context(&[scored("ééééé"), scored("x")], 3);
        assert_eq!(ctx.text, "ééé");
        assert_eq!(ctx.used, 1);
        assert_eq!(ctx.dropped, 1);
    }

    #[test]
    fn empty_ranking_gives_empty_context() {
        let ctx = assemble_context(&[], 10);
        assert_eq!(ctx.text, "");
        assert_eq!(ctx.dropped, 0);
    }
}
