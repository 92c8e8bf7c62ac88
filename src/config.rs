//! TOML configuration.
//!
//! Every section has defaults, so an empty file is a valid configuration
//! (Gemini embeddings + Gemini generation over `./Uploads`). API keys are
//! never read from the file; providers take them from the environment.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::remote;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub ingest: IngestConfig,
    pub chunking: ChunkingConfig,
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
    pub templates: TemplatesConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    /// Directory scanned (non-recursively) for documents.
    pub dir: PathBuf,
    /// Files larger than this fail conversion instead of being read.
    pub max_file_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./Uploads"),
            max_file_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters repeated from the previous chunk.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the persisted vector store.
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/store"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: Option<String>,
    pub dims: Option<usize>,
    /// Base URL override (Ollama, or a Gemini/OpenAI-compatible proxy).
    pub url: Option<String>,
    pub batch_size: usize,
    /// Embedding batches in flight at once.
    pub concurrency: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: Some("gemini-embedding-001".to_string()),
            dims: Some(3072),
            url: None,
            batch_size: 32,
            concurrency: 1,
            max_retries: 1,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: String,
    pub model: Option<String>,
    pub url: Option<String>,
    pub temperature: f32,
    pub max_retries: u32,
    /// Time budget for one question, retries included.
    pub timeout_secs: u64,
    /// Timeout for a single HTTP attempt. Every attempt plus the backoff
    /// between them must fit inside `timeout_secs`.
    pub request_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: Some("gemini-1.5-flash".to_string()),
            url: None,
            temperature: 0.7,
            max_retries: 1,
            timeout_secs: 60,
            request_timeout_secs: 25,
        }
    }
}

impl GenerationConfig {
    /// Seconds taken when every attempt times out: all attempts plus the
    /// backoff sleeps between them.
    pub fn worst_case_secs(&self) -> u64 {
        let attempts = u64::from(self.max_retries) + 1;
        let backoff: u64 = (1..=self.max_retries)
            .map(|attempt| remote::backoff(attempt).as_secs())
            .sum();
        self.request_timeout_secs
            .saturating_mul(attempts)
            .saturating_add(backoff)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Upper bound on the assembled context, in characters.
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            max_context_chars: 12_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Maximum accepted upload body, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Optional TOML file replacing the built-in template catalog.
    pub path: Option<PathBuf>,
}

const EMBEDDING_PROVIDERS: &[&str] = &["disabled", "gemini", "openai", "ollama", "hash", "local"];
const GENERATION_PROVIDERS: &[&str] = &["disabled", "gemini", "openai", "ollama", "echo"];

impl Config {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be < chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }

        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.max_context_chars == 0 {
            bail!("retrieval.max_context_chars must be > 0");
        }

        if !EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            bail!(
                "Unknown embedding provider: '{}'. Must be one of: {}",
                self.embedding.provider,
                EMBEDDING_PROVIDERS.join(", ")
            );
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be >= 1");
        }
        if self.embedding.concurrency == 0 {
            bail!("embedding.concurrency must be >= 1");
        }
        if matches!(
            self.embedding.provider.as_str(),
            "gemini" | "openai" | "ollama" | "hash"
        ) {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }

        if !GENERATION_PROVIDERS.contains(&self.generation.provider.as_str()) {
            bail!(
                "Unknown generation provider: '{}'. Must be one of: {}",
                self.generation.provider,
                GENERATION_PROVIDERS.join(", ")
            );
        }
        if matches!(
            self.generation.provider.as_str(),
            "gemini" | "openai" | "ollama"
        ) && self.generation.model.is_none()
        {
            bail!(
                "generation.model must be specified when provider is '{}'",
                self.generation.provider
            );
        }
        if self.generation.timeout_secs == 0 {
            bail!("generation.timeout_secs must be > 0");
        }
        if self.generation.request_timeout_secs == 0 {
            bail!("generation.request_timeout_secs must be > 0");
        }
        let worst_case = self.generation.worst_case_secs();
        if worst_case > self.generation.timeout_secs {
            bail!(
                "generation.timeout_secs ({}) is shorter than {} attempts of {}s plus backoff ({}s); \
                 raise timeout_secs or lower request_timeout_secs / max_retries",
                self.generation.timeout_secs,
                self.generation.max_retries + 1,
                self.generation.request_timeout_secs,
                worst_case
            );
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Config::from_toml_str(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.embedding.provider, "gemini");
        assert_eq!(
            config.embedding.model.as_deref(),
            Some("gemini-embedding-001")
        );
        assert_eq!(config.generation.model.as_deref(), Some("gemini-1.5-flash"));
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let err = Config::from_toml_str("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n")
            .unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn unknown_provider_rejected() {
        let err = Config::from_toml_str("[embedding]\nprovider = \"cohere\"\n").unwrap_err();
        assert!(err.to_string().contains("cohere"));
    }

    #[test]
    fn remote_embedding_requires_dims() {
        let toml = "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 0\n";
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("dims"));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            "[retrieval]\ntop_k = 8\n\n[ingest]\ndir = \"/srv/uploads\"\n",
        )
        .unwrap();
        assert_eq!(config.retrieval.top_k, 8);
        assert_eq!(config.retrieval.max_context_chars, 12_000);
        assert_eq!(config.ingest.dir, PathBuf::from("/srv/uploads"));
        assert_eq!(config.ingest.max_file_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn default_generation_attempts_fit_the_budget() {
        let generation = GenerationConfig::default();
        assert_eq!(generation.worst_case_secs(), 25 + 1 + 25);
        assert!(generation.worst_case_secs() <= generation.timeout_secs);
    }

    #[test]
    fn attempts_longer_than_the_budget_are_rejected() {
        // Two 60s attempts cannot finish inside a 60s budget.
        let toml = "[generation]\ntimeout_secs = 60\nrequest_timeout_secs = 60\nmax_retries = 1\n";
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));

        let toml = "[generation]\ntimeout_secs = 10\nrequest_timeout_secs = 3\nmax_retries = 2\n";
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.generation.worst_case_secs(), 3 * 3 + 1 + 2);
    }

    #[test]
    fn zero_request_timeout_is_rejected() {
        let err = Config::from_toml_str("[generation]\nrequest_timeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs must be > 0"));
    }

    #[test]
    fn example_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/docassist.example.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config.embedding.dims, Some(3072));
        assert_eq!(config.server.max_upload_bytes, 25 * 1024 * 1024);
        assert_eq!(config.generation.request_timeout_secs, 25);
    }
}
