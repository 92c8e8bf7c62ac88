//! Text generation backends.
//!
//! A [`Generator`] turns a fully rendered prompt into answer text. The query
//! engine owns prompt assembly and the overall time budget; generators only
//! make the call.
//!
//! | Config Value | Backend |
//! |-------------|---------|
//! | `"gemini"` | [`GeminiGenerator`]: `models/{model}:generateContent` |
//! | `"openai"` | [`OpenAIGenerator`]: `/v1/chat/completions` |
//! | `"ollama"` | [`OllamaGenerator`]: `/api/generate` |
//! | `"echo"` | [`EchoGenerator`]: returns the prompt unchanged |
//! | `"disabled"` | [`DisabledGenerator`]: always errors |

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::remote;

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("Generation provider is disabled. Set [generation] provider in config.")
    }
}

/// Returns the prompt as the answer. Useful offline and in tests, where it
/// exposes exactly what the model would have seen.
pub struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo"
    }
    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(prompt.to_string())
    }
}

// ============ Gemini ============

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Requires `GOOGLE_API_KEY`.
pub struct GeminiGenerator {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Gemini provider"))?;
        Ok(Self {
            model: model.trim_start_matches("models/").to_string(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key: remote::api_key("GOOGLE_API_KEY")?,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: remote::client(config.request_timeout_secs)?,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let json = remote::post_json(
            &self.client,
            &url,
            &[("x-goog-api-key", self.api_key.clone())],
            &body,
            self.max_retries,
            "Gemini",
        )
        .await?;
        parse_gemini_text(&json)
    }
}

/// Concatenates the text parts of the first candidate.
fn parse_gemini_text(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates");
            anyhow::anyhow!("Invalid Gemini response: {}", reason)
        })?;

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}

// ============ OpenAI ============

/// Requires `OPENAI_API_KEY`.
pub struct OpenAIGenerator {
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Ok(Self {
            model,
            url: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key: remote::api_key("OPENAI_API_KEY")?,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: remote::client(config.request_timeout_secs)?,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let json = remote::post_json(
            &self.client,
            &self.url,
            &[("Authorization", format!("Bearer {}", self.api_key))],
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
    }
}

// ============ Ollama ============

pub struct OllamaGenerator {
    model: String,
    url: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            model,
            url: format!("{}/api/generate", base.trim_end_matches('/')),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: remote::client(config.request_timeout_secs)?,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let json = remote::post_json(
            &self.client,
            &self.url,
            &[],
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
    }
}

pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "echo" => Ok(Arc::new(EchoGenerator)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_returns_prompt() {
        let g = create_generator(&GenerationConfig {
            provider: "echo".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(g.generate("Question: hi").await.unwrap(), "Question: hi");
    }

    #[tokio::test]
    async fn disabled_errors() {
        let g = DisabledGenerator;
        assert!(g.generate("x").await.is_err());
    }

    #[test]
    fn gemini_text_joins_parts() {
        let json = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "Twelve " }, { "text": "students." }] } }]
        });
        assert_eq!(parse_gemini_text(&json).unwrap(), "Twelve students.");
    }

    #[test]
    fn gemini_blocked_prompt_is_an_error() {
        let json = serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = parse_gemini_text(&json).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn unknown_provider_rejected() {
        let err = create_generator(&GenerationConfig {
            provider: "palm".into(),
            ..Default::default()
        });
        assert!(err.is_err());
    }
}
