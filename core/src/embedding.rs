//! Embedding model collaborator.
//!
//! Turns text into a fixed-dimension float vector. The dimension is
//! known up front ([`EmbeddingModel::dimensions`]) and queried once at
//! startup by vector stores to size their columns and indexes.

use crate::{BraidError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Text-to-vector embedding interface
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed `text` into a fixed-dimension vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimension of every vector this model produces
    fn dimensions(&self) -> usize;
}

/// Configuration for the OpenAI-compatible embedding client
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub dimensions: usize,
    pub request_timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key: None,
            dimensions: 1536,
            request_timeout_ms: 30_000,
        }
    }
}

impl EmbeddingConfig {
    /// Build a config from environment variables, falling back to
    /// defaults. Called from bootstrap code only; stages receive the
    /// resulting config explicitly.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_or("EMBEDDING_BASE_URL", defaults.base_url),
            model: env_or("EMBEDDING_MODEL", defaults.model),
            api_key: std::env::var("EMBEDDING_API_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            dimensions: std::env::var("EMBEDDING_DIMENSIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.dimensions),
            request_timeout_ms: defaults.request_timeout_ms,
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
}

/// HTTP client for an OpenAI-compatible `/embeddings` endpoint
pub struct OpenAiEmbeddingModel {
    http: reqwest::Client,
    cfg: EmbeddingConfig,
}

impl OpenAiEmbeddingModel {
    pub fn new(cfg: EmbeddingConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| BraidError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, cfg })
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiEmbeddingModel {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.cfg.base_url.trim_end_matches('/'));
        debug!(target: "braid::embedding", %url, chars = text.len(), "Embedding text");

        let mut req = self.http.post(&url).header("content-type", "application/json");
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }

        let body = json!({
            "model": self.cfg.model,
            "input": text,
        });

        let resp = req
            .json(&body)
            .send()
            .await
            .map_err(|e| BraidError::Transport(format!("Embedding request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(BraidError::Transport(format!(
                "Embedding endpoint error: status={} body={}",
                status, body
            )));
        }

        let val: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BraidError::Validation(format!("Failed to parse embedding JSON: {e}")))?;

        let vector = extract_embedding(&val).ok_or_else(|| {
            BraidError::Validation("Missing data[0].embedding in embedding response".into())
        })?;

        if vector.len() != self.cfg.dimensions {
            return Err(BraidError::Validation(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.cfg.dimensions,
                vector.len()
            )));
        }

        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.cfg.dimensions
    }
}

fn extract_embedding(v: &serde_json::Value) -> Option<Vec<f32>> {
    v.get("data")?
        .get(0)?
        .get("embedding")?
        .as_array()?
        .iter()
        .map(|x| x.as_f64().map(|f| f as f32))
        .collect()
}
