//! Web search collaborator.
//!
//! The search-augmentation stage folds live web results into the prompt
//! through this seam. [`TavilyClient`] talks to the Tavily search API;
//! tests substitute scripted implementations.

use crate::{BraidError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// One web search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// Web search interface
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search the web for `query`, returning at most `max_results` hits
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

/// Configuration for the Tavily search client
#[derive(Debug, Clone)]
pub struct TavilyConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
}

impl TavilyConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.tavily.com".to_string(),
            api_key: api_key.into(),
            request_timeout_ms: 15_000,
        }
    }

    /// Read the API key from `TAVILY_API_KEY`. Returns `None` when the
    /// variable is unset, which callers treat as search disabled.
    pub fn from_env() -> Option<Self> {
        std::env::var("TAVILY_API_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .map(Self::new)
    }
}

/// HTTP client for the Tavily search API
pub struct TavilyClient {
    http: reqwest::Client,
    cfg: TavilyConfig,
}

impl TavilyClient {
    pub fn new(cfg: TavilyConfig) -> Result<Self> {
        if cfg.api_key.is_empty() {
            return Err(BraidError::Configuration(
                "Tavily API key must not be empty".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| BraidError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, cfg })
    }
}

#[async_trait]
impl WebSearch for TavilyClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let url = format!("{}/search", self.cfg.base_url.trim_end_matches('/'));
        debug!(target: "braid::websearch", query = %query, max_results, "Searching web");

        let body = json!({
            "api_key": self.cfg.api_key,
            "query": query,
            "include_answer": false,
            "max_results": max_results,
        });

        let resp = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| BraidError::Transport(format!("Search request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(BraidError::Transport(format!(
                "Search endpoint error: status={} body={}",
                status, body
            )));
        }

        let val: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BraidError::Validation(format!("Failed to parse search JSON: {e}")))?;

        Ok(parse_results(&val, max_results))
    }
}

fn parse_results(val: &serde_json::Value, max_results: usize) -> Vec<SearchResult> {
    let Some(items) = val.get("results").and_then(|r| r.as_array()) else {
        return Vec::new();
    };

    items
        .iter()
        .take(max_results)
        .filter_map(|item| {
            Some(SearchResult {
                title: item.get("title")?.as_str()?.to_string(),
                url: item.get("url")?.as_str()?.to_string(),
                content: item.get("content")?.as_str()?.to_string(),
                score: item.get("score").and_then(|s| s.as_f64()).map(|f| f as f32),
            })
        })
        .collect()
}
