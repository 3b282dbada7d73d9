//! OpenAI-compatible streaming chat client.
//!
//! Speaks `POST /chat/completions` with `stream: true` and relays the
//! server-sent-event fragments into a [`ResponseStream`]. Transport
//! failures after the stream opens are delivered through the stream,
//! never swallowed, so downstream aggregation can tell a clean close
//! from a broken one.

use crate::prompt::Prompt;
use crate::stream::{ChatChunk, ResponseStream};
use crate::{BraidError, ChatModel, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Configuration for the streaming chat client
#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_ms: u64,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 1024,
            request_timeout_ms: 120_000,
        }
    }
}

impl ChatClientConfig {
    /// Build a config from environment variables, falling back to
    /// defaults. Bootstrap-only; the client itself never reads the
    /// environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_or("CHAT_BASE_URL", defaults.base_url),
            model: env_or("CHAT_MODEL", defaults.model),
            api_key: std::env::var("CHAT_API_KEY").ok().filter(|s| !s.is_empty()),
            temperature: std::env::var("CHAT_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.temperature),
            max_tokens: std::env::var("CHAT_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_tokens),
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

/// HTTP chat model speaking the OpenAI streaming protocol
pub struct OpenAiChatModel {
    http: reqwest::Client,
    cfg: ChatClientConfig,
}

impl OpenAiChatModel {
    pub fn new(cfg: ChatClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| BraidError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, cfg })
    }

    fn request_body(&self, prompt: &Prompt) -> Value {
        let messages: Vec<Value> = prompt
            .utterances()
            .iter()
            .map(|u| json!({"role": u.role.to_string(), "content": u.text}))
            .collect();

        let options = prompt.options();
        let mut body = json!({
            "model": options.model.clone().unwrap_or_else(|| self.cfg.model.clone()),
            "messages": messages,
            "temperature": options.temperature.unwrap_or(self.cfg.temperature),
            "max_tokens": options.max_tokens.unwrap_or(self.cfg.max_tokens),
            "stream": true,
        });
        if !options.tools.is_empty() {
            body["tools"] = Value::Array(options.tools.clone());
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn stream(&self, prompt: Prompt) -> Result<ResponseStream> {
        let url = format!(
            "{}/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        );
        let body = self.request_body(&prompt);
        debug!(
            target: "braid::llm",
            %url,
            messages = prompt.utterances().len(),
            "Starting streaming completion"
        );

        let mut req = self.http.post(&url).header("content-type", "application/json");
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .json(&body)
            .send()
            .await
            .map_err(|e| BraidError::Transport(format!("Chat request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(BraidError::Transport(format!(
                "Chat endpoint error: status={} body={}",
                status, body
            )));
        }

        let (tx, out) = ResponseStream::channel();
        tokio::spawn(relay_sse(resp.bytes_stream(), tx));
        Ok(out)
    }
}

/// Relay an SSE body into response fragments.
///
/// A successful stream terminates with a `data: [DONE]` line; a body
/// that closes without it is a truncated response and is surfaced as a
/// transport error, so downstream aggregation never mistakes a partial
/// answer for a complete one.
async fn relay_sse<S, B, E>(byte_stream: S, tx: mpsc::UnboundedSender<Result<ChatChunk>>)
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    futures::pin_mut!(byte_stream);
    let mut pending = String::new();

    while let Some(chunk) = byte_stream.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(target: "braid::llm", error = %e, "Stream transport failure");
                let _ = tx.send(Err(BraidError::Transport(format!(
                    "Stream interrupted: {e}"
                ))));
                return;
            }
        };

        pending.push_str(&String::from_utf8_lossy(bytes.as_ref()));

        while let Some(pos) = pending.find('\n') {
            let line: String = pending.drain(..=pos).collect();
            let line = line.trim();

            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            if data == "[DONE]" {
                trace!(target: "braid::llm", "Stream complete");
                return;
            }

            match serde_json::from_str::<Value>(data) {
                Ok(event) => {
                    if let Some(content) = extract_delta(&event) {
                        if !content.is_empty() && tx.send(Ok(ChatChunk::new(content))).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    trace!(target: "braid::llm", error = %e, "Skipping unparseable SSE line");
                }
            }
        }
    }

    // Body closed without the terminator; the answer may be truncated.
    warn!(target: "braid::llm", "Stream ended before [DONE] terminator");
    let _ = tx.send(Err(BraidError::Transport(
        "Stream ended before [DONE] terminator".into(),
    )));
}

fn extract_delta(event: &Value) -> Option<String> {
    event
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}
