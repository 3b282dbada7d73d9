use braid_core::embedding::EmbeddingConfig;
use braid_core::llm::ChatClientConfig;
use braid_core::websearch::TavilyConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// High-level configuration for the chat agent demo
#[derive(Clone, Debug)]
pub struct ChatAgentConfig {
    pub chat: ChatClientConfig,
    pub embedding: EmbeddingConfig,
    /// Web search is enabled only when a Tavily credential is present.
    pub search: Option<TavilyConfig>,
    /// Optional directory of .txt/.md files seeded into the document store
    pub documents_dir: Option<PathBuf>,
}

impl Default for ChatAgentConfig {
    fn default() -> Self {
        Self {
            chat: ChatClientConfig::from_env(),
            embedding: EmbeddingConfig::from_env(),
            search: TavilyConfig::from_env(),
            documents_dir: std::env::var("DOCUMENTS_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }
}

impl ChatAgentConfig {
    /// Load configuration from a TOML file (path via CHAT_AGENT_CONFIG or
    /// ./chat_agent.toml), overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("CHAT_AGENT_CONFIG").unwrap_or_else(|_| "chat_agent.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target: "chat_agent", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<ChatAgentToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target: "chat_agent", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "chat_agent", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ChatAgentToml {
    pub documents_dir: Option<PathBuf>,
    pub chat: Option<ChatToml>,
    pub embedding: Option<EmbeddingToml>,
    pub search: Option<SearchToml>,
}

impl ChatAgentToml {
    fn overlay(self, mut base: ChatAgentConfig) -> ChatAgentConfig {
        if let Some(d) = self.documents_dir {
            base.documents_dir = Some(d);
        }
        if let Some(c) = self.chat {
            c.apply(&mut base.chat);
        }
        if let Some(e) = self.embedding {
            e.apply(&mut base.embedding);
        }
        if let Some(s) = self.search {
            if let Some(key) = s.api_key {
                let mut cfg = base
                    .search
                    .unwrap_or_else(|| TavilyConfig::new(key.clone()));
                cfg.api_key = key;
                if let Some(url) = s.base_url {
                    cfg.base_url = url;
                }
                base.search = Some(cfg);
            }
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ChatToml {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub request_timeout_ms: Option<u64>,
}

impl ChatToml {
    fn apply(self, c: &mut ChatClientConfig) {
        if let Some(x) = self.base_url {
            c.base_url = x;
        }
        if let Some(x) = self.model {
            c.model = x;
        }
        if let Some(x) = self.api_key {
            c.api_key = Some(x);
        }
        if let Some(x) = self.temperature {
            c.temperature = x;
        }
        if let Some(x) = self.max_tokens {
            c.max_tokens = x;
        }
        if let Some(x) = self.request_timeout_ms {
            c.request_timeout_ms = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct EmbeddingToml {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub dimensions: Option<usize>,
}

impl EmbeddingToml {
    fn apply(self, e: &mut EmbeddingConfig) {
        if let Some(x) = self.base_url {
            e.base_url = x;
        }
        if let Some(x) = self.model {
            e.model = x;
        }
        if let Some(x) = self.api_key {
            e.api_key = Some(x);
        }
        if let Some(x) = self.dimensions {
            e.dimensions = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct SearchToml {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}
