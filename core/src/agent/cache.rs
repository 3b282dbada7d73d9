//! Semantic response cache stage.
//!
//! Outermost stage of the full chain. Before delegating a send, it
//! looks for a previously-issued prompt whose embedding is nearly
//! identical to the current one; a hit with a stored answer substitutes
//! that answer as a synthetic stream and skips inference entirely. A
//! miss records the prompt speculatively, and the answer is backfilled
//! into the same entry once the delegated stream aggregates cleanly.

use super::Agent;
use crate::message::{PromptProperties, Utterance};
use crate::prompt::{ChatOptions, Prompt};
use crate::store::{Document, VectorStore};
use crate::stream::ResponseStream;
use crate::tokens::word_count;
use crate::{BraidError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Minimum cosine similarity for a prior prompt to count as a hit.
pub const SIMILARITY_THRESHOLD: f32 = 0.99;

/// Prompts at or above this word count bypass the cache entirely; they
/// exceed the embedding model's effective context window.
pub const WORD_CEILING: usize = 8000;

/// Metadata key holding the cached answer text.
pub const ANSWER_METADATA_KEY: &str = "assistant";

/// Candidates examined per lookup; the first with a stored answer wins.
const SEARCH_TOP_K: usize = 10;

pub struct SemanticCacheStage {
    inner: Arc<dyn Agent>,
    cache: Arc<dyn VectorStore>,
}

impl SemanticCacheStage {
    pub fn new(inner: Arc<dyn Agent>, cache: Arc<dyn VectorStore>) -> Self {
        Self { inner, cache }
    }
}

/// Compound cache key correlating the entry with the persisted turn.
fn entry_key(session_id: &str, turn_ts_ms: i64) -> String {
    format!("{session_id}#{turn_ts_ms}")
}

fn cached_answer(doc: &Document) -> Option<&str> {
    doc.metadata
        .get(ANSWER_METADATA_KEY)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl Agent for SemanticCacheStage {
    async fn create_prompt(
        &self,
        utterance: Utterance,
        props: PromptProperties,
        options: ChatOptions,
    ) -> Result<Prompt> {
        self.inner.create_prompt(utterance, props, options).await
    }

    async fn send(&self, prompt: Prompt) -> Result<ResponseStream> {
        let user = prompt.user().ok_or_else(|| {
            BraidError::ContractViolation("Semantic cache requires a user utterance".into())
        })?;
        let session_id = user.session_id().ok_or_else(|| {
            BraidError::ContractViolation(
                "Semantic cache requires a session_id attribute on the utterance".into(),
            )
        })?;
        let turn_ts = user
            .turn_timestamp()
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        let text = prompt.contents();
        let words = word_count(&text);
        if words >= WORD_CEILING {
            debug!(
                target: "braid::cache",
                session_id = %session_id,
                words,
                "Prompt exceeds cache ceiling, bypassing"
            );
            return self.inner.send(prompt).await;
        }

        let candidates = self
            .cache
            .similarity_search(&text, SEARCH_TOP_K, Some(SIMILARITY_THRESHOLD))
            .await?;
        if let Some((id, answer)) = candidates
            .iter()
            .find_map(|doc| cached_answer(doc).map(|a| (doc.id.clone(), a.to_string())))
        {
            warn!(
                target: "braid::cache",
                session_id = %session_id,
                entry = %id,
                question = %user.text,
                "Cache hit, substituting stored answer for inference"
            );
            return Ok(ResponseStream::of_single(answer));
        }

        // Speculative entry: prompt text now, answer backfilled after
        // the delegated stream aggregates.
        let key = entry_key(&session_id, turn_ts);
        self.cache
            .add(vec![Document::new(key.clone(), text.clone())])
            .await?;

        let stream = self.inner.send(prompt).await?;

        let cache = Arc::clone(&self.cache);
        Ok(stream.aggregate(Box::new(move |answer| {
            Box::pin(async move {
                let entry = Document::new(key, text)
                    .with_metadata(ANSWER_METADATA_KEY, json!(answer));
                cache.add(vec![entry]).await
            })
        })))
    }
}
