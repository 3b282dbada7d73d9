//! Web search augmentation stage.
//!
//! Folds live web results into the property bag as a JSON-encoded
//! string. Queries too short to search usefully inject the literal
//! empty result set without touching the network. Search transport
//! failures propagate; retry policy belongs to an outer layer.

use super::Agent;
use crate::message::{PromptProperties, Utterance, PROP_SEARCH_RESULTS};
use crate::prompt::{ChatOptions, Prompt};
use crate::stream::ResponseStream;
use crate::tokens::word_count;
use crate::websearch::{SearchResult, WebSearch};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Queries below this many characters are not searched.
pub const MIN_QUERY_CHARS: usize = 5;

/// Number of results requested per search.
pub const MAX_RESULTS: usize = 3;

/// Word budget across all injected results.
pub const MAX_WORDS: usize = 2000;

/// Oversized result contents are cut to this many characters.
pub const TRUNCATED_CONTENT_CHARS: usize = 1000;

pub struct SearchAugmentStage {
    inner: Arc<dyn Agent>,
    search: Arc<dyn WebSearch>,
}

impl SearchAugmentStage {
    pub fn new(inner: Arc<dyn Agent>, search: Arc<dyn WebSearch>) -> Self {
        Self { inner, search }
    }
}

/// Cut a result's content to [`TRUNCATED_CONTENT_CHARS`] characters
/// when it exceeds its share of the word budget.
fn truncate_result(mut result: SearchResult) -> SearchResult {
    if word_count(&result.content) > MAX_WORDS / MAX_RESULTS {
        result.content = result.content.chars().take(TRUNCATED_CONTENT_CHARS).collect();
    }
    result
}

#[async_trait]
impl Agent for SearchAugmentStage {
    async fn create_prompt(
        &self,
        utterance: Utterance,
        props: PromptProperties,
        options: ChatOptions,
    ) -> Result<Prompt> {
        let encoded = if utterance.text.chars().count() < MIN_QUERY_CHARS {
            debug!(target: "braid::search", "Query too short, skipping web search");
            "[]".to_string()
        } else {
            let results = self.search.search(&utterance.text, MAX_RESULTS).await?;
            debug!(target: "braid::search", results = results.len(), "Web search complete");
            let truncated: Vec<SearchResult> =
                results.into_iter().map(truncate_result).collect();
            serde_json::to_string(&truncated)?
        };

        let props = props.with(PROP_SEARCH_RESULTS, Value::String(encoded));
        self.inner.create_prompt(utterance, props, options).await
    }

    async fn send(&self, prompt: Prompt) -> Result<ResponseStream> {
        self.inner.send(prompt).await
    }
}
