//! Document retrieval stage.
//!
//! Runs a top-K similarity search over the document store with the raw
//! user text and injects the matches into the property bag. Ordering is
//! whatever the store returned; reranking is a separate stage.

use super::Agent;
use crate::message::{PromptProperties, Utterance, PROP_DOCUMENTS};
use crate::prompt::{ChatOptions, Prompt};
use crate::store::{Document, VectorStore};
use crate::stream::ResponseStream;
use crate::tokens::word_count;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Number of candidates requested from the store.
pub const DEFAULT_TOP_K: usize = 10;

/// Cumulative word-count cap across the injected documents.
pub const DEFAULT_WORD_CAP: usize = 2000;

pub struct RetrievalStage {
    inner: Arc<dyn Agent>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
    word_cap: usize,
}

impl RetrievalStage {
    pub fn new(inner: Arc<dyn Agent>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            inner,
            store,
            top_k: DEFAULT_TOP_K,
            word_cap: DEFAULT_WORD_CAP,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_word_cap(mut self, word_cap: usize) -> Self {
        self.word_cap = word_cap;
        self
    }
}

/// All-or-nothing prefix truncation: a document is included only if it
/// fits entirely under the remaining cap. Documents are never split.
fn cap_by_words(documents: Vec<Document>, word_cap: usize) -> Vec<Document> {
    let mut kept = Vec::new();
    let mut words = 0usize;
    for doc in documents {
        let doc_words = word_count(&doc.content);
        if words + doc_words > word_cap {
            break;
        }
        words += doc_words;
        kept.push(doc);
    }
    kept
}

#[async_trait]
impl Agent for RetrievalStage {
    async fn create_prompt(
        &self,
        utterance: Utterance,
        props: PromptProperties,
        options: ChatOptions,
    ) -> Result<Prompt> {
        let matches = self
            .store
            .similarity_search(&utterance.text, self.top_k, None)
            .await?;
        let found = matches.len();
        let documents = cap_by_words(matches, self.word_cap);
        debug!(
            target: "braid::retrieval",
            found,
            injected = documents.len(),
            "Retrieved documents"
        );

        let props = props.with(PROP_DOCUMENTS, serde_json::to_value(&documents)?);
        self.inner.create_prompt(utterance, props, options).await
    }

    async fn send(&self, prompt: Prompt) -> Result<ResponseStream> {
        self.inner.send(prompt).await
    }
}
