//! Document reranking stage.
//!
//! Sits inside the retrieval stage, so the property bag already holds
//! the similarity-ranked document list when this runs. Current policy:
//! log the pairwise cosine similarity of adjacent documents for
//! observability, then truncate to the top three without reordering.
//! Callers wanting a genuine score-based reorder supply their own
//! ordering; this stage deliberately preserves the store's ranking.

use super::Agent;
use crate::message::{PromptProperties, Utterance, PROP_DOCUMENTS};
use crate::prompt::{ChatOptions, Prompt};
use crate::store::{cosine_similarity, Document};
use crate::stream::ResponseStream;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Number of documents kept after truncation.
pub const MAX_DOCUMENTS: usize = 3;

pub struct RerankStage {
    inner: Arc<dyn Agent>,
}

impl RerankStage {
    pub fn new(inner: Arc<dyn Agent>) -> Self {
        Self { inner }
    }
}

fn log_pairwise_similarity(documents: &[Document]) {
    for pair in documents.windows(2) {
        let (left, right) = (&pair[0], &pair[1]);
        if let (Some(a), Some(b)) = (&left.embedding, &right.embedding) {
            info!(
                target: "braid::rerank",
                left = %left.id,
                right = %right.id,
                similarity = cosine_similarity(a, b),
                "Adjacent document similarity"
            );
        }
    }
}

#[async_trait]
impl Agent for RerankStage {
    async fn create_prompt(
        &self,
        utterance: Utterance,
        props: PromptProperties,
        options: ChatOptions,
    ) -> Result<Prompt> {
        let props = match props.get(PROP_DOCUMENTS) {
            Some(value) => {
                let mut documents: Vec<Document> = serde_json::from_value(value.clone())?;
                log_pairwise_similarity(&documents);
                documents.truncate(MAX_DOCUMENTS);
                props.with(PROP_DOCUMENTS, serde_json::to_value(&documents)?)
            }
            None => props,
        };

        self.inner.create_prompt(utterance, props, options).await
    }

    async fn send(&self, prompt: Prompt) -> Result<ResponseStream> {
        self.inner.send(prompt).await
    }
}
