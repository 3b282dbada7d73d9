//! The augmentation pipeline.
//!
//! An [`Agent`] is one link in a chain of request/response transformers
//! around a streaming chat call. Prompt construction flows inward from
//! the outermost stage to the [`BaseAgent`]; the response stream flows
//! back outward through every wrapping stage. Each stage holds its inner
//! neighbor as `Arc<dyn Agent>` and overrides only the operation it
//! cares about, delegating the rest.
//!
//! The chain is assembled once at startup and never rewired
//! mid-conversation. A typical full chain, outermost first:
//!
//! ```text
//! SemanticCacheStage -> HistoryStage -> SearchAugmentStage
//!     -> RetrievalStage -> RerankStage -> BaseAgent
//! ```

pub mod base;
pub mod cache;
pub mod history;
pub mod rerank;
pub mod retrieval;
pub mod search;

pub use base::BaseAgent;
pub use cache::SemanticCacheStage;
pub use history::HistoryStage;
pub use rerank::RerankStage;
pub use retrieval::RetrievalStage;
pub use search::SearchAugmentStage;

use crate::message::{PromptProperties, Utterance};
use crate::prompt::{ChatOptions, Prompt};
use crate::stream::ResponseStream;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// One stage in the augmentation pipeline.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Assemble the prompt for `utterance`.
    ///
    /// A stage may augment `props` and `options` before delegating
    /// inward; the innermost stage renders the final [`Prompt`]. The
    /// utterance's attributes travel with it into the prompt, so
    /// attributes stamped here are visible to every stage's `send`.
    async fn create_prompt(
        &self,
        utterance: Utterance,
        props: PromptProperties,
        options: ChatOptions,
    ) -> Result<Prompt>;

    /// Open a response stream for an assembled prompt.
    ///
    /// Pass-through by default for most stages; overridden to observe
    /// the stream (history persistence, cache backfill) or to
    /// substitute one entirely (cache hit).
    async fn send(&self, prompt: Prompt) -> Result<ResponseStream>;

    /// Convenience entry point: build the prompt through the whole
    /// chain, then send it through the whole chain.
    async fn ask(&self, utterance: Utterance) -> Result<ResponseStream> {
        let prompt = self
            .create_prompt(utterance, PromptProperties::new(), ChatOptions::new())
            .await?;
        self.send(prompt).await
    }
}

/// Builds a stage chain inside-out, starting from the base agent.
///
/// ```ignore
/// let agent = AgentChain::new(base)
///     .wrap(|inner| Arc::new(RerankStage::new(inner)))
///     .wrap(|inner| Arc::new(RetrievalStage::new(inner, docs)))
///     .build();
/// ```
pub struct AgentChain {
    outermost: Arc<dyn Agent>,
}

impl AgentChain {
    pub fn new(base: Arc<dyn Agent>) -> Self {
        Self { outermost: base }
    }

    /// Wrap the current outermost stage with one more layer
    pub fn wrap<F>(self, stage: F) -> Self
    where
        F: FnOnce(Arc<dyn Agent>) -> Arc<dyn Agent>,
    {
        Self {
            outermost: stage(self.outermost),
        }
    }

    pub fn build(self) -> Arc<dyn Agent> {
        self.outermost
    }
}
