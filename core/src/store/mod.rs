//! Storage collaborators: vector store and conversation store.
//!
//! Both are trait seams so the pipeline stages never know whether they
//! are talking to an in-process map or a remote database. In-memory
//! implementations live in [`memory`].

pub mod memory;

pub use memory::{InMemoryConversationStore, InMemoryVectorStore};

use crate::message::Role;
use crate::message::Utterance;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Metadata key under which similarity search attaches the cosine score
/// of each returned document.
pub const SIMILARITY_METADATA_KEY: &str = "similarity";

/// A stored passage with open metadata and an optional embedding.
///
/// The embedding is filled in by the store on add; callers normally
/// construct documents without one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,

    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: BTreeMap::new(),
            embedding: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Cosine similarity attached by the store that returned this
    /// document, if any
    pub fn similarity(&self) -> Option<f32> {
        self.metadata
            .get(SIMILARITY_METADATA_KEY)
            .and_then(|v| v.as_f64())
            .map(|f| f as f32)
    }
}

/// Vector similarity store
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Add documents, embedding each one. Adding a document whose id is
    /// already present replaces the previous version.
    async fn add(&self, documents: Vec<Document>) -> Result<()>;

    /// Return up to `top_k` documents most similar to `query`, best
    /// first, each carrying its score under
    /// [`SIMILARITY_METADATA_KEY`]. When `min_score` is set, documents
    /// scoring below it are excluded.
    async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<Document>>;
}

/// Per-session conversation persistence
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append one turn to `session_id` at `turn_ts_ms` (Unix
    /// milliseconds). Several turns of one exchange share a timestamp;
    /// insertion order breaks the tie.
    async fn append(&self, session_id: &str, turn_ts_ms: i64, role: Role, text: &str)
        -> Result<()>;

    /// Most recent turns of `session_id`, newest first, at most `limit`
    async fn fetch(&self, session_id: &str, limit: usize) -> Result<Vec<Utterance>>;

    /// Drop all turns of `session_id`
    async fn clear(&self, session_id: &str) -> Result<()>;
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero-norm inputs rather than
/// NaN, so degenerate embeddings rank last instead of poisoning sorts.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cosine_similarity_identical() {
        let v = vec![0.5, 0.5, 0.7];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_degenerate() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_document_similarity_accessor() {
        let doc = Document::new("d1", "text").with_metadata(SIMILARITY_METADATA_KEY, json!(0.87));
        assert!((doc.similarity().unwrap() - 0.87).abs() < 1e-6);

        let bare = Document::new("d2", "text");
        assert!(bare.similarity().is_none());
    }
}
