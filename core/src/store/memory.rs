//! In-memory store implementations.
//!
//! Brute-force structures backed by `DashMap`, suitable for tests,
//! demos, and single-process deployments. Both are drop-in behind the
//! store traits, so swapping in a real database touches only bootstrap
//! code.

use super::{cosine_similarity, ConversationStore, Document, VectorStore, SIMILARITY_METADATA_KEY};
use crate::embedding::EmbeddingModel;
use crate::message::{Role, Utterance};
use crate::{BraidError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Brute-force in-memory vector store.
///
/// Documents are embedded on add and scored by exhaustive cosine
/// comparison on search. Keyed by document id, so re-adding an id
/// replaces the stored version.
pub struct InMemoryVectorStore {
    embedder: Arc<dyn EmbeddingModel>,
    documents: DashMap<String, Document>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            embedder,
            documents: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add(&self, documents: Vec<Document>) -> Result<()> {
        for mut doc in documents {
            if doc.embedding.is_none() {
                doc.embedding = Some(self.embedder.embed(&doc.content).await?);
            }

            let embedding = doc.embedding.as_ref().ok_or_else(|| {
                BraidError::Storage(format!("Document {} has no embedding after add", doc.id))
            })?;
            if embedding.len() != self.embedder.dimensions() {
                return Err(BraidError::Storage(format!(
                    "Document {} embedding dimension {} does not match store dimension {}",
                    doc.id,
                    embedding.len(),
                    self.embedder.dimensions()
                )));
            }

            self.documents.insert(doc.id.clone(), doc);
        }
        Ok(())
    }

    async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<Document>> {
        if top_k == 0 || self.documents.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;

        let mut scored: Vec<(f32, Document)> = self
            .documents
            .iter()
            .filter_map(|entry| {
                let doc = entry.value();
                let embedding = doc.embedding.as_ref()?;
                let score = cosine_similarity(&query_embedding, embedding);
                if min_score.map_or(true, |min| score >= min) {
                    Some((score, doc.clone()))
                } else {
                    None
                }
            })
            .collect();

        // Score descending, id ascending for deterministic ties.
        scored.sort_by(|(sa, da), (sb, db)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| da.id.cmp(&db.id))
        });
        scored.truncate(top_k);

        debug!(
            target: "braid::store",
            candidates = self.documents.len(),
            returned = scored.len(),
            "Similarity search complete"
        );

        Ok(scored
            .into_iter()
            .map(|(score, mut doc)| {
                doc.metadata
                    .insert(SIMILARITY_METADATA_KEY.to_string(), json!(score));
                doc
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
struct StoredTurn {
    turn_ts_ms: i64,
    role: Role,
    text: String,
}

/// In-memory per-session conversation log.
pub struct InMemoryConversationStore {
    sessions: DashMap<String, Vec<StoredTurn>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append(
        &self,
        session_id: &str,
        turn_ts_ms: i64,
        role: Role,
        text: &str,
    ) -> Result<()> {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .push(StoredTurn {
                turn_ts_ms,
                role,
                text: text.to_string(),
            });
        Ok(())
    }

    async fn fetch(&self, session_id: &str, limit: usize) -> Result<Vec<Utterance>> {
        let turns = match self.sessions.get(session_id) {
            Some(entry) => entry.value().clone(),
            None => return Ok(Vec::new()),
        };

        // Newest first; turns sharing a timestamp (a question/answer
        // pair persisted together) come back in reverse insertion
        // order like everything else.
        let mut indexed: Vec<(usize, StoredTurn)> = turns.into_iter().enumerate().collect();
        indexed.sort_by(|(ia, ta), (ib, tb)| {
            tb.turn_ts_ms
                .cmp(&ta.turn_ts_ms)
                .then_with(|| ib.cmp(ia))
        });
        indexed.truncate(limit);

        Ok(indexed
            .into_iter()
            .map(|(_, turn)| Utterance::new(turn.role, turn.text))
            .collect())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        self.sessions.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Deterministic embedder: each distinct text gets its own one-hot
    /// axis, so identical texts score 1.0 and distinct texts 0.0.
    /// Individual texts can be scripted to a fixed vector instead.
    pub(crate) struct StubEmbedder {
        axes: DashMap<String, usize>,
        overrides: DashMap<String, Vec<f32>>,
        dims: usize,
    }

    impl StubEmbedder {
        pub(crate) fn new(dims: usize) -> Arc<Self> {
            Arc::new(Self {
                axes: DashMap::new(),
                overrides: DashMap::new(),
                dims,
            })
        }

        pub(crate) fn script(&self, text: &str, vector: Vec<f32>) {
            self.overrides.insert(text.to_string(), vector);
        }
    }

    #[async_trait]
    impl EmbeddingModel for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if let Some(v) = self.overrides.get(text) {
                return Ok(v.clone());
            }
            // Computed before `entry` takes a shard lock: calling
            // `len()` inside `or_insert_with` deadlocks DashMap.
            let next_axis = self.axes.len();
            let axis = *self.axes.entry(text.to_string()).or_insert(next_axis);
            let mut v = vec![0.0; self.dims];
            v[axis % self.dims] = 1.0;
            Ok(v)
        }

        fn dimensions(&self) -> usize {
            self.dims
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubEmbedder;
    use super::*;

    #[tokio::test]
    async fn test_vector_store_add_and_search() {
        let embedder = StubEmbedder::new(8);
        let store = InMemoryVectorStore::new(embedder);

        store
            .add(vec![
                Document::new("a", "rust ownership rules"),
                Document::new("b", "tokio task scheduling"),
            ])
            .await
            .unwrap();

        let hits = store
            .similarity_search("rust ownership rules", 10, None)
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert!((hits[0].similarity().unwrap() - 1.0).abs() < 1e-6);
        assert!(hits[1].similarity().unwrap().abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_vector_store_min_score_filters() {
        let embedder = StubEmbedder::new(8);
        let store = InMemoryVectorStore::new(embedder);

        store
            .add(vec![
                Document::new("match", "exact question"),
                Document::new("other", "unrelated passage"),
            ])
            .await
            .unwrap();

        let hits = store
            .similarity_search("exact question", 10, Some(0.99))
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "match");
    }

    #[tokio::test]
    async fn test_vector_store_upsert_replaces_by_id() {
        let embedder = StubEmbedder::new(8);
        let store = InMemoryVectorStore::new(embedder);

        store
            .add(vec![Document::new("k", "first version")])
            .await
            .unwrap();
        store
            .add(vec![Document::new("k", "second version")])
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        let hits = store
            .similarity_search("second version", 10, None)
            .await
            .unwrap();
        assert_eq!(hits[0].content, "second version");
    }

    #[tokio::test]
    async fn test_vector_store_rejects_dimension_mismatch() {
        let embedder = StubEmbedder::new(8);
        let store = InMemoryVectorStore::new(embedder);

        let mut doc = Document::new("bad", "text");
        doc.embedding = Some(vec![1.0, 0.0]);

        assert!(matches!(
            store.add(vec![doc]).await,
            Err(BraidError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_conversation_store_newest_first() {
        let store = InMemoryConversationStore::new();

        store.append("s1", 1000, Role::User, "first q").await.unwrap();
        store
            .append("s1", 1000, Role::Assistant, "first a")
            .await
            .unwrap();
        store.append("s1", 2000, Role::User, "second q").await.unwrap();

        let turns = store.fetch("s1", 10).await.unwrap();
        let texts: Vec<&str> = turns.iter().map(|u| u.text.as_str()).collect();
        assert_eq!(texts, vec!["second q", "first a", "first q"]);
    }

    #[tokio::test]
    async fn test_conversation_store_limit_and_clear() {
        let store = InMemoryConversationStore::new();
        for i in 0..5 {
            store
                .append("s1", 1000 + i, Role::User, &format!("turn {i}"))
                .await
                .unwrap();
        }

        let turns = store.fetch("s1", 2).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text, "turn 4");

        store.clear("s1").await.unwrap();
        assert!(store.fetch("s1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conversation_store_isolated_sessions() {
        let store = InMemoryConversationStore::new();
        store.append("a", 1, Role::User, "in a").await.unwrap();
        store.append("b", 1, Role::User, "in b").await.unwrap();

        let turns = store.fetch("a", 10).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].text, "in a");
    }
}
