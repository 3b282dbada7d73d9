//! End-to-end pipeline tests over scripted collaborators.

use async_trait::async_trait;
use braid_core::agent::{
    AgentChain, BaseAgent, HistoryStage, RerankStage, RetrievalStage, SearchAugmentStage,
    SemanticCacheStage,
};
use braid_core::message::SESSION_ID_ATTR;
use braid_core::prompt::SystemPromptTemplate;
use braid_core::store::{InMemoryConversationStore, InMemoryVectorStore};
use braid_core::websearch::{SearchResult, WebSearch};
use braid_core::{
    Agent, BraidError, ChatChunk, ChatModel, ConversationStore, Document, EmbeddingModel, Prompt,
    ResponseStream, Result, Utterance, VectorStore,
};
use dashmap::DashMap;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Deterministic embedder: each distinct text gets its own one-hot
/// axis, so identical texts score 1.0 and distinct texts 0.0.
struct StubEmbedder {
    axes: DashMap<String, usize>,
    dims: usize,
}

impl StubEmbedder {
    fn new(dims: usize) -> Arc<Self> {
        Arc::new(Self {
            axes: DashMap::new(),
            dims,
        })
    }
}

#[async_trait]
impl EmbeddingModel for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
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

/// Chat model that replies with a fixed answer, counting invocations
/// and recording every prompt it receives.
struct ScriptedChatModel {
    reply: String,
    calls: AtomicUsize,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedChatModel {
    fn new(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.into(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_system_text(&self) -> String {
        let prompts = self.prompts.lock().unwrap();
        prompts
            .last()
            .map(|p| p.utterances()[0].text.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn stream(&self, prompt: Prompt) -> Result<ResponseStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt);

        // Fragmented reply to exercise aggregation.
        let (tx, stream) = ResponseStream::channel();
        for word in self.reply.split_inclusive(' ') {
            let _ = tx.send(Ok(ChatChunk::new(word)));
        }
        Ok(stream)
    }
}

/// Chat model whose stream breaks mid-answer.
struct FailingChatModel;

#[async_trait]
impl ChatModel for FailingChatModel {
    async fn stream(&self, _prompt: Prompt) -> Result<ResponseStream> {
        let (tx, stream) = ResponseStream::channel();
        let _ = tx.send(Ok(ChatChunk::new("partial ")));
        let _ = tx.send(Ok(ChatChunk::new("answer")));
        let _ = tx.send(Err(BraidError::Transport("connection reset".into())));
        Ok(stream)
    }
}

struct ScriptedSearch {
    calls: AtomicUsize,
}

impl ScriptedSearch {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl WebSearch for ScriptedSearch {
    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![SearchResult {
            title: "Scripted hit".into(),
            url: "https://example.com/hit".into(),
            content: format!("web context for: {query}"),
            score: Some(0.5),
        }])
    }
}

fn session_utterance(text: &str) -> Utterance {
    Utterance::user(text).with_attribute(SESSION_ID_ATTR, json!("session-1"))
}

#[tokio::test]
async fn test_cache_short_circuits_identical_prompt() {
    let model = ScriptedChatModel::new("it is sunny");
    let cache = Arc::new(InMemoryVectorStore::new(StubEmbedder::new(16)));

    let agent = AgentChain::new(Arc::new(BaseAgent::new(model.clone()).with_template(
        SystemPromptTemplate::new("You answer questions."),
    )))
    .wrap(|inner| Arc::new(SemanticCacheStage::new(inner, cache)))
    .build();

    let first = agent
        .ask(session_utterance("What is the weather?"))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(first, "it is sunny");
    assert_eq!(model.call_count(), 1);

    // Identical prompt in the same session: the stored answer comes
    // back without a second inference.
    let second = agent
        .ask(session_utterance("What is the weather?"))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(second, "it is sunny");
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn test_oversized_prompt_always_delegates() {
    let model = ScriptedChatModel::new("long answer");
    let cache = Arc::new(InMemoryVectorStore::new(StubEmbedder::new(16)));

    let agent = AgentChain::new(Arc::new(
        BaseAgent::new(model.clone()).with_template(SystemPromptTemplate::new("Answer.")),
    ))
    .wrap(|inner| Arc::new(SemanticCacheStage::new(inner, cache)))
    .build();

    let oversized = "word ".repeat(9000);
    for _ in 0..2 {
        agent
            .ask(session_utterance(&oversized))
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();
    }

    // Both sends ran inference; nothing was cached.
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn test_history_accumulates_across_turns() {
    let model = ScriptedChatModel::new("blue");
    let conversations = Arc::new(InMemoryConversationStore::new());

    let agent = AgentChain::new(Arc::new(BaseAgent::new(model.clone()).with_template(
        SystemPromptTemplate::new("History:\n{conversation}"),
    )))
    .wrap(|inner| Arc::new(HistoryStage::new(inner, conversations.clone())))
    .build();

    agent
        .ask(session_utterance("What color is the sky?"))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    agent
        .ask(session_utterance("Why?"))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    let system = model.last_system_text();
    assert!(system.contains("user: What color is the sky?"));
    assert!(system.contains("assistant: blue"));

    let turns = conversations.fetch("session-1", 10).await.unwrap();
    assert_eq!(turns.len(), 4);
}

#[tokio::test]
async fn test_errored_stream_persists_no_turn() {
    let conversations = Arc::new(InMemoryConversationStore::new());

    let agent = AgentChain::new(Arc::new(
        BaseAgent::new(Arc::new(FailingChatModel))
            .with_template(SystemPromptTemplate::new("Answer.")),
    ))
    .wrap(|inner| Arc::new(HistoryStage::new(inner, conversations.clone())))
    .build();

    let result = agent
        .ask(session_utterance("Will this survive?"))
        .await
        .unwrap()
        .collect()
        .await;
    assert!(result.is_err());

    assert!(conversations
        .fetch("session-1", 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_short_utterance_skips_web_search() {
    let model = ScriptedChatModel::new("hello there");
    let search = ScriptedSearch::new();

    let agent = AgentChain::new(Arc::new(BaseAgent::new(model.clone()).with_template(
        SystemPromptTemplate::new("Search results: {search_results}"),
    )))
    .wrap(|inner| Arc::new(SearchAugmentStage::new(inner, search.clone())))
    .build();

    agent
        .ask(session_utterance("hi"))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    assert_eq!(model.last_system_text(), "Search results: []");
}

#[tokio::test]
async fn test_full_chain_augments_and_persists() {
    let model = ScriptedChatModel::new("grounded answer");
    let embedder = StubEmbedder::new(32);
    let documents = Arc::new(InMemoryVectorStore::new(embedder.clone()));
    let cache = Arc::new(InMemoryVectorStore::new(embedder));
    let conversations = Arc::new(InMemoryConversationStore::new());
    let search = ScriptedSearch::new();

    documents
        .add(vec![
            Document::new("d1", "Braid is a pipeline library."),
            Document::new("d2", "Unrelated passage about cooking."),
        ])
        .await
        .unwrap();

    let agent = AgentChain::new(Arc::new(BaseAgent::new(model.clone())))
        .wrap(|inner| Arc::new(RerankStage::new(inner)))
        .wrap(|inner| Arc::new(RetrievalStage::new(inner, documents)))
        .wrap(|inner| Arc::new(SearchAugmentStage::new(inner, search.clone())))
        .wrap(|inner| Arc::new(HistoryStage::new(inner, conversations.clone())))
        .wrap(|inner| Arc::new(SemanticCacheStage::new(inner, cache)))
        .build();

    let answer = agent
        .ask(session_utterance("Tell me about the braid library"))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(answer, "grounded answer");

    let system = model.last_system_text();
    assert!(system.contains("Braid is a pipeline library."));
    assert!(system.contains("web context for: Tell me about the braid library"));
    assert_eq!(search.calls.load(Ordering::SeqCst), 1);

    // The completed turn landed in the conversation store.
    let turns = conversations.fetch("session-1", 10).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].text, "grounded answer");
}
