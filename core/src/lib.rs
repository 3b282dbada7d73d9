// Braid Core Library
// Augmentation pipeline around a streaming chat model

pub mod agent;
pub mod embedding;
pub mod llm;
pub mod message;
pub mod prompt;
pub mod store;
pub mod stream;
pub mod tokens;
pub mod websearch;

// Export core types
pub use agent::{
    Agent, AgentChain, BaseAgent, HistoryStage, RerankStage, RetrievalStage, SearchAugmentStage,
    SemanticCacheStage,
};
pub use embedding::EmbeddingModel;
pub use llm::ChatModel;
pub use message::{PromptProperties, Role, Utterance};
pub use prompt::{ChatOptions, Prompt, SystemPromptTemplate};
pub use store::{ConversationStore, Document, VectorStore};
pub use stream::{ChatChunk, ResponseStream};
pub use websearch::{SearchResult, WebSearch};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BraidError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Contract violation: {0}")]
    ContractViolation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BraidError>;
