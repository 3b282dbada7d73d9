mod config;

use braid_core::agent::{
    AgentChain, BaseAgent, HistoryStage, RerankStage, RetrievalStage, SearchAugmentStage,
    SemanticCacheStage,
};
use braid_core::embedding::OpenAiEmbeddingModel;
use braid_core::llm::OpenAiChatModel;
use braid_core::message::SESSION_ID_ATTR;
use braid_core::store::{InMemoryConversationStore, InMemoryVectorStore};
use braid_core::websearch::TavilyClient;
use braid_core::{Agent, Document, Utterance, VectorStore};
use config::ChatAgentConfig;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,braid_core=info,chat_agent=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        target: "chat_agent",
        "Starting chat agent demo: cache -> history -> search -> retrieval -> rerank -> model"
    );

    let cfg = ChatAgentConfig::load();

    // Collaborators behind the pipeline's trait seams
    let chat_model = Arc::new(OpenAiChatModel::new(cfg.chat.clone())?);
    let embedder = Arc::new(OpenAiEmbeddingModel::new(cfg.embedding.clone())?);
    let documents = Arc::new(InMemoryVectorStore::new(embedder.clone()));
    let cache = Arc::new(InMemoryVectorStore::new(embedder));
    let conversations = Arc::new(InMemoryConversationStore::new());

    if let Some(dir) = &cfg.documents_dir {
        let seeded = seed_documents(&documents, dir).await?;
        info!(target: "chat_agent", dir = %dir.display(), seeded, "Seeded document store");
    }

    // Assemble the chain inside-out; web search joins only when a
    // credential is configured.
    let mut chain = AgentChain::new(Arc::new(BaseAgent::new(chat_model)))
        .wrap(|inner| Arc::new(RerankStage::new(inner)))
        .wrap(|inner| Arc::new(RetrievalStage::new(inner, documents)));

    match cfg.search {
        Some(search_cfg) => {
            let search = Arc::new(TavilyClient::new(search_cfg)?);
            chain = chain.wrap(|inner| Arc::new(SearchAugmentStage::new(inner, search)));
        }
        None => {
            warn!(target: "chat_agent", "TAVILY_API_KEY not set; web search stage disabled");
        }
    }

    let agent = chain
        .wrap(|inner| Arc::new(HistoryStage::new(inner, conversations)))
        .wrap(|inner| Arc::new(SemanticCacheStage::new(inner, cache)))
        .build();

    let session_id = format!("cli-{}", chrono::Utc::now().timestamp_millis());
    info!(target: "chat_agent", session_id = %session_id, "Session started");
    println!("Type a question (Ctrl+D or \"exit\" to quit).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        let utterance =
            Utterance::user(question).with_attribute(SESSION_ID_ATTR, json!(session_id.clone()));

        match agent.ask(utterance).await {
            Ok(mut stream) => {
                while let Some(event) = stream.next().await {
                    match event {
                        Ok(chunk) => {
                            print!("{}", chunk.content);
                            std::io::stdout().flush()?;
                        }
                        Err(e) => {
                            error!(target: "chat_agent", error = %e, "Stream failed");
                            break;
                        }
                    }
                }
                println!();
            }
            Err(e) => {
                error!(target: "chat_agent", error = %e, "Send failed");
            }
        }
    }

    info!(target: "chat_agent", "Shutting down...");
    Ok(())
}

/// Seed the document store with every .txt/.md file under `dir`.
async fn seed_documents(
    store: &Arc<InMemoryVectorStore>,
    dir: &std::path::Path,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut batch = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_text = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("txt") | Some("md")
        );
        if !is_text {
            continue;
        }
        let content = std::fs::read_to_string(&path)?;
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string();
        batch.push(Document::new(id, content).with_metadata("path", json!(path.display().to_string())));
    }

    let count = batch.len();
    if count > 0 {
        store.add(batch).await?;
    }
    Ok(count)
}
