//! Chat model collaborator.
//!
//! The base agent sits on a [`ChatModel`]: hand it a fully-assembled
//! prompt, get back a stream of partial output fragments. The HTTP
//! implementation in [`client`] speaks the OpenAI-compatible streaming
//! chat protocol.

pub mod client;

pub use client::{ChatClientConfig, OpenAiChatModel};

use crate::prompt::Prompt;
use crate::stream::ResponseStream;
use crate::Result;
use async_trait::async_trait;

/// Streaming chat completion interface
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Start a streaming completion for `prompt`.
    ///
    /// The call returns once the stream is open; fragments and any
    /// transport error arrive through the returned stream.
    async fn stream(&self, prompt: Prompt) -> Result<ResponseStream>;
}
