//! Response streaming and aggregation.
//!
//! A [`ResponseStream`] is a lazy, finite, single-consumer sequence of
//! partial output fragments. It is not restartable: a new send always
//! produces a new stream. [`ResponseStream::aggregate`] is the response
//! aggregator seam the history stage and the semantic-cache backfill
//! depend on: it forwards every fragment unchanged for progressive
//! display while accumulating them, and fires a completion hook exactly
//! once after the last fragment of a cleanly-terminated stream. The hook
//! never fires for a stream that errors or is cancelled before
//! completion.

use crate::Result;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::trace;

/// One partial output fragment from the chat model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatChunk {
    pub content: String,
}

impl ChatChunk {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Completion hook invoked with the aggregated answer text.
///
/// Runs after the final fragment has been forwarded; a hook error is
/// surfaced to the consumer as a trailing stream error without
/// invalidating the fragments already delivered.
pub type CompletionHook = Box<dyn FnOnce(String) -> BoxFuture<'static, Result<()>> + Send>;

/// A push stream of response fragments, consumed by a single reader.
pub struct ResponseStream {
    rx: mpsc::UnboundedReceiver<Result<ChatChunk>>,
}

impl ResponseStream {
    /// Create a stream together with its producer handle
    pub fn channel() -> (mpsc::UnboundedSender<Result<ChatChunk>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// A synthetic, already-completed stream carrying exactly one
    /// fragment. Used by the semantic cache to substitute a stored
    /// answer for a fresh inference.
    pub fn of_single(content: impl Into<String>) -> Self {
        let (tx, stream) = Self::channel();
        let _ = tx.send(Ok(ChatChunk::new(content)));
        stream
    }

    /// Next fragment, or `None` once the stream has terminated
    pub async fn next(&mut self) -> Option<Result<ChatChunk>> {
        self.rx.recv().await
    }

    /// Drain the stream, concatenating fragment contents.
    ///
    /// Returns the first error encountered, if any. When this stream was
    /// produced by [`ResponseStream::aggregate`], returning guarantees
    /// the completion hook has already run.
    pub async fn collect(mut self) -> Result<String> {
        let mut combined = String::new();
        while let Some(event) = self.next().await {
            combined.push_str(&event?.content);
        }
        Ok(combined)
    }

    /// Wrap this stream with the response aggregator.
    ///
    /// Every fragment is forwarded to the returned stream unchanged. On
    /// clean termination the accumulated text is handed to `hook`
    /// exactly once; an errored or cancelled stream never invokes it.
    /// The returned stream does not terminate until the hook has
    /// finished, so draining it is a completion barrier for the hook's
    /// side effects.
    pub fn aggregate(mut self, hook: CompletionHook) -> ResponseStream {
        let (tx, out) = ResponseStream::channel();

        tokio::spawn(async move {
            let mut buffer = String::new();

            while let Some(event) = self.next().await {
                let errored = event.is_err();
                if let Ok(chunk) = &event {
                    buffer.push_str(&chunk.content);
                }

                if tx.send(event).is_err() {
                    // Consumer cancelled the send; the terminal hook
                    // must not fire for an incomplete stream.
                    trace!(target: "braid::stream", "consumer gone, dropping aggregation");
                    return;
                }

                if errored {
                    return;
                }
            }

            // Upstream terminated cleanly; fire the hook exactly once.
            if let Err(e) = hook(buffer).await {
                let _ = tx.send(Err(e));
            }
        });

        out
    }
}
