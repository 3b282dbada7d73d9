//! Token Counting
//!
//! All size caps in the pipeline (history window, document truncation,
//! the semantic cache ceiling) are expressed in whitespace-delimited
//! word units, and the base agent logs prompt sizes in the same units.

use std::sync::Arc;

/// Token counting interface for prompt size accounting
pub trait TokenCounter: Send + Sync {
    /// Count tokens in text
    fn count(&self, text: &str) -> usize;
}

/// Counts whitespace-delimited words.
pub struct WhitespaceTokenizer;

impl WhitespaceTokenizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl TokenCounter for WhitespaceTokenizer {
    fn count(&self, text: &str) -> usize {
        word_count(text)
    }
}

/// Count whitespace-delimited words in `text`
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
