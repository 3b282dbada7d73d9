//! Multi-turn history stage.
//!
//! Inbound: loads the session's recent turns into the property bag and
//! stamps the utterance with the shared turn timestamp. Outbound:
//! persists the (question, answer) pair once the answer has fully
//! aggregated, and never for an errored or cancelled stream.

use super::Agent;
use crate::message::{PromptProperties, Utterance, PROP_CONVERSATION, TURN_TS_ATTR};
use crate::prompt::{ChatOptions, Prompt};
use crate::store::ConversationStore;
use crate::stream::ResponseStream;
use crate::tokens::word_count;
use crate::{BraidError, Result, Role};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Maximum number of persisted turns considered per prompt.
pub const DEFAULT_WINDOW: usize = 40;

/// Running word-count cap across the included turns.
pub const DEFAULT_WORD_CAP: usize = 2000;

pub struct HistoryStage {
    inner: Arc<dyn Agent>,
    store: Arc<dyn ConversationStore>,
    window: usize,
    word_cap: usize,
}

impl HistoryStage {
    pub fn new(inner: Arc<dyn Agent>, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            inner,
            store,
            window: DEFAULT_WINDOW,
            word_cap: DEFAULT_WORD_CAP,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn with_word_cap(mut self, word_cap: usize) -> Self {
        self.word_cap = word_cap;
        self
    }

    /// Keep the newest turns whose cumulative word count fits the cap,
    /// then serialize them oldest-first. Recency wins over
    /// completeness: once a turn would cross the cap, it and everything
    /// older is dropped.
    fn serialize_window(&self, newest_first: Vec<Utterance>) -> String {
        let mut kept = Vec::new();
        let mut words = 0usize;
        for turn in newest_first {
            let turn_words = word_count(&turn.text);
            if words + turn_words > self.word_cap {
                break;
            }
            words += turn_words;
            kept.push(turn);
        }

        kept.iter()
            .rev()
            .map(|u| format!("{}: {}", u.role, u.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Agent for HistoryStage {
    async fn create_prompt(
        &self,
        mut utterance: Utterance,
        props: PromptProperties,
        options: ChatOptions,
    ) -> Result<Prompt> {
        let session_id = utterance.session_id().ok_or_else(|| {
            BraidError::ContractViolation(
                "History stage requires a session_id attribute on the utterance".into(),
            )
        })?;

        // Shared timestamp correlating this turn's persistence and
        // cache entries.
        let turn_ts = chrono::Utc::now().timestamp_millis();
        utterance.set_attribute(TURN_TS_ATTR, json!(turn_ts));

        let turns = self.store.fetch(&session_id, self.window).await?;
        let fetched = turns.len();
        let conversation = self.serialize_window(turns);
        debug!(
            target: "braid::history",
            session_id = %session_id,
            turn_ts,
            fetched,
            "Injected conversation window"
        );

        let props = props.with(PROP_CONVERSATION, json!(conversation));
        self.inner.create_prompt(utterance, props, options).await
    }

    async fn send(&self, prompt: Prompt) -> Result<ResponseStream> {
        let user = prompt.user().ok_or_else(|| {
            BraidError::ContractViolation("History stage requires a user utterance".into())
        })?;
        let session_id = user.session_id().ok_or_else(|| {
            BraidError::ContractViolation(
                "History stage requires a session_id attribute on the utterance".into(),
            )
        })?;
        let turn_ts = user.turn_timestamp().ok_or_else(|| {
            BraidError::ContractViolation(
                "History stage requires the turn timestamp it stamps during prompt creation"
                    .into(),
            )
        })?;
        let question = user.text.clone();

        let stream = self.inner.send(prompt).await?;

        let store = Arc::clone(&self.store);
        Ok(stream.aggregate(Box::new(move |answer| {
            Box::pin(async move {
                store
                    .append(&session_id, turn_ts, Role::User, &question)
                    .await?;
                store
                    .append(&session_id, turn_ts, Role::Assistant, &answer)
                    .await?;
                debug!(
                    target: "braid::history",
                    session_id = %session_id,
                    turn_ts,
                    "Persisted completed turn"
                );
                Ok(())
            })
        })))
    }
}
