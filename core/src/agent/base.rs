//! Innermost pipeline stage: the chat model itself.

use super::Agent;
use crate::llm::ChatModel;
use crate::message::{PromptProperties, Utterance, PROP_CURRENT_DATE};
use crate::prompt::{ChatOptions, Prompt, SystemPromptTemplate};
use crate::stream::ResponseStream;
use crate::tokens::{TokenCounter, WhitespaceTokenizer};
use crate::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Terminates the chain: renders the system template against the
/// accumulated property bag and opens a token stream from the model.
pub struct BaseAgent {
    model: Arc<dyn ChatModel>,
    template: SystemPromptTemplate,
    counter: Arc<dyn TokenCounter>,
}

impl BaseAgent {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            template: SystemPromptTemplate::default_qa(),
            counter: WhitespaceTokenizer::new(),
        }
    }

    pub fn with_template(mut self, template: SystemPromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }
}

#[async_trait]
impl Agent for BaseAgent {
    async fn create_prompt(
        &self,
        utterance: Utterance,
        props: PromptProperties,
        options: ChatOptions,
    ) -> Result<Prompt> {
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let props = props.with(PROP_CURRENT_DATE, json!(today));

        let system = Utterance::system(self.template.render(&props));
        Ok(Prompt::new(vec![system, utterance], options))
    }

    async fn send(&self, prompt: Prompt) -> Result<ResponseStream> {
        info!(
            target: "braid::agent",
            words = self.counter.count(&prompt.contents()),
            utterances = prompt.utterances().len(),
            "Sending prompt to model"
        );
        self.model.stream(prompt).await
    }
}
