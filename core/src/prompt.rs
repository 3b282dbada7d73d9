//! Prompt assembly.
//!
//! A [`Prompt`] is an ordered sequence of utterances (system first, then
//! the current user utterance) plus model invocation options. It is
//! immutable once built and passed by value into the base agent.
//! [`SystemPromptTemplate`] renders a system instruction template against
//! the property bag accumulated by the pipeline stages.

use crate::message::{PromptProperties, Role, Utterance};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Model invocation options carried with a prompt.
///
/// Stages may rewrite these while the prompt travels inward, e.g. to
/// attach a tool schema the model may call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,

    /// JSON tool/function schemas offered to the model
    #[serde(default)]
    pub tools: Vec<Value>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_tool(mut self, schema: Value) -> Self {
        self.tools.push(schema);
        self
    }
}

/// An assembled prompt: ordered utterances plus invocation options.
#[derive(Debug, Clone)]
pub struct Prompt {
    utterances: Vec<Utterance>,
    options: ChatOptions,
}

impl Prompt {
    pub fn new(utterances: Vec<Utterance>, options: ChatOptions) -> Self {
        Self {
            utterances,
            options,
        }
    }

    pub fn utterances(&self) -> &[Utterance] {
        &self.utterances
    }

    pub fn options(&self) -> &ChatOptions {
        &self.options
    }

    /// First user utterance in the prompt, if any
    pub fn user(&self) -> Option<&Utterance> {
        self.utterances.iter().find(|u| u.role == Role::User)
    }

    /// Concatenated text of every utterance, used for size accounting
    /// and as the semantic-cache embedding text
    pub fn contents(&self) -> String {
        let mut combined = String::new();
        for utterance in &self.utterances {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&utterance.text);
        }
        combined
    }
}

/// Default system instruction template for question answering.
///
/// Placeholders are property-bag keys; stages that never ran leave their
/// placeholder untouched.
pub const DEFAULT_SYSTEM_TEMPLATE: &str = "\
You are a helpful assistant. Today's date is {current_date}.

Answer the user's question using the conversation so far, the provided
documents, and the web search results below. If the answer is not
contained in the provided context, say so honestly instead of guessing.

Conversation so far:
{conversation}

Documents:
{documents}

Web search results:
{search_results}
";

/// Renders a system instruction template against a property bag.
///
/// Each `{key}` placeholder is substituted with the rendered form of the
/// bag entry under `key`. Placeholders without a matching entry are left
/// intact so an incompletely-configured chain remains visible in logs.
#[derive(Debug, Clone)]
pub struct SystemPromptTemplate {
    template: String,
}

impl SystemPromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn default_qa() -> Self {
        Self::new(DEFAULT_SYSTEM_TEMPLATE)
    }

    /// Render the template against `props`
    pub fn render(&self, props: &PromptProperties) -> String {
        let mut rendered = self.template.clone();
        for (key, value) in props.iter() {
            let placeholder = format!("{{{}}}", key);
            if rendered.contains(&placeholder) {
                rendered = rendered.replace(&placeholder, &render_value(value));
            }
        }
        rendered
    }
}

/// Render a bag value for inclusion in the system prompt.
///
/// Strings are used verbatim. Arrays of objects with a `content` field
/// (retrieved documents) are joined by blank lines. Everything else is
/// compact JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) if items.iter().all(|i| i.get("content").is_some()) => items
            .iter()
            .filter_map(|i| i.get("content").and_then(|c| c.as_str()))
            .collect::<Vec<_>>()
            .join("\n\n"),
        other => other.to_string(),
    }
}
