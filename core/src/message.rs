//! Core message types for the augmentation pipeline.
//!
//! An [`Utterance`] is one message in a conversation: a role, text content,
//! and an open map of side-channel attributes that stages attach and later
//! stages read (session id, turn timestamp). A [`PromptProperties`] bag
//! carries cross-stage context (conversation summary, retrieved documents,
//! search results) through prompt construction. Both follow a copy-on-write
//! discipline: stages receive them by value and hand augmented copies
//! inward, so concurrent sends never observe each other's state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Attribute under which the caller stores the conversation session id.
pub const SESSION_ID_ATTR: &str = "session_id";

/// Attribute under which the history stage stamps the shared turn
/// timestamp (Unix milliseconds) used to correlate persistence and
/// cache entries for one send.
pub const TURN_TS_ATTR: &str = "turn_timestamp_ms";

/// Property key for the serialized conversation history.
pub const PROP_CONVERSATION: &str = "conversation";

/// Property key for retrieved documents (JSON array of [`crate::Document`]).
pub const PROP_DOCUMENTS: &str = "documents";

/// Property key for JSON-encoded web search results.
pub const PROP_SEARCH_RESULTS: &str = "search_results";

/// Property key for the current date, injected by the base agent.
pub const PROP_CURRENT_DATE: &str = "current_date";

/// Roles for messages in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in a conversation, with side-channel attributes.
///
/// Attributes accumulate monotonically as the utterance passes through
/// stages; they are never removed and never mutated after the response
/// completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub role: Role,
    pub text: String,

    /// Side-channel attributes attached by stages and read by later stages.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl Utterance {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Attach an attribute (builder form)
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Attach an attribute in place
    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Session id carried by this utterance, if the caller attached one
    pub fn session_id(&self) -> Option<String> {
        self.attributes
            .get(SESSION_ID_ATTR)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    /// Turn timestamp stamped by the history stage, if present
    pub fn turn_timestamp(&self) -> Option<i64> {
        self.attributes.get(TURN_TS_ATTR).and_then(|v| v.as_i64())
    }
}

/// Ordered-key property bag carried alongside an utterance through prompt
/// construction.
///
/// Stages read entries written by outer stages and return augmented
/// copies via [`PromptProperties::with`]; the bag is never shared mutably
/// between stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptProperties {
    entries: BTreeMap<String, Value>,
}

impl PromptProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return an augmented copy with `key` set to `value`
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_utterance_attributes() {
        let utterance = Utterance::user("hello")
            .with_attribute(SESSION_ID_ATTR, json!("session-1"))
            .with_attribute(TURN_TS_ATTR, json!(1_700_000_000_000i64));

        assert_eq!(utterance.session_id().unwrap(), "session-1");
        assert_eq!(utterance.turn_timestamp().unwrap(), 1_700_000_000_000);
        assert_eq!(utterance.role, Role::User);
    }

    #[test]
    fn test_missing_attributes() {
        let utterance = Utterance::user("hello");
        assert!(utterance.session_id().is_none());
        assert!(utterance.turn_timestamp().is_none());
    }

    #[test]
    fn test_property_bag_copy_on_write() {
        let original = PromptProperties::new().with("a", json!(1));

        // A stage augments a clone; the original is unaffected.
        let augmented = original.clone().with("b", json!(2));

        assert!(original.get("b").is_none());
        assert_eq!(augmented.get("a").unwrap(), &json!(1));
        assert_eq!(augmented.get("b").unwrap(), &json!(2));
    }

    #[test]
    fn test_property_bag_ordered_keys() {
        let props = PromptProperties::new()
            .with("zebra", json!(1))
            .with("alpha", json!(2))
            .with("mango", json!(3));

        let keys: Vec<&String> = props.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["alpha", "mango", "zebra"]);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!(Role::System.to_string(), "system");
    }
}
