//! Conversation data model: events, content and their parts.

use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Author name used for events carrying user input.
pub const USER_AUTHOR: &str = "user";

/// Current time as Unix epoch seconds.
#[must_use]
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Role of a content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Input from the human side of the conversation.
    User,
    /// Output produced by the model.
    Model,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Model => f.write_str("model"),
        }
    }
}

/// A function invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Call identifier, echoed back by the matching response.
    pub id: String,
    /// Function name.
    pub name: String,
    /// Call arguments.
    #[serde(default)]
    pub args: Value,
}

/// The answer to a [`FunctionCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    /// Identifier of the call being answered.
    pub id: String,
    /// Function name.
    pub name: String,
    /// Response payload.
    #[serde(default)]
    pub response: Value,
}

/// One piece of a [`Content`] block.
///
/// A part normally carries exactly one of its fields, but nothing enforces it;
/// readers must tolerate parts where every field is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    /// Create a text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Create a function call part.
    #[must_use]
    pub fn function_call(call: FunctionCall) -> Self {
        Self {
            function_call: Some(call),
            ..Self::default()
        }
    }

    /// Create a function response part.
    #[must_use]
    pub fn function_response(response: FunctionResponse) -> Self {
        Self {
            function_response: Some(response),
            ..Self::default()
        }
    }
}

/// A message: a role and an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// Wrap a query string as a user message.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    /// Wrap a reply string as a model message.
    #[must_use]
    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::text(text)],
        }
    }

    /// Text of the first part, if it has any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.parts.first().and_then(|p| p.text.as_deref())
    }

    /// Iterate over all text fragments in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| p.text.as_deref())
    }
}

/// Marker left by compaction: a condensed replacement for a range of events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCompaction {
    /// Timestamp of the first compacted event.
    pub start_timestamp: i64,
    /// Timestamp of the last compacted event.
    pub end_timestamp: i64,
    /// The condensed content.
    pub compacted_content: Content,
}

/// Side effects attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventActions {
    /// Keys to merge into the session state when the event is appended.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub state_delta: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction: Option<EventCompaction>,
}

/// An immutable record of one turn's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    /// Invocation this event belongs to. All events produced for one
    /// submission share it.
    pub invocation_id: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default)]
    pub actions: EventActions,
    /// Unix epoch seconds.
    pub timestamp: i64,
}

impl Event {
    /// Create an event with a fresh id and the current timestamp.
    #[must_use]
    pub fn new(invocation_id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            invocation_id: invocation_id.into(),
            author: author.into(),
            content: None,
            actions: EventActions::default(),
            timestamp: now(),
        }
    }

    /// Attach content.
    #[must_use]
    pub fn with_content(mut self, content: Content) -> Self {
        self.content = Some(content);
        self
    }

    /// Record a state change carried by this event.
    #[must_use]
    pub fn with_state(mut self, key: impl Into<String>, value: Value) -> Self {
        self.actions.state_delta.insert(key.into(), value);
        self
    }

    /// Parts of the event's content, empty when there is none.
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        self.content
            .as_ref()
            .map(|c| c.parts.as_slice())
            .unwrap_or_default()
    }

    /// Whether this event is a compaction marker.
    #[must_use]
    pub const fn is_compaction(&self) -> bool {
        self.actions.compaction.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_text_wraps_single_part() {
        let content = Content::user_text("hello");
        assert_eq!(content.role, Role::User);
        assert_eq!(content.parts.len(), 1);
        assert_eq!(content.first_text(), Some("hello"));
    }

    #[test]
    fn test_event_without_content_has_no_parts() {
        let event = Event::new("inv-1", "agent");
        assert!(event.parts().is_empty());
        assert!(!event.is_compaction());
    }

    #[test]
    fn test_part_omits_empty_fields_when_serialized() {
        let json = serde_json::to_value(Part::text("hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "text": "hi" }));
    }

    #[test]
    fn test_event_deserializes_without_actions() {
        let event: Event = serde_json::from_value(serde_json::json!({
            "id": "e1",
            "invocation_id": "i1",
            "author": "user",
            "timestamp": 0
        }))
        .unwrap();
        assert!(event.content.is_none());
        assert!(event.actions.state_delta.is_empty());
    }
}
