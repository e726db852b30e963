// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! Message types for LLM interactions
//!
//! A conversation is an append-only sequence of turns owned by the caller;
//! the engine borrows it for the current turn and never persists it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single turn in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for the turn
    pub id: Uuid,

    /// Role of the sender
    pub role: Role,

    /// Text content
    pub content: String,

    /// Structured tool-call payload, if this turn carried one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<serde_json::Value>,

    /// When the turn was created
    pub timestamp: DateTime<Utc>,
}

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// System prompt
    System,
    /// Tool execution result fed back into the conversation
    Tool,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a tool-result message
    pub fn tool_result(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            tool_call: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a structured tool-call payload to this turn
    pub fn with_tool_call(mut self, payload: serde_json::Value) -> Self {
        self.tool_call = Some(payload);
        self
    }
}

/// An ordered conversation history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message; history is append-only for the session
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All messages in order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of turns
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the conversation is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::user("hi").role, Role::User);
        assert_eq!(Message::assistant("hello").role, Role::Assistant);
        assert_eq!(Message::system("rules").role, Role::System);
        assert_eq!(Message::tool_result("done").role, Role::Tool);
    }

    #[test]
    fn test_message_with_tool_call() {
        let payload = serde_json::json!({"name": "read_file", "arguments": {"filename": "a.py"}});
        let msg = Message::assistant("calling a tool").with_tool_call(payload.clone());
        assert_eq!(msg.tool_call, Some(payload));
    }

    #[test]
    fn test_message_serialization_skips_empty_tool_call() {
        let msg = Message::user("hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("tool_call"));
        assert!(json.contains("\"role\":\"user\""));
    }

    #[test]
    fn test_conversation_append_only_order() {
        let mut convo = Conversation::new();
        assert!(convo.is_empty());

        convo.push(Message::user("first"));
        convo.push(Message::assistant("second"));
        convo.push(Message::user("third"));

        assert_eq!(convo.len(), 3);
        let contents: Vec<&str> = convo.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
    }
}
