// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! LLM Provider trait and related types
//!
//! Defines the abstraction layer for different LLM backends.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::Result;
use crate::llm::message::Message;

/// A pinned, boxed stream of provider events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Main trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openrouter", "mock")
    fn name(&self) -> &str;

    /// Streaming completion; the returned stream yields content deltas in
    /// provider order and ends with exactly one `Done` event (or an error).
    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream>;
}

/// Request for completion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model to use
    pub model: String,

    /// Messages in the conversation
    pub messages: Vec<Message>,

    /// System prompt
    pub system: Option<String>,

    /// Maximum tokens in response
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,
}

impl CompletionRequest {
    /// Create a new completion request
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            system: None,
            max_tokens: 8192,
            temperature: 0.7,
        }
    }

    /// Set the system prompt
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Events from a streaming response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A fragment of response text, in provider emission order
    ContentDelta(String),

    /// End of the response; no further events follow
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::Message;

    #[test]
    fn test_completion_request_new() {
        let request = CompletionRequest::new("model-a", vec![Message::user("Hello")]);

        assert_eq!(request.model, "model-a");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.max_tokens, 8192);
        assert!((request.temperature - 0.7).abs() < 0.001);
        assert!(request.system.is_none());
    }

    #[test]
    fn test_completion_request_chained() {
        let request = CompletionRequest::new("model-a", vec![Message::user("Hello")])
            .with_system("You are a coding assistant")
            .with_max_tokens(2048)
            .with_temperature(0.2);

        assert_eq!(request.system.as_deref(), Some("You are a coding assistant"));
        assert_eq!(request.max_tokens, 2048);
        assert!((request.temperature - 0.2).abs() < 0.001);
    }

    #[test]
    fn test_stream_event_equality() {
        assert_eq!(
            StreamEvent::ContentDelta("a".to_string()),
            StreamEvent::ContentDelta("a".to_string())
        );
        assert_ne!(StreamEvent::ContentDelta("a".to_string()), StreamEvent::Done);
    }
}
