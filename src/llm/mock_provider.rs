// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! Mock LLM provider for testing
//!
//! Provides a configurable mock implementation of the LlmProvider trait
//! that can be used in unit tests without making real API calls. Outcomes
//! are scripted per model name, so fallback behavior across a candidate
//! list can be exercised against a single provider instance.

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{ApiError, Result};
use crate::llm::provider::{CompletionRequest, EventStream, LlmProvider, StreamEvent};

/// Scripted outcome for a single mock call
#[derive(Clone, Debug)]
pub enum MockOutcome {
    /// Stream the text as word-sized deltas, then finish
    Text(String),
    /// Fail before producing any content (HTTP status)
    HttpError(u16),
    /// Fail before producing any content (connection-level)
    ConnectError(String),
    /// Never respond; lets per-call timeouts fire
    Hang,
    /// Stream some content, then stall without ever finishing
    StallAfter(String),
    /// Stream some content, then fail mid-stream
    MidStreamFailure { partial: String, reason: String },
}

/// A mock LLM provider for testing
#[derive(Clone)]
pub struct MockProvider {
    /// Provider name
    name: String,
    /// Scripted outcomes keyed by model name, consumed in order
    scripts: Arc<Mutex<HashMap<String, VecDeque<MockOutcome>>>>,
    /// Fallback outcome when a model has no script
    default_outcome: MockOutcome,
    /// Call counter
    call_count: Arc<AtomicUsize>,
    /// Model names in the order they were called
    called_models: Arc<Mutex<Vec<String>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a new mock provider that answers every call with a stub reply
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            scripts: Arc::new(Mutex::new(HashMap::new())),
            default_outcome: MockOutcome::Text("mock reply".to_string()),
            call_count: Arc::new(AtomicUsize::new(0)),
            called_models: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Change the fallback outcome used by unscripted models
    pub fn with_default(mut self, outcome: MockOutcome) -> Self {
        self.default_outcome = outcome;
        self
    }

    /// Queue outcomes for a specific model, consumed one per call
    pub fn script(self, model: impl Into<String>, outcomes: Vec<MockOutcome>) -> Self {
        {
            let mut scripts = lock(&self.scripts);
            scripts
                .entry(model.into())
                .or_default()
                .extend(outcomes);
        }
        self
    }

    /// Number of calls received
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Model names in call order
    pub fn called_models(&self) -> Vec<String> {
        lock(&self.called_models).clone()
    }

    fn next_outcome(&self, model: &str) -> MockOutcome {
        let mut scripts = lock(&self.scripts);
        scripts
            .get_mut(model)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| self.default_outcome.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Split text into word-sized deltas, preserving whitespace
fn chunk_text(text: &str) -> Vec<String> {
    let mut chunks = vec![];
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if ch.is_whitespace() {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.called_models).push(request.model.clone());

        match self.next_outcome(&request.model) {
            MockOutcome::Text(text) => {
                let mut events: Vec<Result<StreamEvent>> = chunk_text(&text)
                    .into_iter()
                    .map(|c| Ok(StreamEvent::ContentDelta(c)))
                    .collect();
                events.push(Ok(StreamEvent::Done));
                Ok(Box::pin(stream::iter(events)))
            }
            MockOutcome::HttpError(status) => Err(ApiError::ServerError {
                status,
                message: "mock server error".to_string(),
            }
            .into()),
            MockOutcome::ConnectError(reason) => Err(ApiError::Network(reason).into()),
            MockOutcome::Hang => {
                futures::future::pending::<()>().await;
                unreachable!("pending future never resolves")
            }
            MockOutcome::StallAfter(partial) => {
                let head = stream::iter(
                    chunk_text(&partial)
                        .into_iter()
                        .map(|c| Ok(StreamEvent::ContentDelta(c)))
                        .collect::<Vec<Result<StreamEvent>>>(),
                );
                Ok(Box::pin(head.chain(stream::pending())))
            }
            MockOutcome::MidStreamFailure { partial, reason } => {
                let mut events: Vec<Result<StreamEvent>> = chunk_text(&partial)
                    .into_iter()
                    .map(|c| Ok(StreamEvent::ContentDelta(c)))
                    .collect();
                events.push(Err(ApiError::StreamError(reason).into()));
                Ok(Box::pin(stream::iter(events)))
            }
        }
    }
}
