// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! LLM provider abstraction and model routing
//!
//! This module defines the provider trait, the streaming event types,
//! per-model circuit breakers, and the fallback router that walks the
//! configured candidate list.

pub mod circuit_breaker;
pub mod message;
pub mod mock_provider;
pub mod provider;
pub mod providers;
pub mod router;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use message::{Conversation, Message, Role};
pub use mock_provider::{MockOutcome, MockProvider};
pub use provider::{CompletionRequest, EventStream, LlmProvider, StreamEvent};
pub use providers::OpenRouterProvider;
pub use router::{ActiveCall, ModelCandidate, ModelRouter};
