// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! OpenRouter API provider implementation
//!
//! Implements the LlmProvider trait for OpenRouter's OpenAI-compatible
//! chat completions endpoint. Tool invocations arrive inline in the
//! assistant text, so this provider only deals in plain content deltas.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ApiError, OttoError, Result};
use crate::llm::message::{Message, Role};
use crate::llm::provider::{CompletionRequest, EventStream, LlmProvider, StreamEvent};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// OpenRouter provider, access to many models via a single API
pub struct OpenRouterProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenRouterProvider {
    /// Create a new OpenRouter provider
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, OPENROUTER_API_URL)
    }

    /// Create with a custom base URL
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /// Convert internal messages to the OpenAI chat format
    fn convert_messages(messages: &[Message], system: Option<&str>) -> Vec<OpenRouterMessage> {
        let mut result = Vec::new();

        if let Some(sys) = system {
            result.push(OpenRouterMessage {
                role: "system".to_string(),
                content: sys.to_string(),
            });
        }

        for m in messages.iter().filter(|m| m.role != Role::System) {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                // Action results go back as user turns; extraction is
                // text-based, so there is no tool_call_id to thread.
                Role::Tool => "user",
                Role::System => continue,
            };
            result.push(OpenRouterMessage {
                role: role.to_string(),
                content: m.content.clone(),
            });
        }

        result
    }

    fn build_request(request: &CompletionRequest) -> OpenRouterRequest {
        OpenRouterRequest {
            model: request.model.clone(),
            messages: Self::convert_messages(&request.messages, request.system.as_deref()),
            max_tokens: Some(request.max_tokens),
            temperature: Some(request.temperature),
            stream: true,
        }
    }

    /// Map an error response body to an ApiError
    fn parse_error(status: u16, body: &str) -> OttoError {
        if let Ok(error_response) = serde_json::from_str::<OpenRouterError>(body) {
            let message = error_response.error.message;
            let code = error_response.error.code.as_deref().unwrap_or("");

            let api = match (status, code) {
                (401, _) | (_, "invalid_api_key") | (_, "authentication_error") => {
                    ApiError::AuthenticationFailed
                }
                (429, _) | (_, "rate_limit_exceeded") => ApiError::RateLimited(60),
                (404, _) | (_, "model_not_found") => ApiError::ModelNotFound(message),
                _ => ApiError::ServerError { status, message },
            };
            OttoError::Api(api)
        } else {
            OttoError::Api(ApiError::ServerError {
                status,
                message: body.to_string(),
            })
        }
    }
}

/// Extract stream events from complete SSE lines in `buffer`.
///
/// Consumes up to the last newline; a partial trailing line stays in the
/// buffer for the next chunk. The buffer holds raw bytes so a multi-byte
/// UTF-8 character split across network chunks is only decoded once the
/// line containing it is complete.
fn drain_sse_buffer(buffer: &mut Vec<u8>) -> Vec<Result<StreamEvent>> {
    let mut events = Vec::new();

    while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
        let line_bytes: Vec<u8> = buffer.drain(..=line_end).collect();
        let line = String::from_utf8_lossy(&line_bytes).trim().to_string();

        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let Some(data) = line.strip_prefix("data: ") else {
            continue;
        };

        if data == "[DONE]" {
            events.push(Ok(StreamEvent::Done));
            continue;
        }

        match serde_json::from_str::<OpenRouterStreamChunk>(data) {
            Ok(chunk) => {
                if let Some(choice) = chunk.choices.into_iter().next() {
                    if let Some(text) = choice.delta.content {
                        if !text.is_empty() {
                            events.push(Ok(StreamEvent::ContentDelta(text)));
                        }
                    }
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable stream chunk");
            }
        }
    }

    events
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        let body = OpenRouterProvider::build_request(&request);

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", &self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| OttoError::Api(ApiError::Network(e.to_string())))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(status, &body));
        }

        let byte_stream = response.bytes_stream();

        let event_stream = byte_stream
            .map(|result| {
                result.map_err(|e| OttoError::Api(ApiError::StreamError(e.to_string())))
            })
            .scan(Vec::new(), |buffer: &mut Vec<u8>, result| {
                let events = match result {
                    Ok(bytes) => {
                        buffer.extend_from_slice(&bytes);
                        drain_sse_buffer(buffer)
                    }
                    Err(e) => vec![Err(e)],
                };
                futures::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }
}

// OpenRouter API types (OpenAI-compatible format)

#[derive(Debug, Serialize)]
struct OpenRouterRequest {
    model: String,
    messages: Vec<OpenRouterMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenRouterMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenRouterError {
    error: OpenRouterErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenRouterErrorDetail {
    message: String,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterStreamChunk {
    choices: Vec<OpenRouterStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterStreamChoice {
    delta: OpenRouterStreamDelta,
}

#[derive(Debug, Deserialize)]
struct OpenRouterStreamDelta {
    content: Option<String>,
}
