// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! Error types for Otto
//!
//! This module defines all error types used throughout the engine.

use thiserror::Error;

/// Main error type for Otto operations
#[derive(Error, Debug)]
pub enum OttoError {
    /// API-related errors from a single model call
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Every configured model candidate was exhausted
    #[error("All models unavailable: {}", format_failures(failures))]
    AllModelsUnavailable {
        /// Per-candidate failure reasons, in the order they were tried
        failures: Vec<(String, String)>,
    },

    /// Malformed or unrecognized tool call in model output
    #[error("Tool call extraction failed: {0}")]
    Extraction(String),

    /// Constitutional rule violation
    #[error("Action denied by safety rules: {0}")]
    SafetyDenied(String),

    /// Filesystem-level failure during an approved action
    #[error("Action execution failed: {0}")]
    Execution(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session errors
    #[error("Session error: {0}")]
    Session(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(model, reason)| format!("{}: {}", model, reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// API-specific error types for a single provider call
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Rate limited by the API
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Requested model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// API returned an error
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Timeout waiting for response
    #[error("Request timed out")]
    Timeout,

    /// Streaming error after the response began
    #[error("Streaming error: {0}")]
    StreamError(String),

    /// Call cancelled by the caller (never counted against breaker health)
    #[error("Request cancelled")]
    Cancelled,
}

impl ApiError {
    /// Whether this failure should be recorded against the model's
    /// circuit breaker. Cancellations are health-neutral.
    pub fn penalizes_breaker(&self) -> bool {
        !matches!(self, ApiError::Cancelled)
    }
}

/// Result type alias for Otto operations
pub type Result<T> = std::result::Result<T, OttoError>;

impl From<anyhow::Error> for OttoError {
    fn from(err: anyhow::Error) -> Self {
        OttoError::Session(err.to_string())
    }
}
