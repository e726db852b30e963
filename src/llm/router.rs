// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! Model routing with per-candidate circuit breakers
//!
//! The router holds an ordered list of model candidates and walks it on
//! every request: candidates whose breaker is open are skipped, the first
//! healthy candidate that opens a stream wins, and pre-content failures
//! advance to the next candidate after being recorded against the failed
//! model's breaker. Breaker cells live inside the router instance, so two
//! routers never share health state.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ResilienceConfig;
use crate::error::{ApiError, OttoError, Result};
use crate::llm::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::llm::provider::{CompletionRequest, EventStream, LlmProvider};

/// A single model in the fallback order, paired with its health state
pub struct ModelCandidate {
    /// Provider-qualified model identifier
    pub model: String,
    breaker: Arc<CircuitBreaker>,
}

impl ModelCandidate {
    fn new(model: String, threshold: u32, recovery: Duration) -> Self {
        Self {
            model,
            breaker: Arc::new(CircuitBreaker::new(threshold, recovery)),
        }
    }

    /// Current breaker state, for status display
    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// The candidate's breaker, for health inspection
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

/// A successfully opened model call.
///
/// The stream has been established but not yet consumed; the caller owns
/// the outcome and must report it back so the winning model's breaker
/// stays accurate. Dropping without a report is treated as cancellation.
pub struct ActiveCall {
    /// Model that accepted the request
    pub model: String,
    stream: Option<EventStream>,
    breaker: Arc<CircuitBreaker>,
    reported: bool,
}

impl ActiveCall {
    /// Take ownership of the event stream. A second take yields an empty
    /// stream; there is exactly one real consumer.
    pub fn take_stream(&mut self) -> EventStream {
        match self.stream.take() {
            Some(stream) => stream,
            None => Box::pin(futures::stream::empty()),
        }
    }

    /// The stream was consumed to completion. Only the first report after
    /// a route counts.
    pub fn report_success(&mut self) {
        if !self.reported {
            self.reported = true;
            self.breaker.report_success();
        }
    }

    /// The stream failed after it was opened
    pub fn report_failure(&mut self) {
        if !self.reported {
            self.reported = true;
            self.breaker.report_failure();
        }
    }

    /// The caller abandoned the stream; health-neutral
    pub fn report_cancelled(&mut self) {
        if !self.reported {
            self.reported = true;
            self.breaker.report_cancelled();
        }
    }
}

impl Drop for ActiveCall {
    fn drop(&mut self) {
        if !self.reported {
            self.breaker.report_cancelled();
        }
    }
}

/// Routes completion requests across an ordered model candidate list
pub struct ModelRouter {
    provider: Arc<dyn LlmProvider>,
    candidates: Vec<ModelCandidate>,
    /// Timeout for opening a stream against a single candidate
    request_timeout: Duration,
}

impl ModelRouter {
    /// Create a router over the given candidate models, in priority order
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        models: Vec<String>,
        resilience: &ResilienceConfig,
    ) -> Self {
        let threshold = resilience.circuit_failure_threshold;
        let recovery = Duration::from_secs(resilience.circuit_recovery_secs);
        Self {
            provider,
            candidates: models
                .into_iter()
                .map(|m| ModelCandidate::new(m, threshold, recovery))
                .collect(),
            request_timeout: Duration::from_secs(resilience.request_timeout_secs),
        }
    }

    /// The candidate list, for health inspection
    pub fn candidates(&self) -> &[ModelCandidate] {
        &self.candidates
    }

    /// Try candidates in order until one opens a stream.
    ///
    /// The `model` field on `request` is overwritten per candidate. Errors
    /// raised before any content is received count against the failed
    /// candidate's breaker; if every candidate is skipped or fails, the
    /// aggregate error lists each candidate with its failure reason.
    pub async fn route(&self, request: CompletionRequest) -> Result<ActiveCall> {
        let mut failures: Vec<(String, String)> = Vec::new();

        for candidate in &self.candidates {
            if !candidate.breaker.may_attempt() {
                tracing::debug!(model = %candidate.model, "skipping candidate, circuit not admitting");
                failures.push((candidate.model.clone(), "circuit open".to_string()));
                continue;
            }

            let mut attempt = request.clone();
            attempt.model = candidate.model.clone();

            match tokio::time::timeout(
                self.request_timeout,
                self.provider.complete_stream(attempt),
            )
            .await
            {
                Ok(Ok(stream)) => {
                    tracing::debug!(model = %candidate.model, "stream opened");
                    return Ok(ActiveCall {
                        model: candidate.model.clone(),
                        stream: Some(stream),
                        breaker: Arc::clone(&candidate.breaker),
                        reported: false,
                    });
                }
                Ok(Err(err)) => {
                    if penalizes(&err) {
                        candidate.breaker.report_failure();
                    } else {
                        candidate.breaker.report_cancelled();
                    }
                    tracing::warn!(model = %candidate.model, error = %err, "candidate failed, trying next");
                    failures.push((candidate.model.clone(), err.to_string()));
                }
                Err(_elapsed) => {
                    candidate.breaker.report_failure();
                    let err = ApiError::Timeout;
                    tracing::warn!(model = %candidate.model, "candidate timed out, trying next");
                    failures.push((candidate.model.clone(), err.to_string()));
                }
            }
        }

        Err(OttoError::AllModelsUnavailable { failures })
    }
}

fn penalizes(err: &OttoError) -> bool {
    match err {
        OttoError::Api(api) => api.penalizes_breaker(),
        _ => true,
    }
}
