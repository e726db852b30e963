// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! Circuit breaker pattern for LLM provider resilience
//!
//! One breaker per model candidate. State transitions happen lazily at
//! check time; there is no background timer. In half-open state at most
//! one probe call is admitted at a time, so a still-unhealthy endpoint
//! never gets hammered by concurrent sessions.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests allowed
    Closed,
    /// Too many failures, requests blocked
    Open,
    /// Testing if service recovered, a single probe request allowed
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    /// Consecutive failure count
    consecutive_failures: u32,
    /// When the circuit opened; set iff the failure threshold was reached
    opened_at: Option<Instant>,
    /// Whether a half-open probe call is currently in flight
    probe_in_flight: bool,
}

/// Circuit breaker for tracking a single model candidate's health
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    /// Maximum consecutive failures before opening
    failure_threshold: u32,
    /// Cooldown before an open circuit admits a probe
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
            failure_threshold,
            recovery_timeout,
        }
    }

    /// Get the current circuit state
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        self.state_of(&inner)
    }

    fn state_of(&self, inner: &BreakerInner) -> CircuitState {
        match inner.opened_at {
            None => CircuitState::Closed,
            Some(opened_at) => {
                if opened_at.elapsed() >= self.recovery_timeout {
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                }
            }
        }
    }

    /// Check whether a call may be attempted right now.
    ///
    /// In half-open state this admits exactly one concurrent probe; the
    /// admission is released by the next `report_*` call.
    pub fn may_attempt(&self) -> bool {
        let mut inner = self.lock();
        match self.state_of(&inner) {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful call; closes the circuit and resets counters
    pub fn report_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    /// Record a failed call; opens the circuit at the failure threshold.
    /// A failed half-open probe re-opens the circuit with a fresh cooldown.
    pub fn report_failure(&self) {
        let mut inner = self.lock();
        inner.probe_in_flight = false;
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        if inner.consecutive_failures >= self.failure_threshold {
            let reopened = inner.opened_at.is_some();
            inner.opened_at = Some(Instant::now());
            tracing::warn!(
                failures = inner.consecutive_failures,
                cooldown_secs = self.recovery_timeout.as_secs(),
                reopened,
                "circuit opened"
            );
        }
    }

    /// Record a cancelled call. Releases an outstanding probe admission
    /// without touching the failure count; cancellation is health-neutral.
    pub fn report_cancelled(&self) {
        let mut inner = self.lock();
        inner.probe_in_flight = false;
    }

    /// Get current consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
