// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! Streaming session over a routed model call
//!
//! A session owns the consumption of one model stream. Content deltas are
//! forwarded in provider order; the session then emits exactly one
//! terminal event, `Complete` or `Failed`. Cancellation stops upstream
//! consumption and reports the call to the breaker as health-neutral, in
//! which case no terminal event is delivered.

use tokio::sync::{mpsc, watch};

use crate::extract;
use crate::llm::provider::StreamEvent;
use crate::llm::router::ActiveCall;
use futures::StreamExt;

/// Events delivered to the session consumer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A content fragment, in provider order
    Content(String),
    /// A tool-call block was spotted in the finished text; carries the raw
    /// candidate JSON, not yet validated
    ToolCallDetected(String),
    /// Terminal: the stream finished; carries the full accumulated text
    Complete(String),
    /// Terminal: the stream failed; content already delivered stands
    Failed(String),
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Complete(_) | SessionEvent::Failed(_))
    }
}

/// A live streaming session bound to one model call
pub struct StreamingSession {
    model: String,
    receiver: mpsc::UnboundedReceiver<SessionEvent>,
    cancel: watch::Sender<bool>,
}

impl StreamingSession {
    /// Spawn the consumer task over a freshly routed call
    pub fn spawn(mut call: ActiveCall) -> Self {
        let model = call.model.clone();
        let (tx, receiver) = mpsc::unbounded_channel();
        let (cancel, mut cancelled) = watch::channel(false);

        tokio::spawn(async move {
            let mut stream = call.take_stream();
            let mut accumulated = String::new();

            loop {
                tokio::select! {
                    // Cancellation or a dropped session handle stops
                    // consumption without penalizing the model
                    changed = cancelled.changed() => {
                        let _ = changed;
                        call.report_cancelled();
                        tracing::debug!(model = %call.model, "session cancelled");
                        return;
                    }
                    item = stream.next() => match item {
                        Some(Ok(StreamEvent::ContentDelta(delta))) => {
                            accumulated.push_str(&delta);
                            if tx.send(SessionEvent::Content(delta)).is_err() {
                                call.report_cancelled();
                                return;
                            }
                        }
                        Some(Ok(StreamEvent::Done)) | None => break,
                        Some(Err(e)) => {
                            call.report_failure();
                            let _ = tx.send(SessionEvent::Failed(e.to_string()));
                            return;
                        }
                    }
                }
            }

            call.report_success();
            if let Some(raw) = extract::locate_tool_call(&accumulated) {
                let _ = tx.send(SessionEvent::ToolCallDetected(raw));
            }
            let _ = tx.send(SessionEvent::Complete(accumulated));
        });

        Self {
            model,
            receiver,
            cancel,
        }
    }

    /// The model serving this session
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Next event; `None` after the terminal event or cancellation
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.receiver.recv().await
    }

    /// Stop consuming the upstream stream. Already-delivered content
    /// stands; the breaker records neither success nor failure.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Drain the session to its terminal event. Returns the accumulated
    /// content alongside the terminal event for callers that only care
    /// about the finished turn.
    pub async fn drain(&mut self) -> (String, Option<SessionEvent>) {
        let mut content = String::new();
        while let Some(event) = self.next_event().await {
            match event {
                SessionEvent::Content(delta) => content.push_str(&delta),
                terminal if terminal.is_terminal() => return (content, Some(terminal)),
                _ => {}
            }
        }
        (content, None)
    }
}
