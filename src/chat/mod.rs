// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! Turn orchestration and streaming sessions

pub mod engine;
pub mod session;

pub use engine::{ActionDescriptor, ChatEngine, ReplacePreview, TurnOutcome};
pub use session::{SessionEvent, StreamingSession};
