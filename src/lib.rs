// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! Otto - agent orchestration engine for AI coding assistants.
//!
//! This crate exposes the runtime that turns a user message into a reply
//! or a workspace action:
//! - `llm`: provider abstraction, streaming, circuit breaker, model router
//! - `chat`: streaming sessions and per-turn orchestration
//! - `extract`: tool-call extraction and JSON repair heuristics
//! - `safety`: constitutional safety gate over extracted actions
//! - `tools`: the action set, executor, backups, and diffs
//! - `config`: settings with candidate models and safety rules

pub mod chat;
pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod safety;
pub mod tools;

pub use error::{OttoError, Result};
