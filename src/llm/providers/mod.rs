// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! LLM provider implementations

pub mod openrouter;

pub use openrouter::OpenRouterProvider;
