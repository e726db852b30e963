// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! Configuration for Otto

pub mod settings;

pub use settings::*;
