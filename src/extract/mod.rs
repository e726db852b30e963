// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! Tool-call extraction from accumulated model output
//!
//! The model announces a tool invocation as a JSON object inside a
//! ```json fenced block (or, degraded, as a bare object mentioning
//! "tool_call"). The extractor finds the candidate text, tries a strict
//! parse, then walks the repair heuristics one at a time re-parsing after
//! each. The whole thing is a pure function of its input; it never panics
//! and never silently invents a default.

pub mod repair;

pub use repair::{repair, RepairKind, RepairOptions};

use serde_json::Value;

use crate::tools::ToolAction;

/// A validated tool call recovered from model output
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// The parsed, schema-checked action
    pub action: ToolAction,
    /// The JSON text that actually parsed, kept for audit
    pub raw: String,
    /// Repair heuristics that were needed, in application order
    pub repairs: Vec<RepairKind>,
}

/// Result of scanning a completed response for a tool call
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// A well-formed call was found
    ToolCall(ToolCallRequest),
    /// The response is plain prose
    None,
    /// Something that looks like a call was found but could not be made
    /// valid; the raw candidate text is attached for diagnostics
    Error { reason: String, raw: String },
}

/// Scan `text` for a tool call using the default repair options
pub fn extract(text: &str) -> Extraction {
    extract_with(text, &RepairOptions::default())
}

/// Scan `text` for a tool call, honoring the given repair toggles
pub fn extract_with(text: &str, options: &RepairOptions) -> Extraction {
    let Some(candidate) = locate_tool_call(text) else {
        return Extraction::None;
    };

    let (parsed, repaired_text, repairs) = match parse_with_repairs(&candidate, options) {
        Ok(outcome) => outcome,
        Err(reason) => {
            tracing::debug!(%reason, "tool call candidate unparseable");
            return Extraction::Error {
                reason,
                raw: candidate,
            };
        }
    };

    let Some(inner) = parsed.get("tool_call") else {
        // Valid JSON that isn't a tool envelope, e.g. the model quoting
        // example data
        return Extraction::None;
    };

    match ToolAction::from_value(inner) {
        Ok(action) => {
            if !repairs.is_empty() {
                tracing::debug!(tool = action.name(), ?repairs, "tool call recovered via repair");
            }
            Extraction::ToolCall(ToolCallRequest {
                action,
                raw: repaired_text,
                repairs,
            })
        }
        Err(reason) => Extraction::Error {
            reason: format!("invalid tool call: {}", reason),
            raw: candidate,
        },
    }
}

/// Find the JSON text most likely to hold a tool call.
///
/// A ```json fence wins; otherwise a bare object is accepted only when it
/// mentions "tool_call" somewhere. This is the cheap detection pass used
/// by streaming sessions before full extraction runs.
pub fn locate_tool_call(text: &str) -> Option<String> {
    if let Some(fenced) = locate_fenced(text) {
        return Some(fenced);
    }

    if !text.contains("tool_call") {
        return None;
    }
    let start = text.find('{')?;
    let end = text.rfind('}').map(|i| i + 1).unwrap_or(text.len());
    if end <= start {
        // Opening brace but no close at all; hand the tail to the repairer
        return Some(text[start..].trim().to_string());
    }
    Some(text[start..end].trim().to_string())
}

fn locate_fenced(text: &str) -> Option<String> {
    let fence_start = text.find("```json")?;
    let body_start = fence_start + "```json".len();
    let body = &text[body_start..];
    let body = match body.find("```") {
        Some(fence_end) => &body[..fence_end],
        // Unterminated fence: the model was cut off mid-block
        None => body,
    };
    let trimmed = body.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Strict parse, then one heuristic at a time with a re-parse after each
fn parse_with_repairs(
    candidate: &str,
    options: &RepairOptions,
) -> std::result::Result<(Value, String, Vec<RepairKind>), String> {
    let mut current = candidate.to_string();
    let mut repairs = Vec::new();

    let first_err = match serde_json::from_str::<Value>(&current) {
        Ok(v) => return Ok((v, current, repairs)),
        Err(e) => e,
    };

    let steps = [
        (
            options.trailing_commas,
            RepairOptions {
                trailing_commas: true,
                balance_delimiters: false,
                escape_control_chars: false,
                normalize_quotes: false,
            },
        ),
        (
            options.balance_delimiters,
            RepairOptions {
                trailing_commas: false,
                balance_delimiters: true,
                escape_control_chars: false,
                normalize_quotes: false,
            },
        ),
        (
            options.escape_control_chars,
            RepairOptions {
                trailing_commas: false,
                balance_delimiters: false,
                escape_control_chars: true,
                normalize_quotes: false,
            },
        ),
        (
            options.normalize_quotes,
            RepairOptions {
                trailing_commas: false,
                balance_delimiters: false,
                escape_control_chars: false,
                normalize_quotes: true,
            },
        ),
    ];

    let mut last_err = first_err.to_string();
    for (enabled, single) in steps {
        if !enabled {
            continue;
        }
        let (next, applied) = repair(&current, &single);
        if !applied.is_empty() {
            repairs.extend(applied);
            current = next;
            match serde_json::from_str::<Value>(&current) {
                Ok(v) => return Ok((v, current, repairs)),
                Err(e) => last_err = e.to_string(),
            }
        }
    }

    Err(format!("could not parse tool call JSON: {}", last_err))
}
