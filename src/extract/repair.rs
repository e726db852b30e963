// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! JSON repair heuristics
//!
//! Models sometimes emit almost-JSON: trailing commas, an unclosed brace,
//! a raw newline inside a string, Python-style single quotes. Each
//! heuristic here is a pure, idempotent text transform; the extractor
//! re-attempts strict parsing after every one and stops at first success.

use serde::{Deserialize, Serialize};

/// Which repair heuristic was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairKind {
    /// Removed commas immediately preceding `}` or `]`
    TrailingCommas,
    /// Appended closing braces/brackets for unmatched opens
    BalanceDelimiters,
    /// Escaped raw control characters inside string literals
    EscapeControlChars,
    /// Rewrote single-quoted strings and unquoted keys to double quotes
    NormalizeQuotes,
}

/// Toggles for the individual heuristics, all enabled by default
#[derive(Debug, Clone)]
pub struct RepairOptions {
    pub trailing_commas: bool,
    pub balance_delimiters: bool,
    pub escape_control_chars: bool,
    pub normalize_quotes: bool,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            trailing_commas: true,
            balance_delimiters: true,
            escape_control_chars: true,
            normalize_quotes: true,
        }
    }
}

/// Apply the enabled heuristics in order, recording each one that changed
/// the text. Pure: same input and options always give the same output.
pub fn repair(text: &str, options: &RepairOptions) -> (String, Vec<RepairKind>) {
    let mut current = text.to_string();
    let mut applied = Vec::new();

    let steps: [(bool, RepairKind, fn(&str) -> String); 4] = [
        (options.trailing_commas, RepairKind::TrailingCommas, strip_trailing_commas),
        (options.balance_delimiters, RepairKind::BalanceDelimiters, balance_delimiters),
        (options.escape_control_chars, RepairKind::EscapeControlChars, escape_control_chars),
        (options.normalize_quotes, RepairKind::NormalizeQuotes, normalize_quotes),
    ];

    for (enabled, kind, step) in steps {
        if !enabled {
            continue;
        }
        let repaired = step(&current);
        if repaired != current {
            tracing::debug!(heuristic = ?kind, "repair heuristic changed text");
            applied.push(kind);
            current = repaired;
        }
    }

    (current, applied)
}

/// Tracks whether the scanner is inside a quoted string
#[derive(Clone, Copy, PartialEq)]
enum Quote {
    None,
    Double,
    Single,
}

/// Remove commas that are followed only by whitespace and a closing
/// delimiter, outside of string literals
fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut quote = Quote::None;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if quote != Quote::None {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if (c == '"' && quote == Quote::Double)
                || (c == '\'' && quote == Quote::Single)
            {
                quote = Quote::None;
            }
            continue;
        }

        match c {
            '"' => {
                quote = Quote::Double;
                out.push(c);
            }
            '\'' => {
                quote = Quote::Single;
                out.push(c);
            }
            ',' => {
                let next_meaningful = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if matches!(next_meaningful, Some('}') | Some(']')) {
                    // drop the comma
                } else {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Append closing delimiters for any opens left unmatched at end of input
fn balance_delimiters(text: &str) -> String {
    let mut stack = Vec::new();
    let mut quote = Quote::None;
    let mut escaped = false;

    for c in text.chars() {
        if quote != Quote::None {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if (c == '"' && quote == Quote::Double)
                || (c == '\'' && quote == Quote::Single)
            {
                quote = Quote::None;
            }
            continue;
        }
        match c {
            '"' => quote = Quote::Double,
            '\'' => quote = Quote::Single,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    let mut out = text.to_string();
    // An unterminated string swallows everything after it; close it so the
    // appended delimiters land outside.
    match quote {
        Quote::Double => out.push('"'),
        Quote::Single => out.push('\''),
        Quote::None => {}
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

/// Escape raw control characters that appear inside string literals
fn escape_control_chars(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote = Quote::None;
    let mut escaped = false;

    for c in text.chars() {
        if quote == Quote::None {
            match c {
                '"' => quote = Quote::Double,
                '\'' => quote = Quote::Single,
                _ => {}
            }
            out.push(c);
            continue;
        }

        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            '"' if quote == Quote::Double => {
                quote = Quote::None;
                out.push(c);
            }
            '\'' if quote == Quote::Single => {
                quote = Quote::None;
                out.push(c);
            }
            c if c.is_control() => out.push_str(&escape_control(c)),
            c => out.push(c),
        }
    }

    out
}

fn escape_control(c: char) -> String {
    match c {
        '\n' => "\\n".to_string(),
        '\t' => "\\t".to_string(),
        '\r' => "\\r".to_string(),
        other => format!("\\u{:04x}", other as u32),
    }
}

/// Rewrite single-quoted strings as double-quoted and quote bare object
/// keys. Control characters inside converted strings are escaped as well,
/// so a second pass over the output is a no-op.
fn normalize_quotes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                // Copy a double-quoted string verbatim
                out.push(c);
                i += 1;
                let mut escaped = false;
                while i < chars.len() {
                    let c = chars[i];
                    out.push(c);
                    i += 1;
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '"' {
                        break;
                    }
                }
            }
            '\'' => {
                // Convert a single-quoted string
                out.push('"');
                i += 1;
                let mut escaped = false;
                while i < chars.len() {
                    let c = chars[i];
                    i += 1;
                    if escaped {
                        escaped = false;
                        // \' has no meaning in JSON; emit the quote bare
                        if c == '\'' {
                            out.push('\'');
                        } else {
                            out.push('\\');
                            out.push(c);
                        }
                        continue;
                    }
                    match c {
                        '\\' => escaped = true,
                        '\'' => {
                            out.push('"');
                            break;
                        }
                        '"' => out.push_str("\\\""),
                        c if c.is_control() => out.push_str(&escape_control(c)),
                        c => out.push(c),
                    }
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                // Possible bare key: identifier followed by ':'
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let mut j = i;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if chars.get(j) == Some(&':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}
