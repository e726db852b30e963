// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! Constitutional safety gate
//!
//! Every tool call passes through here before execution, including the
//! confirmation re-entry path. The rule set is data loaded from config;
//! the gate's logic is only the evaluation order: containment, then
//! forbidden prefixes, then forbidden basename patterns, then the
//! tool-class default. A deny is final and is never downgraded by a later
//! rule. Verdicts are computed fresh per request, never cached.

use std::path::{Component, Path, PathBuf};

use crate::config::SafetyConfig;
use crate::extract::ToolCallRequest;

/// Outcome of evaluating a tool call against the rule set
#[derive(Debug, Clone, PartialEq)]
pub enum SafetyVerdict {
    /// Read-only action touching no protected path; run it
    AllowAuto,
    /// Mutating action; the user must approve it first
    RequireConfirmation,
    /// Forbidden; the executor is never reached
    Deny { reason: String },
}

/// Compiled constitutional rules
pub struct RuleSet {
    forbidden_prefixes: Vec<PathBuf>,
    forbidden_patterns: Vec<glob::Pattern>,
}

impl RuleSet {
    pub fn from_config(config: &SafetyConfig) -> Self {
        let forbidden_patterns = config
            .forbidden_patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!(pattern = %p, error = %e, "ignoring unparseable forbidden pattern");
                    None
                }
            })
            .collect();

        Self {
            forbidden_prefixes: config.forbidden_prefixes.iter().map(PathBuf::from).collect(),
            forbidden_patterns,
        }
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::from_config(&SafetyConfig::default())
    }
}

/// Evaluates tool calls against the rule set
pub struct SafetyGate {
    rules: RuleSet,
}

impl SafetyGate {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    /// Decide what may happen to this request. Paths are judged lexically;
    /// nothing here touches the filesystem.
    pub fn evaluate(&self, request: &ToolCallRequest, workspace_root: &Path) -> SafetyVerdict {
        let root = normalize(workspace_root);

        for raw in request.action.paths() {
            // 1. Containment: traversal out of the workspace is final
            let joined = {
                let p = Path::new(raw);
                if p.is_absolute() {
                    p.to_path_buf()
                } else {
                    root.join(p)
                }
            };
            let Some(resolved) = normalize_checked(&joined) else {
                return self.deny(request, raw, "path escapes the workspace root");
            };
            if !resolved.starts_with(&root) {
                return self.deny(request, raw, "path is outside the workspace root");
            }

            // 2. Forbidden absolute prefixes
            for prefix in &self.rules.forbidden_prefixes {
                if Path::new(raw).starts_with(prefix) || resolved.starts_with(prefix) {
                    return self.deny(
                        request,
                        raw,
                        &format!("path is under protected prefix '{}'", prefix.display()),
                    );
                }
            }

            // 3. Forbidden basename patterns, applied to every component
            for component in resolved
                .strip_prefix(&root)
                .unwrap_or(&resolved)
                .components()
            {
                let name = component.as_os_str().to_string_lossy();
                for pattern in &self.rules.forbidden_patterns {
                    if pattern.matches(&name) {
                        return self.deny(
                            request,
                            raw,
                            &format!("'{}' matches protected pattern '{}'", name, pattern),
                        );
                    }
                }
            }
        }

        // 4. Tool-class default
        if request.action.is_read_only() {
            SafetyVerdict::AllowAuto
        } else {
            SafetyVerdict::RequireConfirmation
        }
    }

    fn deny(&self, request: &ToolCallRequest, path: &str, why: &str) -> SafetyVerdict {
        let reason = format!("{} denied: {} ({})", request.action.name(), path, why);
        tracing::warn!(tool = request.action.name(), path, why, "action denied");
        SafetyVerdict::Deny { reason }
    }
}

/// Lexically collapse `.` and `..` components; `..` past the start is
/// clamped (the caller catches the escape via `normalize_checked`).
fn normalize(path: &Path) -> PathBuf {
    normalize_checked(path).unwrap_or_else(|| path.to_path_buf())
}

/// Lexical normalization that reports `None` when `..` climbs above the
/// path's own start
fn normalize_checked(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                out.pop();
                depth -= 1;
            }
            Component::Normal(name) => {
                out.push(name);
                depth += 1;
            }
            other => out.push(other),
        }
    }
    Some(out)
}
