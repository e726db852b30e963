// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! Tool actions and execution
//!
//! A tool call on the wire is `{"name": "<tool>", "arguments": {...}}`.
//! Parsing it lands directly in the `ToolAction` union, so an unknown tool
//! name or a missing required argument is rejected at the type boundary
//! and there is no stringly-typed dispatch anywhere downstream.

pub mod backup;
pub mod diff;
pub mod executor;

pub use backup::BackupManager;
pub use executor::ActionExecutor;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A fully validated tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolAction {
    /// Read a file, optionally a 1-based line range
    ReadFile {
        filename: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_line: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_line: Option<usize>,
    },
    /// Create or overwrite a file. Non-string content is written as
    /// pretty-printed JSON.
    WriteFile { filename: String, content: Value },
    /// Delete a file (pre-image is backed up first)
    DeleteFile { filename: String },
    /// Create a directory, parents included; idempotent
    CreateDirectory { directory_name: String },
    /// Insert a code block before the given 1-based line, re-indented to
    /// match the target line
    InsertAtLine {
        filename: String,
        code_to_insert: String,
        line_number: usize,
    },
    /// Replace an exact block of code, re-indented to the old block's
    /// first-line indent
    ReplaceCode {
        filename: String,
        old_code: String,
        new_code: String,
    },
    /// Non-recursive directory listing
    ListFiles {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        directory: Option<String>,
    },
    /// Case-insensitive regex search across files
    SearchFiles {
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        directory: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_pattern: Option<String>,
    },
    /// Run an allow-listed shell command
    RunCommand { command: String },
}

impl ToolAction {
    /// Parse from the wire form `{"name": ..., "arguments": {...}}`.
    ///
    /// The error string names the offending tool or argument so it can be
    /// surfaced to the model verbatim.
    pub fn from_value(value: &Value) -> std::result::Result<ToolAction, String> {
        serde_json::from_value(value.clone()).map_err(|e| e.to_string())
    }

    /// The wire name of this tool
    pub fn name(&self) -> &'static str {
        match self {
            ToolAction::ReadFile { .. } => "read_file",
            ToolAction::WriteFile { .. } => "write_file",
            ToolAction::DeleteFile { .. } => "delete_file",
            ToolAction::CreateDirectory { .. } => "create_directory",
            ToolAction::InsertAtLine { .. } => "insert_at_line",
            ToolAction::ReplaceCode { .. } => "replace_code",
            ToolAction::ListFiles { .. } => "list_files",
            ToolAction::SearchFiles { .. } => "search_files",
            ToolAction::RunCommand { .. } => "run_command",
        }
    }

    /// Whether this tool only observes the filesystem
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            ToolAction::ReadFile { .. }
                | ToolAction::ListFiles { .. }
                | ToolAction::SearchFiles { .. }
        )
    }

    /// Every filesystem path this action touches, as written by the model
    pub fn paths(&self) -> Vec<&str> {
        match self {
            ToolAction::ReadFile { filename, .. }
            | ToolAction::WriteFile { filename, .. }
            | ToolAction::DeleteFile { filename }
            | ToolAction::InsertAtLine { filename, .. }
            | ToolAction::ReplaceCode { filename, .. } => vec![filename],
            ToolAction::CreateDirectory { directory_name } => vec![directory_name],
            ToolAction::ListFiles { directory } => {
                directory.as_deref().into_iter().collect()
            }
            ToolAction::SearchFiles { directory, .. } => {
                directory.as_deref().into_iter().collect()
            }
            ToolAction::RunCommand { .. } => vec![],
        }
    }
}

/// Outcome of executing a single tool action.
///
/// Executor failures are reported inside the result, never as a panic or
/// an error that escapes the turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// Whether the action did what it claimed
    pub success: bool,
    /// Human-readable outcome, fed back to the model as a tool turn
    pub message: String,
    /// Unified diff of the mutation, when one applies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    /// Path of the pre-image backup, when one was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<std::path::PathBuf>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            diff: None,
            backup: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            diff: None,
            backup: None,
        }
    }

    pub fn with_diff(mut self, diff: impl Into<String>) -> Self {
        self.diff = Some(diff.into());
        self
    }

    pub fn with_backup(mut self, backup: Option<std::path::PathBuf>) -> Self {
        self.backup = backup;
        self
    }
}
