// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! Action executor
//!
//! Runs an approved `ToolAction` against the workspace. Every failure mode
//! is reported inside the `ActionResult`; nothing here panics or lets an
//! error escape the turn. Mutating actions back up the pre-image first and
//! attach a unified diff of what changed.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;

use crate::config::{SafetyConfig, WorkspaceConfig};
use crate::tools::backup::BackupManager;
use crate::tools::diff::unified_diff;
use crate::tools::{ActionResult, ToolAction};

/// Executes validated tool actions inside a workspace root
pub struct ActionExecutor {
    workspace_root: PathBuf,
    backups: BackupManager,
    allowed_commands: Vec<String>,
    command_timeout: Duration,
}

impl ActionExecutor {
    pub fn new(workspace: &WorkspaceConfig, safety: &SafetyConfig) -> Self {
        let root = PathBuf::from(&workspace.root);
        Self {
            backups: BackupManager::new(root.join(&workspace.backup_dir)),
            workspace_root: root,
            allowed_commands: safety.allowed_commands.clone(),
            command_timeout: Duration::from_secs(workspace.command_timeout_secs),
        }
    }

    /// Build an executor rooted at an explicit directory
    pub fn with_root(
        root: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        allowed_commands: Vec<String>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            workspace_root: root.into(),
            backups: BackupManager::new(backup_dir),
            allowed_commands,
            command_timeout,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Resolve a model-supplied path against the workspace root
    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.workspace_root.join(p)
        }
    }

    /// Execute an already-approved action
    pub async fn execute(&self, action: &ToolAction) -> ActionResult {
        tracing::debug!(tool = action.name(), "executing action");
        match action {
            ToolAction::ReadFile {
                filename,
                start_line,
                end_line,
            } => self.read_file(filename, *start_line, *end_line),
            ToolAction::WriteFile { filename, content } => self.write_file(filename, content),
            ToolAction::DeleteFile { filename } => self.delete_file(filename),
            ToolAction::CreateDirectory { directory_name } => {
                self.create_directory(directory_name)
            }
            ToolAction::InsertAtLine {
                filename,
                code_to_insert,
                line_number,
            } => self.insert_at_line(filename, code_to_insert, *line_number),
            ToolAction::ReplaceCode {
                filename,
                old_code,
                new_code,
            } => self.replace_code(filename, old_code, new_code),
            ToolAction::ListFiles { directory } => {
                self.list_files(directory.as_deref().unwrap_or("."))
            }
            ToolAction::SearchFiles {
                pattern,
                directory,
                file_pattern,
            } => self.search_files(
                pattern,
                directory.as_deref().unwrap_or("."),
                file_pattern.as_deref(),
            ),
            ToolAction::RunCommand { command } => self.run_command(command).await,
        }
    }

    fn read_file(
        &self,
        filename: &str,
        start_line: Option<usize>,
        end_line: Option<usize>,
    ) -> ActionResult {
        let path = self.resolve(filename);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ActionResult::failure(format!("Error: File '{}' not found.", filename));
            }
            Err(e) => {
                return ActionResult::failure(format!(
                    "Error reading file '{}': {}",
                    filename, e
                ));
            }
        };

        if start_line.is_none() && end_line.is_none() {
            return ActionResult::ok(format!(
                "Content of '{}':\n---\n{}\n---",
                filename, content
            ));
        }

        let lines: Vec<&str> = content.lines().collect();
        let start = start_line.unwrap_or(1).max(1);
        let end = end_line.unwrap_or(lines.len()).min(lines.len());
        let selected = if start <= end {
            lines[start - 1..end].join("\n")
        } else {
            String::new()
        };

        ActionResult::ok(format!(
            "Content of '{}' from line {} to {}:\n---\n{}\n---",
            filename, start, end, selected
        ))
    }

    fn write_file(&self, filename: &str, content: &Value) -> ActionResult {
        let path = self.resolve(filename);
        let new_content = match render_content(content) {
            Ok(c) => c,
            Err(e) => {
                return ActionResult::failure(format!(
                    "Error serializing content for '{}': {}",
                    filename, e
                ));
            }
        };

        let old_content = std::fs::read_to_string(&path).unwrap_or_default();
        let backup = match self.backups.backup(&path) {
            Ok(b) => b,
            Err(e) => {
                return ActionResult::failure(format!(
                    "Error backing up '{}': {}",
                    filename, e
                ));
            }
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ActionResult::failure(format!(
                    "Error creating parent directory for '{}': {}",
                    filename, e
                ));
            }
        }

        if let Err(e) = std::fs::write(&path, &new_content) {
            return ActionResult::failure(format!("Error writing to file '{}': {}", filename, e));
        }

        let diff = unified_diff(
            &old_content,
            &new_content,
            &format!("a/{}", filename),
            &format!("b/{}", filename),
        );
        let mut result =
            ActionResult::ok(format!("Successfully wrote content to '{}'.", filename))
                .with_backup(backup);
        if let Some(diff) = diff {
            result = result.with_diff(diff);
        }
        result
    }

    fn delete_file(&self, filename: &str) -> ActionResult {
        let path = self.resolve(filename);
        if !path.exists() {
            return ActionResult::failure(format!(
                "Error: File '{}' not found for deletion.",
                filename
            ));
        }

        let backup = match self.backups.backup(&path) {
            Ok(b) => b,
            Err(e) => {
                return ActionResult::failure(format!(
                    "Error backing up '{}': {}",
                    filename, e
                ));
            }
        };

        match std::fs::remove_file(&path) {
            Ok(()) => ActionResult::ok(format!("Successfully deleted file '{}'.", filename))
                .with_backup(backup),
            Err(e) => {
                ActionResult::failure(format!("Error deleting file '{}': {}", filename, e))
            }
        }
    }

    fn create_directory(&self, directory_name: &str) -> ActionResult {
        let path = self.resolve(directory_name);
        match std::fs::create_dir_all(&path) {
            Ok(()) => ActionResult::ok(format!(
                "Successfully created directory '{}'.",
                directory_name
            )),
            Err(e) => ActionResult::failure(format!(
                "Error creating directory '{}': {}",
                directory_name, e
            )),
        }
    }

    fn insert_at_line(
        &self,
        filename: &str,
        code_to_insert: &str,
        line_number: usize,
    ) -> ActionResult {
        let path = self.resolve(filename);
        let old_content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ActionResult::failure(format!("Error: File '{}' not found.", filename));
            }
            Err(e) => {
                return ActionResult::failure(format!(
                    "Error reading file '{}': {}",
                    filename, e
                ));
            }
        };

        let mut lines: Vec<String> = old_content.lines().map(String::from).collect();
        if line_number < 1 || line_number > lines.len() + 1 {
            return ActionResult::failure(format!(
                "Error: Line number {} is out of bounds for file '{}' which has {} lines.",
                line_number,
                filename,
                lines.len()
            ));
        }

        let target_index = line_number - 1;
        // Match the indentation of the line being displaced; appending at
        // the end keeps the block as written.
        let base_indent = lines
            .get(target_index)
            .map(|l| leading_indent(l).to_string())
            .unwrap_or_default();
        let inserted: Vec<String> = code_to_insert
            .lines()
            .map(|l| format!("{}{}", base_indent, l))
            .collect();
        lines.splice(target_index..target_index, inserted);

        let mut new_content = lines.join("\n");
        if old_content.ends_with('\n') || !old_content.contains('\n') {
            new_content.push('\n');
        }

        let backup = match self.backups.backup(&path) {
            Ok(b) => b,
            Err(e) => {
                return ActionResult::failure(format!(
                    "Error backing up '{}': {}",
                    filename, e
                ));
            }
        };

        if let Err(e) = std::fs::write(&path, &new_content) {
            return ActionResult::failure(format!(
                "Error inserting code into '{}': {}",
                filename, e
            ));
        }

        let mut result = ActionResult::ok(format!(
            "Successfully inserted code at line {} in '{}'.",
            line_number, filename
        ))
        .with_backup(backup);
        if let Some(diff) = unified_diff(
            &old_content,
            &new_content,
            &format!("a/{}", filename),
            &format!("b/{}", filename),
        ) {
            result = result.with_diff(diff);
        }
        result
    }

    fn replace_code(&self, filename: &str, old_code: &str, new_code: &str) -> ActionResult {
        let path = self.resolve(filename);
        let old_content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ActionResult::failure(format!("Error: File '{}' not found.", filename));
            }
            Err(e) => {
                return ActionResult::failure(format!(
                    "Error reading file '{}': {}",
                    filename, e
                ));
            }
        };

        if !old_content.contains(old_code) {
            return ActionResult::failure(format!(
                "Error: The specified 'old_code' was not found in '{}'. It must be an exact match.",
                filename
            ));
        }

        // Re-indent the replacement to the old block's first-line indent
        let base_indent = old_code
            .lines()
            .next()
            .map(leading_indent)
            .unwrap_or_default();
        let indented_new: String = new_code
            .lines()
            .map(|l| format!("{}{}", base_indent, l))
            .collect::<Vec<_>>()
            .join("\n");
        let new_content = old_content.replace(old_code, &indented_new);

        let backup = match self.backups.backup(&path) {
            Ok(b) => b,
            Err(e) => {
                return ActionResult::failure(format!(
                    "Error backing up '{}': {}",
                    filename, e
                ));
            }
        };

        if let Err(e) = std::fs::write(&path, &new_content) {
            return ActionResult::failure(format!(
                "Error replacing code in '{}': {}",
                filename, e
            ));
        }

        let mut result =
            ActionResult::ok(format!("Successfully replaced code in '{}'.", filename))
                .with_backup(backup);
        if let Some(diff) = unified_diff(
            &old_content,
            &new_content,
            &format!("a/{}", filename),
            &format!("b/{}", filename),
        ) {
            result = result.with_diff(diff);
        }
        result
    }

    fn list_files(&self, directory: &str) -> ActionResult {
        let path = self.resolve(directory);
        let entries = match std::fs::read_dir(&path) {
            Ok(e) => e,
            Err(e) => {
                return ActionResult::failure(format!("Error listing files: {}", e));
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();

        if names.is_empty() {
            ActionResult::ok("The directory is empty.")
        } else {
            ActionResult::ok(format!(
                "Files in the current directory:\n{}",
                names.join("\n")
            ))
        }
    }

    fn search_files(
        &self,
        pattern: &str,
        directory: &str,
        file_pattern: Option<&str>,
    ) -> ActionResult {
        let regex = match regex::RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
        {
            Ok(r) => r,
            Err(e) => {
                return ActionResult::failure(format!("Error: invalid search pattern: {}", e));
            }
        };

        let name_filter = match file_pattern.map(glob::Pattern::new) {
            Some(Ok(p)) => Some(p),
            Some(Err(e)) => {
                return ActionResult::failure(format!("Error: invalid file pattern: {}", e));
            }
            None => None,
        };

        let root = self.resolve(directory);
        let mut results = Vec::new();
        for entry in walkdir::WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if let Some(ref filter) = name_filter {
                let name = entry.file_name().to_string_lossy();
                if !filter.matches(&name) {
                    continue;
                }
            }
            // Binary and unreadable files are skipped silently
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            if regex.is_match(&content) {
                results.push(format!("Found in {}", entry.path().display()));
            }
        }

        if results.is_empty() {
            ActionResult::ok("No matches found.")
        } else {
            ActionResult::ok(format!("Search results:\n{}", results.join("\n")))
        }
    }

    async fn run_command(&self, command: &str) -> ActionResult {
        if !self.command_allowed(command) {
            return ActionResult::failure("Error: Command not allowed for security reasons.");
        }

        let output_fut = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workspace_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.command_timeout, output_fut).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return ActionResult::failure(format!("Error executing command: {}", e));
            }
            Err(_elapsed) => {
                return ActionResult::failure(format!(
                    "Error: command timed out after {} seconds.",
                    self.command_timeout.as_secs()
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() {
            ActionResult::ok(format!("Command executed successfully:\n{}", stdout))
        } else {
            ActionResult::failure(format!("Command failed:\n{}", stderr))
        }
    }

    /// The command's first token must be on the allow-list, and the
    /// command must not contain shell metacharacters that would chain an
    /// unlisted program behind a listed one.
    fn command_allowed(&self, command: &str) -> bool {
        const SHELL_META: &[char] = &[';', '&', '|', '`', '$', '>', '<', '\n'];
        if command.contains(SHELL_META) {
            return false;
        }
        let Some(first) = command.split_whitespace().next() else {
            return false;
        };
        let program = first.rsplit('/').next().unwrap_or(first);
        self.allowed_commands.iter().any(|c| c == program)
    }
}

/// Render write_file content: strings verbatim, everything else as
/// 4-space-indented JSON
pub(crate) fn render_content(content: &Value) -> serde_json::Result<String> {
    match content {
        Value::String(s) => Ok(s.clone()),
        other => {
            let mut buf = Vec::new();
            let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
            let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
            serde::Serialize::serialize(other, &mut ser)?;
            Ok(String::from_utf8_lossy(&buf).to_string())
        }
    }
}

fn leading_indent(line: &str) -> &str {
    let end = line
        .find(|c: char| !c.is_whitespace())
        .unwrap_or(line.len());
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn executor(dir: &tempfile::TempDir) -> ActionExecutor {
        ActionExecutor::with_root(
            dir.path(),
            dir.path().join("backups"),
            vec!["ls".to_string(), "cat".to_string(), "git".to_string()],
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_read_file_whole() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello\nworld\n").unwrap();
        let exec = executor(&dir);

        let result = exec
            .execute(&ToolAction::ReadFile {
                filename: "a.txt".to_string(),
                start_line: None,
                end_line: None,
            })
            .await;

        assert!(result.success);
        assert!(result.message.contains("hello\nworld"));
    }

    #[tokio::test]
    async fn test_read_file_line_range() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\nfour\n").unwrap();
        let exec = executor(&dir);

        let result = exec
            .execute(&ToolAction::ReadFile {
                filename: "a.txt".to_string(),
                start_line: Some(2),
                end_line: Some(3),
            })
            .await;

        assert!(result.success);
        assert!(result.message.contains("two\nthree"));
        assert!(!result.message.contains("one\ntwo\nthree"));
        assert!(!result.message.contains("four"));
    }

    #[tokio::test]
    async fn test_read_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir);
        let result = exec
            .execute(&ToolAction::ReadFile {
                filename: "missing.txt".to_string(),
                start_line: None,
                end_line: None,
            })
            .await;

        assert!(!result.success);
        assert!(result.message.contains("not found"));
    }

    #[tokio::test]
    async fn test_write_file_string_content() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir);

        let result = exec
            .execute(&ToolAction::WriteFile {
                filename: "out.txt".to_string(),
                content: json!("plain text"),
            })
            .await;

        assert!(result.success);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
            "plain text"
        );
        // New file: no backup, but a diff showing the addition
        assert!(result.backup.is_none());
        assert!(result.diff.unwrap().contains("+plain text"));
    }

    #[tokio::test]
    async fn test_write_file_json_content_pretty_printed() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir);

        let result = exec
            .execute(&ToolAction::WriteFile {
                filename: "config.json".to_string(),
                content: json!({"name": "otto", "debug": true}),
            })
            .await;

        assert!(result.success);
        let written = std::fs::read_to_string(dir.path().join("config.json")).unwrap();
        assert!(written.contains("    \"debug\": true"));
        let parsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed["name"], "otto");
    }

    #[tokio::test]
    async fn test_write_file_overwrite_takes_backup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "old content\n").unwrap();
        let exec = executor(&dir);

        let result = exec
            .execute(&ToolAction::WriteFile {
                filename: "a.txt".to_string(),
                content: json!("new content\n"),
            })
            .await;

        assert!(result.success);
        let backup = result.backup.unwrap();
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "old content\n");
        let diff = result.diff.unwrap();
        assert!(diff.contains("-old content"));
        assert!(diff.contains("+new content"));
    }

    #[tokio::test]
    async fn test_delete_file_with_backup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("doomed.txt"), "bye").unwrap();
        let exec = executor(&dir);

        let result = exec
            .execute(&ToolAction::DeleteFile {
                filename: "doomed.txt".to_string(),
            })
            .await;

        assert!(result.success);
        assert!(!dir.path().join("doomed.txt").exists());
        assert_eq!(
            std::fs::read_to_string(result.backup.unwrap()).unwrap(),
            "bye"
        );
    }

    #[tokio::test]
    async fn test_delete_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir);
        let result = exec
            .execute(&ToolAction::DeleteFile {
                filename: "ghost.txt".to_string(),
            })
            .await;

        assert!(!result.success);
        assert!(result.message.contains("not found for deletion"));
    }

    #[tokio::test]
    async fn test_create_directory_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir);
        let action = ToolAction::CreateDirectory {
            directory_name: "nested/child".to_string(),
        };

        assert!(exec.execute(&action).await.success);
        assert!(dir.path().join("nested/child").is_dir());
        // Second run reports success too
        assert!(exec.execute(&action).await.success);
    }

    #[tokio::test]
    async fn test_insert_at_line_matches_indentation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("app.py"),
            "def main():\n    first()\n    second()\n",
        )
        .unwrap();
        let exec = executor(&dir);

        let result = exec
            .execute(&ToolAction::InsertAtLine {
                filename: "app.py".to_string(),
                code_to_insert: "inserted()".to_string(),
                line_number: 3,
            })
            .await;

        assert!(result.success);
        let content = std::fs::read_to_string(dir.path().join("app.py")).unwrap();
        assert_eq!(
            content,
            "def main():\n    first()\n    inserted()\n    second()\n"
        );
    }

    #[tokio::test]
    async fn test_insert_at_line_out_of_bounds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\n").unwrap();
        let exec = executor(&dir);

        let result = exec
            .execute(&ToolAction::InsertAtLine {
                filename: "a.txt".to_string(),
                code_to_insert: "x".to_string(),
                line_number: 10,
            })
            .await;

        assert!(!result.success);
        assert!(result.message.contains("out of bounds"));
    }

    #[tokio::test]
    async fn test_insert_appends_after_last_line() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\n").unwrap();
        let exec = executor(&dir);

        let result = exec
            .execute(&ToolAction::InsertAtLine {
                filename: "a.txt".to_string(),
                code_to_insert: "three".to_string(),
                line_number: 3,
            })
            .await;

        assert!(result.success);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "one\ntwo\nthree\n"
        );
    }

    #[tokio::test]
    async fn test_replace_code_exact_match_with_indent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("app.py"),
            "def main():\n    old_call()\n",
        )
        .unwrap();
        let exec = executor(&dir);

        let result = exec
            .execute(&ToolAction::ReplaceCode {
                filename: "app.py".to_string(),
                old_code: "    old_call()".to_string(),
                new_code: "new_call()".to_string(),
            })
            .await;

        assert!(result.success);
        let content = std::fs::read_to_string(dir.path().join("app.py")).unwrap();
        assert_eq!(content, "def main():\n    new_call()\n");
        assert!(result.diff.unwrap().contains("+    new_call()"));
    }

    #[tokio::test]
    async fn test_replace_code_requires_exact_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "actual content\n").unwrap();
        let exec = executor(&dir);

        let result = exec
            .execute(&ToolAction::ReplaceCode {
                filename: "a.txt".to_string(),
                old_code: "something else".to_string(),
                new_code: "x".to_string(),
            })
            .await;

        assert!(!result.success);
        assert!(result.message.contains("exact match"));
        // File untouched
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "actual content\n"
        );
    }

    #[tokio::test]
    async fn test_list_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        let exec = executor(&dir);

        let result = exec
            .execute(&ToolAction::ListFiles { directory: None })
            .await;

        assert!(result.success);
        assert!(result.message.contains("a.txt"));
        assert!(result.message.contains("b.txt"));
    }

    #[tokio::test]
    async fn test_list_files_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir);
        let result = exec
            .execute(&ToolAction::ListFiles { directory: None })
            .await;

        assert!(result.success);
        assert!(result.message.contains("empty"));
    }

    #[tokio::test]
    async fn test_search_files_with_glob_filter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("code.py"), "def handler(): pass").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "handler notes").unwrap();
        let exec = executor(&dir);

        let result = exec
            .execute(&ToolAction::SearchFiles {
                pattern: "HANDLER".to_string(),
                directory: None,
                file_pattern: Some("*.py".to_string()),
            })
            .await;

        assert!(result.success);
        assert!(result.message.contains("code.py"));
        assert!(!result.message.contains("notes.txt"));
    }

    #[tokio::test]
    async fn test_search_files_no_matches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "nothing here").unwrap();
        let exec = executor(&dir);

        let result = exec
            .execute(&ToolAction::SearchFiles {
                pattern: "absent_symbol".to_string(),
                directory: None,
                file_pattern: None,
            })
            .await;

        assert!(result.success);
        assert_eq!(result.message, "No matches found.");
    }

    #[tokio::test]
    async fn test_search_files_invalid_regex() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir);
        let result = exec
            .execute(&ToolAction::SearchFiles {
                pattern: "[unclosed".to_string(),
                directory: None,
                file_pattern: None,
            })
            .await;

        assert!(!result.success);
        assert!(result.message.contains("invalid search pattern"));
    }

    #[tokio::test]
    async fn test_run_command_allowed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("visible.txt"), "").unwrap();
        let exec = executor(&dir);

        let result = exec
            .execute(&ToolAction::RunCommand {
                command: "ls".to_string(),
            })
            .await;

        assert!(result.success);
        assert!(result.message.contains("visible.txt"));
    }

    #[tokio::test]
    async fn test_run_command_rejects_off_list() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir);

        let result = exec
            .execute(&ToolAction::RunCommand {
                command: "rm -rf /".to_string(),
            })
            .await;

        assert!(!result.success);
        assert!(result.message.contains("not allowed"));
    }

    #[tokio::test]
    async fn test_run_command_first_token_decides() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir);

        // "ls" appearing later in the command does not whitelist it
        let result = exec
            .execute(&ToolAction::RunCommand {
                command: "curl http://example.com; ls".to_string(),
            })
            .await;

        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_run_command_rejects_shell_chaining() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir);

        // A listed first token must not smuggle a second command past
        // the allow-list via the shell.
        for command in [
            "ls ; touch smuggled.txt",
            "ls && touch smuggled.txt",
            "ls | touch smuggled.txt",
            "ls `touch smuggled.txt`",
            "ls $(touch smuggled.txt)",
            "ls > smuggled.txt",
        ] {
            let result = exec
                .execute(&ToolAction::RunCommand {
                    command: command.to_string(),
                })
                .await;

            assert!(!result.success, "accepted: {command}");
            assert!(result.message.contains("not allowed"));
        }
        assert!(!dir.path().join("smuggled.txt").exists());
    }

    #[tokio::test]
    async fn test_run_command_nonzero_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir);

        let result = exec
            .execute(&ToolAction::RunCommand {
                command: "cat no_such_file_here".to_string(),
            })
            .await;

        assert!(!result.success);
        assert!(result.message.contains("Command failed"));
    }

    #[test]
    fn test_render_content_object_uses_four_space_indent() {
        let rendered = render_content(&json!({"a": 1})).unwrap();
        assert!(rendered.contains("    \"a\": 1"));
    }

    #[test]
    fn test_leading_indent() {
        assert_eq!(leading_indent("    code"), "    ");
        assert_eq!(leading_indent("\t\tcode"), "\t\t");
        assert_eq!(leading_indent("code"), "");
        assert_eq!(leading_indent("   "), "   ");
    }
}
