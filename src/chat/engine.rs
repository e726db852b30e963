// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! Turn orchestration for the coding assistant
//!
//! `ChatEngine` ties the pipeline together: it routes each user turn to a
//! healthy model, streams the completion, extracts a tool call from the
//! finished text, runs it through the safety gate, and either executes the
//! action or parks it for confirmation. History is borrowed per turn; the
//! engine never persists it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::{ModelsConfig, SafetyConfig, Settings, WorkspaceConfig};
use crate::error::{OttoError, Result};
use crate::extract::{self, Extraction, RepairKind, RepairOptions, ToolCallRequest};
use crate::llm::message::{Conversation, Message};
use crate::llm::provider::{CompletionRequest, LlmProvider};
use crate::llm::router::ModelRouter;
use crate::safety::{RuleSet, SafetyGate, SafetyVerdict};
use crate::tools::diff::unified_diff;
use crate::tools::executor::{render_content, ActionExecutor};
use crate::tools::{ActionResult, ToolAction};

use super::session::{SessionEvent, StreamingSession};

/// A validated action awaiting user confirmation
#[derive(Debug, Clone, Serialize)]
pub struct ActionDescriptor {
    /// Stable id for the confirmation round-trip
    pub id: Uuid,
    /// The action as it will execute
    pub action: ToolAction,
    /// The JSON text the action was parsed from
    pub raw: String,
    /// Repair heuristics that were needed to parse it
    pub repairs: Vec<RepairKind>,
}

impl ActionDescriptor {
    fn from_request(request: &ToolCallRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: request.action.clone(),
            raw: request.raw.clone(),
            repairs: request.repairs.clone(),
        }
    }
}

/// What a resolved turn produced
#[derive(Debug)]
pub enum TurnOutcome {
    /// Plain assistant prose, no action
    Reply(String),
    /// A mutating action is parked until the user confirms it
    PendingAction(ActionDescriptor),
    /// A read-only action ran immediately
    ActionExecuted {
        result: ActionResult,
        /// Prose the model wrote around the tool call, if any
        reply: Option<String>,
    },
}

/// Both diffs for a replace_code preview
#[derive(Debug, Serialize)]
pub struct ReplacePreview {
    /// old_code against new_code, in isolation
    pub snippet_diff: Option<String>,
    /// The whole file against what it would become
    pub file_diff: Option<String>,
}

/// Orchestrates one user turn end to end
pub struct ChatEngine {
    router: ModelRouter,
    gate: SafetyGate,
    models: ModelsConfig,
    workspace: WorkspaceConfig,
    safety: SafetyConfig,
    repair_options: RepairOptions,
}

impl ChatEngine {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: &Settings) -> Self {
        let router = ModelRouter::new(
            provider,
            settings.models.candidates.clone(),
            &settings.resilience,
        );
        Self {
            router,
            gate: SafetyGate::new(RuleSet::from_config(&settings.safety)),
            models: settings.models.clone(),
            workspace: settings.workspace.clone(),
            safety: settings.safety.clone(),
            repair_options: RepairOptions::default(),
        }
    }

    /// The router, exposed for health inspection
    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    /// Run one turn to completion: route, stream, extract, gate, execute
    pub async fn process_turn(
        &self,
        user_text: &str,
        history: &Conversation,
        workspace_override: Option<&Path>,
    ) -> Result<TurnOutcome> {
        let mut session = self.process_turn_stream(user_text, history).await?;
        let model = session.model().to_string();

        let (content, terminal) = session.drain().await;
        match terminal {
            Some(SessionEvent::Complete(text)) => {
                if text.trim().is_empty() {
                    return Err(OttoError::Session(format!(
                        "model '{model}' returned an empty completion"
                    )));
                }
                self.resolve_turn(&text, workspace_override).await
            }
            Some(SessionEvent::Failed(reason)) => {
                if content.is_empty() {
                    return Err(OttoError::Session(format!(
                        "stream from '{model}' failed before producing content: {reason}"
                    )));
                }
                // Partial content already shown to the user stands
                tracing::warn!(model = %model, %reason, "stream failed mid-turn, keeping partial reply");
                Ok(TurnOutcome::Reply(format!(
                    "{content}\n\n[response interrupted: {reason}]"
                )))
            }
            _ => Err(OttoError::Session(
                "session ended without a terminal event".to_string(),
            )),
        }
    }

    /// Start a turn and hand back the live session. The caller forwards
    /// `SessionEvent`s to its transport and feeds the final text to
    /// [`ChatEngine::resolve_turn`].
    pub async fn process_turn_stream(
        &self,
        user_text: &str,
        history: &Conversation,
    ) -> Result<StreamingSession> {
        let request = self.build_request(user_text, history);
        let call = self.router.route(request).await?;
        Ok(StreamingSession::spawn(call))
    }

    /// Resolve a finished completion into a turn outcome
    pub async fn resolve_turn(
        &self,
        final_text: &str,
        workspace_override: Option<&Path>,
    ) -> Result<TurnOutcome> {
        let request = match extract::extract_with(final_text, &self.repair_options) {
            Extraction::None => return Ok(TurnOutcome::Reply(final_text.to_string())),
            Extraction::Error { reason, raw } => {
                // A malformed call degrades to prose rather than failing
                // the turn; the user sees what the model wrote.
                tracing::warn!(%reason, raw = %raw, "tool call extraction failed");
                return Ok(TurnOutcome::Reply(final_text.to_string()));
            }
            Extraction::ToolCall(request) => request,
        };

        let root = self.workspace_root(workspace_override);
        match self.gate.evaluate(&request, &root) {
            SafetyVerdict::Deny { reason } => {
                tracing::info!(tool = request.action.name(), %reason, "action denied");
                Ok(TurnOutcome::Reply(format!(
                    "I can't perform that action: {reason}"
                )))
            }
            SafetyVerdict::AllowAuto => {
                let result = self
                    .executor_for(workspace_override)
                    .execute(&request.action)
                    .await;
                Ok(TurnOutcome::ActionExecuted {
                    result,
                    reply: prose_around(final_text),
                })
            }
            SafetyVerdict::RequireConfirmation => Ok(TurnOutcome::PendingAction(
                ActionDescriptor::from_request(&request),
            )),
        }
    }

    /// Confirmation re-entry: execute a previously parked action. Skips
    /// model selection and extraction, but the gate is evaluated again
    /// and a deny still refuses.
    pub async fn execute_confirmed(
        &self,
        descriptor: &ActionDescriptor,
        workspace_override: Option<&Path>,
    ) -> Result<ActionResult> {
        let request = ToolCallRequest {
            action: descriptor.action.clone(),
            raw: descriptor.raw.clone(),
            repairs: descriptor.repairs.clone(),
        };
        let root = self.workspace_root(workspace_override);
        if let SafetyVerdict::Deny { reason } = self.gate.evaluate(&request, &root) {
            return Err(OttoError::SafetyDenied(reason));
        }
        tracing::info!(
            tool = descriptor.action.name(),
            id = %descriptor.id,
            "executing confirmed action"
        );
        Ok(self
            .executor_for(workspace_override)
            .execute(&descriptor.action)
            .await)
    }

    /// Diff of what write_file would do, without mutating anything.
    /// `None` means the write would be a no-op.
    pub fn preview_write_diff(
        &self,
        filename: &str,
        content: &Value,
        workspace_override: Option<&Path>,
    ) -> Result<Option<String>> {
        let path = self.workspace_root(workspace_override).join(filename);
        // A missing file previews as a creation from empty
        let original = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let rendered = render_content(content)?;
        Ok(unified_diff(
            &original,
            &rendered,
            &format!("{filename}:original"),
            &format!("{filename}:preview"),
        ))
    }

    /// Diffs of what replace_code would do: the snippet in isolation and
    /// the whole file. Fails if the file does not exist.
    pub fn preview_replace_diff(
        &self,
        filename: &str,
        old_code: &str,
        new_code: &str,
        workspace_override: Option<&Path>,
    ) -> Result<ReplacePreview> {
        let path = self.workspace_root(workspace_override).join(filename);
        let original = std::fs::read_to_string(&path).map_err(|_| {
            OttoError::InvalidInput(format!("Error: File '{filename}' not found."))
        })?;

        let snippet_diff = unified_diff(old_code, new_code, "old_code", "new_code");
        let would_be = original.replace(old_code, new_code);
        let file_diff = unified_diff(
            &original,
            &would_be,
            &format!("{filename}:original"),
            &format!("{filename}:preview"),
        );

        Ok(ReplacePreview {
            snippet_diff,
            file_diff,
        })
    }

    fn workspace_root(&self, workspace_override: Option<&Path>) -> PathBuf {
        workspace_override
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.workspace.root.clone())
    }

    fn executor_for(&self, workspace_override: Option<&Path>) -> ActionExecutor {
        match workspace_override {
            Some(root) => ActionExecutor::with_root(
                root,
                root.join(&self.workspace.backup_dir),
                self.safety.allowed_commands.clone(),
                Duration::from_secs(self.workspace.command_timeout_secs),
            ),
            None => ActionExecutor::new(&self.workspace, &self.safety),
        }
    }

    fn build_request(&self, user_text: &str, history: &Conversation) -> CompletionRequest {
        let mut messages: Vec<Message> = history.messages().to_vec();
        messages.push(Message::user(user_text));

        // The router substitutes the winning candidate's model
        let model = self.models.candidates.first().cloned().unwrap_or_default();
        CompletionRequest::new(model, messages)
            .with_system(self.build_system_prompt())
            .with_max_tokens(self.models.max_tokens)
            .with_temperature(self.models.temperature)
    }

    /// Assemble the system prompt: working rules, the tool reference, the
    /// active constitutional patterns, and the tool-call wire format.
    fn build_system_prompt(&self) -> String {
        let patterns = self.safety.forbidden_patterns.join(", ");
        let prefixes = self.safety.forbidden_prefixes.join(", ");
        format!(
            "You are an expert AI programmer and universal code assistant. \
Your goal is to help users by writing and editing code in any language. \
Follow these rules strictly:\n\n\
1. **Match Indentation Style**: When editing a file, you MUST detect and match the existing indentation style.\n\
2. **Use Precise Tools**: To add new code, use `insert_at_line` with a specific line number. To modify existing code, use `replace_code` by first reading the exact block to be replaced.\n\
3. **Write Clean Code**: Generate clean, readable, and idiomatic code appropriate for the language you are writing.\n\
4. **Complete Tasks**: Fulfill the user's request step-by-step. If you need to read a file first to understand the context, do so.\n\
5. **Constitutional Rules**: Never touch files matching these patterns without explicit user permission: {patterns}. \
Never touch paths under: {prefixes}.\n\n\
Available tools:\n{}\n\n\
When you need to use a tool, respond with a JSON object inside a ```json code block:\n\
```json\n\
{{\n\
  \"tool_call\": {{\n\
    \"name\": \"<tool_name>\",\n\
    \"arguments\": {{\n\
      \"<arg_name>\": \"<arg_value>\"\n\
    }}\n\
  }}\n\
}}\n\
```",
            tool_reference()
        )
    }
}

/// Text the model wrote outside the tool-call fence, if any
fn prose_around(text: &str) -> Option<String> {
    let head = match text.find("```") {
        Some(idx) => &text[..idx],
        None => text,
    };
    let trimmed = head.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// One line per tool: name, arguments, what it does
fn tool_reference() -> &'static str {
    "- list_files(directory?) - lists files in a directory\n\
     - read_file(filename, start_line?, end_line?) - reads a file, optionally a line range\n\
     - write_file(filename, content) - creates or overwrites a file; dict/list content is saved as JSON\n\
     - delete_file(filename) - deletes a file\n\
     - create_directory(directory_name) - creates a directory, parents included\n\
     - insert_at_line(filename, code_to_insert, line_number) - inserts a code block at a 1-based line\n\
     - replace_code(filename, old_code, new_code) - replaces an exact existing block\n\
     - search_files(pattern, directory?, file_pattern?) - regex search across files\n\
     - run_command(command) - runs an allow-listed shell command"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResilienceConfig;
    use crate::llm::mock_provider::{MockOutcome, MockProvider};

    fn settings_for(dir: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.models.candidates = vec!["model-a".to_string(), "model-b".to_string()];
        settings.resilience = ResilienceConfig {
            circuit_failure_threshold: 3,
            circuit_recovery_secs: 60,
            request_timeout_secs: 5,
        };
        settings.workspace.root = dir.to_path_buf();
        settings
    }

    fn engine_with(provider: MockProvider, dir: &Path) -> ChatEngine {
        ChatEngine::new(Arc::new(provider), &settings_for(dir))
    }

    fn tool_call_text(name: &str, arguments: serde_json::Value) -> String {
        format!(
            "```json\n{}\n```",
            serde_json::json!({"tool_call": {"name": name, "arguments": arguments}})
        )
    }

    #[tokio::test]
    async fn test_plain_prose_turn() {
        let dir = tempfile::tempdir().unwrap();
        let provider =
            MockProvider::new().with_default(MockOutcome::Text("Just an answer.".to_string()));
        let engine = engine_with(provider, dir.path());

        let outcome = engine
            .process_turn("hello", &Conversation::new(), None)
            .await
            .unwrap();
        match outcome {
            TurnOutcome::Reply(text) => assert_eq!(text, "Just an answer."),
            other => panic!("expected Reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_only_action_auto_executes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello\n").unwrap();

        let text = format!(
            "Let me check.\n{}",
            tool_call_text("read_file", serde_json::json!({"filename": "notes.txt"}))
        );
        let provider = MockProvider::new().with_default(MockOutcome::Text(text));
        let engine = engine_with(provider, dir.path());

        let outcome = engine
            .process_turn("show notes", &Conversation::new(), None)
            .await
            .unwrap();
        match outcome {
            TurnOutcome::ActionExecuted { result, reply } => {
                assert!(result.success);
                assert!(result.message.contains("hello"));
                assert_eq!(reply.as_deref(), Some("Let me check."));
            }
            other => panic!("expected ActionExecuted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_write_action_parks_for_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let text = tool_call_text(
            "write_file",
            serde_json::json!({"filename": "out.txt", "content": "data"}),
        );
        let provider = MockProvider::new().with_default(MockOutcome::Text(text));
        let engine = engine_with(provider, dir.path());

        let outcome = engine
            .process_turn("write it", &Conversation::new(), None)
            .await
            .unwrap();
        let descriptor = match outcome {
            TurnOutcome::PendingAction(descriptor) => descriptor,
            other => panic!("expected PendingAction, got {other:?}"),
        };
        assert_eq!(descriptor.action.name(), "write_file");
        // Nothing was written yet
        assert!(!dir.path().join("out.txt").exists());

        let result = engine.execute_confirmed(&descriptor, None).await.unwrap();
        assert!(result.success);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
            "data"
        );
    }

    #[tokio::test]
    async fn test_forbidden_write_refused_even_when_confirmed() {
        let dir = tempfile::tempdir().unwrap();
        let text = tool_call_text(
            "write_file",
            serde_json::json!({"filename": "/etc/passwd", "content": "x"}),
        );
        let provider = MockProvider::new().with_default(MockOutcome::Text(text.clone()));
        let engine = engine_with(provider, dir.path());

        // The gate denies at resolution time
        let outcome = engine.resolve_turn(&text, None).await.unwrap();
        match outcome {
            TurnOutcome::Reply(reply) => assert!(reply.contains("can't perform")),
            other => panic!("expected refusal Reply, got {other:?}"),
        }

        // And a forged confirmation is denied again
        let descriptor = ActionDescriptor {
            id: Uuid::new_v4(),
            action: ToolAction::WriteFile {
                filename: "/etc/passwd".to_string(),
                content: serde_json::json!("x"),
            },
            raw: String::new(),
            repairs: vec![],
        };
        let err = engine.execute_confirmed(&descriptor, None).await.unwrap_err();
        assert!(matches!(err, OttoError::SafetyDenied(_)));
    }

    #[tokio::test]
    async fn test_fallback_to_second_model() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new()
            .script("model-a", vec![MockOutcome::HttpError(500)])
            .script("model-b", vec![MockOutcome::Text("from b".to_string())]);
        let engine = engine_with(provider, dir.path());

        let outcome = engine
            .process_turn("hi", &Conversation::new(), None)
            .await
            .unwrap();
        match outcome {
            TurnOutcome::Reply(text) => assert_eq!(text, "from b"),
            other => panic!("expected Reply, got {other:?}"),
        }
        assert_eq!(engine.router().candidates()[0].breaker().failure_count(), 1);
        assert_eq!(engine.router().candidates()[1].breaker().failure_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_tool_call_degrades_to_prose() {
        let dir = tempfile::tempdir().unwrap();
        let text = "```json\n{\"tool_call\": {\"name\": \"no_such_tool\", \"arguments\": {}}}\n```";
        let provider = MockProvider::new().with_default(MockOutcome::Text(text.to_string()));
        let engine = engine_with(provider, dir.path());

        let outcome = engine
            .process_turn("hi", &Conversation::new(), None)
            .await
            .unwrap();
        match outcome {
            TurnOutcome::Reply(reply) => assert_eq!(reply, text),
            other => panic!("expected Reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_repaired_tool_call_resolves() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x\n").unwrap();
        // Trailing comma and single quotes, as sloppy models produce
        let text = "```json\n{'tool_call': {'name': 'read_file', 'arguments': {'filename': 'a.txt',}}}\n```";
        let provider = MockProvider::new().with_default(MockOutcome::Text(text.to_string()));
        let engine = engine_with(provider, dir.path());

        let outcome = engine
            .process_turn("read a", &Conversation::new(), None)
            .await
            .unwrap();
        match outcome {
            TurnOutcome::ActionExecuted { result, .. } => assert!(result.success),
            other => panic!("expected ActionExecuted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_workspace_override_scopes_execution() {
        let home = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        std::fs::write(other.path().join("only-here.txt"), "found\n").unwrap();

        let text = tool_call_text(
            "read_file",
            serde_json::json!({"filename": "only-here.txt"}),
        );
        let provider = MockProvider::new().with_default(MockOutcome::Text(text));
        let engine = engine_with(provider, home.path());

        let outcome = engine
            .process_turn("read", &Conversation::new(), Some(other.path()))
            .await
            .unwrap();
        match outcome {
            TurnOutcome::ActionExecuted { result, .. } => {
                assert!(result.success);
                assert!(result.message.contains("found"));
            }
            other => panic!("expected ActionExecuted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_partial_reply() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new().with_default(MockOutcome::MidStreamFailure {
            partial: "half an answer".to_string(),
            reason: "connection reset".to_string(),
        });
        let engine = engine_with(provider, dir.path());

        let outcome = engine
            .process_turn("hi", &Conversation::new(), None)
            .await
            .unwrap();
        match outcome {
            TurnOutcome::Reply(reply) => {
                assert!(reply.starts_with("half an answer"));
                assert!(reply.contains("interrupted"));
            }
            other => panic!("expected Reply, got {other:?}"),
        }
    }

    #[test]
    fn test_preview_write_diff_for_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new();
        let engine = engine_with(provider, dir.path());

        let diff = engine
            .preview_write_diff("new.txt", &serde_json::json!("line one\n"), None)
            .unwrap()
            .unwrap();
        assert!(diff.contains("+line one"));
        assert!(!dir.path().join("new.txt").exists());
    }

    #[test]
    fn test_preview_replace_diff_has_both_views() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m.py"), "def f():\n    return 1\n").unwrap();
        let provider = MockProvider::new();
        let engine = engine_with(provider, dir.path());

        let preview = engine
            .preview_replace_diff("m.py", "    return 1", "    return 2", None)
            .unwrap();
        let snippet = preview.snippet_diff.unwrap();
        assert!(snippet.contains("-    return 1"));
        assert!(snippet.contains("+    return 2"));
        let file = preview.file_diff.unwrap();
        assert!(file.contains("def f():"));
    }

    #[test]
    fn test_preview_replace_diff_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new();
        let engine = engine_with(provider, dir.path());

        let err = engine
            .preview_replace_diff("ghost.py", "a", "b", None)
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_system_prompt_reflects_active_rules() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(MockProvider::new(), dir.path());
        let prompt = engine.build_system_prompt();
        assert!(prompt.contains("*.lock"));
        assert!(prompt.contains("/etc"));
        assert!(prompt.contains("tool_call"));
        assert!(prompt.contains("replace_code"));
    }
}
