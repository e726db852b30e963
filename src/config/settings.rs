// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! Settings management for Otto
//!
//! Handles loading and saving settings from ~/.otto/settings.json

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{OttoError, Result};

/// Main settings structure, stored in ~/.otto/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Model candidate configuration
    #[serde(default)]
    pub models: ModelsConfig,

    /// Circuit breaker and timeout settings for model calls
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Constitutional safety rules
    #[serde(default)]
    pub safety: SafetyConfig,

    /// Workspace and backup locations
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

/// Ordered model candidate list and provider credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Candidates in fallback priority order; the first healthy one wins
    #[serde(default = "default_candidates")]
    pub candidates: Vec<String>,

    /// Environment variable holding the provider API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL for the provider API (for custom endpoints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            api_key_env: default_api_key_env(),
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Circuit breaker and per-call timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Consecutive failures before a candidate's circuit opens
    #[serde(default = "default_failure_threshold")]
    pub circuit_failure_threshold: u32,

    /// Seconds an open circuit waits before admitting a probe call
    #[serde(default = "default_recovery_secs")]
    pub circuit_recovery_secs: u64,

    /// Per-call timeout in seconds; expiry counts as a breaker failure
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_failure_threshold: default_failure_threshold(),
            circuit_recovery_secs: default_recovery_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Constitutional safety rule configuration
///
/// The rule set is data, not code: extending it never touches the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Absolute path prefixes that are always denied
    #[serde(default = "default_forbidden_prefixes")]
    pub forbidden_prefixes: Vec<String>,

    /// Basename glob patterns that are always denied
    #[serde(default = "default_forbidden_patterns")]
    pub forbidden_patterns: Vec<String>,

    /// Commands run_command may execute (prefix match)
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            forbidden_prefixes: default_forbidden_prefixes(),
            forbidden_patterns: default_forbidden_patterns(),
            allowed_commands: default_allowed_commands(),
        }
    }
}

/// Workspace and backup directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root directory for all file operations
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,

    /// Directory for pre-mutation backups
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Seconds a run_command invocation may run before being killed
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
            backup_dir: default_backup_dir(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

fn default_candidates() -> Vec<String> {
    vec![
        "openrouter/horizon-beta".to_string(),
        "openrouter/anthropic/claude-3.5-sonnet".to_string(),
        "openrouter/meta-llama/llama-3.1-8b-instruct".to_string(),
    ]
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_temperature() -> f32 {
    0.7
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_forbidden_prefixes() -> Vec<String> {
    ["/etc", "/usr", "/var", "/bin", "/sbin", "/boot", "/root"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_forbidden_patterns() -> Vec<String> {
    [
        ".git",
        ".env",
        ".config",
        "*.bak",
        "*.backup",
        "*.old",
        "*.lock",
        "package-lock.json",
        "yarn.lock",
        "*.db",
        "*.sqlite",
        "*.log",
        "*.tmp",
        "*.temp",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_allowed_commands() -> Vec<String> {
    ["python", "pip", "npm", "node", "git", "ls", "cat", "head", "tail"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("workspace")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_command_timeout_secs() -> u64 {
    30
}

impl Settings {
    /// Default settings file location (~/.otto/settings.json)
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".otto")
            .join("settings.json")
    }

    /// Load settings from a JSON file, falling back to defaults if absent
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| OttoError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings as pretty-printed JSON
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate invariants the type system cannot express
    pub fn validate(&self) -> Result<()> {
        if self.models.candidates.is_empty() {
            return Err(OttoError::Config(
                "models.candidates must list at least one model".to_string(),
            ));
        }
        if self.resilience.circuit_failure_threshold == 0 {
            return Err(OttoError::Config(
                "resilience.circuit_failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.resilience.request_timeout_secs == 0 {
            return Err(OttoError::Config(
                "resilience.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
