// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! Pre-image backups for mutating actions
//!
//! Every destructive file operation copies the current content into the
//! backup directory first, named `<file_name>_<unix_ts>.bak`.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Copies pre-images into a dedicated backup directory
pub struct BackupManager {
    backup_dir: PathBuf,
}

impl BackupManager {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Back up `path` if it exists. Returns the backup location, or `None`
    /// when there is nothing to preserve (new file).
    pub fn backup(&self, path: &Path) -> Result<Option<PathBuf>> {
        if !path.exists() {
            return Ok(None);
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string());
        let timestamp = chrono::Utc::now().timestamp();
        let backup_path = self
            .backup_dir
            .join(format!("{}_{}.bak", file_name, timestamp));

        std::fs::create_dir_all(&self.backup_dir)?;
        std::fs::copy(path, &backup_path)?;
        tracing::debug!(from = %path.display(), to = %backup_path.display(), "backed up pre-image");
        Ok(Some(backup_path))
    }
}
