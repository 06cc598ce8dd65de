//! core::paths
//!
//! Centralized path routing for teamflow storage locations.
//!
//! # Storage Layout
//!
//! Project-scoped state lives under `<project>/.teamflow/`:
//! - `config.json` - Project-level tool configuration
//! - `backups/` - Snapshot store (`index.json` plus one directory per backup)
//! - `state/offline-mode.json` - Written when offline mode is triggered
//! - `logs/team-flow.log` - Append-only log file
//!
//! User-scoped configuration lives at `$HOME/.teamflow/config.json`.
//!
//! No code outside this module should compute `*.join(".teamflow")` paths.

use std::path::{Path, PathBuf};

/// Name of the tool's state directory.
pub const APP_DIR: &str = ".teamflow";

/// Centralized path routing for teamflow storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Project root (the directory containing `.teamflow/`).
    pub project_root: PathBuf,
}

impl AppPaths {
    /// Create path routing rooted at the given project directory.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    /// The state directory itself: `<project>/.teamflow`.
    pub fn app_dir(&self) -> PathBuf {
        self.project_root.join(APP_DIR)
    }

    /// Project-level configuration file.
    pub fn project_config_path(&self) -> PathBuf {
        self.app_dir().join("config.json")
    }

    /// Root of the backup store.
    pub fn backups_dir(&self) -> PathBuf {
        self.app_dir().join("backups")
    }

    /// The backup index file.
    pub fn backup_index_path(&self) -> PathBuf {
        self.backups_dir().join("index.json")
    }

    /// Directory holding one snapshot.
    pub fn backup_dir(&self, backup_id: &str) -> PathBuf {
        self.backups_dir().join(backup_id)
    }

    /// State directory for runtime flags.
    pub fn state_dir(&self) -> PathBuf {
        self.app_dir().join("state")
    }

    /// The offline-mode marker file.
    pub fn offline_mode_path(&self) -> PathBuf {
        self.state_dir().join("offline-mode.json")
    }

    /// Log directory.
    pub fn logs_dir(&self) -> PathBuf {
        self.app_dir().join("logs")
    }

    /// The append-only log file.
    pub fn log_file_path(&self) -> PathBuf {
        self.logs_dir().join("team-flow.log")
    }

    /// Project-level `.env` file.
    pub fn env_file_path(&self) -> PathBuf {
        self.project_root.join(".env")
    }

    /// User-scoped global configuration file, if a home directory exists.
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(APP_DIR).join("config.json"))
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new(Path::new("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_documented_tree() {
        let paths = AppPaths::new("/repo");
        assert_eq!(
            paths.project_config_path(),
            PathBuf::from("/repo/.teamflow/config.json")
        );
        assert_eq!(
            paths.backup_index_path(),
            PathBuf::from("/repo/.teamflow/backups/index.json")
        );
        assert_eq!(
            paths.backup_dir("abc"),
            PathBuf::from("/repo/.teamflow/backups/abc")
        );
        assert_eq!(
            paths.offline_mode_path(),
            PathBuf::from("/repo/.teamflow/state/offline-mode.json")
        );
        assert_eq!(
            paths.log_file_path(),
            PathBuf::from("/repo/.teamflow/logs/team-flow.log")
        );
        assert_eq!(paths.env_file_path(), PathBuf::from("/repo/.env"));
    }
}
