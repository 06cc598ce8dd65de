//! backup::record
//!
//! Backup metadata schema.
//!
//! # Storage
//!
//! - `backups/index.json` - `BackupIndex` with records append-front
//! - `backups/<id>/backup-info.json` - the `BackupRecord` for one snapshot
//! - `backups/<id>/git-info.json` - optional `GitSnapshot`
//! - `backups/<id>/files/...` - mirrored file tree

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current index schema version.
pub const INDEX_VERSION: u32 = 1;

/// Snapshot kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    /// Every target path copied.
    Full,
    /// Only paths that changed relative to the base record.
    Incremental,
}

/// Whether an entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// One path captured in a snapshot.
///
/// Files carry a SHA-256 checksum; directories carry only size zero and
/// their mtime, which is what incremental comparison uses for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the project root.
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    /// Modification time, unix seconds.
    pub mtime: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Metadata describing one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub kind: BackupKind,
    /// The operation this backup protects (e.g. "start", "finish").
    pub operation: String,
    pub timestamp: DateTime<Utc>,
    /// For incremental records, the id of the record this one is based on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub based_on_id: Option<String>,
    pub files: Vec<FileEntry>,
    pub total_size: u64,
    /// Whole-snapshot SHA-256 over the canonical concatenation of the
    /// captured file contents.
    pub checksum: String,
}

impl BackupRecord {
    /// Generate a fresh backup id.
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}

/// A JSON-serialized view of repository state stored beside a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSnapshot {
    pub current_branch: Option<String>,
    pub staged: usize,
    pub modified: usize,
    pub untracked: usize,
    pub remote_url: Option<String>,
    pub last_commit: Option<String>,
}

/// The on-disk backup index.
///
/// Records are append-front: index zero is always the newest snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupIndex {
    pub version: u32,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub backups: Vec<BackupRecord>,
}

impl Default for BackupIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            created_at: Utc::now(),
            backups: Vec::new(),
        }
    }
}

impl BackupIndex {
    /// The newest record, if any.
    pub fn latest(&self) -> Option<&BackupRecord> {
        self.backups.first()
    }

    /// Find a record by id.
    pub fn find(&self, id: &str) -> Option<&BackupRecord> {
        self.backups.iter().find(|r| r.id == id)
    }

    /// The newest record created for the given operation.
    pub fn latest_for_operation(&self, operation: &str) -> Option<&BackupRecord> {
        self.backups.iter().find(|r| r.operation == operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, operation: &str) -> BackupRecord {
        BackupRecord {
            id: id.to_string(),
            kind: BackupKind::Full,
            operation: operation.to_string(),
            timestamp: Utc::now(),
            based_on_id: None,
            files: Vec::new(),
            total_size: 0,
            checksum: String::new(),
        }
    }

    #[test]
    fn append_front_ordering() {
        let mut index = BackupIndex::default();
        index.backups.insert(0, record("a", "start"));
        index.backups.insert(0, record("b", "finish"));

        assert_eq!(index.latest().map(|r| r.id.as_str()), Some("b"));
        assert_eq!(
            index.latest_for_operation("start").map(|r| r.id.as_str()),
            Some("a")
        );
        assert!(index.find("a").is_some());
        assert!(index.find("zzz").is_none());
    }

    #[test]
    fn serialization_field_names() {
        let index = BackupIndex::default();
        let json = serde_json::to_string(&index).unwrap();
        assert!(json.contains("\"version\""));
        assert!(json.contains("\"createdAt\""));
        assert!(json.contains("\"backups\""));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(BackupRecord::new_id(), BackupRecord::new_id());
    }
}
