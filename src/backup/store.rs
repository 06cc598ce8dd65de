//! backup::store
//!
//! Snapshot store with checksums, incremental backups, and restore.
//!
//! # Targets
//!
//! Every snapshot covers a fixed set of project paths: `.env`, the
//! package manifest, `.gitignore`, the tool's configuration file, and
//! its state directory. A JSON Git snapshot (branch, status counts,
//! remote, last commit) is stored beside the file tree when provided.
//!
//! # Checksums
//!
//! Per-file SHA-256, plus one whole-snapshot SHA-256 computed over the
//! canonical concatenation `"<relpath>:<content>"` in sorted path order.
//! Verification recomputes the snapshot checksum from the stored tree.
//!
//! # Ordering
//!
//! The index is append-front by timestamp; retention drops tail entries
//! beyond the cap and deletes their directories. Index mutations hold an
//! exclusive file lock.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::paths::AppPaths;

use super::record::{
    BackupIndex, BackupKind, BackupRecord, EntryKind, FileEntry, GitSnapshot, INDEX_VERSION,
};

/// Default number of snapshots kept.
pub const DEFAULT_RETENTION: usize = 10;

/// Paths captured by every snapshot, relative to the project root.
/// The first existing manifest wins.
const MANIFEST_CANDIDATES: [&str; 2] = ["Cargo.toml", "package.json"];
const FIXED_TARGETS: [&str; 2] = [".env", ".gitignore"];

/// Errors from backup operations.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup i/o error at '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("backup index error: {0}")]
    Index(String),

    #[error("backup not found: {0}")]
    NotFound(String),

    #[error("checksum mismatch for backup {id}: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("nothing to back up: no target paths exist")]
    NothingToBackUp,
}

fn io_err(path: &Path, source: std::io::Error) -> BackupError {
    BackupError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// The backup store.
///
/// Exclusively owns the on-disk backup directory and its index.
#[derive(Debug, Clone)]
pub struct BackupStore {
    paths: AppPaths,
    retention: usize,
}

impl BackupStore {
    /// Create a store rooted at the given project paths.
    pub fn new(paths: AppPaths) -> Self {
        Self {
            paths,
            retention: DEFAULT_RETENTION,
        }
    }

    /// Override the retention cap. Used by tests.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    /// Target paths that currently exist, relative to the project root.
    fn existing_targets(&self) -> Vec<String> {
        let root = &self.paths.project_root;
        let mut targets: Vec<String> = Vec::new();

        for candidate in FIXED_TARGETS {
            if root.join(candidate).exists() {
                targets.push(candidate.to_string());
            }
        }
        for manifest in MANIFEST_CANDIDATES {
            if root.join(manifest).exists() {
                targets.push(manifest.to_string());
                break;
            }
        }
        // Tool state, excluding the backup store itself and logs
        let config_rel = format!("{}/config.json", crate::core::paths::APP_DIR);
        if root.join(&config_rel).exists() {
            targets.push(config_rel);
        }
        let state_rel = format!("{}/state", crate::core::paths::APP_DIR);
        if root.join(&state_rel).exists() {
            targets.push(state_rel);
        }

        targets
    }

    /// Create a full snapshot for the given operation.
    pub fn create_full(
        &self,
        operation: &str,
        git: Option<&GitSnapshot>,
    ) -> Result<BackupRecord, BackupError> {
        let entries = self.scan_targets()?;
        if entries.is_empty() {
            return Err(BackupError::NothingToBackUp);
        }
        self.write_snapshot(operation, BackupKind::Full, None, entries, git)
    }

    /// Create an incremental snapshot based on the latest record.
    ///
    /// Falls back to a full snapshot when no base exists. A file is
    /// included when its checksum differs from the base record; a
    /// directory when its mtime differs.
    pub fn create_incremental(
        &self,
        operation: &str,
        git: Option<&GitSnapshot>,
    ) -> Result<BackupRecord, BackupError> {
        let index = self.load_index()?;
        let Some(base) = index.latest().cloned() else {
            return self.create_full(operation, git);
        };

        let current = self.scan_targets()?;
        let changed: Vec<FileEntry> = current
            .into_iter()
            .filter(|entry| {
                match base.files.iter().find(|b| b.path == entry.path) {
                    None => true,
                    Some(b) => match entry.kind {
                        EntryKind::File => b.checksum != entry.checksum,
                        EntryKind::Dir => b.mtime != entry.mtime,
                    },
                }
            })
            .collect();

        self.write_snapshot(
            operation,
            BackupKind::Incremental,
            Some(base.id),
            changed,
            git,
        )
    }

    /// All records, newest first.
    pub fn list(&self) -> Result<Vec<BackupRecord>, BackupError> {
        Ok(self.load_index()?.backups)
    }

    /// The newest record for an operation.
    pub fn latest_for_operation(
        &self,
        operation: &str,
    ) -> Result<Option<BackupRecord>, BackupError> {
        Ok(self
            .load_index()?
            .latest_for_operation(operation)
            .cloned())
    }

    /// Verify a snapshot: recompute the whole-snapshot checksum from the
    /// stored tree and compare. An incremental record whose base record
    /// has been dropped degrades to full (persisted) before the check.
    pub fn verify(&self, id: &str) -> Result<(), BackupError> {
        let mut index = self.load_index()?;
        let position = index
            .backups
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| BackupError::NotFound(id.to_string()))?;

        // Dangling incremental: degrade to full so restore no longer
        // tries to resolve the missing chain
        let based_on = index.backups[position].based_on_id.clone();
        if let Some(base_id) = based_on {
            if index.find(&base_id).is_none() {
                index.backups[position].kind = BackupKind::Full;
                index.backups[position].based_on_id = None;
                self.save_index(&index)?;
            }
        }
        let record = index.backups[position].clone();

        let files_root = self.paths.backup_dir(id).join("files");
        let actual = checksum_of_stored_tree(&files_root, &record.files)?;
        if actual != record.checksum {
            return Err(BackupError::ChecksumMismatch {
                id: id.to_string(),
                expected: record.checksum,
                actual,
            });
        }
        Ok(())
    }

    /// Restore the working tree from a snapshot.
    ///
    /// Refuses when verification fails. Incremental snapshots are
    /// resolved back to their full base, then applied oldest-first so
    /// the newest state wins. Returns the Git snapshot stored beside
    /// the backup, when present, so the caller can restore the branch.
    pub fn restore(&self, id: &str) -> Result<Option<GitSnapshot>, BackupError> {
        self.verify(id)?;

        let index = self.load_index()?;
        let mut chain = Vec::new();
        let mut cursor = Some(id.to_string());
        while let Some(current) = cursor {
            let record = index
                .find(&current)
                .ok_or_else(|| BackupError::NotFound(current.clone()))?
                .clone();
            cursor = record.based_on_id.clone();
            chain.push(record);
        }

        // Apply base first, newest last
        for record in chain.iter().rev() {
            let files_root = self.paths.backup_dir(&record.id).join("files");
            for entry in &record.files {
                let source = files_root.join(&entry.path);
                let target = self.paths.project_root.join(&entry.path);
                match entry.kind {
                    EntryKind::Dir => {
                        fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
                    }
                    EntryKind::File => {
                        if let Some(parent) = target.parent() {
                            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
                        }
                        fs::copy(&source, &target).map_err(|e| io_err(&source, e))?;
                    }
                }
            }
        }

        let git_info_path = self.paths.backup_dir(id).join("git-info.json");
        if git_info_path.exists() {
            let contents =
                fs::read_to_string(&git_info_path).map_err(|e| io_err(&git_info_path, e))?;
            let snapshot = serde_json::from_str(&contents)
                .map_err(|e| BackupError::Index(format!("git-info.json: {}", e)))?;
            Ok(Some(snapshot))
        } else {
            Ok(None)
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Walk all targets and compute entries with checksums.
    fn scan_targets(&self) -> Result<Vec<FileEntry>, BackupError> {
        let mut entries = Vec::new();
        for target in self.existing_targets() {
            let absolute = self.paths.project_root.join(&target);
            scan_path(&self.paths.project_root, &absolute, &mut entries)?;
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn write_snapshot(
        &self,
        operation: &str,
        kind: BackupKind,
        based_on_id: Option<String>,
        entries: Vec<FileEntry>,
        git: Option<&GitSnapshot>,
    ) -> Result<BackupRecord, BackupError> {
        let id = BackupRecord::new_id();
        let backup_dir = self.paths.backup_dir(&id);
        let files_root = backup_dir.join("files");
        fs::create_dir_all(&files_root).map_err(|e| io_err(&files_root, e))?;

        // Mirror the tree
        for entry in &entries {
            let source = self.paths.project_root.join(&entry.path);
            let target = files_root.join(&entry.path);
            match entry.kind {
                EntryKind::Dir => {
                    fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
                }
                EntryKind::File => {
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
                    }
                    fs::copy(&source, &target).map_err(|e| io_err(&source, e))?;
                }
            }
        }

        let total_size = entries.iter().map(|e| e.size).sum();
        let checksum = checksum_of_stored_tree(&files_root, &entries)?;

        let record = BackupRecord {
            id: id.clone(),
            kind,
            operation: operation.to_string(),
            timestamp: Utc::now(),
            based_on_id,
            files: entries,
            total_size,
            checksum,
        };

        // Per-snapshot metadata
        let info_path = backup_dir.join("backup-info.json");
        let info_json = serde_json::to_string_pretty(&record)
            .map_err(|e| BackupError::Index(e.to_string()))?;
        fs::write(&info_path, info_json).map_err(|e| io_err(&info_path, e))?;

        if let Some(git) = git {
            let git_path = backup_dir.join("git-info.json");
            let git_json = serde_json::to_string_pretty(git)
                .map_err(|e| BackupError::Index(e.to_string()))?;
            fs::write(&git_path, git_json).map_err(|e| io_err(&git_path, e))?;
        }

        // Append-front and apply retention
        let mut index = self.load_index()?;
        index.backups.insert(0, record.clone());
        while index.backups.len() > self.retention {
            if let Some(dropped) = index.backups.pop() {
                let _ = fs::remove_dir_all(self.paths.backup_dir(&dropped.id));
            }
        }
        self.save_index(&index)?;

        Ok(record)
    }

    fn load_index(&self) -> Result<BackupIndex, BackupError> {
        let path = self.paths.backup_index_path();
        if !path.exists() {
            return Ok(BackupIndex::default());
        }
        let contents = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let index: BackupIndex = serde_json::from_str(&contents)
            .map_err(|e| BackupError::Index(format!("index.json: {}", e)))?;
        if index.version != INDEX_VERSION {
            return Err(BackupError::Index(format!(
                "unsupported index version {}",
                index.version
            )));
        }
        Ok(index)
    }

    fn save_index(&self, index: &BackupIndex) -> Result<(), BackupError> {
        let dir = self.paths.backups_dir();
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

        let lock_path = dir.join(".lock");
        let lock_file = File::create(&lock_path).map_err(|e| io_err(&lock_path, e))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| io_err(&lock_path, e))?;

        let path = self.paths.backup_index_path();
        let contents = serde_json::to_string_pretty(index)
            .map_err(|e| BackupError::Index(e.to_string()))?;
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, contents).map_err(|e| io_err(&temp, e))?;
        fs::rename(&temp, &path).map_err(|e| io_err(&path, e))?;

        let _ = fs2::FileExt::unlock(&lock_file);
        Ok(())
    }
}

/// Recursively scan a path into entries (relative to `root`).
fn scan_path(
    root: &Path,
    absolute: &Path,
    entries: &mut Vec<FileEntry>,
) -> Result<(), BackupError> {
    let metadata = fs::metadata(absolute).map_err(|e| io_err(absolute, e))?;
    let relative = absolute
        .strip_prefix(root)
        .map_err(|_| BackupError::Index(format!("path escapes root: {}", absolute.display())))?
        .to_string_lossy()
        .replace('\\', "/");
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    if metadata.is_dir() {
        entries.push(FileEntry {
            path: relative,
            kind: EntryKind::Dir,
            size: 0,
            mtime,
            checksum: None,
        });
        let listing = fs::read_dir(absolute).map_err(|e| io_err(absolute, e))?;
        let mut children: Vec<PathBuf> = listing
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        children.sort();
        for child in children {
            scan_path(root, &child, entries)?;
        }
    } else {
        let contents = fs::read(absolute).map_err(|e| io_err(absolute, e))?;
        entries.push(FileEntry {
            path: relative,
            kind: EntryKind::File,
            size: metadata.len(),
            mtime,
            checksum: Some(sha256_hex(&contents)),
        });
    }
    Ok(())
}

/// SHA-256 of a byte slice, hex-encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Whole-snapshot checksum over `"<relpath>:<content>"` in sorted path
/// order. Directory entries contribute nothing.
fn checksum_of_stored_tree(
    files_root: &Path,
    entries: &[FileEntry],
) -> Result<String, BackupError> {
    let mut files: Vec<&FileEntry> = entries
        .iter()
        .filter(|e| e.kind == EntryKind::File)
        .collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let mut hasher = Sha256::new();
    for entry in files {
        let path = files_root.join(&entry.path);
        let contents = fs::read(&path).map_err(|e| io_err(&path, e))?;
        hasher.update(entry.path.as_bytes());
        hasher.update(b":");
        hasher.update(&contents);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Checksum of a live directory tree, for equality checks in tests and
/// diagnostics. Computed with the same canonical form as snapshots.
pub fn calculate_directory_checksum(root: &Path) -> Result<String, BackupError> {
    let mut entries = Vec::new();
    scan_path(root, root, &mut entries)?;
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    let mut hasher = Sha256::new();
    for entry in entries.iter().filter(|e| e.kind == EntryKind::File) {
        let path = root.join(&entry.path);
        let contents = fs::read(&path).map_err(|e| io_err(&path, e))?;
        hasher.update(entry.path.as_bytes());
        hasher.update(b":");
        hasher.update(&contents);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> BackupStore {
        BackupStore::new(AppPaths::new(dir.path()))
    }

    fn seed_project(dir: &TempDir) {
        fs::write(dir.path().join(".env"), "GITHUB_TOKEN=secret\n").unwrap();
        fs::write(dir.path().join(".gitignore"), "target/\n").unwrap();
        fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();
    }

    #[test]
    fn full_backup_captures_targets() {
        let dir = TempDir::new().unwrap();
        seed_project(&dir);
        let store = store_in(&dir);

        let record = store.create_full("start", None).unwrap();
        assert_eq!(record.kind, BackupKind::Full);
        assert_eq!(record.files.len(), 3);
        assert!(record.total_size > 0);
        assert!(!record.checksum.is_empty());

        store.verify(&record.id).unwrap();
    }

    #[test]
    fn incremental_with_no_changes_is_empty() {
        let dir = TempDir::new().unwrap();
        seed_project(&dir);
        let store = store_in(&dir);

        store.create_full("start", None).unwrap();
        let incremental = store.create_incremental("start", None).unwrap();
        assert_eq!(incremental.kind, BackupKind::Incremental);
        assert!(incremental.files.is_empty());
    }

    #[test]
    fn incremental_captures_only_changes() {
        let dir = TempDir::new().unwrap();
        seed_project(&dir);
        let store = store_in(&dir);

        store.create_full("start", None).unwrap();
        fs::write(dir.path().join(".env"), "GITHUB_TOKEN=rotated\n").unwrap();

        let incremental = store.create_incremental("start", None).unwrap();
        assert_eq!(incremental.files.len(), 1);
        assert_eq!(incremental.files[0].path, ".env");
    }

    #[test]
    fn restore_produces_identical_tree() {
        let dir = TempDir::new().unwrap();
        seed_project(&dir);
        let store = store_in(&dir);

        let record = store.create_full("start", None).unwrap();
        let before = fs::read_to_string(dir.path().join(".env")).unwrap();

        fs::write(dir.path().join(".env"), "GITHUB_TOKEN=clobbered\n").unwrap();
        store.restore(&record.id).unwrap();

        let after = fs::read_to_string(dir.path().join(".env")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn restore_applies_incremental_over_base() {
        let dir = TempDir::new().unwrap();
        seed_project(&dir);
        let store = store_in(&dir);

        store.create_full("start", None).unwrap();
        fs::write(dir.path().join(".env"), "GITHUB_TOKEN=v2\n").unwrap();
        let incremental = store.create_incremental("start", None).unwrap();

        fs::write(dir.path().join(".env"), "GITHUB_TOKEN=clobbered\n").unwrap();
        fs::write(dir.path().join(".gitignore"), "clobbered\n").unwrap();
        store.restore(&incremental.id).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join(".env")).unwrap(),
            "GITHUB_TOKEN=v2\n"
        );
        // Unchanged file comes from the full base
        assert_eq!(
            fs::read_to_string(dir.path().join(".gitignore")).unwrap(),
            "target/\n"
        );
    }

    #[test]
    fn verify_detects_tampering() {
        let dir = TempDir::new().unwrap();
        seed_project(&dir);
        let store = store_in(&dir);

        let record = store.create_full("start", None).unwrap();
        let stored = AppPaths::new(dir.path())
            .backup_dir(&record.id)
            .join("files/.env");
        fs::write(&stored, "tampered").unwrap();

        assert!(matches!(
            store.verify(&record.id),
            Err(BackupError::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            store.restore(&record.id),
            Err(BackupError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn retention_drops_tail_records() {
        let dir = TempDir::new().unwrap();
        seed_project(&dir);
        let store = store_in(&dir).with_retention(2);

        let first = store.create_full("one", None).unwrap();
        store.create_full("two", None).unwrap();
        store.create_full("three", None).unwrap();

        let records = store.list().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.id != first.id));
        assert!(!AppPaths::new(dir.path()).backup_dir(&first.id).exists());
    }

    #[test]
    fn dangling_incremental_degrades_to_full_on_verify() {
        let dir = TempDir::new().unwrap();
        seed_project(&dir);
        let store = store_in(&dir).with_retention(2);

        store.create_full("start", None).unwrap();
        fs::write(dir.path().join(".env"), "GITHUB_TOKEN=v2\n").unwrap();
        let inc = store.create_incremental("start", None).unwrap();
        // Third snapshot evicts the full base under retention=2
        fs::write(dir.path().join(".env"), "GITHUB_TOKEN=v3\n").unwrap();
        store.create_incremental("start", None).unwrap();

        store.verify(&inc.id).unwrap();
        let record = store
            .list()
            .unwrap()
            .into_iter()
            .find(|r| r.id == inc.id)
            .unwrap();
        assert_eq!(record.kind, BackupKind::Full);
        assert!(record.based_on_id.is_none());
    }

    #[test]
    fn directory_checksum_is_stable_and_sensitive() {
        let dir = TempDir::new().unwrap();
        seed_project(&dir);

        let first = calculate_directory_checksum(dir.path()).unwrap();
        let second = calculate_directory_checksum(dir.path()).unwrap();
        assert_eq!(first, second);

        fs::write(dir.path().join(".env"), "GITHUB_TOKEN=other\n").unwrap();
        let third = calculate_directory_checksum(dir.path()).unwrap();
        assert_ne!(first, third);
    }

    #[test]
    fn git_snapshot_roundtrips_through_restore() {
        let dir = TempDir::new().unwrap();
        seed_project(&dir);
        let store = store_in(&dir);

        let snapshot = GitSnapshot {
            current_branch: Some("feature/x".to_string()),
            staged: 1,
            modified: 2,
            untracked: 0,
            remote_url: Some("git@github.com:o/r.git".to_string()),
            last_commit: Some("abc123".to_string()),
        };
        let record = store.create_full("start", Some(&snapshot)).unwrap();

        let restored = store.restore(&record.id).unwrap();
        assert_eq!(restored, Some(snapshot));
    }

    #[test]
    fn empty_project_has_nothing_to_back_up() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(matches!(
            store.create_full("start", None),
            Err(BackupError::NothingToBackUp)
        ));
    }
}
