//! Backup store scenarios driven through the public surface.

use std::fs;

use tempfile::TempDir;

use teamflow::backup::{calculate_directory_checksum, BackupKind, BackupStore};
use teamflow::core::paths::AppPaths;

fn seed(dir: &TempDir) {
    fs::write(dir.path().join(".env"), "GITHUB_TOKEN=secret\n").unwrap();
    fs::write(dir.path().join(".gitignore"), "target/\n").unwrap();
    fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();
}

#[test]
fn full_then_unchanged_incremental_is_empty_and_both_restore_identically() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    let store = BackupStore::new(AppPaths::new(dir.path()));

    let full = store.create_full("start", None).unwrap();
    let incremental = store.create_incremental("start", None).unwrap();

    assert_eq!(full.kind, BackupKind::Full);
    assert_eq!(incremental.kind, BackupKind::Incremental);
    assert_eq!(incremental.based_on_id.as_deref(), Some(full.id.as_str()));
    // No change between snapshots: the incremental captures nothing
    assert!(incremental.files.is_empty());

    let pristine_env = fs::read(dir.path().join(".env")).unwrap();

    // Restore from the full snapshot
    fs::write(dir.path().join(".env"), "clobbered").unwrap();
    store.restore(&full.id).unwrap();
    assert_eq!(fs::read(dir.path().join(".env")).unwrap(), pristine_env);

    // Restore from the incremental resolves through its base and
    // produces the same bytes
    fs::write(dir.path().join(".env"), "clobbered again").unwrap();
    store.restore(&incremental.id).unwrap();
    assert_eq!(fs::read(dir.path().join(".env")).unwrap(), pristine_env);
}

#[test]
fn directory_checksum_is_deterministic_and_content_sensitive() {
    let dir = TempDir::new().unwrap();
    seed(&dir);

    let first = calculate_directory_checksum(dir.path()).unwrap();
    let second = calculate_directory_checksum(dir.path()).unwrap();
    assert_eq!(first, second);

    // Any content change moves the checksum
    fs::write(dir.path().join(".gitignore"), "target/\nnode_modules/\n").unwrap();
    let third = calculate_directory_checksum(dir.path()).unwrap();
    assert_ne!(first, third);

    // Renames move it too: the path participates in the canonical form
    fs::rename(
        dir.path().join(".gitignore"),
        dir.path().join(".gitignore.bak"),
    )
    .unwrap();
    let fourth = calculate_directory_checksum(dir.path()).unwrap();
    assert_ne!(third, fourth);
}

#[test]
fn snapshots_survive_a_fresh_store_handle() {
    let dir = TempDir::new().unwrap();
    seed(&dir);

    let id = {
        let store = BackupStore::new(AppPaths::new(dir.path()));
        store.create_full("finish", None).unwrap().id
    };

    // A new handle over the same directory sees and verifies the record
    let reopened = BackupStore::new(AppPaths::new(dir.path()));
    let records = reopened.list().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, id);
    reopened.verify(&id).unwrap();
}
