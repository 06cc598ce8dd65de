//! backup
//!
//! Snapshot store with checksums and incremental backups.
//!
//! Phases create a snapshot before every mutating operation; the
//! Help-Flow phase and the recovery manager restore from them. The
//! store exclusively owns the backup directory and its index.

pub mod record;
pub mod store;

pub use record::{
    BackupIndex, BackupKind, BackupRecord, EntryKind, FileEntry, GitSnapshot, INDEX_VERSION,
};
pub use store::{
    calculate_directory_checksum, sha256_hex, BackupError, BackupStore, DEFAULT_RETENTION,
};
