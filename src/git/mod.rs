//! git
//!
//! Single interface for all Git operations.
//!
//! All repository reads and mutations flow through [`GitAdapter`]. Every
//! operation carries a wall-clock bound and maps failures into the
//! [`GitError`] tag set the error handler understands.

pub mod adapter;

pub use adapter::{
    ChangedFile, CommitInfo, FileChangeTag, GitAdapter, GitError, SyncOutcome, DEFAULT_TIMEOUT,
};
