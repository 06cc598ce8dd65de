//! git::adapter
//!
//! Git adapter implementation using git2.
//!
//! This module is the **single doorway** to all Git operations. No other
//! module imports `git2` directly, which keeps error handling consistent
//! and gives every operation the same wall-clock bound.
//!
//! # Bounded execution
//!
//! Every operation runs on a helper thread and is joined with a timeout
//! (default 30 seconds). On expiry the caller gets [`GitError::Timeout`];
//! the worker thread is detached and allowed to finish in the background.
//! The repository is opened fresh inside each operation, so adapters hand
//! out snapshots, never live handles.
//!
//! # Error mapping
//!
//! git2 and process failures are normalized into [`GitError`] tags so the
//! error handler upstream can classify them without knowing about git2.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

use crate::core::types::GitStatus;

/// Default wall-clock bound for a single Git operation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from Git operations, normalized into domain tags.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not inside a Git repository.
    #[error("not a git repository: {path}")]
    NotGitRepository { path: PathBuf },

    /// Merge, rebase, or pull hit conflicting changes.
    #[error("merge conflict in: {files:?}")]
    MergeConflict { files: Vec<String> },

    /// Filesystem permission failure.
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },

    /// The named remote does not exist.
    #[error("remote not found: {remote}")]
    RemoteNotFound { remote: String },

    /// The named branch does not exist.
    #[error("branch not found: {branch}")]
    BranchNotFound { branch: String },

    /// Commit requested but the index matches HEAD.
    #[error("nothing to commit")]
    NothingToCommit,

    /// The operation requires a clean working tree.
    #[error("uncommitted changes present: {details}")]
    UncommittedChanges { details: String },

    /// Remote authentication failed.
    #[error("authentication failed: {message}")]
    AuthFailed { message: String },

    /// Network-level failure talking to the remote.
    #[error("network error: {message}")]
    NetworkError { message: String },

    /// The remote rejected the push (non-fast-forward or policy).
    #[error("push rejected: {reason}")]
    PushRejected { reason: String },

    /// The operation exceeded its wall-clock bound.
    #[error("git operation timed out: {operation}")]
    Timeout { operation: String },

    /// Deleting the currently checked-out branch is refused.
    #[error("cannot delete the current branch: {branch}")]
    CannotDeleteCurrent { branch: String },

    /// Anything git2 reports that has no dedicated tag.
    #[error("git error: {message}")]
    UnknownGit { message: String },
}

impl GitError {
    /// Map a git2 error with operation context into a domain tag.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        use git2::{ErrorClass, ErrorCode};

        match (err.code(), err.class()) {
            (ErrorCode::Conflict, _) | (_, ErrorClass::Merge) => GitError::MergeConflict {
                files: Vec::new(),
            },
            (ErrorCode::Auth, _) | (_, ErrorClass::Ssh) => GitError::AuthFailed {
                message: err.message().to_string(),
            },
            (_, ErrorClass::Net) | (_, ErrorClass::Http) => GitError::NetworkError {
                message: err.message().to_string(),
            },
            (ErrorCode::NotFound, _) if context.starts_with("branch:") => {
                GitError::BranchNotFound {
                    branch: context.trim_start_matches("branch:").to_string(),
                }
            }
            (ErrorCode::NotFound, _) if context.starts_with("remote:") => {
                GitError::RemoteNotFound {
                    remote: context.trim_start_matches("remote:").to_string(),
                }
            }
            _ if err.message().contains("permission denied")
                || err.message().contains("Permission denied") =>
            {
                GitError::PermissionDenied {
                    message: err.message().to_string(),
                }
            }
            _ => GitError::UnknownGit {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }
}

/// Per-file status tag, matching porcelain short format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeTag {
    Modified,
    Added,
    Deleted,
    Renamed,
    Untracked,
}

impl FileChangeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileChangeTag::Modified => "M",
            FileChangeTag::Added => "A",
            FileChangeTag::Deleted => "D",
            FileChangeTag::Renamed => "R",
            FileChangeTag::Untracked => "??",
        }
    }
}

impl std::fmt::Display for FileChangeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One changed path in the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub path: String,
    pub tag: FileChangeTag,
}

/// Information about a single commit.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: String,
    pub summary: String,
    pub author_name: String,
    pub author_email: String,
    pub time: DateTime<Utc>,
}

/// Outcome of a sync-style operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    AlreadyUpToDate,
    FastForwarded,
    Merged,
    Rebased,
}

/// The Git adapter.
///
/// Holds the working directory and the per-operation bound; opens the
/// repository fresh for every call.
#[derive(Debug, Clone)]
pub struct GitAdapter {
    workdir: PathBuf,
    timeout: Duration,
}

impl GitAdapter {
    /// Create an adapter rooted at the given working directory.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-operation bound. Used by tests.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The working directory this adapter operates on.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Check whether the directory is inside a Git repository.
    pub fn is_repository(&self) -> bool {
        git2::Repository::discover(&self.workdir).is_ok()
    }

    /// Run a closure with a timeout on a helper thread.
    ///
    /// On expiry the worker is detached; it finishes (or blocks) in the
    /// background while the caller moves on with a `Timeout` error.
    fn bounded<T, F>(&self, operation: &str, f: F) -> Result<T, GitError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, GitError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(f());
        });
        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(_) => Err(GitError::Timeout {
                operation: operation.to_string(),
            }),
        }
    }

    /// Run a closure against a freshly-opened repository, bounded.
    fn with_repo<T, F>(&self, operation: &str, f: F) -> Result<T, GitError>
    where
        T: Send + 'static,
        F: FnOnce(&mut git2::Repository) -> Result<T, GitError> + Send + 'static,
    {
        let path = self.workdir.clone();
        self.bounded(operation, move || {
            let mut repo =
                git2::Repository::discover(&path).map_err(|_| GitError::NotGitRepository {
                    path: path.clone(),
                })?;
            f(&mut repo)
        })
    }

    // =========================================================================
    // Status and inspection
    // =========================================================================

    /// Snapshot the working tree status.
    pub fn status(&self) -> Result<GitStatus, GitError> {
        self.with_repo("status", |repo| {
            let mut status = GitStatus::default();

            status.current_branch = head_branch_name(repo)?;
            status.has_remote_origin = repo.find_remote("origin").is_ok();

            let mut opts = git2::StatusOptions::new();
            opts.include_untracked(true).recurse_untracked_dirs(true);
            let statuses = repo
                .statuses(Some(&mut opts))
                .map_err(|e| GitError::from_git2(e, "status"))?;

            for entry in statuses.iter() {
                let Some(path) = entry.path() else { continue };
                let s = entry.status();
                if s.is_conflicted() {
                    status.conflicted.push(path.to_string());
                    continue;
                }
                if s.is_index_new() || s.is_index_modified() || s.is_index_deleted()
                    || s.is_index_renamed() || s.is_index_typechange()
                {
                    status.staged.push(path.to_string());
                }
                if s.is_wt_modified() || s.is_wt_deleted() || s.is_wt_renamed()
                    || s.is_wt_typechange()
                {
                    status.modified.push(path.to_string());
                }
                if s.is_wt_new() {
                    status.untracked.push(path.to_string());
                }
            }

            if let Some(branch) = &status.current_branch {
                if let Ok((ahead, behind, tracking)) = ahead_behind_of(repo, branch) {
                    status.ahead = ahead;
                    status.behind = behind;
                    status.tracking = tracking;
                }
            }

            Ok(status)
        })
    }

    /// The current branch name, or `None` when HEAD is detached.
    pub fn current_branch(&self) -> Result<Option<String>, GitError> {
        self.with_repo("current-branch", |repo| head_branch_name(repo))
    }

    /// List local branch names.
    pub fn local_branches(&self) -> Result<Vec<String>, GitError> {
        self.with_repo("local-branches", |repo| {
            branch_names(repo, git2::BranchType::Local)
        })
    }

    /// List remote branch names, without the `origin/` prefix.
    pub fn remote_branches(&self) -> Result<Vec<String>, GitError> {
        self.with_repo("remote-branches", |repo| {
            let names = branch_names(repo, git2::BranchType::Remote)?;
            Ok(names
                .into_iter()
                .filter_map(|n| n.strip_prefix("origin/").map(str::to_string))
                .filter(|n| n != "HEAD")
                .collect())
        })
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, name: &str) -> Result<bool, GitError> {
        let name = name.to_string();
        self.with_repo("branch-exists", move |repo| {
            Ok(repo.find_branch(&name, git2::BranchType::Local).is_ok())
        })
    }

    /// Check whether a remote branch exists (against the local remote refs).
    pub fn remote_branch_exists(&self, name: &str) -> Result<bool, GitError> {
        let name = name.to_string();
        self.with_repo("remote-branch-exists", move |repo| {
            Ok(repo
                .find_branch(&format!("origin/{}", name), git2::BranchType::Remote)
                .is_ok())
        })
    }

    /// Enumerate changed paths with their porcelain-style tags.
    pub fn changed_files(&self) -> Result<Vec<ChangedFile>, GitError> {
        self.with_repo("changed-files", |repo| {
            let mut opts = git2::StatusOptions::new();
            opts.include_untracked(true).recurse_untracked_dirs(true);
            let statuses = repo
                .statuses(Some(&mut opts))
                .map_err(|e| GitError::from_git2(e, "changed-files"))?;

            let mut files = Vec::new();
            for entry in statuses.iter() {
                let Some(path) = entry.path() else { continue };
                let s = entry.status();
                let tag = if s.is_wt_new() {
                    FileChangeTag::Untracked
                } else if s.is_index_renamed() || s.is_wt_renamed() {
                    FileChangeTag::Renamed
                } else if s.is_index_deleted() || s.is_wt_deleted() {
                    FileChangeTag::Deleted
                } else if s.is_index_new() {
                    FileChangeTag::Added
                } else if s.is_index_modified() || s.is_wt_modified() || s.is_index_typechange()
                    || s.is_wt_typechange()
                {
                    FileChangeTag::Modified
                } else {
                    continue;
                };
                files.push(ChangedFile {
                    path: path.to_string(),
                    tag,
                });
            }
            Ok(files)
        })
    }

    /// Local branch vs upstream: (ahead, behind).
    pub fn ahead_behind(&self) -> Result<(usize, usize), GitError> {
        self.with_repo("ahead-behind", |repo| {
            let Some(branch) = head_branch_name(repo)? else {
                return Ok((0, 0));
            };
            let (ahead, behind, _) = ahead_behind_of(repo, &branch)?;
            Ok((ahead, behind))
        })
    }

    /// The most recent commit on HEAD.
    pub fn last_commit(&self) -> Result<CommitInfo, GitError> {
        self.with_repo("last-commit", |repo| {
            let head = repo
                .head()
                .map_err(|e| GitError::from_git2(e, "last-commit"))?;
            let commit = head
                .peel_to_commit()
                .map_err(|e| GitError::from_git2(e, "last-commit"))?;
            Ok(commit_info(&commit))
        })
    }

    /// The tip commit of a local branch.
    pub fn branch_last_commit(&self, branch: &str) -> Result<CommitInfo, GitError> {
        let branch = branch.to_string();
        self.with_repo("branch-last-commit", move |repo| {
            let commit = repo
                .find_branch(&branch, git2::BranchType::Local)
                .map_err(|e| GitError::from_git2(e, &format!("branch:{}", branch)))?
                .get()
                .peel_to_commit()
                .map_err(|e| GitError::from_git2(e, "branch-last-commit"))?;
            Ok(commit_info(&commit))
        })
    }

    /// Commits on HEAD since (exclusive of) the given ref.
    pub fn commits_since(&self, base_ref: &str) -> Result<Vec<CommitInfo>, GitError> {
        let base_ref = base_ref.to_string();
        self.with_repo("commits-since", move |repo| {
            let head = repo
                .head()
                .map_err(|e| GitError::from_git2(e, "commits-since"))?
                .peel_to_commit()
                .map_err(|e| GitError::from_git2(e, "commits-since"))?;
            let base = repo
                .revparse_single(&base_ref)
                .map_err(|e| GitError::from_git2(e, &format!("branch:{}", base_ref)))?
                .peel_to_commit()
                .map_err(|e| GitError::from_git2(e, "commits-since"))?;

            let mut walk = repo
                .revwalk()
                .map_err(|e| GitError::from_git2(e, "commits-since"))?;
            walk.push(head.id())
                .map_err(|e| GitError::from_git2(e, "commits-since"))?;
            walk.hide(base.id())
                .map_err(|e| GitError::from_git2(e, "commits-since"))?;

            let mut commits = Vec::new();
            for oid in walk {
                let oid = oid.map_err(|e| GitError::from_git2(e, "commits-since"))?;
                let commit = repo
                    .find_commit(oid)
                    .map_err(|e| GitError::from_git2(e, "commits-since"))?;
                commits.push(commit_info(&commit));
            }
            Ok(commits)
        })
    }

    /// When the branch was created: the author time of the first commit
    /// unique to the branch relative to the base. Falls back to the tip
    /// commit time when the branch has no unique commits.
    pub fn branch_created_at(
        &self,
        branch: &str,
        base: &str,
    ) -> Result<DateTime<Utc>, GitError> {
        let branch = branch.to_string();
        let base = base.to_string();
        self.with_repo("branch-created-at", move |repo| {
            let tip = repo
                .find_branch(&branch, git2::BranchType::Local)
                .map_err(|e| GitError::from_git2(e, &format!("branch:{}", branch)))?
                .get()
                .peel_to_commit()
                .map_err(|e| GitError::from_git2(e, "branch-created-at"))?;

            let mut walk = repo
                .revwalk()
                .map_err(|e| GitError::from_git2(e, "branch-created-at"))?;
            walk.push(tip.id())
                .map_err(|e| GitError::from_git2(e, "branch-created-at"))?;
            if let Ok(base_obj) = repo.revparse_single(&base) {
                if let Ok(base_commit) = base_obj.peel_to_commit() {
                    let _ = walk.hide(base_commit.id());
                }
            }

            let mut oldest = None;
            for oid in walk.flatten() {
                oldest = Some(oid);
            }
            let commit_id = oldest.unwrap_or_else(|| tip.id());
            let commit = repo
                .find_commit(commit_id)
                .map_err(|e| GitError::from_git2(e, "branch-created-at"))?;
            Ok(commit_time(&commit))
        })
    }

    /// Paths that differ between two branches (name-only diff).
    pub fn diff_branches(&self, left: &str, right: &str) -> Result<Vec<String>, GitError> {
        let left = left.to_string();
        let right = right.to_string();
        self.with_repo("diff-branches", move |repo| {
            let left_tree = branch_tree(repo, &left)?;
            let right_tree = branch_tree(repo, &right)?;
            let diff = repo
                .diff_tree_to_tree(Some(&left_tree), Some(&right_tree), None)
                .map_err(|e| GitError::from_git2(e, "diff-branches"))?;

            let mut paths = Vec::new();
            for delta in diff.deltas() {
                if let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) {
                    paths.push(path.to_string_lossy().to_string());
                }
            }
            paths.sort();
            paths.dedup();
            Ok(paths)
        })
    }

    /// The configured URL of the `origin` remote.
    pub fn remote_url(&self) -> Result<Option<String>, GitError> {
        self.with_repo("remote-url", |repo| {
            match repo.find_remote("origin") {
                Ok(remote) => Ok(remote.url().map(str::to_string)),
                Err(_) => Ok(None),
            }
        })
    }

    /// The configured user identity, when both name and email are set.
    pub fn user_identity(&self) -> Result<Option<(String, String)>, GitError> {
        self.with_repo("user-identity", |repo| {
            let config = repo
                .config()
                .map_err(|e| GitError::from_git2(e, "user-identity"))?;
            let name = config.get_string("user.name").ok();
            let email = config.get_string("user.email").ok();
            Ok(name.zip(email))
        })
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Stage the given paths.
    pub fn stage(&self, paths: &[String]) -> Result<(), GitError> {
        let paths = paths.to_vec();
        self.with_repo("stage", move |repo| {
            let mut index = repo.index().map_err(|e| GitError::from_git2(e, "stage"))?;
            for path in &paths {
                let as_path = Path::new(path);
                if repo
                    .workdir()
                    .map(|w| w.join(as_path).exists())
                    .unwrap_or(false)
                {
                    index
                        .add_path(as_path)
                        .map_err(|e| GitError::from_git2(e, "stage"))?;
                } else {
                    // Deleted file: record the removal
                    index
                        .remove_path(as_path)
                        .map_err(|e| GitError::from_git2(e, "stage"))?;
                }
            }
            index.write().map_err(|e| GitError::from_git2(e, "stage"))?;
            Ok(())
        })
    }

    /// Stage everything, including untracked files.
    pub fn stage_all(&self) -> Result<(), GitError> {
        self.with_repo("stage-all", |repo| {
            let mut index = repo
                .index()
                .map_err(|e| GitError::from_git2(e, "stage-all"))?;
            index
                .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
                .map_err(|e| GitError::from_git2(e, "stage-all"))?;
            index
                .update_all(["*"].iter(), None)
                .map_err(|e| GitError::from_git2(e, "stage-all"))?;
            index
                .write()
                .map_err(|e| GitError::from_git2(e, "stage-all"))?;
            Ok(())
        })
    }

    /// Commit the staged changes. Returns the new commit id.
    ///
    /// Fails with [`GitError::NothingToCommit`] when the staged tree is
    /// identical to HEAD.
    pub fn commit(&self, message: &str) -> Result<String, GitError> {
        let message = message.to_string();
        self.with_repo("commit", move |repo| {
            let signature = repo
                .signature()
                .map_err(|e| GitError::from_git2(e, "commit"))?;
            let mut index = repo.index().map_err(|e| GitError::from_git2(e, "commit"))?;
            let tree_id = index
                .write_tree()
                .map_err(|e| GitError::from_git2(e, "commit"))?;
            let tree = repo
                .find_tree(tree_id)
                .map_err(|e| GitError::from_git2(e, "commit"))?;

            let parent = match repo.head() {
                Ok(head) => Some(
                    head.peel_to_commit()
                        .map_err(|e| GitError::from_git2(e, "commit"))?,
                ),
                Err(_) => None,
            };

            if let Some(parent) = &parent {
                if parent.tree_id() == tree_id {
                    return Err(GitError::NothingToCommit);
                }
            }

            let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
            let oid = repo
                .commit(Some("HEAD"), &signature, &signature, &message, &tree, &parents)
                .map_err(|e| GitError::from_git2(e, "commit"))?;
            Ok(oid.to_string())
        })
    }

    /// Create a branch at HEAD and switch to it.
    pub fn create_and_switch_branch(&self, name: &str) -> Result<(), GitError> {
        let name = name.to_string();
        self.with_repo("create-branch", move |repo| {
            let head = repo
                .head()
                .map_err(|e| GitError::from_git2(e, "create-branch"))?
                .peel_to_commit()
                .map_err(|e| GitError::from_git2(e, "create-branch"))?;
            repo.branch(&name, &head, false)
                .map_err(|e| GitError::from_git2(e, "create-branch"))?;
            checkout_branch(repo, &name)
        })
    }

    /// Switch to an existing local branch.
    pub fn switch_branch(&self, name: &str) -> Result<(), GitError> {
        let name = name.to_string();
        self.with_repo("switch-branch", move |repo| {
            repo.find_branch(&name, git2::BranchType::Local)
                .map_err(|e| GitError::from_git2(e, &format!("branch:{}", name)))?;
            checkout_branch(repo, &name)
        })
    }

    /// Delete a local branch. Refuses to delete the current branch.
    pub fn delete_branch(&self, name: &str) -> Result<(), GitError> {
        let name = name.to_string();
        self.with_repo("delete-branch", move |repo| {
            if head_branch_name(repo)?.as_deref() == Some(name.as_str()) {
                return Err(GitError::CannotDeleteCurrent { branch: name });
            }
            let mut branch = repo
                .find_branch(&name, git2::BranchType::Local)
                .map_err(|e| GitError::from_git2(e, &format!("branch:{}", name)))?;
            branch
                .delete()
                .map_err(|e| GitError::from_git2(e, "delete-branch"))?;
            Ok(())
        })
    }

    /// Push the branch to `origin`, optionally setting the upstream.
    ///
    /// Tries the libgit2 path first; on failure (other than rejection)
    /// falls back to the `git` CLI, which picks up credential helpers the
    /// library cannot.
    pub fn push(&self, branch: &str, set_upstream: bool) -> Result<(), GitError> {
        let branch_owned = branch.to_string();
        let libgit_result = self.with_repo("push", move |repo| {
            let mut remote = repo
                .find_remote("origin")
                .map_err(|e| GitError::from_git2(e, "remote:origin"))?;
            let refspec = format!(
                "refs/heads/{}:refs/heads/{}",
                branch_owned, branch_owned
            );

            let mut callbacks = git2::RemoteCallbacks::new();
            callbacks.credentials(|url, username, _allowed| {
                let config = git2::Config::open_default()?;
                git2::Cred::credential_helper(&config, url, username)
            });
            let mut opts = git2::PushOptions::new();
            opts.remote_callbacks(callbacks);

            remote
                .push(&[&refspec], Some(&mut opts))
                .map_err(|e| GitError::from_git2(e, "push"))?;
            Ok(())
        });

        match libgit_result {
            Ok(()) => {
                if set_upstream {
                    self.set_upstream(branch)?;
                }
                Ok(())
            }
            Err(err @ (GitError::PushRejected { .. } | GitError::Timeout { .. })) => Err(err),
            Err(_) => self.push_via_cli(branch, set_upstream),
        }
    }

    /// CLI fallback for push.
    fn push_via_cli(&self, branch: &str, set_upstream: bool) -> Result<(), GitError> {
        let mut args = vec!["push".to_string()];
        if set_upstream {
            args.push("-u".to_string());
        }
        args.push("origin".to_string());
        args.push(branch.to_string());

        let output = self.run_git_cli(args, "push")?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        Err(classify_push_failure(&stderr))
    }

    /// Record `origin/<branch>` as the upstream of the local branch.
    fn set_upstream(&self, branch: &str) -> Result<(), GitError> {
        let branch = branch.to_string();
        self.with_repo("set-upstream", move |repo| {
            let mut local = repo
                .find_branch(&branch, git2::BranchType::Local)
                .map_err(|e| GitError::from_git2(e, &format!("branch:{}", branch)))?;
            // The remote ref may not exist locally until the next fetch
            let _ = local.set_upstream(Some(&format!("origin/{}", branch)));
            Ok(())
        })
    }

    /// Fetch from `origin`.
    pub fn fetch(&self) -> Result<(), GitError> {
        self.with_repo("fetch", |repo| {
            let mut remote = repo
                .find_remote("origin")
                .map_err(|e| GitError::from_git2(e, "remote:origin"))?;
            let mut callbacks = git2::RemoteCallbacks::new();
            callbacks.credentials(|url, username, _allowed| {
                let config = git2::Config::open_default()?;
                git2::Cred::credential_helper(&config, url, username)
            });
            let mut opts = git2::FetchOptions::new();
            opts.remote_callbacks(callbacks);
            remote
                .fetch(&[] as &[&str], Some(&mut opts), None)
                .map_err(|e| GitError::from_git2(e, "fetch"))?;
            Ok(())
        })
    }

    /// Pull: fetch, then merge the upstream of the current branch.
    pub fn pull(&self) -> Result<SyncOutcome, GitError> {
        self.fetch()?;
        self.with_repo("pull", |repo| {
            let Some(branch) = head_branch_name(repo)? else {
                return Err(GitError::UnknownGit {
                    message: "cannot pull with detached HEAD".to_string(),
                });
            };
            let upstream_name = format!("origin/{}", branch);
            let upstream = repo
                .find_branch(&upstream_name, git2::BranchType::Remote)
                .map_err(|e| GitError::from_git2(e, &format!("branch:{}", upstream_name)))?;
            let upstream_commit = upstream
                .get()
                .peel_to_commit()
                .map_err(|e| GitError::from_git2(e, "pull"))?;
            merge_commit_into_head(repo, &branch, &upstream_commit)
        })
    }

    /// Merge a local branch into the current branch.
    pub fn merge(&self, branch: &str) -> Result<SyncOutcome, GitError> {
        let branch = branch.to_string();
        self.with_repo("merge", move |repo| {
            let Some(current) = head_branch_name(repo)? else {
                return Err(GitError::UnknownGit {
                    message: "cannot merge with detached HEAD".to_string(),
                });
            };
            let other = repo
                .find_branch(&branch, git2::BranchType::Local)
                .map_err(|e| GitError::from_git2(e, &format!("branch:{}", branch)))?
                .get()
                .peel_to_commit()
                .map_err(|e| GitError::from_git2(e, "merge"))?;
            merge_commit_into_head(repo, &current, &other)
        })
    }

    /// Rebase the current branch onto the given upstream ref.
    ///
    /// On conflict the rebase is left in progress for manual resolution
    /// and [`GitError::MergeConflict`] is returned with the conflicted
    /// paths.
    pub fn rebase(&self, onto: &str) -> Result<SyncOutcome, GitError> {
        let onto = onto.to_string();
        self.with_repo("rebase", move |repo| {
            let upstream = repo
                .revparse_single(&onto)
                .map_err(|e| GitError::from_git2(e, &format!("branch:{}", onto)))?;
            let annotated = repo
                .find_annotated_commit(upstream.id())
                .map_err(|e| GitError::from_git2(e, "rebase"))?;

            let mut rebase = repo
                .rebase(None, Some(&annotated), None, None)
                .map_err(|e| GitError::from_git2(e, "rebase"))?;

            let signature = repo
                .signature()
                .map_err(|e| GitError::from_git2(e, "rebase"))?;

            let mut applied = 0usize;
            while let Some(op) = rebase.next() {
                op.map_err(|e| GitError::from_git2(e, "rebase"))?;
                let index = repo.index().map_err(|e| GitError::from_git2(e, "rebase"))?;
                if index.has_conflicts() {
                    let files = conflicted_paths(&index);
                    return Err(GitError::MergeConflict { files });
                }
                match rebase.commit(None, &signature, None) {
                    Ok(_) => applied += 1,
                    // Empty patch after rebase: skip it
                    Err(e) if e.code() == git2::ErrorCode::Applied => {}
                    Err(e) => return Err(GitError::from_git2(e, "rebase")),
                }
            }
            rebase
                .finish(Some(&signature))
                .map_err(|e| GitError::from_git2(e, "rebase"))?;

            if applied == 0 {
                Ok(SyncOutcome::AlreadyUpToDate)
            } else {
                Ok(SyncOutcome::Rebased)
            }
        })
    }

    /// Stash the working tree.
    pub fn stash_push(&self, message: &str) -> Result<(), GitError> {
        let message = message.to_string();
        self.with_repo("stash-push", move |repo| {
            let signature = repo
                .signature()
                .map_err(|e| GitError::from_git2(e, "stash-push"))?;
            repo.stash_save(
                &signature,
                &message,
                Some(git2::StashFlags::INCLUDE_UNTRACKED),
            )
            .map_err(|e| GitError::from_git2(e, "stash-push"))?;
            Ok(())
        })
    }

    /// Pop the most recent stash entry.
    pub fn stash_pop(&self) -> Result<(), GitError> {
        self.with_repo("stash-pop", |repo| {
            repo.stash_pop(0, None)
                .map_err(|e| GitError::from_git2(e, "stash-pop"))?;
            Ok(())
        })
    }

    /// List stash entry messages, most recent first.
    pub fn stash_list(&self) -> Result<Vec<String>, GitError> {
        self.with_repo("stash-list", |repo| {
            let mut entries = Vec::new();
            repo.stash_foreach(|_, message, _| {
                entries.push(message.to_string());
                true
            })
            .map_err(|e| GitError::from_git2(e, "stash-list"))?;
            Ok(entries)
        })
    }

    /// Undo the last commit, keeping its changes in the working tree.
    pub fn undo_last_commit(&self) -> Result<(), GitError> {
        self.with_repo("undo-last-commit", |repo| {
            let head = repo
                .head()
                .map_err(|e| GitError::from_git2(e, "undo-last-commit"))?
                .peel_to_commit()
                .map_err(|e| GitError::from_git2(e, "undo-last-commit"))?;
            let Some(parent) = head.parents().next() else {
                return Err(GitError::UnknownGit {
                    message: "the first commit cannot be undone".to_string(),
                });
            };
            repo.reset(parent.as_object(), git2::ResetType::Soft, None)
                .map_err(|e| GitError::from_git2(e, "undo-last-commit"))?;
            Ok(())
        })
    }

    /// Abort an in-progress merge or rebase by resetting to HEAD.
    pub fn abort_in_progress(&self) -> Result<(), GitError> {
        self.with_repo("abort-in-progress", |repo| {
            repo.cleanup_state()
                .map_err(|e| GitError::from_git2(e, "abort-in-progress"))?;
            let head = repo
                .head()
                .map_err(|e| GitError::from_git2(e, "abort-in-progress"))?
                .peel_to_commit()
                .map_err(|e| GitError::from_git2(e, "abort-in-progress"))?;
            repo.reset(head.as_object(), git2::ResetType::Hard, None)
                .map_err(|e| GitError::from_git2(e, "abort-in-progress"))?;
            Ok(())
        })
    }

    /// Compose a commit message from the working tree when the user
    /// supplies none: `Update: add K files, modify K files, delete K files`.
    pub fn auto_commit_message(&self) -> Result<String, GitError> {
        let files = self.changed_files()?;
        let added = files
            .iter()
            .filter(|f| matches!(f.tag, FileChangeTag::Added | FileChangeTag::Untracked))
            .count();
        let modified = files
            .iter()
            .filter(|f| matches!(f.tag, FileChangeTag::Modified | FileChangeTag::Renamed))
            .count();
        let deleted = files
            .iter()
            .filter(|f| matches!(f.tag, FileChangeTag::Deleted))
            .count();
        Ok(format!(
            "Update: add {} files, modify {} files, delete {} files",
            added, modified, deleted
        ))
    }

    /// Run the `git` CLI with a wall-clock bound.
    fn run_git_cli(
        &self,
        args: Vec<String>,
        operation: &str,
    ) -> Result<std::process::Output, GitError> {
        let workdir = self.workdir.clone();
        self.bounded(operation, move || {
            Command::new("git")
                .args(&args)
                .current_dir(&workdir)
                .output()
                .map_err(|e| GitError::UnknownGit {
                    message: format!("failed to run git: {}", e),
                })
        })
    }
}

/// Classify a CLI push failure from stderr, distinguishing timeout,
/// authentication, and rejection.
fn classify_push_failure(stderr: &str) -> GitError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("403")
        || lower.contains("401")
    {
        GitError::AuthFailed {
            message: stderr.trim().to_string(),
        }
    } else if lower.contains("rejected") || lower.contains("non-fast-forward") {
        GitError::PushRejected {
            reason: stderr.trim().to_string(),
        }
    } else if lower.contains("timed out") || lower.contains("timeout") {
        GitError::Timeout {
            operation: "push".to_string(),
        }
    } else if lower.contains("could not resolve host") || lower.contains("network") {
        GitError::NetworkError {
            message: stderr.trim().to_string(),
        }
    } else {
        GitError::UnknownGit {
            message: stderr.trim().to_string(),
        }
    }
}

/// The current branch name, or `None` for detached HEAD / unborn branch.
fn head_branch_name(repo: &git2::Repository) -> Result<Option<String>, GitError> {
    match repo.head() {
        Ok(head) => {
            if head.is_branch() {
                Ok(head.shorthand().map(str::to_string))
            } else {
                Ok(None)
            }
        }
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
            // Unborn HEAD still names the branch it will create
            let reference = repo
                .find_reference("HEAD")
                .map_err(|e| GitError::from_git2(e, "head"))?;
            Ok(reference
                .symbolic_target()
                .and_then(|t| t.strip_prefix("refs/heads/"))
                .map(str::to_string))
        }
        Err(e) => Err(GitError::from_git2(e, "head")),
    }
}

/// (ahead, behind, tracking-name) of a branch vs its upstream.
fn ahead_behind_of(
    repo: &git2::Repository,
    branch: &str,
) -> Result<(usize, usize, Option<String>), GitError> {
    let local = repo
        .find_branch(branch, git2::BranchType::Local)
        .map_err(|e| GitError::from_git2(e, &format!("branch:{}", branch)))?;
    let Ok(upstream) = local.upstream() else {
        return Ok((0, 0, None));
    };
    let tracking = upstream
        .name()
        .ok()
        .flatten()
        .map(str::to_string);

    let local_oid = local
        .get()
        .target()
        .ok_or_else(|| GitError::UnknownGit {
            message: format!("branch {} has no target", branch),
        })?;
    let upstream_oid = upstream
        .get()
        .target()
        .ok_or_else(|| GitError::UnknownGit {
            message: "upstream has no target".to_string(),
        })?;

    let (ahead, behind) = repo
        .graph_ahead_behind(local_oid, upstream_oid)
        .map_err(|e| GitError::from_git2(e, "ahead-behind"))?;
    Ok((ahead, behind, tracking))
}

fn branch_names(
    repo: &git2::Repository,
    kind: git2::BranchType,
) -> Result<Vec<String>, GitError> {
    let branches = repo
        .branches(Some(kind))
        .map_err(|e| GitError::from_git2(e, "branches"))?;
    let mut names = Vec::new();
    for branch in branches {
        let (branch, _) = branch.map_err(|e| GitError::from_git2(e, "branches"))?;
        if let Ok(Some(name)) = branch.name() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

fn branch_tree<'repo>(
    repo: &'repo git2::Repository,
    name: &str,
) -> Result<git2::Tree<'repo>, GitError> {
    repo.revparse_single(name)
        .map_err(|e| GitError::from_git2(e, &format!("branch:{}", name)))?
        .peel_to_tree()
        .map_err(|e| GitError::from_git2(e, "branch-tree"))
}

fn checkout_branch(repo: &git2::Repository, name: &str) -> Result<(), GitError> {
    let refname = format!("refs/heads/{}", name);
    let object = repo
        .revparse_single(&refname)
        .map_err(|e| GitError::from_git2(e, &format!("branch:{}", name)))?;
    repo.checkout_tree(&object, None)
        .map_err(|e| GitError::from_git2(e, "checkout"))?;
    repo.set_head(&refname)
        .map_err(|e| GitError::from_git2(e, "checkout"))?;
    Ok(())
}

fn conflicted_paths(index: &git2::Index) -> Vec<String> {
    let Ok(conflicts) = index.conflicts() else {
        return Vec::new();
    };
    conflicts
        .flatten()
        .filter_map(|c| {
            c.our
                .or(c.their)
                .or(c.ancestor)
                .map(|entry| String::from_utf8_lossy(&entry.path).to_string())
        })
        .collect()
}

fn commit_time(commit: &git2::Commit<'_>) -> DateTime<Utc> {
    Utc.timestamp_opt(commit.time().seconds(), 0)
        .single()
        .unwrap_or_else(Utc::now)
}

fn commit_info(commit: &git2::Commit<'_>) -> CommitInfo {
    CommitInfo {
        id: commit.id().to_string(),
        summary: commit.summary().unwrap_or("").to_string(),
        author_name: commit.author().name().unwrap_or("").to_string(),
        author_email: commit.author().email().unwrap_or("").to_string(),
        time: commit_time(commit),
    }
}

/// Merge the given commit into HEAD of `branch`, fast-forwarding when
/// possible.
fn merge_commit_into_head(
    repo: &git2::Repository,
    branch: &str,
    other: &git2::Commit<'_>,
) -> Result<SyncOutcome, GitError> {
    let annotated = repo
        .find_annotated_commit(other.id())
        .map_err(|e| GitError::from_git2(e, "merge"))?;
    let (analysis, _) = repo
        .merge_analysis(&[&annotated])
        .map_err(|e| GitError::from_git2(e, "merge"))?;

    if analysis.is_up_to_date() {
        return Ok(SyncOutcome::AlreadyUpToDate);
    }

    if analysis.is_fast_forward() {
        let refname = format!("refs/heads/{}", branch);
        let mut reference = repo
            .find_reference(&refname)
            .map_err(|e| GitError::from_git2(e, "merge"))?;
        reference
            .set_target(other.id(), "fast-forward")
            .map_err(|e| GitError::from_git2(e, "merge"))?;
        repo.set_head(&refname)
            .map_err(|e| GitError::from_git2(e, "merge"))?;
        repo.checkout_head(Some(git2::build::CheckoutBuilder::default().force()))
            .map_err(|e| GitError::from_git2(e, "merge"))?;
        return Ok(SyncOutcome::FastForwarded);
    }

    repo.merge(&[&annotated], None, None)
        .map_err(|e| GitError::from_git2(e, "merge"))?;

    let mut index = repo.index().map_err(|e| GitError::from_git2(e, "merge"))?;
    if index.has_conflicts() {
        let files = conflicted_paths(&index);
        return Err(GitError::MergeConflict { files });
    }

    let tree_id = index
        .write_tree_to(repo)
        .map_err(|e| GitError::from_git2(e, "merge"))?;
    let tree = repo
        .find_tree(tree_id)
        .map_err(|e| GitError::from_git2(e, "merge"))?;
    let head = repo
        .head()
        .map_err(|e| GitError::from_git2(e, "merge"))?
        .peel_to_commit()
        .map_err(|e| GitError::from_git2(e, "merge"))?;
    let signature = repo
        .signature()
        .map_err(|e| GitError::from_git2(e, "merge"))?;
    let message = format!("Merge {} into {}", other.id(), branch);
    repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        &message,
        &tree,
        &[&head, other],
    )
    .map_err(|e| GitError::from_git2(e, "merge"))?;
    repo.cleanup_state()
        .map_err(|e| GitError::from_git2(e, "merge"))?;

    Ok(SyncOutcome::Merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_failure_classification() {
        assert!(matches!(
            classify_push_failure("fatal: Authentication failed for 'https://...'"),
            GitError::AuthFailed { .. }
        ));
        assert!(matches!(
            classify_push_failure("! [rejected] main -> main (non-fast-forward)"),
            GitError::PushRejected { .. }
        ));
        assert!(matches!(
            classify_push_failure("fatal: unable to access: Connection timed out"),
            GitError::Timeout { .. }
        ));
        assert!(matches!(
            classify_push_failure("fatal: Could not resolve host: github.com"),
            GitError::NetworkError { .. }
        ));
        assert!(matches!(
            classify_push_failure("something inexplicable"),
            GitError::UnknownGit { .. }
        ));
    }

    #[test]
    fn file_change_tags_match_porcelain() {
        assert_eq!(FileChangeTag::Modified.as_str(), "M");
        assert_eq!(FileChangeTag::Added.as_str(), "A");
        assert_eq!(FileChangeTag::Deleted.as_str(), "D");
        assert_eq!(FileChangeTag::Renamed.as_str(), "R");
        assert_eq!(FileChangeTag::Untracked.as_str(), "??");
    }

    #[test]
    fn not_a_repository_detected() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = GitAdapter::new(dir.path());
        assert!(!adapter.is_repository());
        assert!(matches!(
            adapter.status(),
            Err(GitError::NotGitRepository { .. })
        ));
    }

    #[test]
    fn timeout_surfaces_as_timeout_error() {
        let dir = tempfile::tempdir().unwrap();
        git2::Repository::init(dir.path()).unwrap();
        let adapter = GitAdapter::new(dir.path()).with_timeout(Duration::from_millis(0));
        let result = adapter.bounded("sleep", move || {
            thread::sleep(Duration::from_millis(250));
            Ok(())
        });
        assert!(matches!(result, Err(GitError::Timeout { .. })));
    }
}
