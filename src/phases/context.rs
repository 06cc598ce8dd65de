//! phases::context
//!
//! Shared context for phase execution: configuration, adapters, and the
//! error-dispatch helper every phase step uses.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use crate::backup::{BackupStore, GitSnapshot};
use crate::core::config::Config;
use crate::core::logger::Logger;
use crate::core::paths::AppPaths;
use crate::errors::{ErrorClassification, ErrorHandler, Severity, WorkflowError};
use crate::gateway::{Gateway, GatewayError};
use crate::git::GitAdapter;
use crate::notify::Notifier;
use crate::recovery::{RecoveryContext, RecoveryManager, RecoveryOutcome};
use crate::ui::{output, Prompter, Verbosity};

/// A detected test runner: how to invoke the project's tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRunner {
    /// Runner kind, e.g. "cargo", "npm", "make".
    pub kind: &'static str,
    /// Command and arguments.
    pub run_cmd: Vec<String>,
}

/// Probe the project for a test runner.
///
/// Checks, in order: a Cargo manifest, a package.json with a test
/// script or jest configuration, and a Makefile with a test target.
pub fn detect_test_runner(root: &Path) -> Option<TestRunner> {
    if root.join("Cargo.toml").exists() {
        return Some(TestRunner {
            kind: "cargo",
            run_cmd: vec!["cargo".to_string(), "test".to_string()],
        });
    }

    let package_json = root.join("package.json");
    if package_json.exists() {
        let has_test = std::fs::read_to_string(&package_json)
            .ok()
            .and_then(|contents| serde_json::from_str::<serde_json::Value>(&contents).ok())
            .map(|json| json.get("scripts").and_then(|s| s.get("test")).is_some())
            .unwrap_or(false);
        let has_jest_config = root.join("jest.config.js").exists()
            || root.join("jest.config.ts").exists()
            || root.join("jest.config.json").exists();
        if has_test || has_jest_config {
            return Some(TestRunner {
                kind: "npm",
                run_cmd: vec!["npm".to_string(), "test".to_string()],
            });
        }
    }

    let makefile = root.join("Makefile");
    if makefile.exists() {
        let has_target = std::fs::read_to_string(&makefile)
            .map(|contents| contents.lines().any(|line| line.starts_with("test:")))
            .unwrap_or(false);
        if has_target {
            return Some(TestRunner {
                kind: "make",
                run_cmd: vec!["make".to_string(), "test".to_string()],
            });
        }
    }

    None
}

/// Run the detected test command. Returns whether it passed.
pub fn run_tests(runner: &TestRunner, root: &Path) -> bool {
    let Some((program, args)) = runner.run_cmd.split_first() else {
        return false;
    };
    Command::new(program)
        .args(args)
        .current_dir(root)
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// How a phase step should proceed after an error went through the
/// handler.
#[derive(Debug)]
pub enum FailureDisposition {
    /// Recovery asks the caller to retry the failed operation.
    Retry,
    /// Recovery succeeded; the operation itself should not be retried.
    Recovered(String),
    /// Warning severity: log, tell the user, keep going.
    Continue(String),
    /// The phase should end in failure; the report was already printed.
    Fatal(ErrorClassification),
}

/// Everything a phase needs, built once per command invocation.
pub struct PhaseContext {
    pub config: Config,
    pub logger: Logger,
    pub paths: AppPaths,
    pub prompter: Box<dyn Prompter>,
    pub git: GitAdapter,
    pub gateway: Arc<dyn Gateway>,
    pub backup: BackupStore,
    pub recovery: RecoveryManager,
    pub errors: Arc<ErrorHandler>,
    pub notifier: Notifier,
    pub verbosity: Verbosity,
}

impl PhaseContext {
    /// Confirmation that honors `CONFIRM_DESTRUCTIVE_ACTIONS`: when the
    /// setting is off, destructive prompts auto-approve.
    pub fn confirm_destructive(&self, message: &str) -> Result<bool, crate::ui::PromptError> {
        if !self.config.confirm_destructive_actions {
            return Ok(true);
        }
        self.prompter.confirm(message, false)
    }

    /// Snapshot repository state for backup metadata. Best-effort; a
    /// failure yields an empty snapshot rather than blocking a backup.
    pub fn git_snapshot(&self) -> GitSnapshot {
        let status = self.git.status().unwrap_or_default();
        GitSnapshot {
            current_branch: status.current_branch.clone(),
            staged: status.staged.len(),
            modified: status.modified.len(),
            untracked: status.untracked.len(),
            remote_url: self.git.remote_url().ok().flatten(),
            last_commit: self.git.last_commit().ok().map(|c| c.id),
        }
    }

    /// Create the pre-operation backup. A backup failure is reported as
    /// a warning; it does not block the operation.
    pub fn backup_before(&self, operation: &str) {
        let snapshot = self.git_snapshot();
        match self.backup.create_incremental(operation, Some(&snapshot)) {
            Ok(record) => {
                self.logger.info(&format!(
                    "backup {} created before {} ({} files)",
                    record.id,
                    operation,
                    record.files.len()
                ));
            }
            Err(e) => {
                self.logger.warn(&format!("backup before {} failed: {}", operation, e));
                output::warn(
                    format!("バックアップを作成できませんでした: {}", e),
                    self.verbosity,
                );
            }
        }
    }

    /// Route an error through the handler and, for recoverable tags,
    /// the recovery manager. Prints the user-facing report.
    pub async fn dispose_error(
        &self,
        error: WorkflowError,
        operation: &str,
    ) -> FailureDisposition {
        let classification = self.errors.handle(&error);

        match classification.severity {
            Severity::Warning => {
                let message = format!("{}", error);
                output::warn(&message, self.verbosity);
                FailureDisposition::Continue(message)
            }
            Severity::Critical | Severity::Unknown => {
                output::error(format!("{}", error));
                output::print(self.errors.report(&classification), self.verbosity);
                FailureDisposition::Fatal(classification)
            }
            Severity::Recoverable => {
                output::warn(format!("{}", error), self.verbosity);
                let Some(attempt) = self.errors.next_retry(operation) else {
                    output::print(self.errors.report(&classification), self.verbosity);
                    return FailureDisposition::Fatal(classification);
                };
                output::print(
                    format!("復旧を試みます... (試行 {})", attempt),
                    self.verbosity,
                );

                let context = RecoveryContext {
                    operation: operation.to_string(),
                    path: None,
                    reset_epoch: reset_epoch_of(&error),
                    attempt,
                };
                let prompter = self.prompter.as_ref();
                let confirm = move |question: &str| {
                    prompter.confirm(question, false).unwrap_or(false)
                };
                let outcome = self
                    .recovery
                    .recover(classification.tag, &context, &confirm)
                    .await;

                match outcome {
                    RecoveryOutcome::Retry => FailureDisposition::Retry,
                    RecoveryOutcome::Recovered { message } => {
                        self.errors.clear_retries(operation);
                        output::print(&message, self.verbosity);
                        FailureDisposition::Recovered(message)
                    }
                    RecoveryOutcome::Failed { message } => {
                        output::error(&message);
                        output::print(self.errors.report(&classification), self.verbosity);
                        FailureDisposition::Fatal(classification)
                    }
                }
            }
        }
    }
}

fn reset_epoch_of(error: &WorkflowError) -> Option<u64> {
    match error {
        WorkflowError::Gateway(GatewayError::RateLimit { reset_epoch }) => Some(*reset_epoch),
        _ => None,
    }
}

impl std::fmt::Debug for PhaseContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseContext")
            .field("workdir", &self.git.workdir())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn detects_cargo_project() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\n").unwrap();
        let runner = detect_test_runner(dir.path()).unwrap();
        assert_eq!(runner.kind, "cargo");
        assert_eq!(runner.run_cmd, vec!["cargo", "test"]);
    }

    #[test]
    fn detects_npm_with_test_script() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"scripts": {"test": "jest"}}"#,
        )
        .unwrap();
        let runner = detect_test_runner(dir.path()).unwrap();
        assert_eq!(runner.kind, "npm");
    }

    #[test]
    fn detects_jest_config_without_script() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        std::fs::write(dir.path().join("jest.config.js"), "module.exports = {}").unwrap();
        assert!(detect_test_runner(dir.path()).is_some());
    }

    #[test]
    fn detects_makefile_test_target() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Makefile"), "test:\n\t@true\n").unwrap();
        let runner = detect_test_runner(dir.path()).unwrap();
        assert_eq!(runner.kind, "make");
    }

    #[test]
    fn makefile_without_test_target_is_not_a_runner() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Makefile"), "build:\n\t@true\n").unwrap();
        assert!(detect_test_runner(dir.path()).is_none());
    }

    #[test]
    fn empty_project_has_no_runner() {
        let dir = TempDir::new().unwrap();
        assert!(detect_test_runner(dir.path()).is_none());
    }
}
