//! diagnosis
//!
//! Repository diagnosis and work-status analysis.
//!
//! Diagnosis inspects the repository and produces three lists: issues
//! (severity-tagged), warnings (team-practice nudges), and suggestions.
//! The work-status analyzer derives a ranked list of next actions from
//! repository state, timestamps, and the linked issue.

pub mod work_status;

pub use work_status::{analyze_work_status, WorkStatus, WorkStatusInput};

use std::fs;
use std::path::Path;

use crate::core::types::GitStatus;
use crate::git::{GitAdapter, GitError};

/// Threshold for the untracked-file noise issue.
const UNTRACKED_LIMIT: usize = 10;

/// Threshold for the large-batch warning.
const UNCOMMITTED_LIMIT: usize = 20;

/// Files larger than this are flagged (bytes).
const LARGE_FILE_LIMIT: u64 = 100 * 1024 * 1024;

/// Severity of a diagnosed issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Blocks normal workflow operation.
    Blocking,
    /// Degrades the workflow but does not block it.
    Degraded,
}

/// One diagnosed repository problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosedIssue {
    pub severity: IssueSeverity,
    pub message: String,
}

/// Result of diagnosing a repository.
#[derive(Debug, Clone, Default)]
pub struct DiagnosisReport {
    pub issues: Vec<DiagnosedIssue>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl DiagnosisReport {
    /// True when no blocking issues were found.
    pub fn is_healthy(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|issue| issue.severity == IssueSeverity::Blocking)
    }
}

/// Diagnose the repository at the adapter's working directory.
///
/// Detects: non-repo, merge conflicts, untracked-file noise, detached
/// HEAD, unreachable remote, unwritable working directory, missing Git
/// identity, and oversized files. Warnings encode team practices: work
/// on the default branch, large uncommitted batches, unpushed commits.
pub fn diagnose(git: &GitAdapter, default_branch: &str) -> DiagnosisReport {
    let mut report = DiagnosisReport::default();

    if !git.is_repository() {
        report.issues.push(DiagnosedIssue {
            severity: IssueSeverity::Blocking,
            message: "Gitリポジトリではありません。git init または git clone を実行してください"
                .to_string(),
        });
        return report;
    }

    let status = match git.status() {
        Ok(status) => status,
        Err(GitError::Timeout { .. }) => {
            report.issues.push(DiagnosedIssue {
                severity: IssueSeverity::Degraded,
                message: "Git操作がタイムアウトしました。リポジトリが大きすぎる可能性があります"
                    .to_string(),
            });
            return report;
        }
        Err(e) => {
            report.issues.push(DiagnosedIssue {
                severity: IssueSeverity::Blocking,
                message: format!("リポジトリの状態を取得できません: {}", e),
            });
            return report;
        }
    };

    diagnose_status(&mut report, &status, default_branch);
    diagnose_identity(&mut report, git);
    diagnose_workdir(&mut report, git.workdir());

    report
}

/// The status-derived part of diagnosis, split out for direct testing.
pub fn diagnose_status(report: &mut DiagnosisReport, status: &GitStatus, default_branch: &str) {
    if !status.conflicted.is_empty() {
        report.issues.push(DiagnosedIssue {
            severity: IssueSeverity::Blocking,
            message: format!(
                "マージコンフリクトが未解消です: {}",
                status.conflicted.join(", ")
            ),
        });
    }

    if status.current_branch.is_none() {
        report.issues.push(DiagnosedIssue {
            severity: IssueSeverity::Degraded,
            message: "HEADがブランチを指していません (detached HEAD)".to_string(),
        });
    }

    if status.untracked.len() > UNTRACKED_LIMIT {
        report.issues.push(DiagnosedIssue {
            severity: IssueSeverity::Degraded,
            message: format!(
                "未追跡ファイルが多すぎます ({}個)。.gitignoreの整備を検討してください",
                status.untracked.len()
            ),
        });
    }

    if !status.has_remote_origin {
        report.issues.push(DiagnosedIssue {
            severity: IssueSeverity::Degraded,
            message: "リモート origin が設定されていません".to_string(),
        });
    }

    // Team-practice warnings
    if status.current_branch.as_deref() == Some(default_branch) {
        report.warnings.push(format!(
            "{} ブランチ上で作業しています。tf start で作業ブランチを作成してください",
            default_branch
        ));
    }
    if status.uncommitted_count() > UNCOMMITTED_LIMIT {
        report.warnings.push(format!(
            "未コミットの変更が{}件あります。小さくコミットすることを推奨します",
            status.uncommitted_count()
        ));
    }
    if status.ahead > 0 {
        report.warnings.push(format!(
            "未プッシュのコミットが{}件あります",
            status.ahead
        ));
    }
}

fn diagnose_identity(report: &mut DiagnosisReport, git: &GitAdapter) {
    match git.user_identity() {
        Ok(Some(_)) => {}
        Ok(None) => {
            report.issues.push(DiagnosedIssue {
                severity: IssueSeverity::Degraded,
                message: "Gitのuser.name / user.emailが未設定です".to_string(),
            });
            report.suggestions.push(
                "git config user.name と git config user.email を設定してください".to_string(),
            );
        }
        Err(_) => {}
    }
}

fn diagnose_workdir(report: &mut DiagnosisReport, workdir: &Path) {
    // Probe writability with a throwaway file
    let probe = workdir.join(".teamflow-write-probe");
    match fs::write(&probe, b"probe") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
        }
        Err(_) => {
            report.issues.push(DiagnosedIssue {
                severity: IssueSeverity::Blocking,
                message: "作業ディレクトリに書き込めません".to_string(),
            });
            return;
        }
    }

    for entry in oversized_files(workdir) {
        report.issues.push(DiagnosedIssue {
            severity: IssueSeverity::Degraded,
            message: format!(
                "100MiBを超えるファイルがあります: {}。Git LFSの利用を検討してください",
                entry
            ),
        });
    }
}

/// Top-level files over the size limit. Only the first directory level
/// is scanned; deep trees are the province of git itself.
fn oversized_files(workdir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(workdir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.metadata()
                .map(|m| m.is_file() && m.len() > LARGE_FILE_LIMIT)
                .unwrap_or(false)
        })
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_on(branch: &str) -> GitStatus {
        GitStatus {
            current_branch: Some(branch.to_string()),
            has_remote_origin: true,
            ..Default::default()
        }
    }

    #[test]
    fn conflicts_are_blocking() {
        let mut report = DiagnosisReport::default();
        let status = GitStatus {
            conflicted: vec!["a.txt".to_string()],
            ..status_on("feature/x")
        };
        diagnose_status(&mut report, &status, "main");
        assert!(!report.is_healthy());
        assert!(report.issues[0].message.contains("a.txt"));
    }

    #[test]
    fn detached_head_is_degraded() {
        let mut report = DiagnosisReport::default();
        let status = GitStatus {
            current_branch: None,
            has_remote_origin: true,
            ..Default::default()
        };
        diagnose_status(&mut report, &status, "main");
        assert!(report.is_healthy());
        assert_eq!(report.issues.len(), 1);
    }

    #[test]
    fn untracked_noise_over_limit() {
        let mut report = DiagnosisReport::default();
        let status = GitStatus {
            untracked: (0..11).map(|i| format!("file{}", i)).collect(),
            ..status_on("feature/x")
        };
        diagnose_status(&mut report, &status, "main");
        assert!(report.issues.iter().any(|i| i.message.contains("11")));
    }

    #[test]
    fn default_branch_work_warns() {
        let mut report = DiagnosisReport::default();
        diagnose_status(&mut report, &status_on("main"), "main");
        assert!(report.warnings.iter().any(|w| w.contains("tf start")));
    }

    #[test]
    fn large_uncommitted_batch_warns() {
        let mut report = DiagnosisReport::default();
        let status = GitStatus {
            modified: (0..21).map(|i| format!("file{}", i)).collect(),
            ..status_on("feature/x")
        };
        diagnose_status(&mut report, &status, "main");
        assert!(report.warnings.iter().any(|w| w.contains("21")));
    }

    #[test]
    fn unpushed_commits_warn() {
        let mut report = DiagnosisReport::default();
        let status = GitStatus {
            ahead: 3,
            ..status_on("feature/x")
        };
        diagnose_status(&mut report, &status, "main");
        assert!(report.warnings.iter().any(|w| w.contains("3")));
    }

    #[test]
    fn clean_feature_branch_is_healthy() {
        let mut report = DiagnosisReport::default();
        diagnose_status(&mut report, &status_on("feature/x"), "main");
        assert!(report.is_healthy());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn non_repo_reports_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitAdapter::new(dir.path());
        let report = diagnose(&git, "main");
        assert!(!report.is_healthy());
    }
}
