//! core::types
//!
//! Domain types shared across the workflow phases.
//!
//! # Types
//!
//! - [`WorkType`] - The kind of work a branch carries (feature, bugfix, ...)
//! - [`BranchPlan`] - A derived branch name plus the inputs that produced it
//! - [`Issue`] / [`PullRequest`] / [`Review`] - Remote tracker values
//! - [`GitStatus`] - A point-in-time snapshot of the working tree
//! - [`PhaseResult`] - The structured outcome of running a phase
//!
//! `GitStatus` is a snapshot value and must never be cached across
//! operations; callers re-query the adapter whenever they need fresh state.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of work a branch carries.
///
/// Each work type carries a display name, a branch-name prefix, and the
/// Conventional Commits type used when composing commit messages.
///
/// # Example
///
/// ```
/// use teamflow::core::types::WorkType;
///
/// assert_eq!(WorkType::Feature.branch_prefix(), "feature/");
/// assert_eq!(WorkType::Bugfix.commit_type(), "fix");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    /// New functionality
    Feature,
    /// Non-urgent bug fix
    Bugfix,
    /// Urgent production fix
    Hotfix,
    /// Documentation only
    Docs,
    /// Restructuring without behavior change
    Refactor,
    /// Test additions or corrections
    Test,
    /// Build, tooling, or dependency chores
    Chore,
}

impl WorkType {
    /// All work types, in menu order.
    pub fn all() -> &'static [WorkType] {
        &[
            WorkType::Feature,
            WorkType::Bugfix,
            WorkType::Hotfix,
            WorkType::Docs,
            WorkType::Refactor,
            WorkType::Test,
            WorkType::Chore,
        ]
    }

    /// Human-readable name shown in selection menus.
    pub fn display_name(&self) -> &'static str {
        match self {
            WorkType::Feature => "新機能開発",
            WorkType::Bugfix => "バグ修正",
            WorkType::Hotfix => "緊急修正",
            WorkType::Docs => "ドキュメント",
            WorkType::Refactor => "リファクタリング",
            WorkType::Test => "テスト",
            WorkType::Chore => "環境・設定",
        }
    }

    /// Branch name prefix, including the trailing slash.
    pub fn branch_prefix(&self) -> &'static str {
        match self {
            WorkType::Feature => "feature/",
            WorkType::Bugfix => "bugfix/",
            WorkType::Hotfix => "hotfix/",
            WorkType::Docs => "docs/",
            WorkType::Refactor => "refactor/",
            WorkType::Test => "test/",
            WorkType::Chore => "chore/",
        }
    }

    /// Conventional Commits type for this kind of work.
    pub fn commit_type(&self) -> &'static str {
        match self {
            WorkType::Feature => "feat",
            WorkType::Bugfix | WorkType::Hotfix => "fix",
            WorkType::Docs => "docs",
            WorkType::Refactor => "refactor",
            WorkType::Test => "test",
            WorkType::Chore => "chore",
        }
    }

    /// Short help blurb shown next to the menu entry.
    pub fn blurb(&self) -> &'static str {
        match self {
            WorkType::Feature => "新しい機能を追加する",
            WorkType::Bugfix => "既存のバグを修正する",
            WorkType::Hotfix => "本番環境の緊急問題を修正する",
            WorkType::Docs => "ドキュメントを追加・更新する",
            WorkType::Refactor => "動作を変えずにコードを整理する",
            WorkType::Test => "テストを追加・修正する",
            WorkType::Chore => "ビルド設定や依存関係を更新する",
        }
    }
}

impl std::fmt::Display for WorkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A derived branch name plus the inputs that produced it.
///
/// Invariant: `full_name == branch_prefix + issue_prefix + slug`, where
/// `issue_prefix` is `issue-<N>-` when an issue number is present. The slug
/// is lower-case alphanumerics plus dash, at most 30 characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPlan {
    /// The kind of work the branch carries.
    pub work_type: WorkType,
    /// Linked issue number, if any.
    pub issue_number: Option<u64>,
    /// Slug derived from the work description.
    pub slug: String,
    /// The complete branch name.
    pub full_name: String,
}

/// Issue lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl std::fmt::Display for IssueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueState::Open => write!(f, "open"),
            IssueState::Closed => write!(f, "closed"),
        }
    }
}

/// A tracker issue, fetched or created during Start and commented on
/// during Continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: BTreeSet<String>,
    pub assignees: BTreeSet<String>,
    pub state: IssueState,
    pub updated_at: DateTime<Utc>,
    pub url: String,
}

/// Pull request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrState::Open => write!(f, "open"),
            PrState::Closed => write!(f, "closed"),
            PrState::Merged => write!(f, "merged"),
        }
    }
}

/// Review verdict on a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Pending,
}

/// A single review on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub user: String,
    pub state: ReviewState,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// A pull request, created during Finish and listed during Team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub head_ref: String,
    pub base_ref: String,
    pub state: PrState,
    pub draft: bool,
    pub reviewers: BTreeSet<String>,
    pub reviews: Vec<Review>,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub url: String,
}

impl PullRequest {
    /// Summarize review state for team reports.
    ///
    /// Changes-requested wins over approval; a PR with neither is awaiting
    /// review.
    pub fn review_summary(&self) -> ReviewSummary {
        let mut approved = false;
        for review in &self.reviews {
            match review.state {
                ReviewState::ChangesRequested => return ReviewSummary::ChangesRequested,
                ReviewState::Approved => approved = true,
                ReviewState::Commented | ReviewState::Pending => {}
            }
        }
        if approved {
            ReviewSummary::Approved
        } else {
            ReviewSummary::AwaitingReview
        }
    }
}

/// Aggregated review state shown in team reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewSummary {
    Approved,
    ChangesRequested,
    AwaitingReview,
}

impl std::fmt::Display for ReviewSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewSummary::Approved => write!(f, "承認済み"),
            ReviewSummary::ChangesRequested => write!(f, "変更要求"),
            ReviewSummary::AwaitingReview => write!(f, "要レビュー"),
        }
    }
}

/// A point-in-time snapshot of the working tree.
///
/// Never cached: any mutation invalidates it, so callers re-query the
/// adapter instead of holding onto an old value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitStatus {
    /// Current branch, or `None` when HEAD is detached.
    pub current_branch: Option<String>,
    /// Commits ahead of the tracking branch.
    pub ahead: usize,
    /// Commits behind the tracking branch.
    pub behind: usize,
    /// Staged paths.
    pub staged: Vec<String>,
    /// Modified-but-unstaged paths.
    pub modified: Vec<String>,
    /// Untracked paths.
    pub untracked: Vec<String>,
    /// Paths with unresolved conflicts.
    pub conflicted: Vec<String>,
    /// Whether a remote named `origin` is configured.
    pub has_remote_origin: bool,
    /// Upstream tracking branch, if set.
    pub tracking: Option<String>,
}

impl GitStatus {
    /// True when nothing is staged, modified, untracked, or conflicted.
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty()
            && self.modified.is_empty()
            && self.untracked.is_empty()
            && self.conflicted.is_empty()
    }

    /// Total count of uncommitted paths (staged + modified + untracked).
    pub fn uncommitted_count(&self) -> usize {
        self.staged.len() + self.modified.len() + self.untracked.len()
    }
}

/// Classification of local branch vs its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    UpToDate,
    Ahead,
    Behind,
    Diverged,
    NoRemote,
}

impl SyncState {
    /// Classify from ahead/behind counts and remote presence.
    pub fn classify(ahead: usize, behind: usize, has_remote: bool) -> Self {
        if !has_remote {
            SyncState::NoRemote
        } else {
            match (ahead > 0, behind > 0) {
                (false, false) => SyncState::UpToDate,
                (true, false) => SyncState::Ahead,
                (false, true) => SyncState::Behind,
                (true, true) => SyncState::Diverged,
            }
        }
    }
}

/// Priority of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// The action a recommendation drives in the Continue dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Commit,
    Pull,
    Push,
    Sync,
    Test,
    UpdateIssue,
    UpdateStatus,
}

impl RecommendedAction {
    /// Fixed dispatch ordering: commit > pull > push > sync > test >
    /// update_issue > update_status.
    pub fn rank(&self) -> u8 {
        match self {
            RecommendedAction::Commit => 0,
            RecommendedAction::Pull => 1,
            RecommendedAction::Push => 2,
            RecommendedAction::Sync => 3,
            RecommendedAction::Test => 4,
            RecommendedAction::UpdateIssue => 5,
            RecommendedAction::UpdateStatus => 6,
        }
    }
}

/// A ranked next action the Continue phase may execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub action: RecommendedAction,
    pub priority: Priority,
    pub title: String,
    pub description: String,
}

/// Outcome classification of a phase run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    /// The phase ran to its terminal state.
    Completed,
    /// The user backed out; no side effects beyond those already reported.
    Aborted,
    /// The phase could not finish.
    Failed,
}

/// Artifacts a phase may produce.
#[derive(Debug, Clone, Default)]
pub struct PhaseArtifacts {
    /// Branch created or switched to.
    pub branch: Option<String>,
    /// Issue fetched or created.
    pub issue: Option<Issue>,
    /// Pull request created.
    pub pr: Option<PullRequest>,
}

/// The structured outcome of running a phase.
#[derive(Debug, Clone)]
pub struct PhaseResult {
    pub status: PhaseStatus,
    pub artifacts: PhaseArtifacts,
    pub messages: Vec<String>,
    /// Set when the failure needs manual intervention (e.g. conflict
    /// resolution) rather than a retry.
    pub requires_manual_action: bool,
}

impl PhaseResult {
    /// A completed phase with no artifacts.
    pub fn completed() -> Self {
        Self {
            status: PhaseStatus::Completed,
            artifacts: PhaseArtifacts::default(),
            messages: Vec::new(),
            requires_manual_action: false,
        }
    }

    /// A user-aborted phase, with the reason recorded in messages.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self {
            status: PhaseStatus::Aborted,
            artifacts: PhaseArtifacts::default(),
            messages: vec![reason.into()],
            requires_manual_action: false,
        }
    }

    /// A failed phase, with the reason recorded in messages.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: PhaseStatus::Failed,
            artifacts: PhaseArtifacts::default(),
            messages: vec![reason.into()],
            requires_manual_action: false,
        }
    }

    /// Attach a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    /// Mark the result as requiring manual action.
    pub fn manual_action_required(mut self) -> Self {
        self.requires_manual_action = true;
        self
    }
}
