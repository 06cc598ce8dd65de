//! diagnosis::work_status
//!
//! Work-status analysis: composes repository state, timestamps, and the
//! linked issue into a ranked list of next actions for the Continue
//! phase.
//!
//! # Ranking
//!
//! Recommendations are ordered high priority first, then by the fixed
//! action order commit > pull > push > sync > test > update_issue >
//! update_status.

use chrono::{DateTime, Utc};

use crate::core::types::{
    GitStatus, Issue, Priority, Recommendation, RecommendedAction, SyncState,
};

/// Hours without a commit after which a branch counts as stale.
pub const STALE_AFTER_HOURS: f64 = 24.0;

/// Working hours after which a branch counts as long-running.
pub const LONG_RUNNING_AFTER_HOURS: f64 = 8.0;

/// Inputs to the analyzer. All time-derived fields are passed in so the
/// analysis itself is a pure function.
#[derive(Debug, Clone)]
pub struct WorkStatusInput {
    pub status: GitStatus,
    /// When the branch's first own commit was made, if known.
    pub branch_created_at: Option<DateTime<Utc>>,
    /// When the last commit on the branch was made, if any.
    pub last_commit_at: Option<DateTime<Utc>>,
    /// The issue the branch name encodes, when resolvable.
    pub issue: Option<Issue>,
    /// Whether a test runner was detected in the project.
    pub has_test_runner: bool,
    /// "Now" for hour computations.
    pub now: DateTime<Utc>,
}

/// Derived summary of repository + time + issue.
#[derive(Debug, Clone)]
pub struct WorkStatus {
    pub branch: Option<String>,
    pub sync: SyncState,
    pub uncommitted: usize,
    pub unpushed: usize,
    pub hours_since_branch_created: Option<f64>,
    pub hours_since_last_commit: Option<f64>,
    pub is_stale: bool,
    pub is_long_running: bool,
    pub issue: Option<Issue>,
    pub recommendations: Vec<Recommendation>,
}

/// Analyze work status and emit ranked recommendations.
pub fn analyze_work_status(input: WorkStatusInput) -> WorkStatus {
    let sync = SyncState::classify(
        input.status.ahead,
        input.status.behind,
        input.status.has_remote_origin && input.status.tracking.is_some(),
    );
    let uncommitted = input.status.uncommitted_count();
    let unpushed = input.status.ahead;

    let hours_since_branch_created = input
        .branch_created_at
        .map(|t| hours_between(t, input.now));
    let hours_since_last_commit = input.last_commit_at.map(|t| hours_between(t, input.now));

    let is_stale = hours_since_last_commit
        .map(|h| h > STALE_AFTER_HOURS)
        .unwrap_or(false);
    let is_long_running = hours_since_branch_created
        .map(|h| h > LONG_RUNNING_AFTER_HOURS)
        .unwrap_or(false);

    let mut recommendations = Vec::new();

    if uncommitted > 0 {
        recommendations.push(Recommendation {
            action: RecommendedAction::Commit,
            priority: Priority::High,
            title: "変更をコミット".to_string(),
            description: format!("{}件の未コミットの変更があります", uncommitted),
        });
    }

    if matches!(sync, SyncState::Behind) {
        recommendations.push(Recommendation {
            action: RecommendedAction::Pull,
            priority: Priority::High,
            title: "リモートの変更を取得".to_string(),
            description: format!("リモートより{}コミット遅れています", input.status.behind),
        });
    }

    if unpushed > 0 && !matches!(sync, SyncState::Diverged) {
        recommendations.push(Recommendation {
            action: RecommendedAction::Push,
            priority: Priority::Medium,
            title: "コミットをプッシュ".to_string(),
            description: format!("{}件の未プッシュのコミットがあります", unpushed),
        });
    }

    if matches!(sync, SyncState::Diverged) {
        recommendations.push(Recommendation {
            action: RecommendedAction::Sync,
            priority: Priority::High,
            title: "ブランチを同期".to_string(),
            description: "ローカルとリモートが分岐しています。rebaseまたはmergeで同期してください"
                .to_string(),
        });
    }

    if input.has_test_runner && uncommitted > 0 {
        recommendations.push(Recommendation {
            action: RecommendedAction::Test,
            priority: Priority::Medium,
            title: "テストを実行".to_string(),
            description: "コミット前にテストの実行を推奨します".to_string(),
        });
    }

    if let Some(issue) = &input.issue {
        if is_stale {
            recommendations.push(Recommendation {
                action: RecommendedAction::UpdateIssue,
                priority: Priority::Low,
                title: format!("Issue #{} に進捗を記録", issue.number),
                description: "24時間以上コミットがありません。進捗をIssueに共有してください"
                    .to_string(),
            });
        }
    }

    recommendations.push(Recommendation {
        action: RecommendedAction::UpdateStatus,
        priority: Priority::Low,
        title: "状況を再表示".to_string(),
        description: "最新の作業状況を表示します".to_string(),
    });

    rank(&mut recommendations);

    WorkStatus {
        branch: input.status.current_branch.clone(),
        sync,
        uncommitted,
        unpushed,
        hours_since_branch_created,
        hours_since_last_commit,
        is_stale,
        is_long_running,
        issue: input.issue,
        recommendations,
    }
}

/// Sort high priority first, fixed action order within a priority.
fn rank(recommendations: &mut [Recommendation]) {
    recommendations.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.action.rank().cmp(&b.action.rank()))
    });
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_minutes() as f64 / 60.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base_input(status: GitStatus) -> WorkStatusInput {
        WorkStatusInput {
            status,
            branch_created_at: None,
            last_commit_at: None,
            issue: None,
            has_test_runner: false,
            now: Utc::now(),
        }
    }

    fn tracked(branch: &str) -> GitStatus {
        GitStatus {
            current_branch: Some(branch.to_string()),
            has_remote_origin: true,
            tracking: Some(format!("origin/{}", branch)),
            ..Default::default()
        }
    }

    #[test]
    fn clean_synced_branch_only_suggests_status() {
        let ws = analyze_work_status(base_input(tracked("feature/x")));
        assert_eq!(ws.sync, SyncState::UpToDate);
        assert_eq!(ws.recommendations.len(), 1);
        assert_eq!(
            ws.recommendations[0].action,
            RecommendedAction::UpdateStatus
        );
    }

    #[test]
    fn commit_outranks_everything() {
        let status = GitStatus {
            modified: vec!["a.txt".to_string()],
            ahead: 2,
            behind: 1,
            ..tracked("feature/x")
        };
        let ws = analyze_work_status(base_input(status));
        assert_eq!(ws.recommendations[0].action, RecommendedAction::Commit);
    }

    #[test]
    fn behind_suggests_pull_before_push() {
        let status = GitStatus {
            behind: 3,
            ..tracked("feature/x")
        };
        let ws = analyze_work_status(base_input(status));
        assert_eq!(ws.recommendations[0].action, RecommendedAction::Pull);
    }

    #[test]
    fn diverged_suggests_sync_not_push() {
        let status = GitStatus {
            ahead: 2,
            behind: 2,
            ..tracked("feature/x")
        };
        let ws = analyze_work_status(base_input(status));
        assert_eq!(ws.sync, SyncState::Diverged);
        assert!(ws
            .recommendations
            .iter()
            .any(|r| r.action == RecommendedAction::Sync));
        assert!(!ws
            .recommendations
            .iter()
            .any(|r| r.action == RecommendedAction::Push));
    }

    #[test]
    fn no_tracking_branch_is_no_remote() {
        let status = GitStatus {
            current_branch: Some("feature/x".to_string()),
            has_remote_origin: true,
            tracking: None,
            ..Default::default()
        };
        let ws = analyze_work_status(base_input(status));
        assert_eq!(ws.sync, SyncState::NoRemote);
    }

    #[test]
    fn staleness_and_long_running_thresholds() {
        let now = Utc::now();
        let mut input = base_input(tracked("feature/x"));
        input.now = now;
        input.branch_created_at = Some(now - Duration::hours(9));
        input.last_commit_at = Some(now - Duration::hours(25));

        let ws = analyze_work_status(input);
        assert!(ws.is_stale);
        assert!(ws.is_long_running);
        assert!(ws.hours_since_last_commit.unwrap() > 24.0);

        let mut fresh = base_input(tracked("feature/x"));
        fresh.now = now;
        fresh.branch_created_at = Some(now - Duration::hours(2));
        fresh.last_commit_at = Some(now - Duration::hours(1));
        let ws = analyze_work_status(fresh);
        assert!(!ws.is_stale);
        assert!(!ws.is_long_running);
    }

    #[test]
    fn stale_branch_with_issue_suggests_issue_update() {
        let now = Utc::now();
        let mut input = base_input(tracked("bugfix/issue-5-login"));
        input.now = now;
        input.last_commit_at = Some(now - Duration::hours(30));
        input.issue = Some(Issue {
            number: 5,
            title: "login".to_string(),
            body: String::new(),
            labels: Default::default(),
            assignees: Default::default(),
            state: crate::core::types::IssueState::Open,
            updated_at: now,
            url: String::new(),
        });

        let ws = analyze_work_status(input);
        assert!(ws
            .recommendations
            .iter()
            .any(|r| r.action == RecommendedAction::UpdateIssue));
    }

    #[test]
    fn test_runner_adds_test_recommendation() {
        let status = GitStatus {
            modified: vec!["a.rs".to_string()],
            ..tracked("feature/x")
        };
        let mut input = base_input(status);
        input.has_test_runner = true;

        let ws = analyze_work_status(input);
        let actions: Vec<_> = ws.recommendations.iter().map(|r| r.action).collect();
        assert!(actions.contains(&RecommendedAction::Test));
        // Commit (high) still leads
        assert_eq!(actions[0], RecommendedAction::Commit);
    }
}
