//! phases::continue_work
//!
//! The Continue phase: analyze the work in progress, rank the next
//! actions, and execute the ones the user confirms.
//!
//! # Flow
//!
//! `Analyze -> Rank -> for each recommendation in rank order: confirm ->
//! dispatch`. Skipping moves to the next recommendation; a dispatch
//! failure goes through classification and, when recoverable, recovery.

use chrono::Utc;

use crate::core::naming;
use crate::core::types::{PhaseResult, Recommendation, RecommendedAction, SyncState};
use crate::core::validate;
use crate::diagnosis::work_status::{analyze_work_status, WorkStatus, WorkStatusInput};
use crate::errors::{ErrorTag, WorkflowError};
use crate::ui::output;
use crate::ui::PromptError;

use super::context::{detect_test_runner, run_tests, FailureDisposition, PhaseContext};

/// Commit types offered in the Conventional Commits selector.
const COMMIT_TYPES: [(&str, &str); 6] = [
    ("feat", "新機能"),
    ("fix", "バグ修正"),
    ("docs", "ドキュメント"),
    ("refactor", "リファクタリング"),
    ("test", "テスト"),
    ("chore", "雑務・設定"),
];

/// Run the Continue phase.
pub async fn run(ctx: &PhaseContext) -> PhaseResult {
    if !ctx.git.is_repository() {
        return PhaseResult::failed("Gitリポジトリではありません");
    }

    let work_status = match analyze(ctx).await {
        Ok(ws) => ws,
        Err(e) => return PhaseResult::failed(format!("状態の取得に失敗しました: {}", e)),
    };

    display_status(ctx, &work_status);

    let actionable: Vec<&Recommendation> = work_status
        .recommendations
        .iter()
        .filter(|r| r.action != RecommendedAction::UpdateStatus)
        .collect();
    if actionable.is_empty() {
        output::print(
            "実行すべき作業はありません。作業ツリーは同期済みです",
            ctx.verbosity,
        );
        return PhaseResult::completed().with_message("推奨アクションなし");
    }

    let mut executed = Vec::new();
    for recommendation in &work_status.recommendations {
        let go = match ctx.prompter.confirm(
            &format!(
                "{} - {} を実行しますか?",
                recommendation.title, recommendation.description
            ),
            true,
        ) {
            Ok(answer) => answer,
            Err(PromptError::Cancelled) => {
                return PhaseResult::aborted("キャンセルされました")
            }
            Err(e) => return PhaseResult::failed(format!("入力エラー: {}", e)),
        };
        if !go {
            continue;
        }

        match dispatch(ctx, recommendation.action, &work_status).await {
            DispatchResult::Done(message) => {
                output::print(&message, ctx.verbosity);
                executed.push(message);
            }
            DispatchResult::Skipped => {}
            DispatchResult::Aborted => {
                return PhaseResult::aborted("キャンセルされました");
            }
            DispatchResult::Failed {
                message,
                manual_action,
            } => {
                let mut result = PhaseResult::failed(message);
                if manual_action {
                    result = result.manual_action_required();
                }
                return result;
            }
        }
    }

    let mut result = PhaseResult::completed();
    result.messages = executed;
    result
}

/// Gather all analyzer inputs from the adapters.
async fn analyze(ctx: &PhaseContext) -> Result<WorkStatus, WorkflowError> {
    let status = ctx.git.status()?;

    let branch_created_at = match &status.current_branch {
        Some(branch) if branch != &ctx.config.default_branch => ctx
            .git
            .branch_created_at(branch, &ctx.config.default_branch)
            .ok(),
        _ => None,
    };
    let last_commit_at = ctx.git.last_commit().ok().map(|c| c.time);

    let issue = match status
        .current_branch
        .as_deref()
        .and_then(naming::issue_number_from_branch)
    {
        Some(number) if ctx.gateway.available() => ctx.gateway.get_issue(number).await.ok(),
        _ => None,
    };

    let has_test_runner = detect_test_runner(ctx.git.workdir()).is_some();

    Ok(analyze_work_status(WorkStatusInput {
        status,
        branch_created_at,
        last_commit_at,
        issue,
        has_test_runner,
        now: Utc::now(),
    }))
}

fn display_status(ctx: &PhaseContext, ws: &WorkStatus) {
    output::heading("作業状況", ctx.verbosity);
    output::print(
        format!(
            "ブランチ: {}",
            ws.branch.as_deref().unwrap_or("(detached)")
        ),
        ctx.verbosity,
    );
    let sync_label = match ws.sync {
        SyncState::UpToDate => "同期済み",
        SyncState::Ahead => "リモートより進んでいます",
        SyncState::Behind => "リモートより遅れています",
        SyncState::Diverged => "リモートと分岐しています",
        SyncState::NoRemote => "リモート追跡なし",
    };
    output::print(format!("同期状態: {}", sync_label), ctx.verbosity);
    output::print(
        format!(
            "未コミット: {}件 / 未プッシュ: {}件",
            ws.uncommitted, ws.unpushed
        ),
        ctx.verbosity,
    );
    if let Some(hours) = ws.hours_since_last_commit {
        let stale = if ws.is_stale { " (停滞中)" } else { "" };
        output::print(
            format!("最終コミットから {:.1} 時間{}", hours, stale),
            ctx.verbosity,
        );
    }
    if let Some(issue) = &ws.issue {
        output::print(
            format!("Issue: #{} {} ({})", issue.number, issue.title, issue.state),
            ctx.verbosity,
        );
    }
}

enum DispatchResult {
    Done(String),
    Skipped,
    Aborted,
    Failed { message: String, manual_action: bool },
}

/// Execute one recommended action.
async fn dispatch(
    ctx: &PhaseContext,
    action: RecommendedAction,
    ws: &WorkStatus,
) -> DispatchResult {
    match action {
        RecommendedAction::Commit => commit_action(ctx).await,
        RecommendedAction::Pull => {
            git_action(ctx, "pull", || {
                ctx.git
                    .pull()
                    .map(|_| "リモートの変更を取り込みました".to_string())
            })
            .await
        }
        RecommendedAction::Push => {
            let Some(branch) = ws.branch.clone() else {
                return DispatchResult::Failed {
                    message: "ブランチが特定できません".to_string(),
                    manual_action: false,
                };
            };
            let set_upstream = ws.sync == SyncState::NoRemote;
            git_action(ctx, "push", || {
                ctx.git
                    .push(&branch, set_upstream)
                    .map(|_| "プッシュしました".to_string())
            })
            .await
        }
        RecommendedAction::Sync => sync_action(ctx, ws).await,
        RecommendedAction::Test => test_action(ctx),
        RecommendedAction::UpdateIssue => update_issue_action(ctx, ws).await,
        RecommendedAction::UpdateStatus => match analyze(ctx).await {
            Ok(fresh) => {
                display_status(ctx, &fresh);
                DispatchResult::Done("状況を更新しました".to_string())
            }
            Err(e) => DispatchResult::Failed {
                message: format!("{}", e),
                manual_action: false,
            },
        },
    }
}

/// Compose a Conventional Commits message and commit everything.
async fn commit_action(ctx: &PhaseContext) -> DispatchResult {
    let options: Vec<String> = COMMIT_TYPES
        .iter()
        .map(|(tag, label)| format!("{} ({})", tag, label))
        .collect();
    let type_index = match ctx.prompter.select("コミットの種類", &options) {
        Ok(index) => index,
        Err(PromptError::Cancelled) => return DispatchResult::Aborted,
        Err(e) => {
            return DispatchResult::Failed {
                message: format!("{}", e),
                manual_action: false,
            }
        }
    };
    let commit_type = COMMIT_TYPES[type_index].0;

    let description = loop {
        let text = match ctx.prompter.input("変更内容 (小文字で始め、句点で終えない)", None) {
            Ok(text) => text,
            Err(PromptError::Cancelled) => return DispatchResult::Aborted,
            Err(e) => {
                return DispatchResult::Failed {
                    message: format!("{}", e),
                    manual_action: false,
                }
            }
        };
        match validate_commit_description(&text) {
            Ok(description) => break description,
            Err(message) => output::error(message),
        }
    };

    let message = format!("{}: {}", commit_type, description);
    if let Err(error) = validate::validate_commit_message(&message).into_result() {
        return DispatchResult::Failed {
            message: error,
            manual_action: false,
        };
    }

    if let Err(e) = ctx.git.stage_all() {
        return fail_from_error(ctx, e.into(), "commit").await;
    }
    match ctx.git.commit(&message) {
        Ok(id) => DispatchResult::Done(format!("コミットしました: {} ({})", message, &id[..7.min(id.len())])),
        Err(e) => fail_from_error(ctx, e.into(), "commit").await,
    }
}

/// The Conventional Commits description rules: non-empty, does not
/// start with an upper-case letter, does not end with a period.
pub fn validate_commit_description(text: &str) -> Result<String, &'static str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("変更内容を入力してください");
    }
    if trimmed
        .chars()
        .next()
        .map(|c| c.is_uppercase())
        .unwrap_or(false)
    {
        return Err("変更内容は小文字で始めてください");
    }
    if trimmed.ends_with('.') || trimmed.ends_with('。') {
        return Err("変更内容は句点で終えないでください");
    }
    Ok(trimmed.to_string())
}

async fn sync_action(ctx: &PhaseContext, ws: &WorkStatus) -> DispatchResult {
    let options: Vec<String> = ["rebase", "merge", "キャンセル"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let choice = match ctx.prompter.select("同期方法を選択してください", &options) {
        Ok(choice) => choice,
        Err(PromptError::Cancelled) => return DispatchResult::Aborted,
        Err(e) => {
            return DispatchResult::Failed {
                message: format!("{}", e),
                manual_action: false,
            }
        }
    };

    let Some(branch) = ws.branch.clone() else {
        return DispatchResult::Failed {
            message: "ブランチが特定できません".to_string(),
            manual_action: false,
        };
    };
    let upstream = format!("origin/{}", branch);

    let result = match choice {
        0 => {
            if let Err(e) = ctx.git.fetch() {
                return fail_from_error(ctx, e.into(), "sync").await;
            }
            ctx.git.rebase(&upstream).map(|_| "rebaseで同期しました".to_string())
        }
        1 => ctx.git.pull().map(|_| "mergeで同期しました".to_string()),
        _ => return DispatchResult::Skipped,
    };

    match result {
        Ok(message) => DispatchResult::Done(message),
        Err(e) => fail_from_error(ctx, e.into(), "sync").await,
    }
}

fn test_action(ctx: &PhaseContext) -> DispatchResult {
    let Some(runner) = detect_test_runner(ctx.git.workdir()) else {
        return DispatchResult::Done("テストランナーが見つかりませんでした".to_string());
    };
    output::print(
        format!("{} でテストを実行します...", runner.run_cmd.join(" ")),
        ctx.verbosity,
    );
    if run_tests(&runner, ctx.git.workdir()) {
        DispatchResult::Done("テストは成功しました".to_string())
    } else {
        DispatchResult::Failed {
            message: "テストが失敗しました".to_string(),
            manual_action: true,
        }
    }
}

async fn update_issue_action(ctx: &PhaseContext, ws: &WorkStatus) -> DispatchResult {
    let Some(issue) = &ws.issue else {
        return DispatchResult::Done("このブランチに紐づくIssueがありません".to_string());
    };
    let comment = match ctx.prompter.input("進捗コメント", None) {
        Ok(comment) => comment,
        Err(PromptError::Cancelled) => return DispatchResult::Aborted,
        Err(e) => {
            return DispatchResult::Failed {
                message: format!("{}", e),
                manual_action: false,
            }
        }
    };
    match ctx.gateway.comment_issue(issue.number, &comment).await {
        Ok(()) => DispatchResult::Done(format!("Issue #{} にコメントしました", issue.number)),
        Err(e) => fail_from_error(ctx, e.into(), "update_issue").await,
    }
}

/// Run a git closure with dispatch-level retry: when recovery signals
/// retry, the closure is invoked again up to the handler's bound.
async fn git_action<F>(ctx: &PhaseContext, operation: &str, mut action: F) -> DispatchResult
where
    F: FnMut() -> Result<String, crate::git::GitError>,
{
    loop {
        match action() {
            Ok(message) => {
                ctx.errors.clear_retries(operation);
                return DispatchResult::Done(message);
            }
            Err(e) => match fail_from_error(ctx, e.into(), operation).await {
                DispatchResult::Failed { message, manual_action } => {
                    return DispatchResult::Failed { message, manual_action }
                }
                DispatchResult::Done(message) => return DispatchResult::Done(message),
                DispatchResult::Skipped => continue,
                DispatchResult::Aborted => return DispatchResult::Aborted,
            },
        }
    }
}

/// Route an error through the dispatcher and translate the disposition.
/// `Skipped` doubles as the retry signal for [`git_action`].
async fn fail_from_error(
    ctx: &PhaseContext,
    error: WorkflowError,
    operation: &str,
) -> DispatchResult {
    let tag = error.tag();
    let message = format!("{}", error);
    match ctx.dispose_error(error, operation).await {
        FailureDisposition::Retry => DispatchResult::Skipped,
        FailureDisposition::Recovered(message) => DispatchResult::Done(message),
        FailureDisposition::Continue(message) => DispatchResult::Done(message),
        FailureDisposition::Fatal(_) => DispatchResult::Failed {
            message,
            manual_action: tag == ErrorTag::MergeConflict,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_description_rules() {
        assert_eq!(
            validate_commit_description("add login form").unwrap(),
            "add login form"
        );
        assert!(validate_commit_description("").is_err());
        assert!(validate_commit_description("   ").is_err());
        assert!(validate_commit_description("Add login form").is_err());
        assert!(validate_commit_description("add login form.").is_err());
        assert!(validate_commit_description("ログイン画面を追加").is_ok());
        assert!(validate_commit_description("ログイン画面を追加。").is_err());
    }

    #[test]
    fn commit_types_map_to_conventional_prefixes() {
        let tags: Vec<&str> = COMMIT_TYPES.iter().map(|(tag, _)| *tag).collect();
        assert_eq!(tags, vec!["feat", "fix", "docs", "refactor", "test", "chore"]);
    }
}
