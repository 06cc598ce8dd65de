//! phases::finish
//!
//! The Finish phase: stage, commit, push, and optionally open a pull
//! request for the current branch.
//!
//! Finish refuses to run on the default branch (`main`/`master`). When
//! the branch name carries `issue-<N>-`, the PR body closes the issue.

use crate::core::naming;
use crate::core::types::{PhaseArtifacts, PhaseResult, PullRequest};
use crate::core::validate;
use crate::errors::WorkflowError;
use crate::gateway::CreatePrRequest;
use crate::git::{FileChangeTag, GitError};
use crate::notify::{Notification, NotifyKind};
use crate::ui::output;
use crate::ui::PromptError;

use super::context::{detect_test_runner, run_tests, FailureDisposition, PhaseContext};
use super::continue_work::validate_commit_description;

/// Reason string for the default-branch guard.
pub const ON_DEFAULT_BRANCH: &str = "ON_DEFAULT_BRANCH";

/// Commit types offered in the selector, matching the Continue phase.
const COMMIT_TYPES: [&str; 6] = ["feat", "fix", "docs", "refactor", "test", "chore"];

/// Run the Finish phase.
pub async fn run(ctx: &PhaseContext) -> PhaseResult {
    if !ctx.git.is_repository() {
        return PhaseResult::failed("Gitリポジトリではありません");
    }

    // Guard: never finish on the default branch
    let branch = match ctx.git.current_branch() {
        Ok(Some(branch)) => branch,
        Ok(None) => return PhaseResult::failed("HEADがブランチを指していません"),
        Err(e) => return fail_with(ctx, e.into(), "finish").await,
    };
    if is_default_branch(&branch, &ctx.config.default_branch) {
        output::error(format!(
            "{} ブランチでは finish を実行できません。tf start で作業ブランチを作成してください",
            branch
        ));
        return PhaseResult::failed(ON_DEFAULT_BRANCH);
    }

    match run_on_branch(ctx, &branch).await {
        Ok(result) => result,
        Err(PromptError::Cancelled) => PhaseResult::aborted("キャンセルされました"),
        Err(e) => PhaseResult::failed(format!("入力エラー: {}", e)),
    }
}

fn is_default_branch(branch: &str, configured_default: &str) -> bool {
    branch == configured_default || branch == "main" || branch == "master"
}

async fn run_on_branch(ctx: &PhaseContext, branch: &str) -> Result<PhaseResult, PromptError> {
    ctx.backup_before("finish");

    // Review changed files
    let changed = match ctx.git.changed_files() {
        Ok(changed) => changed,
        Err(e) => return Ok(fail_with(ctx, e.into(), "finish").await),
    };

    let mut committed = false;
    if changed.is_empty() {
        output::print("コミットする変更はありません", ctx.verbosity);
    } else {
        output::heading("変更されたファイル", ctx.verbosity);
        for file in &changed {
            output::print(format!("  {} {}", file.tag, file.path), ctx.verbosity);
        }

        // Select files to stage
        let stage_all = ctx
            .prompter
            .confirm("すべての変更をステージしますか?", true)?;
        if stage_all {
            if let Err(e) = ctx.git.stage_all() {
                return Ok(fail_with(ctx, e.into(), "finish").await);
            }
        } else {
            let mut selected = Vec::new();
            for file in &changed {
                if ctx
                    .prompter
                    .confirm(&format!("{} {} をステージしますか?", file.tag, file.path), true)?
                {
                    selected.push(file.path.clone());
                }
            }
            if selected.is_empty() {
                return Ok(PhaseResult::aborted("ステージ対象がありません"));
            }
            if let Err(e) = ctx.git.stage(&selected) {
                return Ok(fail_with(ctx, e.into(), "finish").await);
            }
        }

        // Compose the commit message
        let message = compose_commit_message(ctx, &changed)?;
        match ctx.git.commit(&message) {
            Ok(_) => {
                committed = true;
                output::print(format!("コミットしました: {}", message), ctx.verbosity);
            }
            Err(GitError::NothingToCommit) => {
                output::print("ステージされた変更がありませんでした", ctx.verbosity);
            }
            Err(e) => return Ok(fail_with(ctx, e.into(), "finish").await),
        }
    }

    // Optionally run tests
    if let Some(runner) = detect_test_runner(ctx.git.workdir()) {
        let run = ctx
            .prompter
            .confirm(&format!("テストを実行しますか? ({})", runner.run_cmd.join(" ")), true)?;
        if run {
            output::print("テストを実行しています...", ctx.verbosity);
            if !run_tests(&runner, ctx.git.workdir()) {
                output::warn("テストが失敗しました", ctx.verbosity);
                let proceed = ctx
                    .prompter
                    .confirm("テストが失敗しましたが続行しますか?", false)?;
                if !proceed {
                    return Ok(PhaseResult::aborted("テスト失敗のため中止しました"));
                }
            } else {
                output::print("テストは成功しました", ctx.verbosity);
            }
        }
    }

    // Push
    let status = ctx.git.status().unwrap_or_default();
    if !committed && status.ahead == 0 {
        return Ok(PhaseResult::aborted("プッシュする変更がありません"));
    }
    let push = ctx.config.auto_push
        || ctx.prompter.confirm("リモートにプッシュしますか?", true)?;
    if !push {
        return Ok(PhaseResult::aborted("プッシュせずに終了しました"));
    }
    let set_upstream = status.tracking.is_none();
    if let Err(e) = ctx.git.push(branch, set_upstream) {
        return Ok(fail_with(ctx, e.into(), "push").await);
    }
    output::print("プッシュしました", ctx.verbosity);

    // Optionally open a pull request
    let mut pr: Option<PullRequest> = None;
    if ctx.gateway.available() {
        let open_pr = ctx.config.auto_pr
            || ctx
                .prompter
                .confirm("プルリクエストを作成しますか?", true)?;
        if open_pr {
            pr = create_pull_request(ctx, branch).await?;
        }
    } else {
        output::warn(
            "GitHub連携が利用できないためPR作成をスキップします",
            ctx.verbosity,
        );
    }

    // Notify the team
    if ctx.notifier.is_configured() {
        let notify = ctx
            .prompter
            .confirm("チームに通知しますか?", true)
            .unwrap_or(false);
        if notify {
            let mut notification = Notification::new(
                NotifyKind::Success,
                "作業が完了しました",
                format!("ブランチ: {}", branch),
            );
            if let Some(pr) = &pr {
                notification = notification
                    .with_field("PR", format!("#{} {}", pr.number, pr.title))
                    .with_url(pr.url.clone());
            }
            ctx.notifier.notify(&notification).await;
        }
    }

    let mut result = PhaseResult::completed().with_message("finish が完了しました");
    result.artifacts = PhaseArtifacts {
        branch: Some(branch.to_string()),
        issue: None,
        pr,
    };
    Ok(result)
}

/// Commit-type selection plus validated description; an empty
/// description falls back to the generated summary message.
fn compose_commit_message(
    ctx: &PhaseContext,
    changed: &[crate::git::ChangedFile],
) -> Result<String, PromptError> {
    let options: Vec<String> = COMMIT_TYPES.iter().map(|s| s.to_string()).collect();
    let type_index = ctx.prompter.select("コミットの種類", &options)?;
    let commit_type = COMMIT_TYPES[type_index];

    loop {
        let text = ctx.prompter.input(
            "変更内容 (空欄で自動生成、小文字で始め、句点で終えない)",
            Some(""),
        )?;
        if text.trim().is_empty() {
            // Autogenerate from working-tree status
            let auto = ctx.git.auto_commit_message().unwrap_or_else(|_| {
                let added = changed
                    .iter()
                    .filter(|f| matches!(f.tag, FileChangeTag::Added | FileChangeTag::Untracked))
                    .count();
                let modified = changed
                    .iter()
                    .filter(|f| matches!(f.tag, FileChangeTag::Modified | FileChangeTag::Renamed))
                    .count();
                let deleted = changed
                    .iter()
                    .filter(|f| matches!(f.tag, FileChangeTag::Deleted))
                    .count();
                format!(
                    "Update: add {} files, modify {} files, delete {} files",
                    added, modified, deleted
                )
            });
            return Ok(auto);
        }
        match validate_commit_description(&text) {
            Ok(description) => {
                let message = format!("{}: {}", commit_type, description);
                match validate::validate_commit_message(&message).into_result() {
                    Ok(message) => return Ok(message),
                    Err(error) => output::error(error),
                }
            }
            Err(error) => output::error(error),
        }
    }
}

/// Build and create the pull request, including issue linkage and
/// reviewer suggestion.
async fn create_pull_request(
    ctx: &PhaseContext,
    branch: &str,
) -> Result<Option<PullRequest>, PromptError> {
    let default_title = pr_title_from_branch(branch);
    let title = ctx.prompter.input("PRタイトル", Some(&default_title))?;
    let body = build_pr_body(branch);

    let mut reviewers = Vec::new();
    match ctx.gateway.suggest_reviewers(&[]).await {
        Ok(candidates) if !candidates.is_empty() => {
            let mut options: Vec<String> = candidates.clone();
            options.push("レビュアーなし".to_string());
            let index = ctx
                .prompter
                .select("レビュアーを選択してください", &options)?;
            if index < candidates.len() {
                reviewers.push(candidates[index].clone());
            }
        }
        Ok(_) => {}
        Err(e) => ctx.logger.warn(&format!("reviewer suggestion failed: {}", e)),
    }

    let request = CreatePrRequest {
        head: branch.to_string(),
        base: ctx.config.default_branch.clone(),
        title,
        body: Some(body),
        draft: false,
        reviewers,
    };

    match ctx.gateway.create_pr(request).await {
        Ok(pr) => {
            output::print(format!("PR #{} を作成しました: {}", pr.number, pr.url), ctx.verbosity);
            if ctx
                .prompter
                .confirm("ブラウザでPRを開きますか?", false)
                .unwrap_or(false)
            {
                let _ = open::that(&pr.url);
            }
            Ok(Some(pr))
        }
        Err(e) if e.is_already_exists() => {
            output::warn("このブランチのPRは既に存在します", ctx.verbosity);
            Ok(None)
        }
        Err(e) if e.is_no_commits_between() => {
            output::warn(
                "ベースブランチとの間にコミットがないためPRを作成できません",
                ctx.verbosity,
            );
            Ok(None)
        }
        Err(e) => {
            let _ = ctx.dispose_error(e.into(), "create_pr").await;
            Ok(None)
        }
    }
}

/// Default PR title derived from the branch name.
pub fn pr_title_from_branch(branch: &str) -> String {
    let tail = branch.rsplit('/').next().unwrap_or(branch);
    let without_issue = match naming::issue_number_from_branch(branch) {
        Some(number) => tail
            .strip_prefix(&format!("issue-{}-", number))
            .unwrap_or(tail),
        None => tail,
    };
    without_issue.replace('-', " ")
}

/// PR body, closing the encoded issue when present.
pub fn build_pr_body(branch: &str) -> String {
    let mut body = String::from("## 概要\n\nこのPRは以下のブランチの作業をまとめたものです。\n\n");
    body.push_str(&format!("- ブランチ: `{}`\n", branch));
    if let Some(number) = naming::issue_number_from_branch(branch) {
        body.push_str(&format!("\nCloses #{}\n", number));
    }
    body
}

async fn fail_with(ctx: &PhaseContext, error: WorkflowError, operation: &str) -> PhaseResult {
    let message = format!("{}", error);
    match ctx.dispose_error(error, operation).await {
        FailureDisposition::Recovered(message) => {
            PhaseResult::aborted(format!("復旧しました: {}。再実行してください", message))
        }
        FailureDisposition::Continue(message) => PhaseResult::completed().with_message(message),
        FailureDisposition::Retry | FailureDisposition::Fatal(_) => PhaseResult::failed(message),
    }
}
