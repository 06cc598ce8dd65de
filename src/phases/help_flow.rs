//! phases::help_flow
//!
//! The Help-Flow phase: urgency-routed assistance.
//!
//! High urgency routes to emergency handlers (restore from backup,
//! abort an in-progress merge/rebase, undo the last commit). Medium
//! urgency routes to fix handlers (authentication check, sync repair,
//! conflict walkthrough). Low urgency shows learning content. Every
//! destructive operation asks for confirmation, honoring
//! `CONFIRM_DESTRUCTIVE_ACTIONS`.

use crate::core::types::PhaseResult;
use crate::core::validate;
use crate::diagnosis;
use crate::ui::output;
use crate::ui::PromptError;

use super::context::PhaseContext;

/// Run the Help-Flow phase.
pub async fn run(ctx: &PhaseContext) -> PhaseResult {
    match route(ctx).await {
        Ok(result) => result,
        Err(PromptError::Cancelled) => PhaseResult::aborted("キャンセルされました"),
        Err(e) => PhaseResult::failed(format!("入力エラー: {}", e)),
    }
}

async fn route(ctx: &PhaseContext) -> Result<PhaseResult, PromptError> {
    let urgency_options: Vec<String> = [
        "高 - 作業が壊れた・すぐに戻したい",
        "中 - 何かがうまく動かない",
        "低 - 使い方を知りたい",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let urgency = ctx
        .prompter
        .select("どの程度お困りですか?", &urgency_options)?;

    match urgency {
        0 => emergency(ctx).await,
        1 => fixes(ctx).await,
        _ => Ok(learning(ctx)),
    }
}

/// High urgency: destructive recovery operations.
async fn emergency(ctx: &PhaseContext) -> Result<PhaseResult, PromptError> {
    let options: Vec<String> = [
        "バックアップから復元する",
        "進行中のmerge/rebaseを中止する",
        "直前のコミットを取り消す (変更は残す)",
        "戻る",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let choice = ctx.prompter.select("緊急対応を選択してください", &options)?;

    match choice {
        0 => restore_from_backup(ctx),
        1 => {
            if !ctx.confirm_destructive("進行中の操作を中止して作業ツリーをリセットします。よろしいですか?")? {
                return Ok(PhaseResult::aborted("キャンセルされました"));
            }
            match ctx.git.abort_in_progress() {
                Ok(()) => Ok(PhaseResult::completed()
                    .with_message("進行中の操作を中止しました")),
                Err(e) => Ok(PhaseResult::failed(format!("中止に失敗しました: {}", e))),
            }
        }
        2 => {
            if !ctx.confirm_destructive("直前のコミットを取り消します。よろしいですか?")? {
                return Ok(PhaseResult::aborted("キャンセルされました"));
            }
            match ctx.git.undo_last_commit() {
                Ok(()) => Ok(PhaseResult::completed()
                    .with_message("直前のコミットを取り消しました。変更はステージに残っています")),
                Err(e) => Ok(PhaseResult::failed(format!("取り消しに失敗しました: {}", e))),
            }
        }
        _ => Ok(PhaseResult::aborted("メニューに戻りました")),
    }
}

/// Restore the working tree from a selected backup.
fn restore_from_backup(ctx: &PhaseContext) -> Result<PhaseResult, PromptError> {
    let records = match ctx.backup.list() {
        Ok(records) => records,
        Err(e) => return Ok(PhaseResult::failed(format!("バックアップ一覧を取得できません: {}", e))),
    };
    if records.is_empty() {
        return Ok(PhaseResult::aborted("バックアップがありません"));
    }

    let options: Vec<String> = records
        .iter()
        .map(|record| {
            format!(
                "{} ({}) - {} [{}ファイル]",
                record.timestamp.format("%Y-%m-%d %H:%M"),
                record.operation,
                record.id,
                record.files.len()
            )
        })
        .collect();
    let index = ctx
        .prompter
        .select("復元するバックアップを選択してください", &options)?;
    let record = &records[index];

    if !ctx.confirm_destructive("作業ツリーをバックアップの内容で上書きします。よろしいですか?")? {
        return Ok(PhaseResult::aborted("キャンセルされました"));
    }

    match ctx.backup.restore(&record.id) {
        Ok(snapshot) => {
            let mut result =
                PhaseResult::completed().with_message(format!("{} から復元しました", record.id));
            // Best-effort: put the repository back on the recorded branch
            if let Some(branch) = snapshot.and_then(|s| s.current_branch) {
                match ctx.git.switch_branch(&branch) {
                    Ok(()) => {
                        result = result.with_message(format!("ブランチ {} に戻しました", branch))
                    }
                    Err(e) => {
                        output::warn(
                            format!("ブランチ {} に戻せませんでした: {}", branch, e),
                            ctx.verbosity,
                        );
                    }
                }
            }
            Ok(result)
        }
        Err(e) => Ok(PhaseResult::failed(format!("復元に失敗しました: {}", e))),
    }
}

/// Medium urgency: diagnose-and-fix handlers.
async fn fixes(ctx: &PhaseContext) -> Result<PhaseResult, PromptError> {
    let options: Vec<String> = [
        "GitHub認証を確認する",
        "リモートとの同期を確認する",
        "コンフリクトの解消手順を見る",
        "リポジトリを診断する",
        "戻る",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let choice = ctx.prompter.select("確認したい項目を選択してください", &options)?;

    match choice {
        0 => {
            output::heading("GitHub認証", ctx.verbosity);
            match &ctx.config.github_token {
                None => output::print(
                    "GITHUB_TOKENが未設定です。tf --setup で設定してください",
                    ctx.verbosity,
                ),
                Some(token) => {
                    let valid = validate::validate_token(token).is_valid();
                    output::print(
                        format!(
                            "トークン形式: {}",
                            if valid { "OK" } else { "不正な形式です" }
                        ),
                        ctx.verbosity,
                    );
                    output::print(
                        format!(
                            "API接続: {}",
                            match ctx.gateway.identity() {
                                Some(user) => format!("OK ({} として認証済み)", user),
                                None => "利用できません".to_string(),
                            }
                        ),
                        ctx.verbosity,
                    );
                }
            }
            Ok(PhaseResult::completed().with_message("認証確認を表示しました"))
        }
        1 => {
            output::heading("同期状態", ctx.verbosity);
            if let Err(e) = ctx.git.fetch() {
                output::warn(format!("fetchに失敗しました: {}", e), ctx.verbosity);
            }
            match ctx.git.status() {
                Ok(status) => {
                    output::print(
                        format!("ahead: {} / behind: {}", status.ahead, status.behind),
                        ctx.verbosity,
                    );
                    Ok(PhaseResult::completed().with_message("同期状態を表示しました"))
                }
                Err(e) => Ok(PhaseResult::failed(format!("{}", e))),
            }
        }
        2 => {
            output::heading("コンフリクト解消の手順", ctx.verbosity);
            for step in [
                "1. git status でコンフリクトしたファイルを確認",
                "2. 各ファイルを開き <<<<<<< / ======= / >>>>>>> を解消",
                "3. git add <file> で解消済みに",
                "4. rebase中なら git rebase --continue、mergeなら git commit",
                "5. やり直す場合は tf help-flow からバックアップ復元",
            ] {
                output::print(step, ctx.verbosity);
            }
            Ok(PhaseResult::completed().with_message("手順を表示しました"))
        }
        3 => {
            let report = diagnosis::diagnose(&ctx.git, &ctx.config.default_branch);
            output::heading("診断結果", ctx.verbosity);
            for issue in &report.issues {
                output::print(format!("問題: {}", issue.message), ctx.verbosity);
            }
            for warning in &report.warnings {
                output::warn(warning, ctx.verbosity);
            }
            for suggestion in &report.suggestions {
                output::print(format!("提案: {}", suggestion), ctx.verbosity);
            }
            if report.is_healthy() && report.warnings.is_empty() {
                output::print("問題は見つかりませんでした", ctx.verbosity);
            }
            let diagnostics = ctx.errors.diagnostics();
            output::print(
                format!(
                    "エラー集計: critical={} recoverable={} warning={} unknown={}",
                    diagnostics.critical,
                    diagnostics.recoverable,
                    diagnostics.warning,
                    diagnostics.unknown
                ),
                ctx.verbosity,
            );
            Ok(PhaseResult::completed().with_message("診断を表示しました"))
        }
        _ => Ok(PhaseResult::aborted("メニューに戻りました")),
    }
}

/// Low urgency: learning content.
fn learning(ctx: &PhaseContext) -> PhaseResult {
    output::heading("teamflow の使い方", ctx.verbosity);
    for line in [
        "tf start    - 作業を開始する (ブランチ作成、Issue紐づけ)",
        "tf continue - 作業を続ける (状況分析と推奨アクション)",
        "tf finish   - 作業を完了する (コミット、プッシュ、PR作成)",
        "tf team     - チーム全体の状況を見る",
        "",
        "ブランチ名は <種類>/issue-<番号>-<内容> の形式で自動生成されます",
        "コミットメッセージは Conventional Commits (feat: ... など) に従います",
        "すべての破壊的操作の前に自動でバックアップが作成されます",
    ] {
        output::print(line, ctx.verbosity);
    }
    PhaseResult::completed().with_message("学習コンテンツを表示しました")
}
