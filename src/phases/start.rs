//! phases::start
//!
//! The Start phase: begin work on a new branch.
//!
//! # State machine
//!
//! ```text
//! Idle -> CheckRepo -> CheckClean -> ChooseWorkType -> ChooseIssue
//!      -> BuildBranchPlan -> ScanConflicts -> Backup -> CreateBranch
//!      -> NotifyTeam -> Done
//! ```
//!
//! Tie-breaks:
//! - dirty tree, stash declined: terminate with `DIRTY_TREE`
//! - plan collides with a local branch: offer switching to it instead
//! - a remote branch already carries the issue number: require explicit
//!   confirmation
//! - branches are only created from the default branch unless the
//!   operator explicitly confirms a non-default base

use crate::core::naming;
use crate::core::types::{Issue, PhaseArtifacts, PhaseResult, WorkType};
use crate::core::validate;
use crate::errors::WorkflowError;
use crate::notify::{Notification, NotifyKind};
use crate::ui::output;
use crate::ui::PromptError;

use super::context::{FailureDisposition, PhaseContext};

/// Reason string for the dirty-tree termination.
pub const DIRTY_TREE: &str = "DIRTY_TREE";

/// The Start phase states. Transitions are total: every state maps to
/// exactly one follow-up given its inputs.
#[derive(Debug)]
enum StartState {
    Idle,
    CheckRepo,
    CheckClean,
    ChooseWorkType,
    ChooseIssue {
        work_type: WorkType,
    },
    BuildBranchPlan {
        work_type: WorkType,
        issue: Option<Issue>,
    },
    ScanConflicts {
        plan: crate::core::types::BranchPlan,
        issue: Option<Issue>,
    },
    CreateBranch {
        plan: crate::core::types::BranchPlan,
        issue: Option<Issue>,
    },
    NotifyTeam {
        branch: String,
        issue: Option<Issue>,
    },
    Done(PhaseResult),
}

/// Run the Start phase.
pub async fn run(ctx: &PhaseContext) -> PhaseResult {
    let mut state = StartState::Idle;
    loop {
        state = match step(ctx, state).await {
            Ok(StartState::Done(result)) => return result,
            Ok(next) => next,
            Err(PromptError::Cancelled) => {
                return PhaseResult::aborted("キャンセルされました");
            }
            Err(e) => return PhaseResult::failed(format!("入力エラー: {}", e)),
        };
    }
}

async fn step(ctx: &PhaseContext, state: StartState) -> Result<StartState, PromptError> {
    match state {
        StartState::Idle => Ok(StartState::CheckRepo),

        StartState::CheckRepo => {
            if !ctx.git.is_repository() {
                return Ok(StartState::Done(PhaseResult::failed(
                    "Gitリポジトリではありません。git init または git clone を実行してください",
                )));
            }
            Ok(StartState::CheckClean)
        }

        StartState::CheckClean => {
            let status = match ctx.git.status() {
                Ok(status) => status,
                Err(e) => {
                    return Ok(StartState::Done(fail_with(ctx, e.into(), "start").await));
                }
            };

            if !status.is_clean() {
                output::print(
                    format!(
                        "未コミットの変更が{}件あります",
                        status.uncommitted_count()
                    ),
                    ctx.verbosity,
                );
                let stash = ctx
                    .prompter
                    .confirm("変更をスタッシュして続行しますか?", true)?;
                if !stash {
                    return Ok(StartState::Done(PhaseResult::aborted(DIRTY_TREE)));
                }
                if let Err(e) = ctx.git.stash_push("teamflow: start前の退避") {
                    return Ok(StartState::Done(fail_with(ctx, e.into(), "start").await));
                }
                output::print("変更をスタッシュしました", ctx.verbosity);
            }

            // Branches grow from the default branch unless the operator
            // explicitly asks otherwise
            if status.current_branch.as_deref() != Some(ctx.config.default_branch.as_str()) {
                let stay = ctx.prompter.confirm(
                    &format!(
                        "現在のブランチは {} です。このブランチを基点に作成しますか? (いいえで {} に切り替え)",
                        status.current_branch.as_deref().unwrap_or("(detached)"),
                        ctx.config.default_branch
                    ),
                    false,
                )?;
                if !stay {
                    if let Err(e) = ctx.git.switch_branch(&ctx.config.default_branch) {
                        return Ok(StartState::Done(fail_with(ctx, e.into(), "start").await));
                    }
                }
            }

            Ok(StartState::ChooseWorkType)
        }

        StartState::ChooseWorkType => {
            let options: Vec<String> = WorkType::all()
                .iter()
                .map(|wt| format!("{} - {}", wt.display_name(), wt.blurb()))
                .collect();
            let index = ctx.prompter.select("作業の種類を選択してください", &options)?;
            Ok(StartState::ChooseIssue {
                work_type: WorkType::all()[index],
            })
        }

        StartState::ChooseIssue { work_type } => {
            let issue = choose_issue(ctx).await?;
            Ok(StartState::BuildBranchPlan { work_type, issue })
        }

        StartState::BuildBranchPlan { work_type, issue } => {
            let default_description = issue.as_ref().map(|i| i.title.clone());
            let description = ctx.prompter.input(
                "作業内容を短く入力してください",
                default_description.as_deref(),
            )?;

            let plan =
                naming::build_branch_plan(work_type, issue.as_ref().map(|i| i.number), &description);

            let validated = validate::validate_branch_name(&plan.full_name);
            if !validated.is_valid() {
                output::error(validated.error().unwrap_or("ブランチ名が不正です"));
                // Loop back for a new description
                return Ok(StartState::BuildBranchPlan { work_type, issue });
            }

            output::print(format!("ブランチ名: {}", plan.full_name), ctx.verbosity);
            Ok(StartState::ScanConflicts { plan, issue })
        }

        StartState::ScanConflicts { plan, issue } => {
            // Local collision: offer switching instead of creating
            match ctx.git.branch_exists(&plan.full_name) {
                Ok(true) => {
                    let switch = ctx.prompter.confirm(
                        &format!(
                            "ブランチ {} は既に存在します。切り替えますか?",
                            plan.full_name
                        ),
                        true,
                    )?;
                    if switch {
                        if let Err(e) = ctx.git.switch_branch(&plan.full_name) {
                            return Ok(StartState::Done(fail_with(ctx, e.into(), "start").await));
                        }
                        let mut result = PhaseResult::completed()
                            .with_message(format!("{} に切り替えました", plan.full_name));
                        result.artifacts = PhaseArtifacts {
                            branch: Some(plan.full_name),
                            issue,
                            pr: None,
                        };
                        return Ok(StartState::Done(result));
                    }
                    return Ok(StartState::Done(PhaseResult::aborted(
                        "既存ブランチとの衝突のため中止しました",
                    )));
                }
                Ok(false) => {}
                Err(e) => {
                    return Ok(StartState::Done(fail_with(ctx, e.into(), "start").await));
                }
            }

            // A remote branch already carrying the issue number needs an
            // explicit go-ahead
            if let Some(number) = plan.issue_number {
                let marker = format!("issue-{}-", number);
                let remote_hit = ctx
                    .git
                    .remote_branches()
                    .unwrap_or_default()
                    .into_iter()
                    .find(|name| name.contains(&marker));
                if let Some(existing) = remote_hit {
                    output::warn(
                        format!(
                            "Issue #{} のリモートブランチが既に存在します: {}",
                            number, existing
                        ),
                        ctx.verbosity,
                    );
                    let proceed = ctx
                        .prompter
                        .confirm("それでも新しいブランチを作成しますか?", false)?;
                    if !proceed {
                        return Ok(StartState::Done(PhaseResult::aborted(
                            "リモートブランチとの重複のため中止しました",
                        )));
                    }
                }
            }

            Ok(StartState::CreateBranch { plan, issue })
        }

        StartState::CreateBranch { plan, issue } => {
            ctx.backup_before("start");

            match ctx.git.create_and_switch_branch(&plan.full_name) {
                Ok(()) => Ok(StartState::NotifyTeam {
                    branch: plan.full_name,
                    issue,
                }),
                Err(e) => Ok(StartState::Done(fail_with(ctx, e.into(), "start").await)),
            }
        }

        StartState::NotifyTeam { branch, issue } => {
            if ctx.notifier.is_configured() {
                let mut notification = Notification::new(
                    NotifyKind::Info,
                    "作業を開始しました",
                    format!("ブランチ: {}", branch),
                );
                if let Some(issue) = &issue {
                    notification = notification
                        .with_field("Issue", format!("#{} {}", issue.number, issue.title))
                        .with_url(issue.url.clone());
                }
                ctx.notifier.notify(&notification).await;
            }

            let mut result = PhaseResult::completed()
                .with_message(format!("ブランチ {} を作成しました", branch));
            result.artifacts = PhaseArtifacts {
                branch: Some(branch),
                issue,
                pr: None,
            };
            Ok(StartState::Done(result))
        }

        StartState::Done(result) => Ok(StartState::Done(result)),
    }
}

/// Issue selection: list open issues when the gateway is available,
/// offer creating a new one, or proceed without.
async fn choose_issue(ctx: &PhaseContext) -> Result<Option<Issue>, PromptError> {
    if !ctx.gateway.available() {
        output::print(
            "GitHub連携が利用できないため、Issueなしで続行します",
            ctx.verbosity,
        );
        return Ok(None);
    }

    let issues = match ctx.gateway.list_open_issues().await {
        Ok(issues) => issues,
        Err(e) => {
            ctx.logger.warn(&format!("issue list failed: {}", e));
            output::warn(
                "Issue一覧を取得できませんでした。Issueなしで続行します",
                ctx.verbosity,
            );
            return Ok(None);
        }
    };

    let mut options: Vec<String> = issues
        .iter()
        .map(|issue| format!("#{} {}", issue.number, issue.title))
        .collect();
    options.push("新しいIssueを作成".to_string());
    options.push("Issueなしで進める".to_string());

    let index = ctx.prompter.select("対応するIssueを選択してください", &options)?;

    if index < issues.len() {
        return Ok(Some(issues[index].clone()));
    }
    if index == issues.len() {
        // Create a new issue
        let title = ctx.prompter.input("Issueのタイトル", None)?;
        let body = ctx.prompter.input("Issueの説明 (任意)", Some(""))?;
        match ctx.gateway.create_issue(&title, &body).await {
            Ok(issue) => {
                output::print(format!("Issue #{} を作成しました", issue.number), ctx.verbosity);
                return Ok(Some(issue));
            }
            Err(e) => {
                output::warn(format!("Issueを作成できませんでした: {}", e), ctx.verbosity);
                return Ok(None);
            }
        }
    }
    Ok(None)
}

/// Terminal failure helper: run the error through the dispatcher and
/// shape the phase result.
async fn fail_with(ctx: &PhaseContext, error: WorkflowError, operation: &str) -> PhaseResult {
    let message = format!("{}", error);
    match ctx.dispose_error(error, operation).await {
        FailureDisposition::Recovered(message) => {
            PhaseResult::aborted(format!("復旧しました: {}。再実行してください", message))
        }
        FailureDisposition::Continue(message) => {
            let mut result = PhaseResult::completed();
            result.messages.push(message);
            result
        }
        FailureDisposition::Retry | FailureDisposition::Fatal(_) => PhaseResult::failed(message),
    }
}
