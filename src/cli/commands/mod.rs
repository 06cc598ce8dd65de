//! cli::commands
//!
//! Command handlers: context construction, phase dispatch, and the
//! configuration maintenance flags.

use std::sync::Arc;

use crate::backup::BackupStore;
use crate::core::config::{Config, ConfigFile};
use crate::core::logger::Logger;
use crate::core::paths::AppPaths;
use crate::core::types::{PhaseResult, PhaseStatus};
use crate::core::validate;
use crate::errors::ErrorHandler;
use crate::gateway::GitHubGateway;
use crate::git::GitAdapter;
use crate::notify::{discord::DiscordTransport, slack::SlackTransport, Notifier, Transport};
use crate::phases::{self, PhaseContext};
use crate::recovery::RecoveryManager;
use crate::ui::{output, Prompter, StdinPrompter, Verbosity};

use super::args::Command;

/// Build the phase context for the current directory.
///
/// Gateway initialization runs its full probe sequence; when it fails
/// the gateway is carried along in the unavailable state and phases
/// degrade gracefully.
pub async fn build_context(config: Config, verbosity: Verbosity) -> PhaseContext {
    let paths = AppPaths::default();
    let logger = Logger::open(&paths.log_file_path(), config.log_level);
    let git = GitAdapter::new(".");

    let remote_url = git.remote_url().ok().flatten();
    let gateway = GitHubGateway::connect(
        config.github_token.as_deref(),
        remote_url.as_deref(),
        &paths.offline_mode_path(),
    )
    .await;
    if let Some(reason) = gateway.unavailable_reason() {
        logger.warn(&format!("gateway unavailable: {}", reason));
        output::warn(reason, verbosity);
    }

    let backup = BackupStore::new(paths.clone());
    let recovery = RecoveryManager::new(paths.clone(), BackupStore::new(paths.clone()), logger.clone());
    let errors = Arc::new(ErrorHandler::new(logger.clone()));

    let mut transports: Vec<Box<dyn Transport>> = Vec::new();
    if let Some(token) = &config.slack_token {
        transports.push(Box::new(SlackTransport::new(
            token.clone(),
            config.slack_channel.clone(),
        )));
    }
    if let Some(url) = &config.discord_webhook_url {
        if validate::validate_discord_webhook(url).is_valid() {
            transports.push(Box::new(DiscordTransport::new(url.clone())));
        }
    }
    let notifier = Notifier::new(transports, logger.clone());

    PhaseContext {
        config,
        logger,
        paths,
        prompter: Box::new(StdinPrompter::new()),
        git,
        gateway: Arc::new(gateway),
        backup,
        recovery,
        errors,
        notifier,
        verbosity,
    }
}

/// Dispatch a subcommand to its phase.
pub async fn run_phase(command: Command, ctx: &PhaseContext) -> PhaseResult {
    match command {
        Command::Start => phases::start::run(ctx).await,
        Command::Continue => phases::continue_work::run(ctx).await,
        Command::Finish => phases::finish::run(ctx).await,
        Command::Team => phases::team::run(ctx).await,
        Command::HelpFlow => phases::help_flow::run(ctx).await,
    }
}

/// Exit code for a phase result: user aborts are successes.
pub fn exit_code_for(result: &PhaseResult) -> i32 {
    match result.status {
        PhaseStatus::Completed | PhaseStatus::Aborted => 0,
        PhaseStatus::Failed => 1,
    }
}

/// `--check-config`: validate configuration and print a report.
pub fn check_config(config: &Config, verbosity: Verbosity) -> i32 {
    let report = config.check();
    output::heading("設定チェック", verbosity);
    if report.findings.is_empty() {
        output::print("すべての設定が有効です", verbosity);
        return 0;
    }
    for finding in &report.findings {
        let level = if finding.blocking { "必須" } else { "任意" };
        output::print(
            format!("[{}] {}: {}", level, finding.key, finding.message),
            verbosity,
        );
    }
    if report.is_usable() {
        0
    } else {
        1
    }
}

/// `--setup`: interactive first-time setup writing the user-scope
/// config file.
pub fn setup(prompter: &dyn Prompter, verbosity: Verbosity) -> i32 {
    output::heading("初期設定", verbosity);

    let token = loop {
        let entered = match prompter.password("GitHubトークン (ghp_... / github_pat_...)") {
            Ok(entered) => entered,
            Err(_) => return 0,
        };
        let validated = validate::validate_token(&entered);
        match validated.into_result() {
            Ok(token) => break token,
            Err(error) => output::error(error),
        }
    };

    let slack_channel = match prompter.input("Slackチャンネル (任意、空欄でスキップ)", Some("")) {
        Ok(entered) if !entered.is_empty() => {
            match validate::validate_slack_channel(&entered).into_result() {
                Ok(channel) => Some(channel),
                Err(error) => {
                    output::error(error);
                    None
                }
            }
        }
        _ => None,
    };

    let file = ConfigFile {
        github_token: Some(token),
        slack_channel,
        ..Default::default()
    };
    match Config::write_global(&file) {
        Ok(path) => {
            output::print(format!("設定を保存しました: {}", path.display()), verbosity);
            0
        }
        Err(e) => {
            output::error(format!("設定を保存できませんでした: {}", e));
            1
        }
    }
}

/// `--fix-config`: best-effort repair.
pub fn fix_config(paths: &AppPaths, verbosity: Verbosity) -> i32 {
    match Config::fix(paths) {
        Ok(repairs) if repairs.is_empty() => {
            output::print("修復すべき項目はありませんでした", verbosity);
            0
        }
        Ok(repairs) => {
            for repair in repairs {
                output::print(repair, verbosity);
            }
            0
        }
        Err(e) => {
            output::error(format!("修復に失敗しました: {}", e));
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_status() {
        assert_eq!(exit_code_for(&PhaseResult::completed()), 0);
        assert_eq!(exit_code_for(&PhaseResult::aborted("user")), 0);
        assert_eq!(exit_code_for(&PhaseResult::failed("boom")), 1);
    }

    #[test]
    fn check_config_reports_missing_token() {
        let config = Config::default();
        assert_eq!(check_config(&config, Verbosity::Quiet), 1);

        let config = Config {
            github_token: Some(format!("ghp_{}", "a".repeat(36))),
            ..Default::default()
        };
        assert_eq!(check_config(&config, Verbosity::Quiet), 0);
    }

    #[test]
    fn fix_config_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        assert_eq!(fix_config(&paths, Verbosity::Quiet), 0);
        assert_eq!(fix_config(&paths, Verbosity::Quiet), 0);
    }
}
