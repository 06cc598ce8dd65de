//! cli
//!
//! Command-line interface layer.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and flags
//! - Construct the phase context and delegate to command handlers
//! - Translate phase results into process exit codes
//!
//! Exit codes: 0 for success and user aborts, 1 for failures. A
//! termination signal runs the registered cleanups and exits 0.

pub mod args;
pub mod commands;

pub use args::{Cli, Command};

use crate::core::config::Config;
use crate::core::logger::{Logger, LogLevel};
use crate::core::paths::AppPaths;
use crate::errors::ErrorHandler;
use crate::ui::{output, StdinPrompter, Verbosity};

/// Run the CLI application. Returns the process exit code.
pub fn run() -> i32 {
    let cli = Cli::parse_args();
    let verbosity = Verbosity::from_flags(cli.quiet, cli.debug);

    let paths = AppPaths::default();
    let config = match Config::load(&paths) {
        Ok(config) => config,
        Err(e) => {
            output::error(format!("設定の読み込みに失敗しました: {}", e));
            output::error("tf --fix-config で修復を試せます");
            return 1;
        }
    };

    let log_level = if cli.debug {
        LogLevel::Debug
    } else {
        config.log_level
    };
    let logger = Logger::open(&paths.log_file_path(), log_level);
    ErrorHandler::install_panic_hook(logger.clone());

    // Maintenance flags short-circuit before any phase runs
    if cli.check_config {
        return commands::check_config(&config, verbosity);
    }
    if cli.setup {
        return commands::setup(&StdinPrompter::new(), verbosity);
    }
    if cli.fix_config {
        return commands::fix_config(&paths, verbosity);
    }

    let Some(command) = cli.command else {
        output::error("コマンドを指定してください (start / continue / finish / team / help-flow)");
        return 1;
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            output::error(format!("ランタイムの初期化に失敗しました: {}", e));
            return 1;
        }
    };

    runtime.block_on(async move {
        let ctx = commands::build_context(config, verbosity).await;

        // Graceful shutdown: run cleanups and exit 0 on Ctrl-C
        let errors = ctx.errors.clone();
        let shutdown_logger = ctx.logger.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown_logger.info("interrupt received, shutting down");
                errors.run_cleanups();
                std::process::exit(0);
            }
        });

        let result = commands::run_phase(command, &ctx).await;
        for message in &result.messages {
            ctx.logger.info(message);
        }
        ctx.errors.run_cleanups();
        commands::exit_code_for(&result)
    })
}
