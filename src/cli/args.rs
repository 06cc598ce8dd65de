//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! The CLI surface is positional subcommands only; all further behavior
//! is driven by prompts. Three flags short-circuit into configuration
//! maintenance and exit.

use clap::{Parser, Subcommand};

/// teamflow - an interactive CLI for standardized team Git/GitHub workflows
#[derive(Parser, Debug)]
#[command(name = "tf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Validate configuration, print a report, and exit
    #[arg(long)]
    pub check_config: bool,

    /// Interactive first-time setup, then exit
    #[arg(long)]
    pub setup: bool,

    /// Best-effort configuration repair, then exit
    #[arg(long)]
    pub fix_config: bool,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start new work: choose a work type and issue, create a branch
    Start,

    /// Continue in-progress work: analyze state and run recommended actions
    #[command(name = "continue")]
    Continue,

    /// Finish work: commit, push, and open a pull request
    Finish,

    /// Show team-wide activity, PRs, and potential conflicts
    Team,

    /// Guided help and recovery
    #[command(name = "help-flow")]
    HelpFlow,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from(["tf", "start"]).unwrap();
        assert_eq!(cli.command, Some(Command::Start));

        let cli = Cli::try_parse_from(["tf", "continue"]).unwrap();
        assert_eq!(cli.command, Some(Command::Continue));

        let cli = Cli::try_parse_from(["tf", "help-flow"]).unwrap();
        assert_eq!(cli.command, Some(Command::HelpFlow));
    }

    #[test]
    fn config_flags_parse_without_subcommand() {
        let cli = Cli::try_parse_from(["tf", "--check-config"]).unwrap();
        assert!(cli.check_config);
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["tf", "--setup"]).unwrap();
        assert!(cli.setup);

        let cli = Cli::try_parse_from(["tf", "--fix-config"]).unwrap();
        assert!(cli.fix_config);
    }

    #[test]
    fn positional_args_beyond_subcommand_are_rejected() {
        assert!(Cli::try_parse_from(["tf", "start", "extra"]).is_err());
    }
}
