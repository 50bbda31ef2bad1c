use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "warren")]
#[command(version)]
#[command(about = "Converge a host into a RabbitMQ broker node", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to the first of the standard locations)
    #[arg(short, long, global = true, env = "WARREN_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge this host
    Apply(ApplyArgs),

    /// Show what apply would change, without changing anything
    Plan(TargetArgs),

    /// Show detected platform facts and node attributes
    Facts(TargetArgs),

    /// List the resolved run list
    Resources(TargetArgs),

    /// Check config and script for every supported platform
    Validate(ValidateArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// What to converge, and as which platform
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// TOML script file to run instead of the built-in broker recipe
    #[arg(short, long, value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// Treat the host as this platform (e.g. `debian`, `centos:6`)
    #[arg(short, long, value_name = "ID[:VERSION]")]
    pub platform: Option<String>,

    /// Fail when the platform has no branch instead of skipping it
    #[arg(long)]
    pub strict_platform: bool,
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Dry run - show what would be done
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Also write the run report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// TOML script file to validate instead of the built-in broker recipe
    #[arg(short, long, value_name = "FILE")]
    pub script: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::try_parse_from([
            "warren",
            "-vv",
            "apply",
            "--dry-run",
            "--yes",
            "--platform",
            "centos:6",
            "--script",
            "broker.toml",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert!(args.dry_run);
        assert!(args.yes);
        assert_eq!(args.target.platform.as_deref(), Some("centos:6"));
        assert_eq!(args.target.script, Some(PathBuf::from("broker.toml")));
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["warren", "plan", "--config", "/etc/warren/mq.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/warren/mq.toml")));
        assert!(matches!(cli.command, Command::Plan(_)));
    }
}
