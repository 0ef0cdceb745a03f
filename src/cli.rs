use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI entry point for the configuration engine.
#[derive(Parser, Debug)]
#[command(
    name = "syscfg",
    about = "Atomic deployment and verification of host configuration files",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct GlobalOpts {
    /// No operator present: never prompt, boot rebuild failures abort the run
    #[arg(short = 'y', long, global = true)]
    pub unattended: bool,

    /// Rewrite files that already match and remove locally modified files
    #[arg(short, long, global = true)]
    pub force: bool,

    /// Preview changes without applying
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,

    /// Only show warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable coloured output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Print reports as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration state overlay (default /etc/syscfg/state.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Resolve system paths under this root instead of /
    #[arg(long, global = true, value_name = "DIR")]
    pub sysroot: Option<PathBuf>,

    /// Directory holding the lock marker (default /run/lock under the system root)
    #[arg(long, global = true, value_name = "DIR")]
    pub lock_dir: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install configuration files and activate them
    Deploy(DeployOpts),
    /// Show how installed files differ from the desired content
    Diff(DiffOpts),
    /// Check installed files against the catalog
    Verify,
    /// Check that the running system reflects the installed configuration
    VerifyRuntime,
    /// Check the catalog for internal consistency
    Lint,
    /// Remove installed configuration files
    Uninstall,
    /// Print version information
    Version,
}

impl Command {
    /// Name used for the run log file.
    #[must_use]
    pub const fn log_name(&self) -> &'static str {
        match self {
            Self::Deploy(_) => "deploy",
            Self::Diff(_) => "diff",
            Self::Verify => "verify",
            Self::VerifyRuntime => "verify-runtime",
            Self::Lint => "lint",
            Self::Uninstall => "uninstall",
            Self::Version => "version",
        }
    }
}

/// Options for the `deploy` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct DeployOpts {
    /// Skip specific tasks
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Run only specific tasks
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,
}

/// Options for the `diff` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct DiffOpts {
    /// Compare a single destination instead of the whole catalog
    pub path: Option<PathBuf>,
}
