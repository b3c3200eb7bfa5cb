use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use entitlement::RequestType;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "entitle")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(
    about = "Plan, validate and apply application entitlements for platform tenants",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/entitle/config.toml)
    #[arg(long, global = true, env = "ENTITLE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the transition plan, interface violations and execution tree
    Plan(PlanArgs),

    /// Show the module levels of one application
    Sequence(SequenceArgs),

    /// Execute an entitlement request
    Apply(ApplyArgs),

    /// Show the report of an executed request
    Status(StatusArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Shared arguments
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RequestKind {
    /// Add applications the tenant does not have
    Entitle,
    /// Move entitled applications to newer versions
    Upgrade,
    /// Remove entitled applications
    Revoke,
    /// Converge on exactly the given applications
    State,
}

impl From<RequestKind> for RequestType {
    fn from(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Entitle => Self::Entitle,
            RequestKind::Upgrade => Self::Upgrade,
            RequestKind::Revoke => Self::Revoke,
            RequestKind::State => Self::State,
        }
    }
}

#[derive(Args, Clone, Debug, Default)]
pub struct SourceArgs {
    /// Descriptor catalog, a JSON file or directory
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// State file with tenant entitlements and reports
    #[arg(long)]
    pub state: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct RequestArgs {
    /// Request type
    #[arg(value_enum)]
    pub request_type: RequestKind,

    /// Application ids (<name>-<version>)
    #[arg(required_unless_present = "allow_empty")]
    pub ids: Vec<String>,

    /// Allow an empty id list (a state request revoking everything)
    #[arg(long)]
    pub allow_empty: bool,

    /// Tenant to change
    #[arg(short, long)]
    pub tenant: String,

    #[command(flatten)]
    pub sources: SourceArgs,
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Args, Clone, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub request: RequestArgs,
}

#[derive(Args, Clone, Debug)]
pub struct SequenceArgs {
    /// Application id (<name>-<version>)
    pub app_id: String,

    /// Installed version of the application to sequence against
    #[arg(long)]
    pub installed: Option<String>,

    /// Sequence removal of the application
    #[arg(long, conflicts_with = "installed")]
    pub revoke: bool,

    /// Descriptor catalog, a JSON file or directory
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Show what would be done without executing
    #[arg(short, long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Keep independent branches running after a failure, no rollback
    #[arg(long)]
    pub ignore_errors: bool,

    /// Number of parallel stages
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Request id (generated when omitted)
    #[arg(long)]
    pub request_id: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct StatusArgs {
    /// Request id
    pub request_id: String,

    /// State file with tenant entitlements and reports
    #[arg(long)]
    pub state: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "entitle",
            "-vv",
            "apply",
            "upgrade",
            "app-a-1.1.0",
            "app-b-2.0.0",
            "--tenant",
            "diku",
            "--jobs",
            "2",
            "--ignore-errors",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.request.request_type, RequestKind::Upgrade);
        assert_eq!(args.request.ids, vec!["app-a-1.1.0", "app-b-2.0.0"]);
        assert_eq!(args.request.tenant, "diku");
        assert_eq!(args.jobs, Some(2));
        assert!(args.ignore_errors);
        assert!(!args.dry_run);
    }

    #[test]
    fn test_ids_required() {
        assert!(Cli::try_parse_from(["entitle", "plan", "entitle", "--tenant", "diku"]).is_err());
        let state = ["entitle", "plan", "state", "--tenant", "diku", "--allow-empty"];
        assert!(Cli::try_parse_from(state).is_ok());
    }

    #[test]
    fn test_sequence_revoke_conflicts_with_installed() {
        let result = Cli::try_parse_from([
            "entitle",
            "sequence",
            "app-a-2.0.0",
            "--installed",
            "app-a-1.0.0",
            "--revoke",
        ]);
        assert!(result.is_err());
    }
}
