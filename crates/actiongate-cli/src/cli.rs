use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "actiongate")]
#[command(about = "ActionGate CLI - ask a policy document who may do what")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Engine configuration file (TOML)
    #[arg(short, long, global = true, env = "ACTIONGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Policy document (JSON or TOML), overrides policy.source from the config
    #[arg(short, long, global = true, env = "ACTIONGATE_POLICIES")]
    pub policies: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decide whether a session may perform an action
    Check(CheckArgs),
    /// List the grants a session holds for an action
    Grants(ActionArgs),
    /// Derive the read filter for an action
    Filter(ActionArgs),
    /// Show which entries mention an action, regardless of session
    Explain(ExplainArgs),
    /// Load and validate the policy document
    Validate,
}

#[derive(clap::Args)]
pub struct ActionArgs {
    /// Action name (e.g. posts.find)
    pub action: String,
    /// Session as inline JSON or @path to a JSON file (anonymous if omitted)
    #[arg(short, long)]
    pub session: Option<String>,
}

#[derive(clap::Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub target: ActionArgs,
    /// Target object as inline JSON or @path to a JSON file
    #[arg(short, long)]
    pub object: Option<String>,
}

#[derive(clap::Args)]
pub struct ExplainArgs {
    /// Action name (e.g. posts.find)
    pub action: String,
}
