mod cli;
mod commands;
mod observability;
mod output;

use std::path::{Path, PathBuf};

use actiongate::AclConfig;
use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();

    observability::init_tracing_with_level(
        observability::verbosity_level(cli.verbose).unwrap_or("warn"),
    );

    let config = load_config(cli.config.as_deref())?;
    if observability::verbosity_level(cli.verbose).is_none() {
        observability::apply_logging_level(&config.logging.level);
    }

    let source = resolve_source(cli.policies.as_deref(), &config)?;

    match &cli.command {
        Commands::Validate => {
            commands::validate::validate(&source, format).await?;
        }
        Commands::Check(args) => {
            let evaluator = commands::load_evaluator(&config, &source).await?;
            commands::check::check(&evaluator, args, format)?;
        }
        Commands::Grants(args) => {
            let evaluator = commands::load_evaluator(&config, &source).await?;
            commands::grants::grants(&evaluator, args, format)?;
        }
        Commands::Filter(args) => {
            let evaluator = commands::load_evaluator(&config, &source).await?;
            commands::filter::filter(&evaluator, args, format)?;
        }
        Commands::Explain(args) => {
            let evaluator = commands::load_evaluator(&config, &source).await?;
            commands::explain::explain(&evaluator, args, format)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AclConfig> {
    match path {
        Some(path) => AclConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(AclConfig::default()),
    }
}

fn resolve_source(policies: Option<&Path>, config: &AclConfig) -> Result<PathBuf> {
    policies
        .map(Path::to_path_buf)
        .or_else(|| config.policy.source.clone())
        .context("No policy document: pass --policies or set policy.source in the config")
}
