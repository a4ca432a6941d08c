pub mod check;
pub mod explain;
pub mod filter;
pub mod grants;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use actiongate::policy::{
    FilePolicySource, PolicyDocument, PolicySource, PolicyStore, to_policy_entries,
};
use actiongate::{AclConfig, PolicyEvaluator, Session};
use anyhow::{Context, Result};
use serde_json::Value;

/// Parse an argument given as inline JSON or `@path` to a JSON file.
pub fn parse_json_arg(raw: &str) -> Result<Value> {
    match raw.strip_prefix('@') {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {path}"))?;
            serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {path}"))
        }
        None => serde_json::from_str(raw).context("Invalid inline JSON"),
    }
}

/// Session from `--session`, anonymous when absent.
pub fn session_arg(raw: Option<&str>) -> Result<Session> {
    let Some(raw) = raw else {
        return Ok(Session::anonymous());
    };
    let value = parse_json_arg(raw).context("Invalid --session")?;
    if !value.is_object() {
        anyhow::bail!("--session must be a JSON object");
    }
    Ok(Session::new(value))
}

pub async fn load_documents(source: &Path) -> Result<Vec<PolicyDocument>> {
    FilePolicySource::new(source)
        .load()
        .await
        .with_context(|| format!("Failed to load policies from {}", source.display()))
}

/// Load the policy document into a fresh store and wrap it in an evaluator.
pub async fn load_evaluator(config: &AclConfig, source: &Path) -> Result<PolicyEvaluator> {
    let documents = load_documents(source).await?;
    let entries = to_policy_entries(&documents).context("Policy document is invalid")?;
    tracing::debug!(entries = entries.len(), source = %source.display(), "Policies loaded");

    let store = Arc::new(PolicyStore::with_entries(entries));
    Ok(PolicyEvaluator::new(store, config.evaluator_config())
        .with_coercion(Arc::new(config.coercion())))
}
