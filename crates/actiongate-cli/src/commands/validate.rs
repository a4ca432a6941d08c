use std::path::Path;

use actiongate::policy::to_policy_entries;
use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::commands::load_documents;
use crate::output::{print_error, print_field, print_json, print_success};

/// Load the policy document and check every entry, reporting all problems.
pub async fn validate(source: &Path, format: OutputFormat) -> Result<()> {
    let documents = load_documents(source).await?;

    let problems: Vec<(String, String)> = documents
        .iter()
        .filter_map(|doc| {
            doc.validate()
                .err()
                .map(|e| (doc.key.as_str().to_string(), e.to_string()))
        })
        .collect();

    if !problems.is_empty() {
        for (key, problem) in &problems {
            print_error(&format!("policy '{key}': {problem}"));
        }
        anyhow::bail!(
            "{} of {} policies are invalid",
            problems.len(),
            documents.len()
        );
    }

    let entries = to_policy_entries(&documents)?;
    let patterns: usize = entries.iter().map(|e| e.actions.len()).sum();
    let wildcards: usize = documents.iter().map(|d| d.wildcard_pattern_count()).sum();

    match format {
        OutputFormat::Json => print_json(&json!({
            "source": source.display().to_string(),
            "valid": true,
            "entries": entries.len(),
            "patterns": patterns,
            "wildcardPatterns": wildcards,
        }))?,
        OutputFormat::Table => {
            print_success(&format!("{} is valid", source.display()));
            print_field("Entries", &entries.len().to_string());
            print_field("Patterns", &patterns.to_string());
            print_field("All-wildcard patterns", &wildcards.to_string());
            if wildcards > 0 {
                println!(
                    "{}",
                    "All-wildcard patterns grant or deny every action of their depth".yellow()
                );
            }
        }
    }
    Ok(())
}
