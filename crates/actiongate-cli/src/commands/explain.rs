use actiongate::PolicyEvaluator;
use actiongate::policy::ActionName;
use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::cli::{ExplainArgs, OutputFormat};
use crate::output::{cell, print_field, print_json, print_table};

/// Show every entry whose action table mentions the action, ignoring sessions.
pub fn explain(evaluator: &PolicyEvaluator, args: &ExplainArgs, format: OutputFormat) -> Result<()> {
    let action = ActionName::parse_with_limit(
        &args.action,
        evaluator.config().max_action_segments,
    )
    .with_context(|| format!("Invalid action '{}'", args.action))?;
    let candidates: Vec<String> = action.candidates().collect();
    let matches = evaluator
        .find_by_action(action.as_str())
        .with_context(|| format!("Invalid action '{}'", args.action))?;

    if matches!(format, OutputFormat::Json) {
        let entries: Vec<Value> = matches
            .iter()
            .map(|m| {
                json!({
                    "key": m.entry.key,
                    "pattern": m.pattern,
                    "session": m.entry.session.to_map(),
                    "spec": m.spec(),
                    "description": m.entry.description,
                })
            })
            .collect();
        return print_json(&json!({
            "action": action.as_str(),
            "candidates": candidates,
            "entries": entries,
        }));
    }

    print_field("Lookup order", &candidates.join(" → "));
    let rows = matches
        .iter()
        .map(|m| {
            let session = if m.entry.session.is_empty() {
                "(any)".to_string()
            } else {
                cell(&json!(m.entry.session.to_map()))
            };
            let spec = serde_json::to_value(m.spec())
                .map(|v| cell(&v))
                .unwrap_or_default();
            [m.entry.key.as_str().to_string(), m.pattern.clone(), session, spec]
        })
        .collect();
    print_table(["Policy", "Pattern", "Session", "Spec"], rows);
    Ok(())
}
