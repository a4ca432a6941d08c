use actiongate::{AccessRequest, PolicyEvaluator};
use anyhow::{Context, Result};
use colored::Colorize;

use crate::cli::{CheckArgs, OutputFormat};
use crate::commands::{parse_json_arg, session_arg};
use crate::output::{print_denied, print_field, print_json, print_success, print_table};

pub fn check(evaluator: &PolicyEvaluator, args: &CheckArgs, format: OutputFormat) -> Result<()> {
    let action = args.target.action.as_str();
    let session = session_arg(args.target.session.as_deref())?;
    let object = args
        .object
        .as_deref()
        .map(parse_json_arg)
        .transpose()
        .context("Invalid --object")?;

    let mut request = AccessRequest::new(action, &session);
    if let Some(object) = &object {
        request = request.with_object(object);
    }
    let result = evaluator.evaluate_with_audit(&request);

    if matches!(format, OutputFormat::Json) {
        return print_json(&result);
    }

    match result.decision.deny_detail() {
        None if result.bypassed => print_success(&format!("{action}: allowed (trusted session)")),
        None => print_success(&format!("{action}: allowed")),
        Some(detail) => {
            print_denied(&format!("{action}: {}", "denied".red()));
            print_field("Code", detail.code.as_str());
            print_field("Reason", &detail.message);
            if let Some(key) = &detail.key {
                print_field("Policy", key.as_str());
            }
            if let Some(pattern) = &detail.matched_pattern {
                print_field("Pattern", pattern);
            }
        }
    }

    let rows = result
        .evaluated_policies
        .iter()
        .map(|p| {
            [
                p.key.as_str().to_string(),
                p.matched_pattern.clone().unwrap_or_else(|| "-".to_string()),
                serde_json::to_value(p.verdict)
                    .map(|v| crate::output::cell(&v))
                    .unwrap_or_default(),
                if p.checked_objects { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    println!();
    print_table(["Policy", "Pattern", "Verdict", "Objects checked"], rows);
    Ok(())
}
