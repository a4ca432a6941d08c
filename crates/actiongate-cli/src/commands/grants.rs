use actiongate::PolicyEvaluator;
use actiongate::policy::GrantSource;
use anyhow::Result;

use crate::cli::{ActionArgs, OutputFormat};
use crate::commands::session_arg;
use crate::output::{cell, print_json, print_table};

pub fn grants(evaluator: &PolicyEvaluator, args: &ActionArgs, format: OutputFormat) -> Result<()> {
    let session = session_arg(args.session.as_deref())?;
    let grants = evaluator.collect_grant_details(&args.action, &session);

    if matches!(format, OutputFormat::Json) {
        return print_json(&grants);
    }

    let rows = grants
        .iter()
        .map(|grant| {
            let (key, pattern) = match &grant.source {
                GrantSource::Bypass => ("(trusted session)".to_string(), "-".to_string()),
                GrantSource::Policy { key, pattern } => {
                    (key.as_str().to_string(), pattern.clone())
                }
            };
            let spec = serde_json::to_value(&grant.spec)
                .map(|v| cell(&v))
                .unwrap_or_default();
            [key, pattern, spec]
        })
        .collect();
    print_table(["Policy", "Pattern", "Grant"], rows);
    Ok(())
}
