use actiongate::{FilterExpression, PolicyEvaluator};
use anyhow::Result;
use colored::Colorize;

use crate::cli::{ActionArgs, OutputFormat};
use crate::commands::session_arg;
use crate::output::{cell, print_json, print_table};

pub fn filter(evaluator: &PolicyEvaluator, args: &ActionArgs, format: OutputFormat) -> Result<()> {
    let session = session_arg(args.session.as_deref())?;
    let expression = evaluator.build_filter_expression(&args.action, &session);

    if matches!(format, OutputFormat::Json) {
        return print_json(&expression);
    }

    match &expression {
        FilterExpression::Unrestricted => println!("{}", "unrestricted (no filter)".green()),
        FilterExpression::Nothing => println!("{}", "nothing (every record filtered out)".red()),
        FilterExpression::AnyOf(clauses) => {
            println!("{} {} clause(s), any may match", "Filter:".cyan(), clauses.len());
            let rows = clauses
                .iter()
                .enumerate()
                .flat_map(|(i, clause)| {
                    clause.fields().iter().map(move |(field, value)| {
                        let value = serde_json::to_value(value)
                            .map(|v| cell(&v))
                            .unwrap_or_default();
                        [(i + 1).to_string(), field.clone(), value]
                    })
                })
                .collect();
            print_table(["Clause", "Field", "Value"], rows);
        }
    }
    Ok(())
}
