//! Expression playground
//!
//! Evaluates one tariff expression against the context a bill record would
//! produce, which is how a failing formula in a tariff document gets debugged.

use anyhow::{Context as _, Result};
use clap::Args;
use colored::*;
use tariff_calc::{evaluate_formula, Context, Value};
use tariff_rules::UsageRecord;

#[derive(Args)]
pub struct EvalArgs {
    /// Expression, e.g. "user.billed_kwh * 0.0881"
    pub expression: String,

    /// Bill record as JSON (fields of a bills file row)
    #[arg(short, long)]
    pub record: Option<String>,

    /// Print the evaluation context before the result
    #[arg(long)]
    pub show_context: bool,
}

pub fn handle_command(args: EvalArgs) -> Result<()> {
    let context = build_context(args.record.as_deref())?;

    if args.show_context {
        for name in context.names() {
            let value = context.get(name).cloned().unwrap_or(Value::None);
            println!("{} = {}", name.cyan(), value);
        }
        println!();
    }

    let value = evaluate_formula(&args.expression, &context)
        .with_context(|| format!("Failed to evaluate '{}'", args.expression))?;
    println!("{}", value.to_string().green());
    Ok(())
}

fn build_context(record: Option<&str>) -> Result<Context> {
    let record: UsageRecord = match record {
        Some(json) => serde_json::from_str(json).context("Invalid --record JSON")?,
        None => UsageRecord::default(),
    };
    Ok(record.to_context())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_context_from_record() {
        let context =
            build_context(Some(r#"{"billed_demand": "55", "delivery_voltage_kv": 13.2}"#)).unwrap();
        let value = evaluate_formula("min(40, user.billed_demand)", &context).unwrap();
        assert_eq!(value, Value::Number(40.0));

        let value = evaluate_formula("delivery_voltage > 2.2", &context).unwrap();
        assert_eq!(value, Value::Bool(true));
    }

    #[test]
    fn test_default_context() {
        let context = build_context(None).unwrap();
        let value = evaluate_formula("user.days_used", &context).unwrap();
        assert_eq!(value, Value::Number(30.0));
        assert_eq!(
            evaluate_formula("delivery_voltage", &context).unwrap(),
            Value::None
        );
    }

    #[test]
    fn test_invalid_record() {
        assert!(build_context(Some("[1, 2")).is_err());
    }
}
