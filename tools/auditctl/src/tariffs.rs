//! Tariff document inspection

use anyhow::{bail, Result};
use clap::Subcommand;
use colored::*;
use std::fmt::Write as _;
use tariff_rules::{normalize_sc_code, LogicStep, RuleStore, StepKind, TariffDefinition};

#[derive(Subcommand)]
pub enum TariffCommands {
    /// List loaded service classifications
    List,

    /// Show one classification's logic steps
    Show {
        /// Service class code (any spelling, e.g. "SC-3" or "sc 3")
        sc_code: String,
    },
}

pub fn handle_command(command: TariffCommands, store: &RuleStore) -> Result<()> {
    match command {
        TariffCommands::List => {
            if store.is_empty() {
                println!("{}", "No tariffs loaded".yellow());
                return Ok(());
            }
            println!("{:<10} {:>6}  {}", "SC".bold(), "Steps".bold(), "Description".bold());
            for tariff in store.iter() {
                print!("{}", list_line(tariff));
            }
            println!("\n{} tariffs", store.len());
        },
        TariffCommands::Show { sc_code } => {
            let normalized = normalize_sc_code(&sc_code);
            let Some(tariff) = store.get(&normalized) else {
                bail!("No tariff for {} (normalized={})", sc_code, normalized);
            };
            print!("{}", describe(tariff));
        },
    }
    Ok(())
}

fn list_line(tariff: &TariffDefinition) -> String {
    let steps = if tariff.logic_steps.is_empty() {
        "-".dimmed().to_string()
    } else {
        tariff.logic_steps.len().to_string()
    };
    let description = tariff
        .description
        .as_deref()
        .or(tariff.notes.as_deref())
        .unwrap_or_default();
    format!("{:<10} {:>6}  {}\n", tariff.sc_code, steps, description)
}

fn describe(tariff: &TariffDefinition) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "{} {}", "Service class".bold(), tariff.sc_code.cyan());
    if let Some(description) = &tariff.description {
        let _ = writeln!(text, "  {}", description);
    }
    if let Some(notes) = &tariff.notes {
        let _ = writeln!(text, "  {} {}", "Note:".dimmed(), notes);
    }
    if tariff.logic_steps.is_empty() {
        let _ = writeln!(text, "  {}", "No active rate logic; records are skipped".yellow());
        return text;
    }

    for (i, step) in tariff.logic_steps.iter().enumerate() {
        let _ = writeln!(text, "{:>3}. {}", i + 1, describe_step(step));
    }
    text
}

fn describe_step(step: &LogicStep) -> String {
    let tag = if step.charge_type.as_str().is_empty() {
        "note".to_string()
    } else {
        step.charge_type.to_string()
    };
    let mut line = format!("{} [{}]", step.step_name.bold(), tag);

    match &step.kind {
        StepKind::Informational => {},
        StepKind::Reference { text } => {
            let _ = write!(line, " {}", text.dimmed());
        },
        StepKind::Minimum | StepKind::FixedFee => {
            let _ = write!(line, " rate={}", step.value);
        },
        StepKind::Energy { quantity }
        | StepKind::Demand { quantity }
        | StepKind::ReactiveDemand { quantity } => {
            let _ = write!(line, " rate={} × {}", step.value, quantity.source());
        },
        StepKind::Formula { amount } => {
            let _ = write!(line, " = {}", amount.source());
        },
        StepKind::Unsupported => {
            let _ = write!(line, " {}", "unsupported".yellow());
        },
        StepKind::Malformed { error } => {
            let _ = write!(line, " {} {}", "malformed:".red(), error);
        },
    }

    if !step.condition.is_always() {
        let _ = write!(line, " when {}", step.condition);
    }
    for formula in step.formulas() {
        if let Some(e) = formula.compile_error() {
            let _ = write!(line, "\n       {} {}", "will not evaluate:".red(), e);
        }
    }
    line
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn store() -> RuleStore {
        RuleStore::from_json_str(
            r#"[
            {"sc_code": "SC-3", "description": "Large general service", "logic_steps": [
                {"step_name": "Customer Charge", "charge_type": "fixed_fee", "value": {"0-2.2 kV": 100, "Over 2.2 kV": 300}},
                {"step_name": "Demand", "charge_type": "per_kw", "value": 16.0, "condition": "delivery_voltage <= 15 kV"},
                {"step_name": "Broken", "charge_type": "formula", "formula": "user.billed_kwh *"}
            ]},
            {"sc_code": "SC4", "note": "Rates as provided in SC9.", "logic_steps": []}
        ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_describe_steps() {
        colored::control::set_override(false);
        let store = store();
        let text = describe(store.get("SC3").unwrap());

        assert!(text.contains("Service class SC3"));
        assert!(text.contains("1. Customer Charge [fixed_fee] rate=0-2.2 kV: 100, Over 2.2 kV: 300"));
        assert!(text.contains("when delivery_voltage <= 15"));
        assert!(text.contains("will not evaluate:"));
    }

    #[test]
    fn test_reference_only_listing() {
        colored::control::set_override(false);
        let store = store();
        let line = list_line(store.get("SC4").unwrap());
        assert_eq!(line, "SC4             -  Rates as provided in SC9.\n");

        let text = describe(store.get("SC4").unwrap());
        assert!(text.contains("records are skipped"));
    }

    #[test]
    fn test_show_unknown_class() {
        let result = handle_command(
            TariffCommands::Show {
                sc_code: "sc-77".to_string(),
            },
            &store(),
        );
        assert!(result.is_err());
    }
}
