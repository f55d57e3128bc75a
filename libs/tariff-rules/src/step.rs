//! Charge-step processor
//!
//! Processes one logic step against one record:
//! 1. Informational and reference-only steps are traced and skipped
//! 2. The condition is evaluated; false or failing skips the step
//! 3. Minimum steps hand their value to the minimum-charge resolver
//! 4. Monetary steps resolve a rate and a quantity and charge the product
//!
//! Failures never escape a step. They are logged, recorded as a defaulted
//! amount in the trace, and the step contributes $0.

use crate::rate::{Outcome, RateValue};
use crate::types::{Condition, Formula, LogicStep, StepKind};
use tariff_calc::Context;
use tracing::{debug, warn};

/// Decision for one step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Amount added to the running total
    Charged(f64),
    Skipped { reason: String },
    /// Minimum-charge candidate, applied after all steps
    DeferredMinimum(f64),
}

/// Outcome plus the trace lines it produced, in order
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub outcome: StepOutcome,
    pub trace: Vec<String>,
}

impl StepReport {
    fn skipped(line: String) -> Self {
        Self {
            outcome: StepOutcome::Skipped {
                reason: line.clone(),
            },
            trace: vec![line],
        }
    }
}

/// Runs steps against one record's context
pub struct StepProcessor<'a> {
    context: &'a Context,
    delivery_voltage: Option<f64>,
}

impl<'a> StepProcessor<'a> {
    pub fn new(context: &'a Context, delivery_voltage: Option<f64>) -> Self {
        Self {
            context,
            delivery_voltage,
        }
    }

    pub fn process(&self, step: &LogicStep) -> StepReport {
        let name = step.step_name.as_str();

        match &step.kind {
            StepKind::Informational => StepReport::skipped(format!(
                "{}: informational only, no charge applied.",
                name
            )),
            StepKind::Reference { text } => {
                StepReport::skipped(format!("{}: {} (no direct charge computed).", name, text))
            },
            StepKind::Malformed { .. } => {
                StepReport::skipped(format!("{}: malformed step; skipped.", name))
            },
            _ => match self.check_condition(step) {
                Some(skip) => skip,
                None => self.charge(step),
            },
        }
    }

    /// Skip report when the step's condition is false or fails
    fn check_condition(&self, step: &LogicStep) -> Option<StepReport> {
        let Condition::When(condition) = &step.condition else {
            return None;
        };
        let name = step.step_name.as_str();

        match condition.evaluate(self.context) {
            Ok(value) if value.is_truthy() => None,
            Ok(_) => Some(StepReport::skipped(format!(
                "{}: condition '{}' false; skipped.",
                name,
                condition.source()
            ))),
            Err(e) => {
                warn!(
                    step = name,
                    expr = condition.source(),
                    error = %e,
                    "Eval error in condition"
                );
                Some(StepReport::skipped(format!(
                    "{}: condition '{}' could not be evaluated; skipped.",
                    name,
                    condition.source()
                )))
            },
        }
    }

    fn charge(&self, step: &LogicStep) -> StepReport {
        let name = step.step_name.as_str();

        match &step.kind {
            StepKind::Minimum => minimum_candidate(name, &step.value),
            StepKind::FixedFee => {
                let rate = step.value.resolve(self.delivery_voltage, name);
                charged(name, &[rate], |r| r[0])
            },
            StepKind::Energy { quantity }
            | StepKind::Demand { quantity }
            | StepKind::ReactiveDemand { quantity } => {
                let rate = step.value.resolve(self.delivery_voltage, name);
                let qty = self.quantity(name, quantity);
                charged(name, &[rate, qty], |r| r[0] * r[1])
            },
            StepKind::Formula { amount } => {
                let amount = self.quantity(name, amount);
                charged(name, &[amount], |r| r[0])
            },
            StepKind::Unsupported
            | StepKind::Informational
            | StepKind::Reference { .. }
            | StepKind::Malformed { .. } => {
                StepReport::skipped(format!(
                    "{}: charge_type '{}' unsupported; skipped.",
                    name, step.charge_type
                ))
            },
        }
    }

    /// Numeric value of an expression; falsy results count as zero
    fn quantity(&self, step_name: &str, formula: &Formula) -> Outcome {
        match formula
            .evaluate(self.context)
            .and_then(|value| value.to_number())
        {
            Ok(v) if v.is_finite() => Outcome::Value(v),
            Ok(v) => Outcome::Default(format!("'{}' is not finite ({})", formula.source(), v)),
            Err(e) => {
                warn!(
                    step = step_name,
                    expr = formula.source(),
                    error = %e,
                    "Eval error in quantity"
                );
                Outcome::Default(format!("'{}' failed: {}", formula.source(), e))
            },
        }
    }
}

fn minimum_candidate(name: &str, value: &RateValue) -> StepReport {
    match value {
        RateValue::Scalar(v) => StepReport {
            outcome: StepOutcome::DeferredMinimum(*v),
            trace: vec![format!("{}: minimum candidate recorded (${:.2}).", name, v)],
        },
        RateValue::Tiered(_) | RateValue::Invalid(_) => {
            warn!(step = name, value = %value, "Could not parse minimum value");
            StepReport::skipped(format!(
                "{}: minimum value could not be parsed; ignored.",
                name
            ))
        },
    }
}

/// Combine resolved inputs into a charge
///
/// Any defaulted input zeroes the step; every default gets its own trace line
/// before the amount line.
fn charged(name: &str, inputs: &[Outcome], combine: impl Fn(&[f64]) -> f64) -> StepReport {
    let mut trace: Vec<String> = inputs
        .iter()
        .filter_map(Outcome::default_reason)
        .map(|reason| format!("{}: defaulted to $0.00 ({}).", name, reason))
        .collect();

    let values: Vec<f64> = inputs.iter().map(Outcome::value).collect();
    let mut amount = combine(&values);
    if !amount.is_finite() {
        warn!(step = name, amount, "Math error: amount is not finite");
        trace.push(format!(
            "{}: defaulted to $0.00 (amount is not finite).",
            name
        ));
        amount = 0.0;
    }

    debug!("{}: ${:.2}", name, amount);
    trace.push(format!("{}: ${:.2}", name, amount));
    StepReport {
        outcome: StepOutcome::Charged(amount),
        trace,
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::record::UsageRecord;
    use crate::types::TariffDefinition;
    use tracing_test::traced_test;

    fn step(json: &str) -> LogicStep {
        serde_json::from_str(json).unwrap()
    }

    fn record() -> UsageRecord {
        UsageRecord {
            billed_kwh: Some(1000.0),
            billed_demand: Some(55.0),
            billed_rkva: Some(10.0),
            delivery_voltage: Some(13.2),
            time_of_use: Some("On Peak".to_string()),
            bill_date: Some("2024-07-15".to_string()),
            ..UsageRecord::new("SC3")
        }
    }

    fn run(json: &str) -> StepReport {
        let record = record();
        let ctx = record.to_context();
        StepProcessor::new(&ctx, record.voltage_kv()).process(&step(json))
    }

    #[test]
    fn test_fixed_fee() {
        let report = run(r#"{"step_name": "Customer Charge", "charge_type": "fixed_fee", "value": 17.0}"#);
        assert_eq!(report.outcome, StepOutcome::Charged(17.0));
        assert_eq!(report.trace, vec!["Customer Charge: $17.00"]);
    }

    #[test]
    fn test_energy_with_tiered_rate() {
        let report = run(
            r#"{"step_name": "Energy", "charge_type": "per_kwh",
                "value": {"0-2.2 kV": 0.088, "2.2-15 kV": 0.081, "Over 60 kV": 0.070}}"#,
        );
        assert_eq!(report.outcome, StepOutcome::Charged(1000.0 * 0.081));
        assert_eq!(report.trace, vec!["Energy: $81.00"]);
    }

    #[test]
    fn test_demand_quantity_expression() {
        let report = run(
            r#"{"step_name": "First 40 kW", "charge_type": "demand_charge", "value": 10,
                "demand_kw": "min(40, user.billed_demand)"}"#,
        );
        assert_eq!(report.outcome, StepOutcome::Charged(400.0));

        let report = run(
            r#"{"step_name": "Excess kW", "charge_type": "per_kw", "value": 12,
                "demand_kw": "max(user.billed_demand - 40, 0)"}"#,
        );
        assert_eq!(report.outcome, StepOutcome::Charged(180.0));
    }

    #[test]
    fn test_reactive_demand_default_quantity() {
        let report = run(r#"{"step_name": "RKVA", "charge_type": "reactive_demand_fee", "value": 1.5}"#);
        assert_eq!(report.outcome, StepOutcome::Charged(15.0));
    }

    #[test]
    fn test_condition_false_and_seasonal() {
        let report = run(
            r#"{"step_name": "Winter Adder", "charge_type": "fixed_fee", "value": 5,
                "condition": "user.bill_date.month in [12, 1, 2]"}"#,
        );
        assert_eq!(
            report.trace,
            vec!["Winter Adder: condition 'user.bill_date.month in [12, 1, 2]' false; skipped."]
        );
        assert!(matches!(report.outcome, StepOutcome::Skipped { .. }));

        let report = run(
            r#"{"step_name": "Peak", "charge_type": "fixed_fee", "value": 5,
                "condition": "time_of_use == 'On Peak' and delivery_voltage <= 15 kV"}"#,
        );
        assert_eq!(report.outcome, StepOutcome::Charged(5.0));
    }

    #[test]
    #[traced_test]
    fn test_condition_error_skips() {
        let report = run(
            r#"{"step_name": "Odd", "charge_type": "fixed_fee", "value": 5,
                "condition": "user.meter_class == 'A'"}"#,
        );
        assert_eq!(
            report.trace,
            vec!["Odd: condition 'user.meter_class == 'A'' could not be evaluated; skipped."]
        );
        assert!(logs_contain("Eval error in condition"));
        assert!(logs_contain("user.meter_class"));
    }

    #[test]
    fn test_informational_and_reference() {
        let report = run(r#"{"step_name": "Note", "note": "Subject to MSC"}"#);
        assert_eq!(report.trace, vec!["Note: informational only, no charge applied."]);

        let report = run(
            r#"{"step_name": "Rates", "charge_type": "demand_rate", "note": "Same as SC9",
                "condition": "undefined_name"}"#,
        );
        // reference steps never look at their condition
        assert_eq!(report.trace, vec!["Rates: Same as SC9 (no direct charge computed)."]);
    }

    #[test]
    fn test_minimum_candidates() {
        let report = run(r#"{"step_name": "Min Bill", "charge_type": "minimum_charge", "value": 20}"#);
        assert_eq!(report.outcome, StepOutcome::DeferredMinimum(20.0));
        assert_eq!(report.trace, vec!["Min Bill: minimum candidate recorded ($20.00)."]);

        let report = run(
            r#"{"step_name": "Min Bill", "charge_type": "minimum_bill", "value": {"0-2.2 kV": 20}}"#,
        );
        assert_eq!(
            report.trace,
            vec!["Min Bill: minimum value could not be parsed; ignored."]
        );
    }

    #[test]
    fn test_malformed_step_is_skipped() {
        let tariff: TariffDefinition = serde_json::from_str(
            r#"{"sc_code": "SC1", "logic_steps": ["Rates subject to MSC"]}"#,
        )
        .unwrap();
        let record = record();
        let ctx = record.to_context();
        let report = StepProcessor::new(&ctx, record.voltage_kv()).process(&tariff.logic_steps[0]);

        assert!(matches!(report.outcome, StepOutcome::Skipped { .. }));
        assert_eq!(report.trace, vec!["Step 1: malformed step; skipped."]);
    }

    #[test]
    fn test_unsupported() {
        let report = run(r#"{"step_name": "Adder", "charge_type": "seasonal_adder", "value": 3}"#);
        assert_eq!(
            report.trace,
            vec!["Adder: charge_type 'seasonal_adder' unsupported; skipped."]
        );
    }

    #[test]
    #[traced_test]
    fn test_formula_failure_defaults_to_zero() {
        let report = run(
            r#"{"step_name": "Delivery", "charge_type": "formula",
                "python_formula": "user.billed_kwh * rate_delivery"}"#,
        );
        assert_eq!(report.outcome, StepOutcome::Charged(0.0));
        assert_eq!(report.trace.len(), 2);
        assert!(report.trace[0].starts_with("Delivery: defaulted to $0.00 ("));
        assert_eq!(report.trace[1], "Delivery: $0.00");
        assert!(logs_contain("Eval error in quantity"));
        assert!(logs_contain("Delivery"));
    }

    #[test]
    fn test_tiered_without_voltage_defaults() {
        let record = UsageRecord {
            billed_kwh: Some(500.0),
            ..UsageRecord::new("SC3")
        };
        let ctx = record.to_context();
        let report = StepProcessor::new(&ctx, record.voltage_kv()).process(&step(
            r#"{"step_name": "Energy", "charge_type": "energy_charge", "value": {"0-2.2 kV": 0.088}}"#,
        ));
        assert_eq!(report.outcome, StepOutcome::Charged(0.0));
        assert_eq!(
            report.trace,
            vec![
                "Energy: defaulted to $0.00 (no delivery voltage for tiered rate).",
                "Energy: $0.00"
            ]
        );
    }

    #[test]
    fn test_overflow_defaults() {
        let report = run(r#"{"step_name": "Huge", "charge_type": "per_kwh", "value": 1e306}"#);
        assert_eq!(report.outcome, StepOutcome::Charged(0.0));
        assert_eq!(
            report.trace,
            vec!["Huge: defaulted to $0.00 (amount is not finite).", "Huge: $0.00"]
        );
    }
}
