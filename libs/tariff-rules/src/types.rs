//! Tariff definition types
//!
//! Core types built once when a tariff document is loaded:
//! - TariffDefinition: one service classification and its ordered steps
//! - LogicStep: one line item, classified into a [`StepKind`]
//! - Condition / Formula: expressions compiled at load time

use crate::rate::RateValue;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use std::fmt;
use tariff_calc::{CalcError, Context, Expression, Value};
use tracing::warn;

/// Default quantity expressions
pub const DEFAULT_KWH_EXPR: &str = "user.billed_kwh";
pub const DEFAULT_DEMAND_EXPR: &str = "user.billed_demand";
pub const DEFAULT_RKVA_EXPR: &str = "user.billed_rkva";

// ============================================================================
// Charge types
// ============================================================================

/// `charge_type` tag of a logic step
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChargeType {
    FixedFee,
    PerKwh,
    EnergyCharge,
    PerKw,
    DemandCharge,
    DemandFee,
    PerRkva,
    ReactiveDemandFee,
    MinimumCharge,
    MinimumBill,
    Reference,
    EnergyRate,
    DemandRate,
    EnergyRateMinimum,
    DemandDetermination,
    Formula,
    /// Anything else, kept verbatim for the trace
    Other(String),
}

impl ChargeType {
    pub fn parse(tag: &str) -> Self {
        match tag.trim() {
            "fixed_fee" => Self::FixedFee,
            "per_kwh" => Self::PerKwh,
            "energy_charge" => Self::EnergyCharge,
            "per_kw" => Self::PerKw,
            "demand_charge" => Self::DemandCharge,
            "demand_fee" => Self::DemandFee,
            "per_rkva" => Self::PerRkva,
            "reactive_demand_fee" => Self::ReactiveDemandFee,
            "minimum_charge" => Self::MinimumCharge,
            "minimum_bill" => Self::MinimumBill,
            "reference" => Self::Reference,
            "energy_rate" => Self::EnergyRate,
            "demand_rate" => Self::DemandRate,
            "energy_rate_minimum" => Self::EnergyRateMinimum,
            "demand_determination" => Self::DemandDetermination,
            "formula" => Self::Formula,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::FixedFee => "fixed_fee",
            Self::PerKwh => "per_kwh",
            Self::EnergyCharge => "energy_charge",
            Self::PerKw => "per_kw",
            Self::DemandCharge => "demand_charge",
            Self::DemandFee => "demand_fee",
            Self::PerRkva => "per_rkva",
            Self::ReactiveDemandFee => "reactive_demand_fee",
            Self::MinimumCharge => "minimum_charge",
            Self::MinimumBill => "minimum_bill",
            Self::Reference => "reference",
            Self::EnergyRate => "energy_rate",
            Self::DemandRate => "demand_rate",
            Self::EnergyRateMinimum => "energy_rate_minimum",
            Self::DemandDetermination => "demand_determination",
            Self::Formula => "formula",
            Self::Other(tag) => tag,
        }
    }

    /// Steps that point at another class's rates and never charge directly
    pub fn is_reference_only(&self) -> bool {
        matches!(
            self,
            Self::Reference
                | Self::EnergyRate
                | Self::DemandRate
                | Self::EnergyRateMinimum
                | Self::DemandDetermination
        )
    }

    pub fn is_minimum(&self) -> bool {
        matches!(self, Self::MinimumCharge | Self::MinimumBill)
    }
}

impl fmt::Display for ChargeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Compiled expressions
// ============================================================================

/// Expression text with its load-time compilation result
///
/// A compile failure is kept rather than rejected so the step still shows up
/// in the trace and degrades the same way as a runtime failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    compiled: Result<Expression, CalcError>,
}

impl Formula {
    pub fn compile(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = Expression::parse(&source);
        Self { source, compiled }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn compile_error(&self) -> Option<&CalcError> {
        self.compiled.as_ref().err()
    }

    pub fn evaluate(&self, context: &Context) -> Result<Value, CalcError> {
        match &self.compiled {
            Ok(expr) => expr.evaluate(context),
            Err(e) => Err(e.clone()),
        }
    }
}

/// Step condition
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Always,
    When(Formula),
}

impl Condition {
    /// Build from the raw `condition` field
    ///
    /// `" kV"` suffixes are stripped so `"delivery_voltage <= 15 kV"` is plain
    /// arithmetic. A missing or non-text condition means `Always`.
    pub fn from_raw(raw: Option<&JsonValue>) -> Self {
        match raw {
            Some(JsonValue::String(text)) => {
                let normalized = text.replace(" kV", "");
                if normalized == "Always" {
                    Condition::Always
                } else {
                    Condition::When(Formula::compile(normalized))
                }
            },
            _ => Condition::Always,
        }
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Condition::Always)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Always => f.write_str("Always"),
            Condition::When(formula) => f.write_str(formula.source()),
        }
    }
}

// ============================================================================
// Logic steps
// ============================================================================

/// What a step does, decided at load time
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    /// No charge_type, only a note
    Informational,
    /// Points at another class's rates
    Reference { text: String },
    /// Floor applied after all other charges
    Minimum,
    FixedFee,
    /// Rate × energy quantity
    Energy { quantity: Formula },
    /// Rate × demand quantity
    Demand { quantity: Formula },
    /// Rate × reactive demand quantity
    ReactiveDemand { quantity: Formula },
    /// Whole amount from one expression
    Formula { amount: Formula },
    Unsupported,
    /// Document entry that is not a readable step
    Malformed { error: String },
}

/// One line item of a tariff
#[derive(Debug, Clone, PartialEq)]
pub struct LogicStep {
    pub step_name: String,
    /// Trimmed tag; empty when the step has none
    pub charge_type: ChargeType,
    pub condition: Condition,
    pub value: RateValue,
    pub kind: StepKind,
}

/// Raw step as it appears in the document
#[derive(Debug, Default, Deserialize)]
struct RawStep {
    #[serde(default)]
    step_name: Option<JsonValue>,
    #[serde(default)]
    charge_type: Option<JsonValue>,
    #[serde(default)]
    value: RateValue,
    #[serde(default, deserialize_with = "present")]
    condition: Option<JsonValue>,
    #[serde(default, deserialize_with = "present")]
    note: Option<JsonValue>,
    #[serde(default)]
    reference: Option<JsonValue>,
    #[serde(default)]
    unit: Option<JsonValue>,
    #[serde(default)]
    applies_to: Option<JsonValue>,
    #[serde(default)]
    formula: Option<JsonValue>,
    #[serde(default)]
    python_formula: Option<JsonValue>,
    #[serde(default, deserialize_with = "present")]
    demand_kw: Option<JsonValue>,
    #[serde(default)]
    demand_rkva: Option<JsonValue>,
}

/// Keeps an explicit `null` as `Some(Null)` so presence can be told apart
/// from absence
fn present<'de, D>(deserializer: D) -> Result<Option<JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    JsonValue::deserialize(deserializer).map(Some)
}

/// Text of a field if it is "truthy": non-empty text, or any other non-null
/// scalar rendered as text
fn text(value: &Option<JsonValue>) -> Option<String> {
    match value.as_ref()? {
        JsonValue::Null => None,
        JsonValue::String(s) if s.is_empty() => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(false) => None,
        JsonValue::Array(a) if a.is_empty() => None,
        JsonValue::Object(o) if o.is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// Quantity expression, falling back to `default` when the candidate does
/// not reference a `user.` quantity (e.g. a unit label such as "per kWh")
fn quantity(candidate: Option<String>, default: &str) -> Formula {
    match candidate {
        Some(expr) if expr.contains("user.") => Formula::compile(expr),
        _ => Formula::compile(default),
    }
}

impl From<RawStep> for LogicStep {
    fn from(raw: RawStep) -> Self {
        let step_name = text(&raw.step_name).unwrap_or_else(|| "Unknown".to_string());
        let charge_type = ChargeType::parse(&text(&raw.charge_type).unwrap_or_default());
        let condition = Condition::from_raw(raw.condition.as_ref());

        let kind = match &charge_type {
            ChargeType::Other(tag) if tag.is_empty() && raw.note.is_some() => {
                StepKind::Informational
            },
            t if t.is_reference_only() => StepKind::Reference {
                text: text(&raw.reference)
                    .or_else(|| text(&raw.note))
                    .unwrap_or_else(|| "Reference-only step.".to_string()),
            },
            t if t.is_minimum() => StepKind::Minimum,
            ChargeType::FixedFee => StepKind::FixedFee,
            ChargeType::PerKwh | ChargeType::EnergyCharge => StepKind::Energy {
                quantity: quantity(
                    text(&raw.unit).or_else(|| text(&raw.applies_to)),
                    DEFAULT_KWH_EXPR,
                ),
            },
            ChargeType::PerKw | ChargeType::DemandCharge | ChargeType::DemandFee => {
                // an explicit demand_kw wins even when it is not usable
                let candidate = match &raw.demand_kw {
                    Some(JsonValue::Null) => Some("None".to_string()),
                    Some(_) => text(&raw.demand_kw),
                    None => text(&raw.formula).or_else(|| text(&raw.unit)),
                };
                StepKind::Demand {
                    quantity: quantity(candidate, DEFAULT_DEMAND_EXPR),
                }
            },
            ChargeType::PerRkva | ChargeType::ReactiveDemandFee => StepKind::ReactiveDemand {
                quantity: quantity(
                    text(&raw.demand_rkva)
                        .or_else(|| text(&raw.formula))
                        .or_else(|| text(&raw.unit)),
                    DEFAULT_RKVA_EXPR,
                ),
            },
            ChargeType::Formula => StepKind::Formula {
                amount: Formula::compile(
                    text(&raw.python_formula)
                        .or_else(|| text(&raw.formula))
                        .unwrap_or_else(|| "0".to_string()),
                ),
            },
            _ => StepKind::Unsupported,
        };

        Self {
            step_name,
            charge_type,
            condition,
            value: raw.value,
            kind,
        }
    }
}

impl<'de> Deserialize<'de> for LogicStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawStep::deserialize(deserializer).map(LogicStep::from)
    }
}

impl LogicStep {
    /// Expressions this step evaluates, for diagnostics
    pub fn formulas(&self) -> Vec<&Formula> {
        let mut formulas = Vec::new();
        if let Condition::When(f) = &self.condition {
            formulas.push(f);
        }
        match &self.kind {
            StepKind::Energy { quantity }
            | StepKind::Demand { quantity }
            | StepKind::ReactiveDemand { quantity } => formulas.push(quantity),
            StepKind::Formula { amount } => formulas.push(amount),
            _ => {},
        }
        formulas
    }
}

// ============================================================================
// Tariff definitions
// ============================================================================

/// One service classification's rate schedule
#[derive(Debug, Clone, PartialEq)]
pub struct TariffDefinition {
    /// Normalized code (uppercase, no spaces or hyphens)
    pub sc_code: String,
    pub description: Option<String>,
    /// `note`, or `notes` when there is no `note`
    pub notes: Option<String>,
    /// Evaluation order is document order
    pub logic_steps: Vec<LogicStep>,
}

#[derive(Debug, Deserialize)]
struct RawTariff {
    sc_code: JsonValue,
    #[serde(default)]
    description: Option<JsonValue>,
    #[serde(default)]
    note: Option<JsonValue>,
    #[serde(default)]
    notes: Option<JsonValue>,
    #[serde(default, deserialize_with = "null_as_empty")]
    logic_steps: Vec<JsonValue>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<JsonValue>>::deserialize(deserializer)?.unwrap_or_default())
}

impl LogicStep {
    /// Placeholder for an entry that could not be read as a step
    fn malformed(raw: &JsonValue, index: usize, error: String) -> Self {
        let step_name = raw
            .get("step_name")
            .and_then(|name| text(&Some(name.clone())))
            .unwrap_or_else(|| format!("Step {}", index + 1));
        Self {
            step_name,
            charge_type: ChargeType::Other(String::new()),
            condition: Condition::Always,
            value: RateValue::default(),
            kind: StepKind::Malformed { error },
        }
    }
}

/// Read each step on its own so one bad entry does not drop the tariff
fn read_steps(sc_code: &str, raw: Vec<JsonValue>) -> Vec<LogicStep> {
    raw.into_iter()
        .enumerate()
        .map(|(index, value)| match LogicStep::deserialize(&value) {
            Ok(step) => step,
            Err(e) => {
                warn!(sc_code, index, error = %e, "Malformed logic step, it will be skipped");
                LogicStep::malformed(&value, index, e.to_string())
            },
        })
        .collect()
}

impl<'de> Deserialize<'de> for TariffDefinition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawTariff::deserialize(deserializer)?;
        let code = match &raw.sc_code {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        };
        let sc_code = crate::store::normalize_sc_code(&code);
        let logic_steps = read_steps(&sc_code, raw.logic_steps);
        Ok(Self {
            sc_code,
            description: text(&raw.description),
            notes: text(&raw.note).or_else(|| text(&raw.notes)),
            logic_steps,
        })
    }
}
