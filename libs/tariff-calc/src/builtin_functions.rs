//! Built-in functions for expression evaluation
//!
//! The whitelist is fixed: `min`, `max`, `abs`, `round`. Any other call in an
//! expression is rejected by the parser.

use crate::error::{CalcError, Result};
use crate::value::Value;
use tracing::debug;

/// Whitelisted function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Min,
    Max,
    Abs,
    Round,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "abs" => Some(Self::Abs),
            "round" => Some(Self::Round),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Abs => "abs",
            Self::Round => "round",
        }
    }

    /// Apply the function to already-evaluated arguments
    pub fn call(&self, args: Vec<Value>) -> Result<Value> {
        debug!(function = self.name(), argc = args.len(), "builtin call");
        match self {
            Self::Min => extremum(self.name(), args, min).map(Value::Number),
            Self::Max => extremum(self.name(), args, max).map(Value::Number),
            Self::Abs => {
                let [value] = exact_args::<1>(self.name(), args)?;
                Ok(Value::Number(abs(number_arg(self.name(), &value)?)))
            },
            Self::Round => match args.len() {
                1 => {
                    let value = number_arg(self.name(), &args[0])?;
                    Ok(Value::Number(round(value, 0)))
                },
                2 => {
                    let value = number_arg(self.name(), &args[0])?;
                    let digits = number_arg(self.name(), &args[1])?;
                    if digits.fract() != 0.0 {
                        return Err(CalcError::type_error(
                            "round() digits must be an integer",
                        ));
                    }
                    Ok(Value::Number(round(value, digits as i32)))
                },
                n => Err(CalcError::type_error(format!(
                    "round() takes 1 or 2 arguments ({} given)",
                    n
                ))),
            },
        }
    }
}

/// Absolute value
pub fn abs(value: f64) -> f64 {
    value.abs()
}

/// Minimum of two values
pub fn min(a: f64, b: f64) -> f64 {
    a.min(b)
}

/// Maximum of two values
pub fn max(a: f64, b: f64) -> f64 {
    a.max(b)
}

/// Round to `decimals` places, ties to even
///
/// # Examples
/// - `round(2.5, 0)` → 2.0
/// - `round(3.5, 0)` → 4.0
/// - `round(3.14159, 2)` → 3.14
///
/// Precision beyond what an f64 holds leaves `value` as is; a negative
/// precision past the float range rounds to zero.
pub fn round(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    if factor == 0.0 {
        return 0.0_f64.copysign(value);
    }
    let scaled = value * factor;
    if !factor.is_finite() || !scaled.is_finite() {
        return value;
    }
    scaled.round_ties_even() / factor
}

/// min/max accept either several numbers or a single list
fn extremum(name: &str, args: Vec<Value>, pick: fn(f64, f64) -> f64) -> Result<f64> {
    let items = match <[Value; 1]>::try_from(args) {
        Ok([Value::List(items)]) => items,
        Ok([single]) => {
            return Err(CalcError::type_error(format!(
                "{}() argument must be a list when only one is given, got {}",
                name,
                single.type_name()
            )))
        },
        Err(args) => args,
    };

    let mut numbers = items.iter().map(|v| number_arg(name, v));
    let first = numbers
        .next()
        .ok_or_else(|| CalcError::type_error(format!("{}() arg is an empty sequence", name)))??;
    numbers.try_fold(first, |acc, next| Ok(pick(acc, next?)))
}

fn exact_args<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N]> {
    let given = args.len();
    <[Value; N]>::try_from(args).map_err(|_| {
        CalcError::type_error(format!(
            "{}() takes exactly {} argument(s) ({} given)",
            name, N, given
        ))
    })
}

fn number_arg(name: &str, value: &Value) -> Result<f64> {
    value.as_number().ok_or_else(|| {
        CalcError::type_error(format!(
            "{}() expects numbers, got {}",
            name,
            value.type_name()
        ))
    })
}
