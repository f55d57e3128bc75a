//! Runtime values and the closed evaluation context
//!
//! An expression can only see what the caller put into its [`Context`]. There
//! is no ambient environment: an identifier that is not a context entry (or a
//! calendar attribute of a date entry) is an undefined variable.

use crate::error::{CalcError, Result};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use std::fmt;

/// Value produced by evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Number(f64),
    Str(String),
    Date(NaiveDate),
    List(Vec<Value>),
}

impl Value {
    /// Name used in type errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "str",
            Value::Date(_) => "date",
            Value::List(_) => "list",
        }
    }

    /// `None`, `False`, `0`, `""` and `[]` are falsy, everything else is truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Date(_) => true,
            Value::List(items) => !items.is_empty(),
        }
    }

    /// Numeric view used by arithmetic: numbers, and booleans as 0/1
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Coerce a formula result into a quantity or an amount
    ///
    /// Falsy values count as zero, numeric strings are parsed, anything else
    /// is a type error.
    pub fn to_number(&self) -> Result<f64> {
        if !self.is_truthy() {
            return Ok(0.0);
        }
        match self {
            Value::Str(s) => s.trim().parse::<f64>().map_err(|_| {
                CalcError::type_error(format!("could not convert string to number: '{}'", s))
            }),
            other => other.as_number().ok_or_else(|| {
                CalcError::type_error(format!("{} is not a number", other.type_name()))
            }),
        }
    }

    /// Attribute access on a value (calendar fields of a date)
    pub fn attribute(&self, name: &str) -> Result<Value> {
        let Value::Date(date) = self else {
            return Err(CalcError::type_error(format!(
                "'{}' has no attribute '{}'",
                self.type_name(),
                name
            )));
        };
        let field = match name {
            "year" => date.year() as f64,
            "month" => date.month() as f64,
            "day" => date.day() as f64,
            "quarter" => ((date.month() - 1) / 3 + 1) as f64,
            "dayofweek" => date.weekday().num_days_from_monday() as f64,
            "dayofyear" => date.ordinal() as f64,
            _ => {
                return Err(CalcError::type_error(format!(
                    "'date' has no attribute '{}'",
                    name
                )))
            },
        };
        Ok(Value::Number(field))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Number(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            },
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::None, Into::into)
    }
}

/// Closed variable namespace for one evaluation
///
/// Names may contain dots (`user.billed_kwh`); they are stored and looked up
/// as whole strings.
#[derive(Debug, Clone, Default)]
pub struct Context {
    variables: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Variable names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    /// Resolve a dotted path
    ///
    /// An exact entry wins. Otherwise the last segment is treated as an
    /// attribute of the shorter path, so `user.bill_date.month` reads the
    /// month of the `user.bill_date` entry.
    pub fn resolve(&self, path: &str) -> Result<Value> {
        if let Some(value) = self.variables.get(path) {
            return Ok(value.clone());
        }
        match path.rsplit_once('.') {
            Some((prefix, attr)) => match self.resolve(prefix) {
                Ok(target) => target.attribute(attr),
                Err(CalcError::UndefinedVariable(_)) => Err(CalcError::undefined_variable(path)),
                Err(e) => Err(e),
            },
            None => Err(CalcError::undefined_variable(path)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::Number(-1.0).is_truthy());
        assert!(Value::Date(date(2024, 1, 1)).is_truthy());
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Value::None.to_number().unwrap(), 0.0);
        assert_eq!(Value::Bool(true).to_number().unwrap(), 1.0);
        assert_eq!(Value::from(" 12.5 ").to_number().unwrap(), 12.5);
        assert!(Value::from("per kWh").to_number().is_err());
        assert!(Value::Date(date(2024, 1, 1)).to_number().is_err());
    }

    #[test]
    fn test_resolve_date_attributes() {
        let ctx = Context::new().with("user.bill_date", date(2024, 7, 15));

        assert_eq!(
            ctx.resolve("user.bill_date.month").unwrap(),
            Value::Number(7.0)
        );
        assert_eq!(
            ctx.resolve("user.bill_date.quarter").unwrap(),
            Value::Number(3.0)
        );
        // 2024-07-15 is a Monday
        assert_eq!(
            ctx.resolve("user.bill_date.dayofweek").unwrap(),
            Value::Number(0.0)
        );
    }

    #[test]
    fn test_resolve_undefined() {
        let ctx = Context::new().with("user.billed_kwh", 100.0);

        assert_eq!(
            ctx.resolve("user.billed_kw").unwrap_err(),
            CalcError::undefined_variable("user.billed_kw")
        );
        assert_eq!(
            ctx.resolve("user").unwrap_err(),
            CalcError::undefined_variable("user")
        );
        // attribute of a non-date is a type error, not an undefined name
        assert!(matches!(
            ctx.resolve("user.billed_kwh.month").unwrap_err(),
            CalcError::Type(_)
        ));
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<f64> = None;
        assert_eq!(Value::from(none), Value::None);
        assert_eq!(Value::from(Some(2.2)), Value::Number(2.2));
    }
}
