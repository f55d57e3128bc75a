//! Expression evaluator
//!
//! Interprets a parsed [`Expr`] against a closed [`Context`]:
//! - Arithmetic: +, -, *, /, //, %, **
//! - Comparison: <, >, <=, >=, ==, != (chainable), in, not in
//! - Logic: and/&&, or/||, not/!
//! - Built-in functions: min, max, abs, round
//!
//! Evaluation is a single recursive walk over a finite tree: no loops, no
//! side effects, no access to anything outside the context.

use crate::error::{CalcError, Result};
use crate::parser::{self, BinaryOp, CompareOp, Expr, UnaryOp};
use crate::value::{Context, Value};
use std::cmp::Ordering;

/// A parsed expression together with its source text
///
/// # Example
/// ```
/// use tariff_calc::{Context, Expression, Value};
///
/// let expr = Expression::parse("min(40, user.billed_demand) * 2").unwrap();
/// let ctx = Context::new().with("user.billed_demand", 55.0);
///
/// assert_eq!(expr.evaluate(&ctx).unwrap(), Value::Number(80.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    /// Parse an expression string
    pub fn parse(source: &str) -> Result<Self> {
        Ok(Self {
            source: source.to_string(),
            ast: parser::parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Evaluate against a context
    pub fn evaluate(&self, context: &Context) -> Result<Value> {
        eval(&self.ast, context)
    }

    /// Evaluate and coerce the result to a number (falsy results count as 0)
    pub fn evaluate_number(&self, context: &Context) -> Result<f64> {
        self.evaluate(context)?.to_number()
    }

    /// Evaluate and take the truthiness of the result
    pub fn evaluate_bool(&self, context: &Context) -> Result<bool> {
        Ok(self.evaluate(context)?.is_truthy())
    }
}

/// Parse and evaluate in one step
pub fn evaluate_formula(formula: &str, context: &Context) -> Result<Value> {
    Expression::parse(formula)?.evaluate(context)
}

fn eval(expr: &Expr, ctx: &Context) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Var(name) => ctx.resolve(name),
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, ctx))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        Expr::Unary { op, operand } => {
            let value = eval(operand, ctx)?;
            apply_unary(*op, value)
        },
        Expr::BinaryOp { left, op, right } => {
            let left_val = eval(left, ctx)?;
            match op {
                // short-circuit, returning the deciding operand
                BinaryOp::And if !left_val.is_truthy() => Ok(left_val),
                BinaryOp::And => eval(right, ctx),
                BinaryOp::Or if left_val.is_truthy() => Ok(left_val),
                BinaryOp::Or => eval(right, ctx),
                _ => {
                    let right_val = eval(right, ctx)?;
                    apply_binary(*op, left_val, right_val)
                },
            }
        },
        Expr::Compare { first, rest } => {
            let mut left = eval(first, ctx)?;
            for (op, operand) in rest {
                let right = eval(operand, ctx)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        },
        Expr::Call { func, args } => {
            let values = args
                .iter()
                .map(|arg| eval(arg, ctx))
                .collect::<Result<Vec<_>>>()?;
            func.call(values)
        },
    }
}

fn apply_unary(op: UnaryOp, operand: Value) -> Result<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::Minus => Ok(Value::Number(-numeric("unary -", &operand)?)),
        UnaryOp::Plus => Ok(Value::Number(numeric("unary +", &operand)?)),
    }
}

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    if op == BinaryOp::Add {
        match (&left, &right) {
            (Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{}{}", a, b))),
            (Value::List(a), Value::List(b)) => {
                return Ok(Value::List(a.iter().chain(b).cloned().collect()))
            },
            _ => {},
        }
    }

    let (Some(a), Some(b)) = (left.as_number(), right.as_number()) else {
        return Err(CalcError::type_error(format!(
            "unsupported operand types for {:?}: {} and {}",
            op,
            left.type_name(),
            right.type_name()
        )));
    };

    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => {
            if b == 0.0 {
                return Err(CalcError::arithmetic("division by zero"));
            }
            a / b
        },
        BinaryOp::FloorDivide => {
            if b == 0.0 {
                return Err(CalcError::arithmetic("integer division by zero"));
            }
            (a / b).floor()
        },
        BinaryOp::Modulo => {
            if b == 0.0 {
                return Err(CalcError::arithmetic("modulo by zero"));
            }
            // result takes the sign of the divisor
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) {
                r + b
            } else {
                r
            }
        },
        BinaryOp::Power => {
            if a < 0.0 && b.fract() != 0.0 {
                return Err(CalcError::arithmetic(
                    "negative number raised to a fractional power",
                ));
            }
            if a == 0.0 && b < 0.0 {
                return Err(CalcError::arithmetic("zero raised to a negative power"));
            }
            a.powf(b)
        },
        BinaryOp::And | BinaryOp::Or => {
            return Err(CalcError::type_error(format!("{:?} is not an arithmetic operator", op)))
        },
    };

    if !result.is_finite() {
        return Err(CalcError::arithmetic(format!(
            "numeric result out of range ({:?})",
            op
        )));
    }
    Ok(Value::Number(result))
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool> {
    let ordering = || {
        order(left, right).ok_or_else(|| {
            CalcError::type_error(format!(
                "'{:?}' not supported between {} and {}",
                op,
                left.type_name(),
                right.type_name()
            ))
        })
    };

    match op {
        CompareOp::Equal => Ok(values_equal(left, right)),
        CompareOp::NotEqual => Ok(!values_equal(left, right)),
        CompareOp::Less => Ok(ordering()? == Ordering::Less),
        CompareOp::LessEqual => Ok(ordering()? != Ordering::Greater),
        CompareOp::Greater => Ok(ordering()? == Ordering::Greater),
        CompareOp::GreaterEqual => Ok(ordering()? != Ordering::Less),
        CompareOp::In => contains(right, left),
        CompareOp::NotIn => contains(right, left).map(|found| !found),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return a == b;
    }
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Date(a), Value::Date(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        },
        _ => false,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return a.partial_cmp(&b);
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool> {
    match (container, item) {
        (Value::List(items), _) => Ok(items.iter().any(|candidate| values_equal(candidate, item))),
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
        _ => Err(CalcError::type_error(format!(
            "'in' not supported between {} and {}",
            item.type_name(),
            container.type_name()
        ))),
    }
}

fn numeric(what: &str, value: &Value) -> Result<f64> {
    value.as_number().ok_or_else(|| {
        CalcError::type_error(format!("bad operand type for {}: {}", what, value.type_name()))
    })
}
