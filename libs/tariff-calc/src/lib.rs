//! tariff-calc - Restricted expression evaluation for tariff rules
//!
//! Tariff steps carry small expressions: conditions such as
//! `delivery_voltage <= 15` and quantity formulas such as
//! `min(40, user.billed_demand)`. This crate parses and evaluates them over a
//! closed [`Context`] and nothing else.
//!
//! # Features
//!
//! - **Arithmetic**: `+ - * / // % **` with unary `-`/`+`
//! - **Comparison**: `< <= > >= == !=` (chainable), `in`, `not in`
//! - **Logic**: `and`/`&&`, `or`/`||`, `not`/`!` (short-circuit)
//! - **Literals**: numbers, quoted strings, `True`/`False`/`None`, lists
//! - **Functions**: `min()`, `max()`, `abs()`, `round()`
//!
//! # Example
//!
//! ```rust
//! use tariff_calc::{evaluate_formula, Context, Value};
//!
//! let ctx = Context::new()
//!     .with("user.billed_kwh", 1200.0)
//!     .with("delivery_voltage", 13.2);
//!
//! let kwh = evaluate_formula("user.billed_kwh * 0.5", &ctx).unwrap();
//! assert_eq!(kwh, Value::Number(600.0));
//!
//! let applies = evaluate_formula("2.2 < delivery_voltage <= 15", &ctx).unwrap();
//! assert!(applies.is_truthy());
//!
//! // Anything outside the grammar is rejected, never executed
//! assert!(evaluate_formula("__import__('os')", &ctx).is_err());
//! ```
//!
//! # Limits
//!
//! | Limit | Value |
//! |-------|-------|
//! | Nesting depth | [`parser::MAX_DEPTH`] |
//! | Tokens per expression | [`parser::MAX_TOKENS`] |

pub mod builtin_functions;
pub mod error;
pub mod evaluator;
pub mod parser;
pub mod value;

pub use error::{CalcError, Result};
pub use evaluator::{evaluate_formula, Expression};
pub use value::{Context, Value};
