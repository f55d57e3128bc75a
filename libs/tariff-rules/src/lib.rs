//! Tariff Rules - Tariff Audit Engine
//!
//! Recomputes what a utility customer should have been billed under a
//! published tariff and compares it with what was actually billed:
//! - Rule store: tariff documents indexed by normalized service class
//! - Tier resolver: scalar or voltage-banded rates
//! - Step processor: one line item at a time, conditions and quantities
//!   evaluated with `tariff-calc`
//! - Minimum-charge resolver and the audit orchestrator on top
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  RuleStore  │────▶│ AuditEngine  │────▶│ AuditResult  │
//! │ (load once) │     │  (per bill)  │     │ (trace, var) │
//! └─────────────┘     └──────────────┘     └──────────────┘
//!                            │
//!                            ▼
//!                  ┌────────────────────┐
//!                  │   StepProcessor    │
//!                  │ rate × quantity,   │
//!                  │ minimum candidates │
//!                  └────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use tariff_rules::{AuditEngine, RuleStore, UsageRecord};
//!
//! let store = RuleStore::from_json_str(r#"[{"sc_code": "SC1", "logic_steps": [
//!     {"step_name": "Customer Charge", "charge_type": "fixed_fee", "value": 17.0},
//!     {"step_name": "Min Bill", "charge_type": "minimum_charge", "value": 20.0}
//! ]}]"#).unwrap();
//! let engine = AuditEngine::new(store);
//!
//! let record = UsageRecord { bill_amount: Some(18.0), ..UsageRecord::new("sc-1") };
//! let result = engine.audit(&record);
//! assert_eq!(result.expected_bill, 20.0);
//! assert_eq!(result.variance, 2.0);
//! ```

mod engine;
mod error;
pub mod minimum;
pub mod rate;
pub mod record;
pub mod result;
pub mod step;
mod store;
pub mod types;

// Re-export public API
pub use engine::AuditEngine;
pub use error::{Result, RuleError};
pub use minimum::{MinimumAdjustment, MinimumCharges};
pub use rate::{parse_tier_label, Outcome, RateValue, VoltageTier};
pub use record::{parse_bill_date, UsageRecord, CONTEXT_VARIABLES, DEFAULT_DAYS_USED};
pub use result::{round_cents, AuditResult, AuditStatus, AuditSummary, Discrepancy};
pub use step::{StepOutcome, StepProcessor, StepReport};
pub use store::{normalize_sc_code, RuleStore};
pub use types::{ChargeType, Condition, Formula, LogicStep, StepKind, TariffDefinition};
