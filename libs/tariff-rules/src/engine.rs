//! Audit orchestrator
//!
//! Ties the pieces together for one record:
//! 1. Normalize the service class and look up its tariff
//! 2. Run every logic step in document order
//! 3. Apply the governing minimum charge
//! 4. Compare against the amount actually billed

use crate::minimum::MinimumCharges;
use crate::record::UsageRecord;
use crate::result::AuditResult;
use crate::step::{StepOutcome, StepProcessor};
use crate::store::{normalize_sc_code, RuleStore};
use std::sync::Arc;
use tracing::debug;

/// Audit engine over a shared, read-only rule store
///
/// Cloning is cheap and clones share the store, so one engine can be handed
/// to any number of worker threads.
#[derive(Debug, Clone)]
pub struct AuditEngine {
    store: Arc<RuleStore>,
}

impl AuditEngine {
    pub fn new(store: RuleStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn from_shared(store: Arc<RuleStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    /// Audit one record; never fails
    pub fn audit(&self, record: &UsageRecord) -> AuditResult {
        // no class is assumed when the record carries none; it audits as SKIPPED
        let raw_sc = record.service_class.as_deref().unwrap_or_default();
        let sc_code = normalize_sc_code(raw_sc);
        let actual = record.actual_bill();

        let Some(tariff) = self.store.get(&sc_code) else {
            let reason = format!("No logic for {} (normalized={})", raw_sc, sc_code);
            debug!("{}", reason);
            return AuditResult::skipped(sc_code, actual, reason)
                .with_account_id(record.account_id.clone());
        };

        // reference-only or canceled classes carry no steps
        if tariff.logic_steps.is_empty() {
            let note = tariff.notes.as_deref().unwrap_or("No active rate logic.");
            let reason = format!("{}: {}", raw_sc, note);
            return AuditResult::skipped(sc_code, actual, reason)
                .with_account_id(record.account_id.clone());
        }

        let context = record.to_context();
        let processor = StepProcessor::new(&context, record.voltage_kv());

        let mut total = 0.0;
        let mut trace = Vec::new();
        let mut minimums = MinimumCharges::new();

        for step in &tariff.logic_steps {
            let report = processor.process(step);
            match report.outcome {
                StepOutcome::Charged(amount) => total += amount,
                StepOutcome::DeferredMinimum(candidate) => minimums.record(candidate),
                StepOutcome::Skipped { .. } => {},
            }
            trace.extend(report.trace);
        }

        let (total, adjustment) = minimums.apply(total);
        if let Some(adjustment) = adjustment {
            trace.push(adjustment.trace_line());
        }

        debug!(
            "Audited {}: expected={:.2} actual={:.2}",
            sc_code, total, actual
        );
        AuditResult::success(sc_code, actual, total, trace)
            .with_account_id(record.account_id.clone())
    }

    /// Audit records in order on the calling thread
    pub fn audit_batch(&self, records: &[UsageRecord]) -> Vec<AuditResult> {
        records.iter().map(|record| self.audit(record)).collect()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::result::AuditStatus;

    fn engine() -> AuditEngine {
        AuditEngine::new(
            RuleStore::from_json_str(
                r#"[
                {"sc_code": "SC1", "logic_steps": [
                    {"step_name": "Customer Charge", "charge_type": "fixed_fee", "value": 17.0, "condition": "Always"},
                    {"step_name": "Energy Charge", "charge_type": "per_kwh", "value": 0.1}
                ]},
                {"sc_code": "SC4", "note": "Canceled; see SC9.", "logic_steps": []}
            ]"#,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_success() {
        let record = UsageRecord {
            billed_kwh: Some(500.0),
            bill_amount: Some(60.0),
            account_id: Some("A-7".to_string()),
            ..UsageRecord::new("sc-1")
        };
        let result = engine().audit(&record);

        assert_eq!(result.status, AuditStatus::Success);
        assert_eq!(result.sc_code, "SC1");
        assert_eq!(result.expected_bill, 67.0);
        assert_eq!(result.variance, 7.0);
        assert_eq!(result.account_id.as_deref(), Some("A-7"));
        assert_eq!(
            result.trace,
            vec!["Customer Charge: $17.00", "Energy Charge: $50.00"]
        );
    }

    #[test]
    fn test_skipped_reasons() {
        let result = engine().audit(&UsageRecord::new("SC99"));
        assert_eq!(result.status, AuditStatus::Skipped);
        assert_eq!(
            result.reason.as_deref(),
            Some("No logic for SC99 (normalized=SC99)")
        );

        let result = engine().audit(&UsageRecord::new("SC 4"));
        assert_eq!(result.reason.as_deref(), Some("SC 4: Canceled; see SC9."));
    }

    #[test]
    fn test_missing_service_class_is_skipped_not_defaulted_to_sc1() {
        let record = UsageRecord {
            billed_kwh: Some(500.0),
            ..UsageRecord::default()
        };
        let result = engine().audit(&record);
        assert_eq!(result.status, AuditStatus::Skipped);
        assert_eq!(result.sc_code, "");
        assert_eq!(result.expected_bill, 0.0);
    }

    #[test]
    fn test_batch_keeps_order() {
        let records = vec![
            UsageRecord::new("SC99"),
            UsageRecord::new("SC1"),
            UsageRecord::new("SC4"),
        ];
        let results = engine().audit_batch(&records);
        let statuses: Vec<_> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![AuditStatus::Skipped, AuditStatus::Success, AuditStatus::Skipped]
        );
    }
}
