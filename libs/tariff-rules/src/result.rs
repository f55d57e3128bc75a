//! Audit results and discrepancy classification

use serde::{Deserialize, Serialize};
use std::fmt;

/// Round to cents, ties to even (`round(x, 2)` in the rule language)
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round_ties_even() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    Success,
    Skipped,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditStatus::Success => f.write_str("SUCCESS"),
            AuditStatus::Skipped => f.write_str("SKIPPED"),
        }
    }
}

/// Outcome of auditing one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub status: AuditStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Normalized code the record was audited under
    pub sc_code: String,
    pub actual_bill: f64,
    pub expected_bill: f64,
    /// `expected_bill - actual_bill`; positive means the customer was billed
    /// less than the tariff requires
    pub variance: f64,
    pub trace: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditResult {
    pub fn success(sc_code: String, actual: f64, expected: f64, trace: Vec<String>) -> Self {
        let actual_bill = round_cents(actual);
        let expected_bill = round_cents(expected);
        Self {
            status: AuditStatus::Success,
            account_id: None,
            sc_code,
            actual_bill,
            expected_bill,
            variance: round_cents(expected_bill - actual_bill),
            trace,
            reason: None,
        }
    }

    pub fn skipped(sc_code: String, actual: f64, reason: String) -> Self {
        Self {
            status: AuditStatus::Skipped,
            account_id: None,
            sc_code,
            actual_bill: round_cents(actual),
            expected_bill: 0.0,
            variance: 0.0,
            trace: vec![reason.clone()],
            reason: Some(reason),
        }
    }

    pub fn with_account_id(mut self, account_id: Option<String>) -> Self {
        self.account_id = account_id;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == AuditStatus::Success
    }

    /// Classify the variance against a dollar tolerance (strictly exceeded)
    pub fn discrepancy(&self, tolerance: f64) -> Discrepancy {
        if !self.is_success() {
            return Discrepancy::WithinTolerance;
        }
        if self.variance < -tolerance {
            Discrepancy::Overcharge
        } else if self.variance > tolerance {
            Discrepancy::Undercharge
        } else {
            Discrepancy::WithinTolerance
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Discrepancy {
    /// Customer was billed more than the tariff requires
    Overcharge,
    /// Customer was billed less than the tariff requires
    Undercharge,
    WithinTolerance,
}

impl Discrepancy {
    pub fn is_flagged(&self) -> bool {
        !matches!(self, Discrepancy::WithinTolerance)
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discrepancy::Overcharge => f.write_str("Overcharge"),
            Discrepancy::Undercharge => f.write_str("Undercharge"),
            Discrepancy::WithinTolerance => f.write_str("OK"),
        }
    }
}

/// Totals over a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditSummary {
    pub audited: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub overcharged: usize,
    pub undercharged: usize,
    /// Sum of variances of SUCCESS results
    pub total_variance: f64,
}

impl AuditSummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a AuditResult>, tolerance: f64) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.audited += 1;
            match result.status {
                AuditStatus::Success => {
                    summary.succeeded += 1;
                    summary.total_variance += result.variance;
                },
                AuditStatus::Skipped => summary.skipped += 1,
            }
            match result.discrepancy(tolerance) {
                Discrepancy::Overcharge => summary.overcharged += 1,
                Discrepancy::Undercharge => summary.undercharged += 1,
                Discrepancy::WithinTolerance => {},
            }
        }
        summary.total_variance = round_cents(summary.total_variance);
        summary
    }

    pub fn flagged(&self) -> usize {
        self.overcharged + self.undercharged
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn success(expected: f64, actual: f64) -> AuditResult {
        AuditResult::success("SC1".to_string(), actual, expected, vec![])
    }

    #[test]
    fn test_variance_sign() {
        let result = success(105.0, 100.0);
        assert_eq!(result.variance, 5.0);

        let result = success(100.004, 100.0);
        assert_eq!(result.expected_bill, 100.0);
        assert_eq!(result.variance, 0.0);
    }

    #[test]
    fn test_round_cents_ties_to_even() {
        assert_eq!(round_cents(10.125), 10.12);
        assert_eq!(round_cents(0.125), 0.12);
        assert_eq!(round_cents(0.375), 0.38);
        assert_eq!(round_cents(-0.125), -0.12);
        assert_eq!(round_cents(42.129), 42.13);
    }

    #[test]
    fn test_discrepancy_classification() {
        assert_eq!(success(105.0, 100.0).discrepancy(5.0), Discrepancy::WithinTolerance);
        assert_eq!(success(105.01, 100.0).discrepancy(5.0), Discrepancy::Undercharge);
        assert_eq!(success(90.0, 100.0).discrepancy(5.0), Discrepancy::Overcharge);

        let skipped = AuditResult::skipped("SC99".to_string(), 500.0, "No logic".to_string());
        assert_eq!(skipped.discrepancy(0.0), Discrepancy::WithinTolerance);
    }

    #[test]
    fn test_skipped_shape() {
        let skipped = AuditResult::skipped("SC99".to_string(), 42.129, "No logic for SC99".to_string());
        assert_eq!(skipped.actual_bill, 42.13);
        assert_eq!(skipped.expected_bill, 0.0);
        assert_eq!(skipped.variance, 0.0);
        assert_eq!(skipped.trace, vec!["No logic for SC99"]);

        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["status"], "SKIPPED");
        assert_eq!(json["reason"], "No logic for SC99");
        assert!(json.get("account_id").is_none());

        let json = serde_json::to_value(success(1.0, 1.0)).unwrap();
        assert_eq!(json["status"], "SUCCESS");
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn test_summary() {
        let results = vec![
            success(105.0, 100.0),
            success(120.0, 100.0),
            success(80.0, 100.0),
            AuditResult::skipped("SC99".to_string(), 10.0, "No logic".to_string()),
        ];
        let summary = AuditSummary::from_results(&results, 5.0);
        assert_eq!(summary.audited, 4);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.undercharged, 1);
        assert_eq!(summary.overcharged, 1);
        assert_eq!(summary.flagged(), 2);
        assert_eq!(summary.total_variance, 5.0);
    }
}
