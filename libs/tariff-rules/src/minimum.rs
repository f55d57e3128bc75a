//! Minimum-charge resolver
//!
//! Minimum steps are collected while the other steps run and applied once at
//! the end: the highest candidate governs.

/// Collected minimum-charge candidates for one audit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MinimumCharges {
    candidates: Vec<f64>,
}

/// Raise applied to a total that fell below the governing minimum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimumAdjustment {
    pub minimum: f64,
    pub adjustment: f64,
}

impl MinimumAdjustment {
    pub fn trace_line(&self) -> String {
        format!(
            "Minimum Charge Adjustment: Increased bill to minimum ${:.2} (+${:.2}).",
            self.minimum, self.adjustment
        )
    }
}

impl MinimumCharges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, candidate: f64) {
        self.candidates.push(candidate);
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Strictest (highest) candidate
    pub fn governing(&self) -> Option<f64> {
        self.candidates.iter().copied().reduce(f64::max)
    }

    /// Floor `total` at the governing minimum
    ///
    /// Returns the new total and the adjustment, if one was needed.
    pub fn apply(&self, total: f64) -> (f64, Option<MinimumAdjustment>) {
        match self.governing() {
            Some(minimum) if total < minimum => (
                minimum,
                Some(MinimumAdjustment {
                    minimum,
                    adjustment: minimum - total,
                }),
            ),
            _ => (total, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_candidates_is_noop() {
        let minimums = MinimumCharges::new();
        assert!(minimums.is_empty());
        assert_eq!(minimums.governing(), None);
        assert_eq!(minimums.apply(12.0), (12.0, None));
    }

    #[test]
    fn test_highest_candidate_wins() {
        let mut minimums = MinimumCharges::new();
        minimums.record(20.0);
        minimums.record(25.0);
        minimums.record(18.0);
        assert_eq!(minimums.governing(), Some(25.0));

        let (total, adjustment) = minimums.apply(10.0);
        assert_eq!(total, 25.0);
        let adjustment = adjustment.unwrap_or_else(|| panic!("expected an adjustment"));
        assert_eq!(adjustment.adjustment, 15.0);
        assert_eq!(
            adjustment.trace_line(),
            "Minimum Charge Adjustment: Increased bill to minimum $25.00 (+$15.00)."
        );
    }

    #[test]
    fn test_total_at_or_above_minimum_unchanged() {
        let mut minimums = MinimumCharges::new();
        minimums.record(20.0);
        assert_eq!(minimums.apply(20.0), (20.0, None));
        assert_eq!(minimums.apply(31.5), (31.5, None));
    }
}
