//! Cost estimation and the pre-execution policy gate
//!
//! A dry run reports how many bytes a query would scan. Everything else
//! (the dollar estimate, the hard ceiling, the advisory warning) is derived
//! from that one number.

use serde::{Deserialize, Serialize};

const GIB: u64 = 1024 * 1024 * 1024;

/// Hard ceiling on bytes a single query may scan (5 GB)
pub const MAX_BYTES_PROCESSED: u64 = 5 * GIB;

/// Bytes scanned per currency unit of cost (~$1 per 5 GB)
pub const BYTES_PER_UNIT_COST: u64 = 5 * GIB;

/// Estimated cost above which an advisory warning is emitted
pub const COST_THRESHOLD_WARNING: f64 = 1.0;

/// Rows returned when the caller does not ask for a specific count
pub const DEFAULT_ROW_LIMIT: u64 = 100;

/// Cost policy thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostPolicy {
    /// Queries scanning more than this are refused
    pub max_bytes_processed: u64,
    /// Conversion factor from bytes to cost units
    pub bytes_per_unit_cost: u64,
    /// Warn when the estimated cost exceeds this
    pub cost_warning_threshold: f64,
    /// Row limit used when the request does not carry one
    pub default_max_results: u64,
}

impl Default for CostPolicy {
    fn default() -> Self {
        Self {
            max_bytes_processed: MAX_BYTES_PROCESSED,
            bytes_per_unit_cost: BYTES_PER_UNIT_COST,
            cost_warning_threshold: COST_THRESHOLD_WARNING,
            default_max_results: DEFAULT_ROW_LIMIT,
        }
    }
}

impl CostPolicy {
    /// Derive a cost estimate from a dry-run byte count
    pub fn estimate(&self, bytes_processed: u64) -> CostEstimate {
        let estimated_cost_usd = if self.bytes_per_unit_cost == 0 {
            0.0
        } else {
            bytes_processed as f64 / self.bytes_per_unit_cost as f64
        };

        CostEstimate {
            bytes_processed,
            estimated_cost_usd,
            exceeds_limit: bytes_processed > self.max_bytes_processed,
            cost_warning: estimated_cost_usd > self.cost_warning_threshold,
        }
    }
}

/// Result of a dry run after applying the policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostEstimate {
    pub bytes_processed: u64,
    pub estimated_cost_usd: f64,
    pub exceeds_limit: bool,
    pub cost_warning: bool,
}

impl CostEstimate {
    /// Estimate recorded when no dry run result is available
    pub fn zero() -> Self {
        Self {
            bytes_processed: 0,
            estimated_cost_usd: 0.0,
            exceeds_limit: false,
            cost_warning: false,
        }
    }

    /// Advisory text for an expensive but permitted query
    pub fn warning_message(&self) -> String {
        format!(
            "⚠️ This query is estimated to process {} bytes (~${:.2}), which is relatively expensive. \
             Consider refining your query to process less data.",
            self.bytes_processed, self.estimated_cost_usd
        )
    }
}

/// Human label for a byte count, e.g. "5 GB" or "2.50 GB"
pub fn gib_label(bytes: &u64) -> String {
    if bytes % GIB == 0 {
        format!("{} GB", bytes / GIB)
    } else {
        format!("{:.2} GB", *bytes as f64 / GIB as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_gib_is_under_every_threshold() {
        let estimate = CostPolicy::default().estimate(2 * GIB);

        assert_eq!(estimate.bytes_processed, 2147483648);
        assert!((estimate.estimated_cost_usd - 0.4).abs() < 1e-9);
        assert!(!estimate.exceeds_limit);
        assert!(!estimate.cost_warning);
    }

    #[test]
    fn test_six_gib_exceeds_limit() {
        let estimate = CostPolicy::default().estimate(6 * GIB);

        assert!(estimate.exceeds_limit);
        assert!(estimate.cost_warning);
        assert!((estimate.estimated_cost_usd - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_limit_is_exclusive() {
        let estimate = CostPolicy::default().estimate(MAX_BYTES_PROCESSED);
        assert!(!estimate.exceeds_limit);
        // exactly $1.00 is not above the threshold
        assert!(!estimate.cost_warning);
    }

    #[test]
    fn test_zero_bytes() {
        let estimate = CostPolicy::default().estimate(0);
        assert_eq!(estimate, CostEstimate::zero());
    }

    #[test]
    fn test_warning_below_limit_with_cheaper_pricing() {
        let policy = CostPolicy {
            bytes_per_unit_cost: GIB,
            ..CostPolicy::default()
        };
        let estimate = policy.estimate(3 * GIB);

        assert!(!estimate.exceeds_limit);
        assert!(estimate.cost_warning);
        assert!(estimate.warning_message().contains("3221225472 bytes"));
        assert!(estimate.warning_message().contains("~$3.00"));
    }

    #[test]
    fn test_zero_conversion_factor_does_not_divide() {
        let policy = CostPolicy {
            bytes_per_unit_cost: 0,
            ..CostPolicy::default()
        };
        assert_eq!(policy.estimate(10).estimated_cost_usd, 0.0);
    }

    #[test]
    fn test_gib_label() {
        assert_eq!(gib_label(&MAX_BYTES_PROCESSED), "5 GB");
        assert_eq!(gib_label(&(GIB + GIB / 2)), "1.50 GB");
    }
}
