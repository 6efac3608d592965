//! Budget admission control.
//!
//! Every candidate attempt passes through [`BudgetManager::should_attempt`]
//! before any Bell pairs are committed. The gate combines retry quotas, a
//! reserve floor on the remaining budget, an expected-value check, and an
//! ROI bar that rises as the budget shrinks.

use std::collections::HashMap;
use std::fmt;

use crate::circuit::Protocol;
use crate::domain::types::{AttemptRecord, EdgeId, EdgeScore};

/// Success probability below which an attempt is never worth submitting.
pub const MIN_SUCCESS_PROB_THRESHOLD: f64 = 0.20;

/// Risk tolerance tiers as a function of budget_ratio = remaining / initial.
const RISK_NORMAL: f64 = 0.4;
const RISK_CONSERVATIVE: f64 = 0.6;
const RISK_VERY_CONSERVATIVE: f64 = 0.8;
const BUDGET_RATIO_HEALTHY: f64 = 0.5;
const BUDGET_RATIO_CRITICAL: f64 = 0.2;

/// Why the admission gate refused an attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum AdmissionReject {
    RetriesExhausted {
        attempts: u32,
        max_retries: u32,
    },
    InsufficientBudget {
        needed: u32,
        available: u32,
    },
    NegativeExpectedValue {
        expected_value: f64,
    },
    RoiBelowTolerance {
        roi: f64,
        tolerance: f64,
    },
    SuccessProbTooLow {
        probability: f64,
    },
}

impl fmt::Display for AdmissionReject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionReject::RetriesExhausted {
                attempts,
                max_retries,
            } => write!(f, "max retries reached ({attempts}/{max_retries})"),
            AdmissionReject::InsufficientBudget { needed, available } => {
                write!(f, "insufficient budget (need {needed}, have {available})")
            }
            AdmissionReject::NegativeExpectedValue { expected_value } => {
                write!(f, "negative expected value ({expected_value:.2})")
            }
            AdmissionReject::RoiBelowTolerance { roi, tolerance } => {
                write!(f, "roi {roi:.2} below risk tolerance {tolerance:.2}")
            }
            AdmissionReject::SuccessProbTooLow { probability } => {
                write!(f, "success probability too low ({probability:.2})")
            }
        }
    }
}

/// Admission controller over the Bell-pair budget.
///
/// Owns the per-edge [`AttemptRecord`]s; the orchestrator's UpdateState
/// stage is the only caller of the mutating operations.
#[derive(Clone, Debug)]
pub struct BudgetManager {
    min_reserve: u32,
    max_retries_per_edge: u32,
    risk_tolerance: f64,
    records: HashMap<EdgeId, AttemptRecord>,
}

impl BudgetManager {
    pub fn new(min_reserve: u32, max_retries_per_edge: u32, risk_tolerance: f64) -> Self {
        Self {
            min_reserve,
            max_retries_per_edge,
            risk_tolerance,
            records: HashMap::new(),
        }
    }

    pub fn min_reserve(&self) -> u32 {
        self.min_reserve
    }

    pub fn risk_tolerance(&self) -> f64 {
        self.risk_tolerance
    }

    /// Attempts recorded so far for an edge; zero for unseen edges.
    pub fn attempt_count(&self, edge_id: &EdgeId) -> u32 {
        self.records
            .get(edge_id)
            .map(|record| record.attempts)
            .unwrap_or(0)
    }

    /// Protocol used on the edge's most recent attempt, if any.
    pub fn last_protocol(&self, edge_id: &EdgeId) -> Option<Protocol> {
        self.records
            .get(edge_id)
            .and_then(|record| record.last_protocol)
    }

    pub fn record(&self, edge_id: &EdgeId) -> Option<&AttemptRecord> {
        self.records.get(edge_id)
    }

    /// Decides whether the scored edge may be attempted with the current
    /// budget. Read-only: refusals surface as values, not state changes.
    pub fn should_attempt(
        &self,
        score: &EdgeScore,
        current_budget: u32,
    ) -> Result<(), AdmissionReject> {
        let attempts = self.attempt_count(&score.edge_id);
        if attempts >= self.max_retries_per_edge {
            return Err(AdmissionReject::RetriesExhausted {
                attempts,
                max_retries: self.max_retries_per_edge,
            });
        }

        let needed = score.expected_cost.saturating_add(self.min_reserve);
        if current_budget < needed {
            return Err(AdmissionReject::InsufficientBudget {
                needed,
                available: current_budget,
            });
        }

        let expected_value = score.expected_utility - f64::from(score.expected_cost);
        if expected_value <= 0.0 {
            return Err(AdmissionReject::NegativeExpectedValue { expected_value });
        }

        if score.roi < self.risk_tolerance {
            return Err(AdmissionReject::RoiBelowTolerance {
                roi: score.roi,
                tolerance: self.risk_tolerance,
            });
        }

        if score.estimated_success_prob < MIN_SUCCESS_PROB_THRESHOLD {
            return Err(AdmissionReject::SuccessProbTooLow {
                probability: score.estimated_success_prob,
            });
        }

        Ok(())
    }

    /// Records the outcome of one attempt. Pairs are charged only on
    /// success; the server does not bill failed claims.
    pub fn record_attempt(
        &mut self,
        edge_id: &EdgeId,
        success: bool,
        pairs_spent: u32,
        protocol: Protocol,
    ) {
        let record = self.records.entry(edge_id.clone()).or_default();
        record.attempts += 1;
        if success {
            record.successes += 1;
            record.total_pairs_spent += pairs_spent;
        } else {
            record.failures += 1;
        }
        record.last_protocol = Some(protocol);
    }

    /// Drops the bookkeeping for a claimed edge; it has left the claimable
    /// set and its retry quota is irrelevant.
    pub fn reset_edge(&mut self, edge_id: &EdgeId) {
        self.records.remove(edge_id);
    }

    /// Re-derives the ROI bar from the fraction of the budget that remains.
    pub fn adjust_risk_tolerance(&mut self, current_budget: u32, initial_budget: u32) {
        let ratio = f64::from(current_budget) / f64::from(initial_budget.max(1));
        self.risk_tolerance = if ratio >= BUDGET_RATIO_HEALTHY {
            RISK_NORMAL
        } else if ratio >= BUDGET_RATIO_CRITICAL {
            RISK_CONSERVATIVE
        } else {
            RISK_VERY_CONSERVATIVE
        };
    }
}
