//! Bell-pair allocation per attempt.
//!
//! Starts from a difficulty-derived base, escalates by one pair per retry,
//! adds headroom for high thresholds, and clamps to the game ceiling and to
//! what the budget can actually cover.

use crate::domain::types::EdgeScore;

const MIN_PAIRS: u32 = 2;
const MAX_PAIRS: u32 = 8;

/// Chooses the Bell-pair count for one claim attempt.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResourcePlanner;

impl ResourcePlanner {
    /// `attempt_number` is the edge's recorded attempt count, zero on the
    /// first try. Escalation is monotonic until the clamp engages.
    pub fn bell_pair_count(
        &self,
        score: &EdgeScore,
        current_budget: u32,
        attempt_number: u32,
    ) -> u32 {
        let base = match score.difficulty {
            0..=3 => 2,
            4..=6 => 3,
            _ => 4,
        };

        let mut pairs = base + attempt_number;
        if score.threshold > 0.85 {
            pairs += 1;
        }
        if score.threshold > 0.92 {
            pairs += 1;
        }

        // The budget-derived ceiling wins even when it sits below the
        // two-pair floor; the allocation never exceeds floor(budget / 2).
        let ceiling = (current_budget / 2).min(MAX_PAIRS);
        pairs.min(ceiling).max(MIN_PAIRS.min(ceiling))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(difficulty: u8, threshold: f64) -> EdgeScore {
        EdgeScore {
            edge_id: ("a".to_string(), "b".to_string()),
            target_node_id: "b".to_string(),
            priority: 0.0,
            expected_cost: 4,
            expected_utility: 8.0,
            estimated_success_prob: 0.7,
            roi: 2.0,
            utility: 10,
            bonus_pairs: 0,
            difficulty,
            threshold,
        }
    }

    #[test]
    fn base_allocation_scales_with_difficulty() {
        let planner = ResourcePlanner;
        assert_eq!(planner.bell_pair_count(&score(2, 0.7), 50, 0), 2);
        assert_eq!(planner.bell_pair_count(&score(5, 0.7), 50, 0), 3);
        assert_eq!(planner.bell_pair_count(&score(8, 0.7), 50, 0), 4);
    }

    #[test]
    fn retries_escalate_monotonically_until_the_clamp() {
        let planner = ResourcePlanner;
        let edge = score(5, 0.88);
        // 3 base + 1 threshold bump, then +1 per retry.
        assert_eq!(planner.bell_pair_count(&edge, 30, 0), 4);
        assert_eq!(planner.bell_pair_count(&edge, 30, 1), 5);
        assert_eq!(planner.bell_pair_count(&edge, 30, 2), 6);
        assert_eq!(planner.bell_pair_count(&edge, 30, 3), 7);
        assert_eq!(planner.bell_pair_count(&edge, 30, 4), 8);
        assert_eq!(planner.bell_pair_count(&edge, 30, 9), 8);

        let mut previous = 0;
        for attempt in 0..12 {
            let pairs = planner.bell_pair_count(&edge, 30, attempt);
            assert!(pairs >= previous, "escalation regressed at {attempt}");
            previous = pairs;
        }
    }

    #[test]
    fn very_high_thresholds_add_two_pairs() {
        let planner = ResourcePlanner;
        assert_eq!(planner.bell_pair_count(&score(2, 0.93), 50, 0), 4);
    }

    #[test]
    fn budget_caps_the_allocation() {
        let planner = ResourcePlanner;
        // floor(11 / 2) = 5 caps an otherwise larger allocation.
        assert_eq!(planner.bell_pair_count(&score(8, 0.95), 11, 3), 5);
    }

    #[test]
    fn allocation_stays_in_valid_range() {
        let planner = ResourcePlanner;
        for difficulty in 1..=10 {
            for attempt in 0..6 {
                for budget in [2, 3, 4, 10, 16, 100] {
                    let ceiling = (budget / 2).min(MAX_PAIRS);
                    let pairs =
                        planner.bell_pair_count(&score(difficulty, 0.9), budget, attempt);
                    assert!(pairs <= budget / 2, "pairs {pairs} over budget {budget}");
                    assert!(pairs <= MAX_PAIRS);
                    assert!(pairs >= MIN_PAIRS.min(ceiling));
                }
            }
        }
    }

    #[test]
    fn a_starved_budget_caps_below_the_two_pair_floor() {
        let planner = ResourcePlanner;
        assert_eq!(planner.bell_pair_count(&score(5, 0.9), 2, 0), 1);
        assert_eq!(planner.bell_pair_count(&score(5, 0.9), 3, 0), 1);
        assert_eq!(planner.bell_pair_count(&score(5, 0.9), 1, 0), 0);
    }
}
