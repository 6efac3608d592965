//! Multi-factor edge scoring.
//!
//! Each claimable edge gets a priority mixing the target node's utility,
//! the estimated success probability, difficulty, projected Bell-pair cost,
//! and ROI. Weights are tunable; aggressive profiles push utility,
//! conservative profiles push cost.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::types::{EdgeInfo, EdgeScore, GraphSnapshot, PlayerStatus};

/// Hard game bounds on the projected spend for one claim.
const MIN_EXPECTED_COST: u32 = 2;

/// Clamps on the success-probability heuristic.
const MIN_SUCCESS_ESTIMATE: f64 = 0.10;
const MAX_SUCCESS_ESTIMATE: f64 = 0.95;

/// Thresholds below this carry no feasibility penalty.
const THRESHOLD_BASELINE: f64 = 0.5;

/// ROI contribution to the priority score.
const ROI_WEIGHT: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub utility: f64,
    pub difficulty: f64,
    pub cost: f64,
    pub success_prob: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            utility: 1.0,
            difficulty: 0.5,
            cost: 0.3,
            success_prob: 0.4,
        }
    }
}

/// Scores and ranks the claimable frontier.
#[derive(Clone, Debug, Default)]
pub struct EdgeScorer {
    weights: ScoringWeights,
}

impl EdgeScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Success heuristic for ranking: drops linearly with difficulty and
    /// with the threshold's distance from its baseline, clamped to
    /// [0.10, 0.95].
    pub fn estimated_success_prob(difficulty: u8, threshold: f64) -> f64 {
        let difficulty_penalty = f64::from(difficulty) * 0.05;
        let threshold_penalty = (threshold - THRESHOLD_BASELINE) * 0.3;
        (1.0 - difficulty_penalty - threshold_penalty)
            .clamp(MIN_SUCCESS_ESTIMATE, MAX_SUCCESS_ESTIMATE)
    }

    /// Projected Bell-pair spend: 2 base, plus ceil(difficulty / 2), plus
    /// one for high-threshold edges. Always lands in [2, 8].
    pub fn expected_cost(difficulty: u8, threshold: f64) -> u32 {
        let difficulty_pairs = u32::from(difficulty).div_ceil(2);
        let threshold_pairs = u32::from(threshold > 0.85);
        (MIN_EXPECTED_COST + difficulty_pairs + threshold_pairs).max(MIN_EXPECTED_COST)
    }

    /// Scores one edge of the claimable frontier. Returns `None` when the
    /// edge has no identifiable target (both or neither endpoint owned, or
    /// the target node is missing from the graph).
    pub fn score_edge(
        &self,
        edge: &EdgeInfo,
        graph: &GraphSnapshot,
        owned_nodes: &BTreeSet<String>,
    ) -> Option<EdgeScore> {
        let (near, far) = (&edge.edge_id.0, &edge.edge_id.1);
        let target_node_id = match (owned_nodes.contains(near), owned_nodes.contains(far)) {
            (true, false) => far.clone(),
            (false, true) => near.clone(),
            _ => return None,
        };
        let target = graph.node(&target_node_id)?;

        let success_prob = Self::estimated_success_prob(edge.difficulty, edge.threshold);
        let expected_cost = Self::expected_cost(edge.difficulty, edge.threshold);
        let expected_utility =
            (f64::from(target.utility) + 0.5 * f64::from(target.bonus_pairs)) * success_prob;
        let roi = expected_utility / f64::from(expected_cost.max(1));

        let priority = self.weights.utility * expected_utility
            + self.weights.success_prob * success_prob * 10.0
            - self.weights.difficulty * f64::from(edge.difficulty)
            - self.weights.cost * f64::from(expected_cost)
            + ROI_WEIGHT * roi;

        Some(EdgeScore {
            edge_id: edge.edge_id.clone(),
            target_node_id,
            priority,
            expected_cost,
            expected_utility,
            estimated_success_prob: success_prob,
            roi,
            utility: target.utility,
            bonus_pairs: target.bonus_pairs,
            difficulty: edge.difficulty,
            threshold: edge.threshold,
        })
    }

    /// Ranks the claimable frontier by descending priority. Ties break on
    /// higher ROI, then lower difficulty, then lexicographic edge id.
    pub fn rank_edges(
        &self,
        claimable: &[EdgeInfo],
        graph: &GraphSnapshot,
        status: &PlayerStatus,
    ) -> Vec<EdgeScore> {
        let mut scores: Vec<EdgeScore> = claimable
            .iter()
            .filter_map(|edge| self.score_edge(edge, graph, &status.owned_nodes))
            .collect();
        scores.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.roi.partial_cmp(&a.roi).unwrap_or(Ordering::Equal))
                .then_with(|| a.difficulty.cmp(&b.difficulty))
                .then_with(|| a.edge_id.cmp(&b.edge_id))
        });
        scores
    }

    /// Highest-ranked edge whose projected spend leaves the reserve
    /// intact; `None` when no candidate is affordable.
    pub fn select_best_edge(
        &self,
        claimable: &[EdgeInfo],
        graph: &GraphSnapshot,
        status: &PlayerStatus,
        min_reserve: u32,
    ) -> Option<EdgeScore> {
        self.rank_edges(claimable, graph, status)
            .into_iter()
            .find(|score| score.expected_cost.saturating_add(min_reserve) <= status.budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::NodeInfo;

    fn three_edge_fixture() -> (GraphSnapshot, PlayerStatus) {
        let graph = GraphSnapshot {
            nodes: vec![
                NodeInfo {
                    node_id: "start".to_string(),
                    utility: 0,
                    bonus_pairs: 0,
                },
                NodeInfo {
                    node_id: "n1".to_string(),
                    utility: 10,
                    bonus_pairs: 0,
                },
                NodeInfo {
                    node_id: "n2".to_string(),
                    utility: 15,
                    bonus_pairs: 0,
                },
                NodeInfo {
                    node_id: "n3".to_string(),
                    utility: 5,
                    bonus_pairs: 0,
                },
            ],
            edges: vec![
                EdgeInfo {
                    edge_id: ("start".to_string(), "n1".to_string()),
                    difficulty: 2,
                    threshold: 0.80,
                },
                EdgeInfo {
                    edge_id: ("start".to_string(), "n2".to_string()),
                    difficulty: 7,
                    threshold: 0.90,
                },
                EdgeInfo {
                    edge_id: ("start".to_string(), "n3".to_string()),
                    difficulty: 1,
                    threshold: 0.70,
                },
            ],
        };
        let status = PlayerStatus {
            budget: 50,
            score: 0,
            owned_nodes: BTreeSet::from(["start".to_string()]),
            owned_edges: Vec::new(),
        };
        (graph, status)
    }

    #[test]
    fn ranking_penalizes_difficulty_and_cost_over_raw_utility() {
        let (graph, status) = three_edge_fixture();
        let scorer = EdgeScorer::default();

        let ranked = scorer.rank_edges(&graph.edges, &graph, &status);
        let order: Vec<&str> = ranked
            .iter()
            .map(|score| score.target_node_id.as_str())
            .collect();
        // The utility-15 edge loses to both cheaper edges on difficulty and cost.
        assert_eq!(order, vec!["n1", "n3", "n2"]);
    }

    #[test]
    fn expected_cost_stays_within_game_bounds() {
        for difficulty in 1..=10 {
            for threshold in [0.5, 0.86, 0.95] {
                let cost = EdgeScorer::expected_cost(difficulty, threshold);
                assert!((2..=8).contains(&cost), "cost {cost} at d={difficulty}");
            }
        }
        assert_eq!(EdgeScorer::expected_cost(2, 0.80), 3);
        assert_eq!(EdgeScorer::expected_cost(7, 0.90), 7);
        assert_eq!(EdgeScorer::expected_cost(10, 0.95), 8);
    }

    #[test]
    fn success_estimate_is_clamped() {
        // d=10, t=0.99: 1.0 - 0.5 - 0.147 = 0.353
        let low = EdgeScorer::estimated_success_prob(10, 0.99);
        assert!((low - 0.353).abs() < 1e-9);
        let floor = EdgeScorer::estimated_success_prob(10, 2.0);
        assert_eq!(floor, MIN_SUCCESS_ESTIMATE);
        let ceiling = EdgeScorer::estimated_success_prob(0, 0.0);
        assert_eq!(ceiling, MAX_SUCCESS_ESTIMATE);
    }

    #[test]
    fn score_edge_targets_the_unowned_endpoint() {
        let (graph, status) = three_edge_fixture();
        let scorer = EdgeScorer::default();

        let score = scorer
            .score_edge(&graph.edges[0], &graph, &status.owned_nodes)
            .expect("frontier edge should score");
        assert_eq!(score.target_node_id, "n1");
        assert_eq!(score.utility, 10);
    }

    #[test]
    fn fully_owned_edges_do_not_score() {
        let (graph, mut status) = three_edge_fixture();
        status.owned_nodes.insert("n1".to_string());
        let scorer = EdgeScorer::default();
        assert!(scorer
            .score_edge(&graph.edges[0], &graph, &status.owned_nodes)
            .is_none());
    }

    #[test]
    fn bonus_pairs_count_half_toward_expected_utility() {
        let graph = GraphSnapshot {
            nodes: vec![
                NodeInfo {
                    node_id: "a".to_string(),
                    utility: 0,
                    bonus_pairs: 0,
                },
                NodeInfo {
                    node_id: "b".to_string(),
                    utility: 10,
                    bonus_pairs: 4,
                },
            ],
            edges: vec![EdgeInfo {
                edge_id: ("a".to_string(), "b".to_string()),
                difficulty: 2,
                threshold: 0.8,
            }],
        };
        let owned = BTreeSet::from(["a".to_string()]);
        let scorer = EdgeScorer::default();

        let score = scorer
            .score_edge(&graph.edges[0], &graph, &owned)
            .expect("edge should score");
        let success = EdgeScorer::estimated_success_prob(2, 0.8);
        assert!((score.expected_utility - 12.0 * success).abs() < 1e-9);
    }

    #[test]
    fn best_edge_must_leave_the_reserve_intact() {
        let (graph, mut status) = three_edge_fixture();
        let scorer = EdgeScorer::default();

        // Budget 12, reserve 10: even the cost-3 winner would dip into the
        // reserve, so nothing is selected.
        status.budget = 12;
        assert!(scorer
            .select_best_edge(&graph.edges, &graph, &status, 10)
            .is_none());

        // Budget 13: the cost-3 winner now clears the reserve.
        status.budget = 13;
        let best = scorer
            .select_best_edge(&graph.edges, &graph, &status, 10)
            .expect("an affordable edge exists");
        assert_eq!(best.target_node_id, "n1");
        assert_eq!(best.expected_cost, 3);
    }

    #[test]
    fn zero_budget_selects_nothing() {
        let (graph, mut status) = three_edge_fixture();
        status.budget = 0;
        let scorer = EdgeScorer::default();
        assert!(scorer
            .select_best_edge(&graph.edges, &graph, &status, 0)
            .is_none());
    }

    #[test]
    fn ties_break_on_roi_then_difficulty_then_id() {
        let graph = GraphSnapshot {
            nodes: vec![
                NodeInfo {
                    node_id: "a".to_string(),
                    utility: 0,
                    bonus_pairs: 0,
                },
                NodeInfo {
                    node_id: "b".to_string(),
                    utility: 8,
                    bonus_pairs: 0,
                },
                NodeInfo {
                    node_id: "c".to_string(),
                    utility: 8,
                    bonus_pairs: 0,
                },
            ],
            edges: vec![
                EdgeInfo {
                    edge_id: ("a".to_string(), "c".to_string()),
                    difficulty: 3,
                    threshold: 0.8,
                },
                EdgeInfo {
                    edge_id: ("a".to_string(), "b".to_string()),
                    difficulty: 3,
                    threshold: 0.8,
                },
            ],
        };
        let status = PlayerStatus {
            budget: 50,
            score: 0,
            owned_nodes: BTreeSet::from(["a".to_string()]),
            owned_edges: Vec::new(),
        };
        let scorer = EdgeScorer::default();

        let ranked = scorer.rank_edges(&graph.edges, &graph, &status);
        // Identical priority, ROI, and difficulty: lexicographic id wins.
        assert_eq!(ranked[0].edge_id, ("a".to_string(), "b".to_string()));
    }
}
