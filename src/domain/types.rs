use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::circuit::{Circuit, Protocol};

/// Unordered pair of node identifiers. Serialized as a two-element array,
/// matching the game server's wire format.
pub type EdgeId = (String, String);

/// A node in the network graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: String,
    /// Score credited when the node is claimed.
    #[serde(default)]
    pub utility: u32,
    /// Bell pairs refunded to the budget when the node is claimed.
    #[serde(default)]
    pub bonus_pairs: u32,
}

/// An edge in the network graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeInfo {
    pub edge_id: EdgeId,
    /// Difficulty rating in [1, 10].
    pub difficulty: u8,
    /// Fidelity the submitted distillation must reach, in (0, 1].
    pub threshold: f64,
}

/// Read-only snapshot of the game graph. Refresh replaces the whole value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<NodeInfo>,
    #[serde(default)]
    pub edges: Vec<EdgeInfo>,
}

impl GraphSnapshot {
    pub fn node(&self, node_id: &str) -> Option<&NodeInfo> {
        self.nodes.iter().find(|node| node.node_id == node_id)
    }

    pub fn edge(&self, edge_id: &EdgeId) -> Option<&EdgeInfo> {
        self.edges.iter().find(|edge| {
            edge.edge_id == *edge_id
                || (edge.edge_id.0 == edge_id.1 && edge.edge_id.1 == edge_id.0)
        })
    }

    /// Edges with exactly one endpoint owned — the claimable frontier.
    pub fn claimable_edges(&self, owned_nodes: &BTreeSet<String>) -> Vec<EdgeInfo> {
        self.edges
            .iter()
            .filter(|edge| {
                owned_nodes.contains(&edge.edge_id.0) != owned_nodes.contains(&edge.edge_id.1)
            })
            .cloned()
            .collect()
    }
}

/// Player-side view of the game, refreshed from the server every iteration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatus {
    #[serde(default)]
    pub budget: u32,
    #[serde(default)]
    pub score: u32,
    #[serde(default)]
    pub owned_nodes: BTreeSet<String>,
    #[serde(default)]
    pub owned_edges: Vec<EdgeId>,
}

/// Per-ranking-pass scoring result for one claimable edge.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeScore {
    pub edge_id: EdgeId,
    /// The endpoint not yet owned.
    pub target_node_id: String,
    pub priority: f64,
    /// Projected Bell-pair spend, always in [2, 8].
    pub expected_cost: u32,
    pub expected_utility: f64,
    pub estimated_success_prob: f64,
    pub roi: f64,
    // Snapshot of the inputs the score was computed from.
    pub utility: u32,
    pub bonus_pairs: u32,
    pub difficulty: u8,
    pub threshold: f64,
}

/// Retry bookkeeping for one edge. Mutated only by the UpdateState stage,
/// via the budget manager.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttemptRecord {
    pub attempts: u32,
    pub successes: u32,
    pub failures: u32,
    /// Bell pairs charged by the server. Failed attempts are free.
    pub total_pairs_spent: u32,
    /// Protocol used on the most recent attempt; drives alternation on retry.
    pub last_protocol: Option<Protocol>,
}

/// Routing decision a stage reports to the orchestrator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StageAction {
    /// Proceed to the next stage in the fixed order.
    #[default]
    Continue,
    /// Abandon this iteration (admission or simulation reject) and jump
    /// straight to UpdateState.
    Skip,
    /// Terminate the loop after UpdateState.
    Stop,
}

/// Why the control loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    NoClaimableEdges,
    BudgetExhausted,
    MaxIterationsReached,
    Cancelled,
    TransportFailure,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StopReason::NoClaimableEdges => "no_claimable_edges",
            StopReason::BudgetExhausted => "budget_exhausted",
            StopReason::MaxIterationsReached => "max_iterations_reached",
            StopReason::Cancelled => "cancelled",
            StopReason::TransportFailure => "transport_failure",
        };
        f.write_str(label)
    }
}

/// Outcome of one iteration, as recorded in the attempt log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Server accepted the claim; the target node is now owned.
    Claimed,
    /// Server processed the claim and rejected it (fidelity or stochastic
    /// failure). Counts against the edge's retry quota.
    ServerRejected,
    /// The claim never reached the server. Also counts as a failed attempt.
    TransportFailed,
    /// Local simulation predicted failure; nothing was submitted.
    SimulationRejected,
    /// The admission gate refused the best-ranked edge.
    AdmissionSkipped,
}

/// Compact per-iteration record surfaced in the final summary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttemptLogEntry {
    pub iteration: u32,
    pub edge_id: Option<EdgeId>,
    pub protocol: Option<Protocol>,
    pub pairs: u32,
    pub outcome: AttemptOutcome,
    pub detail: String,
}

/// State threaded through the six stages of one iteration.
///
/// Each stage consumes the previous snapshot by value and returns a new one;
/// no stage observes mutation performed by a later stage.
#[derive(Clone, Debug, Default)]
pub struct IterationState {
    pub iteration: u32,
    pub initial_budget: u32,
    pub status: PlayerStatus,
    pub graph: GraphSnapshot,
    pub claimable: Vec<EdgeInfo>,

    pub selected_edge: Option<EdgeScore>,
    pub protocol: Option<Protocol>,
    pub num_pairs: u32,
    pub circuit: Option<Circuit>,
    pub flag_bit: usize,

    pub simulation_passed: bool,
    pub simulation_reason: Option<String>,
    /// Why the iteration was abandoned, when the admission gate refused it.
    pub skip_reason: Option<String>,

    pub execution_success: bool,
    pub execution_detail: Option<String>,
    pub execution_was_transport_error: bool,

    pub action: StageAction,
    pub stop_reason: Option<StopReason>,

    pub successful_claims: u32,
    pub failed_attempts: u32,
    pub skipped_iterations: u32,
    pub attempt_log: Vec<AttemptLogEntry>,
}

impl IterationState {
    /// Clears the per-iteration decision fields while keeping game state and
    /// counters. Called at the top of every iteration.
    pub fn begin_iteration(self) -> Self {
        Self {
            selected_edge: None,
            protocol: None,
            num_pairs: 0,
            circuit: None,
            flag_bit: 0,
            simulation_passed: false,
            simulation_reason: None,
            skip_reason: None,
            execution_success: false,
            execution_detail: None,
            execution_was_transport_error: false,
            action: StageAction::Continue,
            ..self
        }
    }
}

/// Final report returned by `run_autonomous`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub iterations: u32,
    pub successful_claims: u32,
    pub failed_attempts: u32,
    pub skipped_iterations: u32,
    pub final_score: u32,
    pub final_budget: u32,
    pub owned_nodes: BTreeSet<String>,
    pub owned_edges: Vec<EdgeId>,
    pub stop_reason: StopReason,
    pub attempt_log: Vec<AttemptLogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_frontier() -> GraphSnapshot {
        GraphSnapshot {
            nodes: vec![
                NodeInfo {
                    node_id: "a".to_string(),
                    utility: 10,
                    bonus_pairs: 0,
                },
                NodeInfo {
                    node_id: "b".to_string(),
                    utility: 5,
                    bonus_pairs: 2,
                },
                NodeInfo {
                    node_id: "c".to_string(),
                    utility: 7,
                    bonus_pairs: 0,
                },
            ],
            edges: vec![
                EdgeInfo {
                    edge_id: ("a".to_string(), "b".to_string()),
                    difficulty: 3,
                    threshold: 0.8,
                },
                EdgeInfo {
                    edge_id: ("b".to_string(), "c".to_string()),
                    difficulty: 5,
                    threshold: 0.9,
                },
            ],
        }
    }

    #[test]
    fn claimable_edges_require_exactly_one_owned_endpoint() {
        let graph = graph_with_frontier();
        let owned = BTreeSet::from(["a".to_string()]);

        let claimable = graph.claimable_edges(&owned);
        assert_eq!(claimable.len(), 1);
        assert_eq!(claimable[0].edge_id, ("a".to_string(), "b".to_string()));

        let owned_both = BTreeSet::from(["a".to_string(), "b".to_string()]);
        let claimable = graph.claimable_edges(&owned_both);
        assert_eq!(claimable.len(), 1);
        assert_eq!(claimable[0].edge_id, ("b".to_string(), "c".to_string()));
    }

    #[test]
    fn edge_lookup_ignores_endpoint_order() {
        let graph = graph_with_frontier();
        let reversed = ("b".to_string(), "a".to_string());
        assert!(graph.edge(&reversed).is_some());
    }

    #[test]
    fn stop_reason_renders_snake_case() {
        assert_eq!(
            StopReason::NoClaimableEdges.to_string(),
            "no_claimable_edges"
        );
        assert_eq!(StopReason::TransportFailure.to_string(), "transport_failure");
    }

    #[test]
    fn begin_iteration_clears_decisions_and_keeps_counters() {
        let state = IterationState {
            iteration: 4,
            successful_claims: 2,
            num_pairs: 5,
            simulation_passed: true,
            action: StageAction::Skip,
            ..IterationState::default()
        };

        let fresh = state.begin_iteration();
        assert_eq!(fresh.iteration, 4);
        assert_eq!(fresh.successful_claims, 2);
        assert_eq!(fresh.num_pairs, 0);
        assert!(!fresh.simulation_passed);
        assert_eq!(fresh.action, StageAction::Continue);
    }
}
