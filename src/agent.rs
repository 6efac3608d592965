//! The orchestrator: a bounded control loop over six staged decisions.
//!
//! Each stage is a function from one [`IterationState`] snapshot to the
//! next; the orchestrator is the only code that sequences them, routing
//! through [`state_machine::transition`] so every hop is validated and
//! logged. Game-server traffic happens in exactly three places —
//! EdgeSelection (status + graph refresh), Execution (the claim), and
//! UpdateState (post-claim refresh); everything else is synchronous.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::circuit::{build_protocol, Protocol};
use crate::client::GameClient;
use crate::config::AgentConfig;
use crate::domain::admission::BudgetManager;
use crate::domain::state_machine::{self, Flow, Stage};
use crate::domain::types::{
    AttemptLogEntry, AttemptOutcome, IterationState, RunSummary, StageAction, StopReason,
};
use crate::error::AgentError;
use crate::sim::Simulator;
use crate::strategy::{EdgeScorer, ResourcePlanner};

/// Autonomous player for the entanglement-distillation game.
///
/// Owns all mutable decision state (the budget manager's attempt records);
/// the configuration is read-only after construction, and the game client
/// is the single external dependency.
pub struct Agent<C: GameClient> {
    client: C,
    config: AgentConfig,
    scorer: EdgeScorer,
    planner: ResourcePlanner,
    budget: BudgetManager,
    simulator: Simulator,
    cancel: Arc<AtomicBool>,
}

impl<C: GameClient> Agent<C> {
    pub fn new(client: C, config: AgentConfig) -> Result<Self, AgentError> {
        config.validate()?;
        let budget = BudgetManager::new(
            config.min_reserve,
            config.max_retries_per_edge,
            config.risk_tolerance,
        );
        let simulator = Simulator {
            safety_margin: config.safety_margin,
            noise_intercept: config.noise_intercept,
            noise_slope: config.noise_slope,
            noise_floor: config.noise_floor,
        };
        Ok(Self {
            client,
            scorer: EdgeScorer::new(config.weights),
            planner: ResourcePlanner,
            budget,
            simulator,
            cancel: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    /// Shared flag that stops the loop at the next stage boundary.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Runs the control loop until a stop condition is met and returns the
    /// final summary. Transport exhaustion ends the run with a
    /// `transport_failure` summary; only programmer errors (invalid pair
    /// counts, broken stage routing) surface as `Err`.
    pub async fn run_autonomous(&mut self) -> Result<RunSummary, AgentError> {
        let mut state = match self.initialize().await {
            Ok(state) => state,
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => {
                warn!(%error, "initial refresh failed");
                return Ok(failed_bootstrap_summary());
            }
        };
        info!(
            budget = state.status.budget,
            score = state.status.score,
            claimable = state.claimable.len(),
            "starting autonomous run"
        );

        let mut stage = Stage::EdgeSelection;
        let stop_reason = loop {
            if self.cancel.load(Ordering::Relaxed) {
                break StopReason::Cancelled;
            }

            state = match stage {
                Stage::EdgeSelection => self.edge_selection(state).await,
                Stage::ResourceAllocation => self.resource_allocation(state),
                Stage::DistillationStrategy => self.distillation_strategy(state)?,
                Stage::SimulationCheck => self.simulation_check(state),
                Stage::Execution => self.execution(state).await,
                Stage::UpdateState => self.update_state(state).await,
            };

            match state_machine::transition(stage, state.action)
                .map_err(|error| AgentError::InvalidInput(error.to_string()))?
            {
                Flow::Advance(next) => {
                    debug!(iteration = state.iteration, from = %stage, to = %next, "stage advance");
                    stage = next;
                }
                Flow::NextIteration => {
                    stage = Stage::EdgeSelection;
                    state = state.begin_iteration();
                }
                Flow::Halt => {
                    break state.stop_reason.unwrap_or(StopReason::NoClaimableEdges);
                }
            }
        };

        let summary = build_summary(&state, stop_reason);
        info!(
            iterations = summary.iterations,
            claims = summary.successful_claims,
            failures = summary.failed_attempts,
            skips = summary.skipped_iterations,
            score = summary.final_score,
            budget = summary.final_budget,
            stop_reason = %summary.stop_reason,
            "autonomous run complete"
        );
        Ok(summary)
    }

    async fn initialize(&self) -> Result<IterationState, AgentError> {
        let status = self.client.status().await?;
        let graph = self.client.graph(false).await?;
        let claimable = graph.claimable_edges(&status.owned_nodes);
        Ok(IterationState {
            initial_budget: status.budget,
            claimable,
            status,
            graph,
            ..IterationState::default()
        })
    }

    /// Stage 1 — refresh the server view, rank the frontier, and gate the
    /// best candidate through the budget manager.
    async fn edge_selection(&self, state: IterationState) -> IterationState {
        let status = match self.client.status().await {
            Ok(status) => status,
            Err(error) => {
                warn!(%error, "status refresh failed");
                return IterationState {
                    action: StageAction::Stop,
                    stop_reason: Some(StopReason::TransportFailure),
                    ..state
                };
            }
        };
        let graph = match self.client.graph(false).await {
            Ok(graph) => graph,
            Err(error) => {
                warn!(%error, "graph refresh failed");
                return IterationState {
                    action: StageAction::Stop,
                    stop_reason: Some(StopReason::TransportFailure),
                    ..state
                };
            }
        };
        let claimable = graph.claimable_edges(&status.owned_nodes);
        let state = IterationState {
            status,
            graph,
            claimable,
            ..state
        };

        if state.claimable.is_empty() {
            return IterationState {
                action: StageAction::Stop,
                stop_reason: Some(StopReason::NoClaimableEdges),
                ..state
            };
        }
        if state.status.budget < self.budget.min_reserve() {
            return IterationState {
                action: StageAction::Stop,
                stop_reason: Some(StopReason::BudgetExhausted),
                ..state
            };
        }

        let Some(best) = self.scorer.select_best_edge(
            &state.claimable,
            &state.graph,
            &state.status,
            self.budget.min_reserve(),
        ) else {
            // Claimable edges exist but none fits on top of the reserve.
            return IterationState {
                action: StageAction::Stop,
                stop_reason: Some(StopReason::BudgetExhausted),
                ..state
            };
        };

        if let Err(rejection) = self.budget.should_attempt(&best, state.status.budget) {
            info!(
                iteration = state.iteration,
                edge = ?best.edge_id,
                %rejection,
                "admission gate refused the best edge"
            );
            return IterationState {
                skip_reason: Some(rejection.to_string()),
                selected_edge: Some(best),
                action: StageAction::Skip,
                ..state
            };
        }

        info!(
            iteration = state.iteration,
            edge = ?best.edge_id,
            priority = best.priority,
            roi = best.roi,
            "edge selected"
        );
        IterationState {
            selected_edge: Some(best),
            action: StageAction::Continue,
            ..state
        }
    }

    /// Stage 2 — pick the Bell-pair count for this attempt.
    fn resource_allocation(&self, state: IterationState) -> IterationState {
        let Some(edge) = state.selected_edge.clone() else {
            return state;
        };
        let attempt = self.budget.attempt_count(&edge.edge_id);
        let num_pairs = self
            .planner
            .bell_pair_count(&edge, state.status.budget, attempt);
        info!(
            iteration = state.iteration,
            pairs = num_pairs,
            attempt,
            "bell pairs allocated"
        );
        IterationState { num_pairs, ..state }
    }

    /// Stage 3 — choose the protocol and emit the circuit. A build failure
    /// here is a programming error and aborts the loop.
    fn distillation_strategy(
        &self,
        state: IterationState,
    ) -> Result<IterationState, AgentError> {
        let Some(edge) = state.selected_edge.clone() else {
            return Ok(state);
        };

        let attempt = self.budget.attempt_count(&edge.edge_id);
        let first_choice = if self.config.prefer_dejmps
            || edge.difficulty >= 7
            || edge.threshold >= 0.9
        {
            Protocol::Dejmps
        } else {
            Protocol::Bbpssw
        };
        let protocol = if attempt == 0 {
            first_choice
        } else {
            // Retry alternates from that edge's own last attempt, not from
            // any global toggle.
            self.budget
                .last_protocol(&edge.edge_id)
                .map(Protocol::alternate)
                .unwrap_or(first_choice)
        };

        let (circuit, flag_bit) = build_protocol(protocol, state.num_pairs as usize)?;
        info!(iteration = state.iteration, %protocol, flag_bit, "circuit built");
        Ok(IterationState {
            protocol: Some(protocol),
            circuit: Some(circuit),
            flag_bit,
            ..state
        })
    }

    /// Stage 4 — gate the submission on the local estimate.
    fn simulation_check(&self, state: IterationState) -> IterationState {
        let (Some(edge), Some(circuit), Some(protocol)) = (
            state.selected_edge.clone(),
            state.circuit.clone(),
            state.protocol,
        ) else {
            return state;
        };

        if !self.config.enable_simulation {
            return IterationState {
                simulation_passed: true,
                simulation_reason: Some("simulation disabled".to_string()),
                ..state
            };
        }

        let input_fidelity = self.simulator.infer_input_fidelity(edge.difficulty);
        let decision = self.simulator.should_submit(
            &circuit,
            state.flag_bit,
            state.num_pairs as usize,
            edge.threshold,
            input_fidelity,
            protocol,
        );
        if !decision.submit {
            info!(
                iteration = state.iteration,
                reason = %decision.reason,
                "simulation rejected the attempt"
            );
            return IterationState {
                simulation_passed: false,
                simulation_reason: Some(decision.reason),
                action: StageAction::Skip,
                ..state
            };
        }

        info!(
            iteration = state.iteration,
            fidelity = decision.estimated_fidelity,
            success_prob = decision.success_probability,
            "simulation passed"
        );
        IterationState {
            simulation_passed: true,
            simulation_reason: Some(decision.reason),
            ..state
        }
    }

    /// Stage 5 — submit the claim. Transport errors are downgraded to a
    /// failed attempt; the server's `ok` flag is the only success signal.
    async fn execution(&self, state: IterationState) -> IterationState {
        let (Some(edge), Some(circuit)) = (state.selected_edge.clone(), state.circuit.clone())
        else {
            return state;
        };

        match self
            .client
            .claim_edge(&edge.edge_id, &circuit, state.flag_bit, state.num_pairs)
            .await
        {
            Ok(outcome) => {
                let detail = if outcome.ok {
                    match outcome.fidelity_achieved {
                        Some(fidelity) => format!("claimed at fidelity {fidelity:.3}"),
                        None => "claimed".to_string(),
                    }
                } else {
                    outcome
                        .error_reason
                        .unwrap_or_else(|| "rejected by server".to_string())
                };
                info!(
                    iteration = state.iteration,
                    edge = ?edge.edge_id,
                    success = outcome.ok,
                    %detail,
                    "claim executed"
                );
                IterationState {
                    execution_success: outcome.ok,
                    execution_detail: Some(detail),
                    ..state
                }
            }
            Err(error) => {
                warn!(iteration = state.iteration, %error, "claim transport failure");
                IterationState {
                    execution_success: false,
                    execution_detail: Some(error.to_string()),
                    execution_was_transport_error: true,
                    ..state
                }
            }
        }
    }

    /// Stage 6 — bookkeeping, refresh, risk adaptation, terminate decision.
    /// The only stage allowed to mutate attempt records.
    async fn update_state(&mut self, state: IterationState) -> IterationState {
        let mut state = IterationState {
            iteration: state.iteration + 1,
            ..state
        };

        let entry = self.record_iteration(&mut state);
        state.attempt_log.push(entry);

        let status = match self.client.status().await {
            Ok(status) => status,
            Err(error) => {
                warn!(%error, "post-claim status refresh failed");
                return IterationState {
                    action: StageAction::Stop,
                    stop_reason: Some(StopReason::TransportFailure),
                    ..state
                };
            }
        };
        let claimable = state.graph.claimable_edges(&status.owned_nodes);
        state = IterationState {
            status,
            claimable,
            ..state
        };

        if self.config.adaptive_risk {
            self.budget
                .adjust_risk_tolerance(state.status.budget, state.initial_budget);
        }

        let stop_reason = if state.claimable.is_empty() {
            Some(StopReason::NoClaimableEdges)
        } else if state.status.budget < self.budget.min_reserve() {
            Some(StopReason::BudgetExhausted)
        } else if state.iteration >= self.config.max_iterations {
            Some(StopReason::MaxIterationsReached)
        } else {
            None
        };

        info!(
            iteration = state.iteration,
            budget = state.status.budget,
            score = state.status.score,
            risk_tolerance = self.budget.risk_tolerance(),
            terminate = stop_reason.is_some(),
            "state updated"
        );
        IterationState {
            action: if stop_reason.is_some() {
                StageAction::Stop
            } else {
                StageAction::Continue
            },
            stop_reason,
            ..state
        }
    }

    /// Classifies the finished iteration, updates counters and the
    /// per-edge attempt record, and produces the log entry.
    fn record_iteration(&mut self, state: &mut IterationState) -> AttemptLogEntry {
        let edge_id = state.selected_edge.as_ref().map(|edge| edge.edge_id.clone());

        let (outcome, detail) = if state.action == StageAction::Skip {
            state.skipped_iterations += 1;
            if let Some(reason) = state.simulation_reason.clone().filter(|_| !state.simulation_passed)
            {
                (AttemptOutcome::SimulationRejected, reason)
            } else {
                (
                    AttemptOutcome::AdmissionSkipped,
                    state
                        .skip_reason
                        .clone()
                        .unwrap_or_else(|| "admission rejected".to_string()),
                )
            }
        } else {
            // An actual submission happened (or failed in transit).
            if let (Some(edge), Some(protocol)) = (edge_id.clone(), state.protocol) {
                self.budget.record_attempt(
                    &edge,
                    state.execution_success,
                    state.num_pairs,
                    protocol,
                );
                if state.execution_success {
                    self.budget.reset_edge(&edge);
                }
            }
            if state.execution_success {
                state.successful_claims += 1;
                (
                    AttemptOutcome::Claimed,
                    state
                        .execution_detail
                        .clone()
                        .unwrap_or_else(|| "claimed".to_string()),
                )
            } else {
                state.failed_attempts += 1;
                let outcome = if state.execution_was_transport_error {
                    AttemptOutcome::TransportFailed
                } else {
                    AttemptOutcome::ServerRejected
                };
                (
                    outcome,
                    state
                        .execution_detail
                        .clone()
                        .unwrap_or_else(|| "claim failed".to_string()),
                )
            }
        };

        AttemptLogEntry {
            iteration: state.iteration,
            edge_id,
            protocol: state.protocol,
            pairs: state.num_pairs,
            outcome,
            detail,
        }
    }
}

fn build_summary(state: &IterationState, stop_reason: StopReason) -> RunSummary {
    RunSummary {
        iterations: state.iteration,
        successful_claims: state.successful_claims,
        failed_attempts: state.failed_attempts,
        skipped_iterations: state.skipped_iterations,
        final_score: state.status.score,
        final_budget: state.status.budget,
        owned_nodes: state.status.owned_nodes.clone(),
        owned_edges: state.status.owned_edges.clone(),
        stop_reason,
        attempt_log: state.attempt_log.clone(),
    }
}

fn failed_bootstrap_summary() -> RunSummary {
    build_summary(&IterationState::default(), StopReason::TransportFailure)
}
