use std::fmt;

use crate::domain::types::StageAction;

/// The six stages of one control-loop iteration, in their fixed order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    EdgeSelection,
    ResourceAllocation,
    DistillationStrategy,
    SimulationCheck,
    Execution,
    UpdateState,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::EdgeSelection => "edge_selection",
            Stage::ResourceAllocation => "resource_allocation",
            Stage::DistillationStrategy => "distillation_strategy",
            Stage::SimulationCheck => "simulation_check",
            Stage::Execution => "execution",
            Stage::UpdateState => "update_state",
        };
        f.write_str(label)
    }
}

/// Where the loop goes after a stage reports its action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Run the given stage next, within the same iteration.
    Advance(Stage),
    /// Iteration finished; start the next one at EdgeSelection.
    NextIteration,
    /// The loop terminates.
    Halt,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionError {
    pub from: Stage,
    pub action: StageAction,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid transition from {} on {:?}", self.from, self.action)
    }
}

/// Routing table for the staged pipeline.
///
/// Skip is only meaningful where a stage can abandon the iteration: the
/// admission gate in EdgeSelection and the pre-submission gate in
/// SimulationCheck. Both route directly to UpdateState so the skip is
/// recorded and the loop decision still runs. Stop is honoured from
/// EdgeSelection (nothing left to try) and from UpdateState (terminate
/// decision); anywhere else it is a programming error.
pub fn transition(current: Stage, action: StageAction) -> Result<Flow, TransitionError> {
    match (current, action) {
        (Stage::EdgeSelection, StageAction::Continue) => Ok(Flow::Advance(Stage::ResourceAllocation)),
        (Stage::EdgeSelection, StageAction::Skip) => Ok(Flow::Advance(Stage::UpdateState)),
        (Stage::EdgeSelection, StageAction::Stop) => Ok(Flow::Halt),
        (Stage::ResourceAllocation, StageAction::Continue) => {
            Ok(Flow::Advance(Stage::DistillationStrategy))
        }
        (Stage::DistillationStrategy, StageAction::Continue) => {
            Ok(Flow::Advance(Stage::SimulationCheck))
        }
        (Stage::SimulationCheck, StageAction::Continue) => Ok(Flow::Advance(Stage::Execution)),
        (Stage::SimulationCheck, StageAction::Skip) => Ok(Flow::Advance(Stage::UpdateState)),
        (Stage::Execution, StageAction::Continue) => Ok(Flow::Advance(Stage::UpdateState)),
        (Stage::UpdateState, StageAction::Continue) => Ok(Flow::NextIteration),
        (Stage::UpdateState, StageAction::Stop) => Ok(Flow::Halt),
        (from, action) => Err(TransitionError { from, action }),
    }
}
