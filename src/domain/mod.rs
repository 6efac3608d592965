/// Decision-domain subsystem — shared types, the staged state machine, and
/// the pure policies that gate what the orchestrator may do:
///
/// 1. [`types`]         — graph/status snapshots, scoring and bookkeeping
///    records, the per-iteration state threaded through the stages.
/// 2. [`state_machine`] — the six-stage routing table with skip and halt
///    semantics.
/// 3. [`admission`]     — budget admission control: retry quotas, reserve
///    floor, expected-value and ROI gates, adaptive risk tolerance.
/// 4. [`recovery`]      — transport retry budget and backoff schedule.
pub mod admission;
pub mod recovery;
pub mod state_machine;
pub mod types;
