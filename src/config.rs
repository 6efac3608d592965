//! Agent configuration: scoring weights, budget policy, simulation tuning.
//!
//! A configuration is built once (usually from a named profile), validated,
//! and then passed by shared reference; nothing mutates it after
//! construction.

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::strategy::ScoringWeights;

/// Named presets that bundle weights and budget policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentProfile {
    Default,
    Aggressive,
    Conservative,
}

/// Full configuration surface of the agent core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Multi-factor scoring weights for edge ranking.
    pub weights: ScoringWeights,

    /// Bell pairs that must remain untouched in the budget. The loop stops
    /// once the remaining budget falls below this floor.
    pub min_reserve: u32,
    /// Attempts allowed per edge before the admission gate refuses it.
    pub max_retries_per_edge: u32,
    /// Initial minimum ROI the admission gate will approve.
    pub risk_tolerance: f64,
    /// When true, risk tolerance is re-derived from the remaining budget
    /// after every iteration.
    pub adaptive_risk: bool,

    /// Hard cap on loop iterations.
    pub max_iterations: u32,

    /// When false, the pre-submission simulation gate is bypassed and every
    /// built circuit is submitted.
    pub enable_simulation: bool,
    /// Required headroom between the estimated output fidelity and the edge
    /// threshold before a submission is allowed.
    pub safety_margin: f64,

    /// Force DEJMPS on the first attempt regardless of edge properties.
    pub prefer_dejmps: bool,

    /// Input-fidelity model `F_in = max(noise_floor, noise_intercept -
    /// noise_slope * difficulty)`. The mapping has no ground truth; these
    /// knobs exist so it can be re-tuned empirically.
    pub noise_intercept: f64,
    pub noise_slope: f64,
    pub noise_floor: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            min_reserve: 10,
            max_retries_per_edge: 3,
            risk_tolerance: 0.5,
            adaptive_risk: true,
            max_iterations: 100,
            enable_simulation: true,
            safety_margin: 0.03,
            prefer_dejmps: false,
            noise_intercept: 0.95,
            noise_slope: 0.04,
            noise_floor: 0.55,
        }
    }
}

impl AgentConfig {
    /// Builds the configuration for a named profile.
    pub fn for_profile(profile: AgentProfile) -> Self {
        match profile {
            AgentProfile::Default => Self::default(),
            AgentProfile::Aggressive => Self {
                weights: ScoringWeights {
                    utility: 1.5,
                    difficulty: 0.2,
                    cost: 0.2,
                    success_prob: 0.3,
                },
                min_reserve: 5,
                max_retries_per_edge: 2,
                risk_tolerance: 0.3,
                prefer_dejmps: true,
                ..Self::default()
            },
            AgentProfile::Conservative => Self {
                weights: ScoringWeights {
                    utility: 0.8,
                    difficulty: 0.8,
                    cost: 0.6,
                    success_prob: 0.7,
                },
                min_reserve: 20,
                max_retries_per_edge: 4,
                risk_tolerance: 0.7,
                ..Self::default()
            },
        }
    }

    /// Rejects configurations that would make the loop ill-defined.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.max_iterations == 0 {
            return Err(AgentError::InvalidConfig(
                "max_iterations must be greater than zero".to_string(),
            ));
        }
        if self.max_retries_per_edge == 0 {
            return Err(AgentError::InvalidConfig(
                "max_retries_per_edge must be at least one".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.risk_tolerance) {
            return Err(AgentError::InvalidConfig(format!(
                "risk_tolerance {} outside [0, 1]",
                self.risk_tolerance
            )));
        }
        if !(0.0..1.0).contains(&self.safety_margin) {
            return Err(AgentError::InvalidConfig(format!(
                "safety_margin {} outside [0, 1)",
                self.safety_margin
            )));
        }
        Ok(())
    }
}
