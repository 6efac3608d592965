//! Local pre-submission simulation.
//!
//! Analytical and O(1) per call: the point is to gate a claim before any
//! Bell pairs are committed, not to model the physics faithfully. Structural
//! validation re-checks the LOCC partition even though the builders enforce
//! it by construction, because the submission gate is the last line before
//! budget is at risk.

use std::fmt;

use crate::circuit::{Circuit, GateOp, Protocol};

/// Default headroom required between estimated fidelity and threshold.
pub const DEFAULT_SAFETY_MARGIN: f64 = 0.03;

/// Submissions with lower estimated post-selection probability are refused.
pub const MIN_SUBMIT_SUCCESS_PROB: f64 = 0.10;

/// Per-round pass rates of the post-selection heuristic.
const BBPSSW_ROUND_BASE: f64 = 0.70;
const DEJMPS_ROUND_BASE: f64 = 0.75;

/// Structural reasons a circuit is unusable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationFault {
    QubitCountMismatch {
        expected: usize,
        actual: usize,
    },
    /// A multi-qubit gate spans the A/B boundary.
    LoccViolation {
        op_index: usize,
        operands: (usize, usize),
    },
    QubitOutOfRange {
        op_index: usize,
        qubit: usize,
    },
    ClassicalBitOutOfRange {
        op_index: usize,
        classical: usize,
    },
    FlagBitOutOfRange {
        flag_bit: usize,
        classical_bits: usize,
    },
}

impl fmt::Display for ValidationFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationFault::QubitCountMismatch { expected, actual } => {
                write!(f, "expected {expected} qubits, circuit has {actual}")
            }
            ValidationFault::LoccViolation { op_index, operands } => write!(
                f,
                "gate {op_index} crosses the A/B boundary ({}, {})",
                operands.0, operands.1
            ),
            ValidationFault::QubitOutOfRange { op_index, qubit } => {
                write!(f, "gate {op_index} addresses qubit {qubit} out of range")
            }
            ValidationFault::ClassicalBitOutOfRange { op_index, classical } => {
                write!(f, "measure {op_index} writes classical bit {classical} out of range")
            }
            ValidationFault::FlagBitOutOfRange {
                flag_bit,
                classical_bits,
            } => write!(
                f,
                "flag bit {flag_bit} outside classical register of {classical_bits}"
            ),
        }
    }
}

/// Verdict of the submission gate, with the metrics that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitDecision {
    pub submit: bool,
    pub reason: String,
    pub estimated_fidelity: f64,
    pub success_probability: f64,
}

/// Checks qubit count, operand ranges, the LOCC partition, and classical
/// register bounds. Pure: identical inputs always yield identical results.
pub fn validate(circuit: &Circuit, pair_count: usize) -> Result<(), ValidationFault> {
    let expected_qubits = 2 * pair_count;
    if circuit.qubit_count() != expected_qubits {
        return Err(ValidationFault::QubitCountMismatch {
            expected: expected_qubits,
            actual: circuit.qubit_count(),
        });
    }

    let classical_bits = circuit.classical_bits();
    for (op_index, op) in circuit.ops().iter().enumerate() {
        let operands: &[usize] = match op {
            GateOp::H { target }
            | GateOp::X { target }
            | GateOp::Z { target }
            | GateOp::S { target }
            | GateOp::Sdg { target }
            | GateOp::Sx { target }
            | GateOp::Rz { target, .. } => std::slice::from_ref(target),
            GateOp::Cx { .. } => &[],
            GateOp::Measure { target, classical } => {
                if *classical >= classical_bits {
                    return Err(ValidationFault::ClassicalBitOutOfRange {
                        op_index,
                        classical: *classical,
                    });
                }
                std::slice::from_ref(target)
            }
        };
        for qubit in operands {
            if *qubit >= expected_qubits {
                return Err(ValidationFault::QubitOutOfRange {
                    op_index,
                    qubit: *qubit,
                });
            }
        }

        if let Some((a, b)) = op.two_qubit_operands() {
            if a >= expected_qubits || b >= expected_qubits {
                return Err(ValidationFault::QubitOutOfRange {
                    op_index,
                    qubit: a.max(b),
                });
            }
            if (a < pair_count) != (b < pair_count) {
                return Err(ValidationFault::LoccViolation {
                    op_index,
                    operands: (a, b),
                });
            }
        }
    }

    Ok(())
}

/// Tuning knobs for the analytical estimator.
#[derive(Clone, Debug)]
pub struct Simulator {
    pub safety_margin: f64,
    /// Input-fidelity model: `F_in = max(floor, intercept - slope * d)`.
    /// Heuristic with no ground truth; override to re-tune empirically.
    pub noise_intercept: f64,
    pub noise_slope: f64,
    pub noise_floor: f64,
}

impl Default for Simulator {
    fn default() -> Self {
        Self {
            safety_margin: DEFAULT_SAFETY_MARGIN,
            noise_intercept: 0.95,
            noise_slope: 0.04,
            noise_floor: 0.55,
        }
    }
}

impl Simulator {
    /// Closed-form output fidelity after distillation.
    ///
    /// Applies the recurrence `F' = F^2 / (F^2 + (1-F)^2)` once per round,
    /// with `pair_count - 1` rounds. This overstates the round count for a
    /// single joint BBPSSW step, making the estimate pessimistic for inputs
    /// below 0.5 and optimistic convergence above; it is the behaviour the
    /// submission gate was tuned against, so it is kept as observed.
    pub fn estimate_output_fidelity(&self, input_fidelity: f64, pair_count: usize) -> f64 {
        let rounds = pair_count.saturating_sub(1);
        let mut fidelity = input_fidelity;
        for _ in 0..rounds {
            let accept = fidelity * fidelity + (1.0 - fidelity) * (1.0 - fidelity);
            if accept > 0.0 {
                fidelity = fidelity * fidelity / accept;
            }
        }
        fidelity.clamp(0.0, 1.0)
    }

    /// Post-selection success heuristic: `base^(pair_count - 1)`.
    pub fn estimate_success_probability(&self, pair_count: usize, protocol: Protocol) -> f64 {
        let base = match protocol {
            Protocol::Bbpssw => BBPSSW_ROUND_BASE,
            Protocol::Dejmps => DEJMPS_ROUND_BASE,
        };
        base.powi(pair_count.saturating_sub(1) as i32)
    }

    /// Maps edge difficulty to an assumed raw Bell-pair fidelity.
    pub fn infer_input_fidelity(&self, difficulty: u8) -> f64 {
        (self.noise_intercept - self.noise_slope * f64::from(difficulty)).max(self.noise_floor)
    }

    /// The submission gate: structural validation, then the fidelity and
    /// success-probability bars. A `submit == false` verdict is a routine
    /// reject, not an error; the reason string is recorded and the
    /// iteration moves on.
    pub fn should_submit(
        &self,
        circuit: &Circuit,
        flag_bit: usize,
        pair_count: usize,
        threshold: f64,
        input_fidelity: f64,
        protocol: Protocol,
    ) -> SubmitDecision {
        if let Err(fault) = validate(circuit, pair_count) {
            return SubmitDecision {
                submit: false,
                reason: format!("invalid circuit: {fault}"),
                estimated_fidelity: 0.0,
                success_probability: 0.0,
            };
        }
        if flag_bit >= circuit.classical_bits() {
            let fault = ValidationFault::FlagBitOutOfRange {
                flag_bit,
                classical_bits: circuit.classical_bits(),
            };
            return SubmitDecision {
                submit: false,
                reason: format!("invalid circuit: {fault}"),
                estimated_fidelity: 0.0,
                success_probability: 0.0,
            };
        }

        let estimated_fidelity = self.estimate_output_fidelity(input_fidelity, pair_count);
        let success_probability = self.estimate_success_probability(pair_count, protocol);

        if estimated_fidelity < threshold - self.safety_margin {
            return SubmitDecision {
                submit: false,
                reason: format!(
                    "estimated fidelity {estimated_fidelity:.3} below threshold {threshold:.3}"
                ),
                estimated_fidelity,
                success_probability,
            };
        }
        if success_probability < MIN_SUBMIT_SUCCESS_PROB {
            return SubmitDecision {
                submit: false,
                reason: format!("success probability too low ({success_probability:.2})"),
                estimated_fidelity,
                success_probability,
            };
        }

        SubmitDecision {
            submit: true,
            reason: "simulation passed".to_string(),
            estimated_fidelity,
            success_probability,
        }
    }
}
