//! Structural circuit descriptions for the two distillation protocols.
//!
//! A [`Circuit`] is an ordered list of gate operations over `2N` qubits plus
//! a classical register sized by its measurement count. Builders emit the
//! BBPSSW and DEJMPS layouts; no numerical simulation happens here.
//!
//! # Qubit layout
//!
//! Bell pair `k` occupies qubits `(k, 2N-1-k)`. The A side is `[0, N)`, the
//! B side `[N, 2N)`; LOCC requires every multi-qubit gate to stay on one
//! side. The raw Bell states themselves come from the environment, so the
//! builders emit no cross-boundary preparation gates — the circuit starts
//! directly with the distillation layer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Game limits on the Bell pairs consumed by a single claim.
pub const MIN_BELL_PAIRS: usize = 2;
pub const MAX_BELL_PAIRS: usize = 8;

/// The two supported distillation protocols.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Bilateral parity check; robust against depolarizing noise.
    Bbpssw,
    /// Alternating X/Z parity checks; favoured for phase noise.
    Dejmps,
}

impl Protocol {
    /// The other protocol, used when a retry alternates strategy.
    pub fn alternate(self) -> Self {
        match self {
            Protocol::Bbpssw => Protocol::Dejmps,
            Protocol::Dejmps => Protocol::Bbpssw,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Bbpssw => f.write_str("bbpssw"),
            Protocol::Dejmps => f.write_str("dejmps"),
        }
    }
}

/// Noise characterization used by adaptive protocol dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoiseHint {
    Depolarizing,
    BitFlip,
    Phase,
    /// The edge threshold is high enough that phase discipline dominates.
    HighThreshold,
}

/// One gate operation. The variant set is the full vocabulary the game
/// server accepts; anything else is unrepresentable by construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireOp", try_from = "WireOp")]
pub enum GateOp {
    H { target: usize },
    X { target: usize },
    Z { target: usize },
    S { target: usize },
    Sdg { target: usize },
    Sx { target: usize },
    Rz { target: usize, angle: f64 },
    Cx { control: usize, target: usize },
    Measure { target: usize, classical: usize },
}

impl GateOp {
    /// Operand indices of a multi-qubit gate, if this is one.
    pub fn two_qubit_operands(&self) -> Option<(usize, usize)> {
        match self {
            GateOp::Cx { control, target } => Some((*control, *target)),
            _ => None,
        }
    }
}

/// Wire form of a gate operation, as the game server expects it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireOp {
    pub op: String,
    #[serde(default)]
    pub targets: Vec<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<f64>>,
    #[serde(
        rename = "classicalTarget",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub classical_target: Option<usize>,
}

impl From<GateOp> for WireOp {
    fn from(op: GateOp) -> Self {
        let single = |name: &str, target: usize| WireOp {
            op: name.to_string(),
            targets: vec![target],
            controls: Vec::new(),
            parameters: None,
            classical_target: None,
        };
        match op {
            GateOp::H { target } => single("h", target),
            GateOp::X { target } => single("x", target),
            GateOp::Z { target } => single("z", target),
            GateOp::S { target } => single("s", target),
            GateOp::Sdg { target } => single("sdag", target),
            GateOp::Sx { target } => single("sx", target),
            GateOp::Rz { target, angle } => WireOp {
                parameters: Some(vec![angle]),
                ..single("rz", target)
            },
            GateOp::Cx { control, target } => WireOp {
                controls: vec![control],
                ..single("cx", target)
            },
            GateOp::Measure { target, classical } => WireOp {
                classical_target: Some(classical),
                ..single("measure", target)
            },
        }
    }
}

impl TryFrom<WireOp> for GateOp {
    type Error = String;

    fn try_from(wire: WireOp) -> Result<Self, Self::Error> {
        let target = *wire
            .targets
            .first()
            .ok_or_else(|| format!("op {:?} has no target", wire.op))?;
        match wire.op.as_str() {
            "h" => Ok(GateOp::H { target }),
            "x" => Ok(GateOp::X { target }),
            "z" => Ok(GateOp::Z { target }),
            "s" => Ok(GateOp::S { target }),
            "sdag" => Ok(GateOp::Sdg { target }),
            "sx" => Ok(GateOp::Sx { target }),
            "rz" => {
                let angle = wire
                    .parameters
                    .as_ref()
                    .and_then(|params| params.first().copied())
                    .ok_or_else(|| "rz requires one parameter".to_string())?;
                Ok(GateOp::Rz { target, angle })
            }
            "cx" => {
                let control = *wire
                    .controls
                    .first()
                    .ok_or_else(|| "cx requires a control".to_string())?;
                Ok(GateOp::Cx { control, target })
            }
            "measure" => {
                let classical = wire
                    .classical_target
                    .ok_or_else(|| "measure requires a classical target".to_string())?;
                Ok(GateOp::Measure { target, classical })
            }
            other => Err(format!("unknown op {other:?}")),
        }
    }
}

/// An ordered sequence of gate operations over a fixed qubit register.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Circuit {
    qubit_count: usize,
    ops: Vec<GateOp>,
}

/// On the wire a circuit is the bare ordered list of operation records;
/// the qubit count travels separately (`num_bell_pairs` in the claim).
impl Serialize for Circuit {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.ops.serialize(serializer)
    }
}

impl Circuit {
    pub fn new(qubit_count: usize) -> Self {
        Self {
            qubit_count,
            ops: Vec::new(),
        }
    }

    pub fn qubit_count(&self) -> usize {
        self.qubit_count
    }

    pub fn ops(&self) -> &[GateOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Size of the classical register: one bit per measurement.
    pub fn classical_bits(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, GateOp::Measure { .. }))
            .count()
    }

    pub fn push(&mut self, op: GateOp) {
        self.ops.push(op);
    }
}

/// Qubit indices of Bell pair `pair` in a `pair_count`-pair register.
pub fn pair_qubits(pair: usize, pair_count: usize) -> (usize, usize) {
    (pair, 2 * pair_count - 1 - pair)
}

fn check_pair_count(pair_count: usize) -> Result<(), AgentError> {
    if !(MIN_BELL_PAIRS..=MAX_BELL_PAIRS).contains(&pair_count) {
        return Err(AgentError::InvalidInput(format!(
            "pair count {pair_count} outside [{MIN_BELL_PAIRS}, {MAX_BELL_PAIRS}]"
        )));
    }
    Ok(())
}

/// Bilateral parity-check layer shared by both protocols: for each ancilla
/// pair `k`, a CNOT from qubit `k` onto the kept qubit `N-1` on the A side
/// and its mirror from `2N-1-k` onto `N` on the B side.
fn push_bilateral_cnots(circuit: &mut Circuit, pair_count: usize) {
    let (kept_a, kept_b) = pair_qubits(pair_count - 1, pair_count);
    for k in 0..pair_count - 1 {
        let (anc_a, anc_b) = pair_qubits(k, pair_count);
        circuit.push(GateOp::Cx {
            control: anc_a,
            target: kept_a,
        });
        circuit.push(GateOp::Cx {
            control: anc_b,
            target: kept_b,
        });
    }
}

/// Measures every ancilla qubit, assigning classical bits in emission
/// order. Returns the flag bit: the classical index whose value must be
/// zero for post-selection to accept.
fn push_ancilla_measurements(circuit: &mut Circuit, pair_count: usize) -> usize {
    let mut classical = 0;
    for k in 0..pair_count - 1 {
        let (anc_a, anc_b) = pair_qubits(k, pair_count);
        circuit.push(GateOp::Measure {
            target: anc_a,
            classical,
        });
        circuit.push(GateOp::Measure {
            target: anc_b,
            classical: classical + 1,
        });
        classical += 2;
    }
    0
}

/// BBPSSW layout: bilateral CNOTs from every ancilla pair onto the kept
/// pair, then measurement of all `2(N-1)` ancilla qubits.
///
/// `pair_count = 2` degenerates to a single bilateral CNOT pair and one
/// measurement pair.
pub fn build_bbpssw(pair_count: usize) -> Result<(Circuit, usize), AgentError> {
    check_pair_count(pair_count)?;

    let mut circuit = Circuit::new(2 * pair_count);
    push_bilateral_cnots(&mut circuit, pair_count);
    let flag_bit = push_ancilla_measurements(&mut circuit, pair_count);
    Ok((circuit, flag_bit))
}

/// DEJMPS layout: a basis-rotation layer over the ancilla pairs —
/// alternating X-basis (Hadamard) and Z-phase (S / S†) checks — followed by
/// the bilateral CNOTs and post-rotated measurements. Flag-bit semantics
/// are identical to BBPSSW.
pub fn build_dejmps(pair_count: usize) -> Result<(Circuit, usize), AgentError> {
    check_pair_count(pair_count)?;

    let mut circuit = Circuit::new(2 * pair_count);
    for k in 0..pair_count - 1 {
        let (anc_a, anc_b) = pair_qubits(k, pair_count);
        if k % 2 == 0 {
            circuit.push(GateOp::H { target: anc_a });
            circuit.push(GateOp::H { target: anc_b });
        } else {
            circuit.push(GateOp::S { target: anc_a });
            circuit.push(GateOp::Sdg { target: anc_b });
        }
    }
    push_bilateral_cnots(&mut circuit, pair_count);
    let flag_bit = push_ancilla_measurements(&mut circuit, pair_count);
    Ok((circuit, flag_bit))
}

/// Dispatches to DEJMPS for phase-dominated noise or high-threshold edges,
/// BBPSSW otherwise.
pub fn build_adaptive(
    pair_count: usize,
    noise_hint: NoiseHint,
) -> Result<(Circuit, usize), AgentError> {
    match noise_hint {
        NoiseHint::Phase | NoiseHint::HighThreshold => build_dejmps(pair_count),
        NoiseHint::Depolarizing | NoiseHint::BitFlip => build_bbpssw(pair_count),
    }
}

/// Builds a circuit for an explicitly chosen protocol.
pub fn build_protocol(
    protocol: Protocol,
    pair_count: usize,
) -> Result<(Circuit, usize), AgentError> {
    match protocol {
        Protocol::Bbpssw => build_bbpssw(pair_count),
        Protocol::Dejmps => build_dejmps(pair_count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn same_side(a: usize, b: usize, pair_count: usize) -> bool {
        (a < pair_count) == (b < pair_count)
    }

    #[test]
    fn builders_reject_pair_counts_outside_game_limits() {
        for pair_count in [0, 1, 9, 16] {
            assert!(matches!(
                build_bbpssw(pair_count),
                Err(AgentError::InvalidInput(_))
            ));
            assert!(matches!(
                build_dejmps(pair_count),
                Err(AgentError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn every_multi_qubit_gate_respects_the_partition() {
        for pair_count in MIN_BELL_PAIRS..=MAX_BELL_PAIRS {
            for (circuit, _) in [
                build_bbpssw(pair_count).expect("bbpssw should build"),
                build_dejmps(pair_count).expect("dejmps should build"),
            ] {
                for op in circuit.ops() {
                    if let Some((a, b)) = op.two_qubit_operands() {
                        assert!(
                            same_side(a, b, pair_count),
                            "gate ({a}, {b}) crosses the partition at N={pair_count}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn qubit_count_is_twice_the_pair_count() {
        for pair_count in MIN_BELL_PAIRS..=MAX_BELL_PAIRS {
            let (circuit, _) = build_bbpssw(pair_count).expect("bbpssw should build");
            assert_eq!(circuit.qubit_count(), 2 * pair_count);
        }
    }

    #[test]
    fn all_ancilla_qubits_are_measured() {
        for pair_count in MIN_BELL_PAIRS..=MAX_BELL_PAIRS {
            let (circuit, flag_bit) = build_bbpssw(pair_count).expect("bbpssw should build");
            assert_eq!(circuit.classical_bits(), 2 * (pair_count - 1));
            assert!(flag_bit < circuit.classical_bits());
        }
    }

    #[test]
    fn two_pairs_degenerate_to_one_bilateral_check() {
        let (circuit, flag_bit) = build_bbpssw(2).expect("bbpssw should build");
        let cx_count = circuit
            .ops()
            .iter()
            .filter(|op| matches!(op, GateOp::Cx { .. }))
            .count();
        assert_eq!(cx_count, 2);
        assert_eq!(circuit.classical_bits(), 2);
        assert_eq!(flag_bit, 0);
    }

    #[test]
    fn dejmps_rotates_ancillas_alternately() {
        let (circuit, _) = build_dejmps(4).expect("dejmps should build");
        // Pair 0 in X basis, pair 1 in Z-phase basis, pair 2 in X again.
        assert_eq!(circuit.ops()[0], GateOp::H { target: 0 });
        assert_eq!(circuit.ops()[1], GateOp::H { target: 7 });
        assert_eq!(circuit.ops()[2], GateOp::S { target: 1 });
        assert_eq!(circuit.ops()[3], GateOp::Sdg { target: 6 });
        assert_eq!(circuit.ops()[4], GateOp::H { target: 2 });
        assert_eq!(circuit.ops()[5], GateOp::H { target: 5 });
    }

    #[test]
    fn adaptive_dispatch_prefers_dejmps_for_phase_noise() {
        let (dejmps, _) = build_adaptive(3, NoiseHint::Phase).expect("should build");
        let (reference, _) = build_dejmps(3).expect("should build");
        assert_eq!(dejmps, reference);

        let (bbpssw, _) = build_adaptive(3, NoiseHint::Depolarizing).expect("should build");
        let (reference, _) = build_bbpssw(3).expect("should build");
        assert_eq!(bbpssw, reference);
    }

    #[test]
    fn pair_layout_pairs_outside_in() {
        assert_eq!(pair_qubits(0, 4), (0, 7));
        assert_eq!(pair_qubits(3, 4), (3, 4));
    }

    #[test]
    fn wire_format_round_trips_and_uses_documented_names() {
        let op = GateOp::Measure {
            target: 3,
            classical: 1,
        };
        let encoded = serde_json::to_value(&op).expect("measure should encode");
        assert_eq!(encoded["op"], "measure");
        assert_eq!(encoded["targets"][0], 3);
        assert_eq!(encoded["classicalTarget"], 1);

        let cx = GateOp::Cx {
            control: 2,
            target: 0,
        };
        let encoded = serde_json::to_value(&cx).expect("cx should encode");
        assert_eq!(encoded["controls"][0], 2);

        let decoded: GateOp = serde_json::from_value(encoded).expect("cx should decode");
        assert_eq!(decoded, cx);
    }

    #[test]
    fn circuit_serializes_as_a_bare_operation_list() {
        let (circuit, _) = build_bbpssw(2).expect("bbpssw should build");
        let encoded = serde_json::to_value(&circuit).expect("circuit should encode");

        let records = encoded.as_array().expect("circuit must encode as an array");
        assert_eq!(records.len(), circuit.len());
        assert_eq!(records[0]["op"], "cx");
        assert_eq!(records[records.len() - 1]["op"], "measure");
    }
}
