// Copyright 2025 The Tangle Developers
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except
// in compliance with the License.You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License
// is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express
// or implied. See the License for the specific language governing permissions and limitations under
// the License.

use rand::Rng;
use tangle_circuit::{Circuit, CircuitError, GateFlags, GateId, GateTarget, Operation};
use tangle_core::bits::word;
use tangle_core::{for_samples, sample_hit_indices, SimRng};

use crate::measurement_record::MeasurementRecord;
use crate::pauli_string::Basis;
use crate::tableau::Tableau;
use crate::transposed::TransposedTableau;

/// A stabilizer-state simulator tracking the inverse of the Clifford circuit
/// applied so far.
///
/// Keeping the inverse means the image of a qubit's Z observable under
/// `inv_state` is the measurement's Heisenberg representation in terms of
/// the initial state's observables: the measurement is deterministic exactly
/// when that image has no X component, and its value is the image's sign.
pub struct TableauSimulator {
    pub inv_state: Tableau,
    pub rng: SimRng,
    /// -1 biases random collapses toward 1, +1 toward 0, 0 is unbiased.
    pub sign_bias: i8,
    pub measurement_record: MeasurementRecord,
    /// When set, noise channels are skipped and measurement error arguments
    /// are ignored (used for reference samples).
    pub suppress_noise: bool,
    last_correlated_error_occurred: bool,
}

impl TableauSimulator {
    #[must_use]
    pub fn new(num_qubits: usize, rng: SimRng, sign_bias: i8) -> Self {
        TableauSimulator {
            inv_state: Tableau::identity(num_qubits),
            rng,
            sign_bias,
            measurement_record: MeasurementRecord::default(),
            suppress_noise: false,
            last_correlated_error_occurred: false,
        }
    }

    /// True when measuring the qubit in the Z basis would not disturb the
    /// state.
    #[must_use]
    pub fn is_deterministic_z(&self, target: usize) -> bool {
        word::is_zero_slice(self.inv_state.zs.xt.row(target))
    }

    pub fn ensure_large_enough_for_qubit(&mut self, max_qubit: usize) {
        if max_qubit >= self.inv_state.num_qubits {
            self.inv_state.expand(max_qubit + 1);
        }
    }

    /// Runs a whole circuit, expanding `REPEAT` blocks.
    ///
    /// # Errors
    /// Fails on measurement-record lookbacks that reach before the start of
    /// time. The circuit is otherwise assumed to be validated.
    pub fn run_circuit(&mut self, circuit: &Circuit) -> Result<(), CircuitError> {
        circuit.try_for_each_flat_op(&mut |c, op| self.apply_op(c, op))
    }

    /// Applies one (non-block) operation.
    ///
    /// # Errors
    /// Fails on invalid measurement-record lookbacks.
    pub fn apply_op(&mut self, circuit: &Circuit, op: &Operation) -> Result<(), CircuitError> {
        let gate = op.gate;
        if self.suppress_noise && gate.flags().contains(GateFlags::NOISE) {
            return Ok(());
        }
        let targets = circuit.targets_of(op);
        let args = circuit.args_of(op);
        match gate {
            GateId::I
            | GateId::Tick
            | GateId::QubitCoords
            | GateId::ShiftCoords
            | GateId::Detector
            | GateId::ObservableInclude => {}

            GateId::X
            | GateId::Y
            | GateId::Z
            | GateId::H
            | GateId::HXY
            | GateId::HYZ
            | GateId::CXYZ
            | GateId::CZYX
            | GateId::S
            | GateId::SDag
            | GateId::SqrtX
            | GateId::SqrtXDag
            | GateId::SqrtY
            | GateId::SqrtYDag => {
                // Applying G is prepending G's inverse to the inverse state.
                let inverse = gate.inverse_id().unwrap();
                for t in targets {
                    self.inv_state.prepend_gate1(inverse, t.qubit_value());
                }
            }

            GateId::CX | GateId::CY | GateId::CZ => {
                self.controlled_pauli_pairs(gate, targets)?;
            }

            GateId::XCX
            | GateId::XCY
            | GateId::XCZ
            | GateId::YCX
            | GateId::YCY
            | GateId::YCZ
            | GateId::Swap
            | GateId::ISwap
            | GateId::ISwapDag
            | GateId::SqrtXX
            | GateId::SqrtXXDag
            | GateId::SqrtYY
            | GateId::SqrtYYDag
            | GateId::SqrtZZ
            | GateId::SqrtZZDag => {
                let inverse = gate.inverse_id().unwrap();
                for pair in targets.chunks_exact(2) {
                    self.inv_state.prepend_gate2(
                        inverse,
                        pair[0].qubit_value(),
                        pair[1].qubit_value(),
                    );
                }
            }

            GateId::MZ => self.measure(Basis::Z, targets, args, false),
            GateId::MX => self.measure(Basis::X, targets, args, false),
            GateId::MY => self.measure(Basis::Y, targets, args, false),
            GateId::MRZ => self.measure(Basis::Z, targets, args, true),
            GateId::MRX => self.measure(Basis::X, targets, args, true),
            GateId::MRY => self.measure(Basis::Y, targets, args, true),
            GateId::RZ => self.reset(Basis::Z, targets),
            GateId::RX => self.reset(Basis::X, targets),
            GateId::RY => self.reset(Basis::Y, targets),

            GateId::XError => {
                let (inv, rng) = (&mut self.inv_state, &mut self.rng);
                for_samples(args[0], targets.len(), rng, |k| {
                    inv.zs.signs.toggle(targets[k].qubit_value());
                });
            }
            GateId::YError => {
                let (inv, rng) = (&mut self.inv_state, &mut self.rng);
                for_samples(args[0], targets.len(), rng, |k| {
                    let q = targets[k].qubit_value();
                    inv.xs.signs.toggle(q);
                    inv.zs.signs.toggle(q);
                });
            }
            GateId::ZError => {
                let (inv, rng) = (&mut self.inv_state, &mut self.rng);
                for_samples(args[0], targets.len(), rng, |k| {
                    inv.xs.signs.toggle(targets[k].qubit_value());
                });
            }
            GateId::Depolarize1 => {
                for k in sample_hit_indices(args[0], targets.len(), &mut self.rng) {
                    let p: u8 = self.rng.random_range(1..4);
                    self.apply_pauli_code(targets[k].qubit_value(), p);
                }
            }
            GateId::Depolarize2 => {
                let pairs = targets.len() >> 1;
                for s in sample_hit_indices(args[0], pairs, &mut self.rng) {
                    let p: u8 = self.rng.random_range(1..16);
                    self.apply_pauli_code(targets[s << 1].qubit_value(), p & 3);
                    self.apply_pauli_code(targets[(s << 1) | 1].qubit_value(), p >> 2);
                }
            }
            GateId::PauliChannel1 => {
                let total: f64 = args.iter().sum();
                for k in sample_hit_indices(total, targets.len(), &mut self.rng) {
                    let case = pick_weighted(args, total, &mut self.rng);
                    self.apply_pauli_code(targets[k].qubit_value(), case as u8 + 1);
                }
            }
            GateId::PauliChannel2 => {
                let total: f64 = args.iter().sum();
                let pairs = targets.len() >> 1;
                for s in sample_hit_indices(total, pairs, &mut self.rng) {
                    let w = pick_weighted(args, total, &mut self.rng) + 1;
                    self.apply_pauli_code(targets[s << 1].qubit_value(), (w >> 2) as u8);
                    self.apply_pauli_code(targets[(s << 1) | 1].qubit_value(), (w & 3) as u8);
                }
            }
            GateId::CorrelatedError | GateId::ElseCorrelatedError => {
                if gate == GateId::CorrelatedError {
                    self.last_correlated_error_occurred = false;
                }
                if !self.last_correlated_error_occurred && self.rng.random::<f64>() < args[0] {
                    self.last_correlated_error_occurred = true;
                    for t in targets {
                        let q = t.qubit_value();
                        if t.has_pauli_x() {
                            self.inv_state.zs.signs.toggle(q);
                        }
                        if t.has_pauli_z() {
                            self.inv_state.xs.signs.toggle(q);
                        }
                    }
                }
            }

            GateId::Repeat => unreachable!("blocks are expanded by the caller"),
        }
        Ok(())
    }

    /// Pauli code: 0 = I, 1 = X, 2 = Y, 3 = Z, applied at the current time.
    fn apply_pauli_code(&mut self, q: usize, code: u8) {
        // X-type components flip subsequent Z measurements (the zs signs);
        // Z-type components flip the xs signs.
        if code == 1 || code == 2 {
            self.inv_state.zs.signs.toggle(q);
        }
        if code == 2 || code == 3 {
            self.inv_state.xs.signs.toggle(q);
        }
    }

    fn controlled_pauli_pairs(
        &mut self,
        gate: GateId,
        targets: &[GateTarget],
    ) -> Result<(), CircuitError> {
        for pair in targets.chunks_exact(2) {
            let (c, t) = (pair[0], pair[1]);
            match (c.is_measurement_record(), t.is_measurement_record()) {
                (false, false) => {
                    self.inv_state
                        .prepend_gate2(gate, c.qubit_value(), t.qubit_value());
                }
                (true, false) => {
                    if self.measurement_record.lookback(c.value() as usize)? {
                        let q = t.qubit_value();
                        match gate {
                            GateId::CX => self.inv_state.prepend_x(q),
                            GateId::CY => self.inv_state.prepend_y(q),
                            GateId::CZ => self.inv_state.prepend_z(q),
                            _ => unreachable!(),
                        }
                    }
                }
                (false, true) => {
                    debug_assert_eq!(gate, GateId::CZ);
                    if self.measurement_record.lookback(t.value() as usize)? {
                        self.inv_state.prepend_z(c.qubit_value());
                    }
                }
                // A CZ between two classical bits has no quantum effect.
                (true, true) => {}
            }
        }
        Ok(())
    }

    fn basis_change(&mut self, basis: Basis, targets: &[GateTarget]) {
        for t in targets {
            let q = t.qubit_value();
            match basis {
                Basis::X => self.inv_state.prepend_h_xz(q),
                Basis::Y => self.inv_state.prepend_h_yz(q),
                Basis::Z => {}
            }
        }
    }

    fn measure(&mut self, basis: Basis, targets: &[GateTarget], args: &[f64], reset: bool) {
        let noise = if self.suppress_noise {
            0.0
        } else {
            args.first().copied().unwrap_or(0.0)
        };
        self.basis_change(basis, targets);
        self.collapse_targets(targets);
        for t in targets {
            let q = t.qubit_value();
            let mut result = self.inv_state.zs.signs.get(q) ^ t.is_inverted_result();
            if noise > 0.0 && self.rng.random::<f64>() < noise {
                result = !result;
            }
            self.measurement_record.record_result(result);
            if reset {
                self.inv_state.zs.signs.set(q, false);
            }
        }
        self.basis_change(basis, targets);
    }

    fn reset(&mut self, basis: Basis, targets: &[GateTarget]) {
        self.basis_change(basis, targets);
        self.collapse_targets(targets);
        for t in targets {
            self.inv_state.zs.signs.set(t.qubit_value(), false);
        }
        self.basis_change(basis, targets);
    }

    fn collapse_targets(&mut self, targets: &[GateTarget]) {
        let mut pending: Vec<usize> = Vec::new();
        for t in targets {
            let q = t.qubit_value();
            if !self.is_deterministic_z(q) {
                pending.push(q);
            }
        }
        // Only pay for the quadrant transpose when something must collapse.
        if !pending.is_empty() {
            let TableauSimulator {
                inv_state,
                rng,
                sign_bias,
                ..
            } = self;
            let mut transposed = TransposedTableau::new(inv_state);
            for q in pending {
                collapse_qubit_z(&mut transposed, q, rng, *sign_bias);
            }
        }
    }

    /// Runs the circuit and returns the recorded measurement bits.
    ///
    /// # Errors
    /// Propagates lookback failures.
    pub fn sample_circuit(
        circuit: &Circuit,
        rng: SimRng,
        sign_bias: i8,
    ) -> Result<Vec<bool>, CircuitError> {
        let mut sim = TableauSimulator::new(circuit.count_qubits(), rng, sign_bias);
        sim.run_circuit(circuit)?;
        Ok(sim.measurement_record.storage)
    }
}

fn pick_weighted(weights: &[f64], total: f64, rng: &mut SimRng) -> usize {
    let mut u = rng.random::<f64>() * total;
    for (k, &w) in weights.iter().enumerate() {
        if u < w {
            return k;
        }
        u -= w;
    }
    weights.len() - 1
}

/// Collapses one qubit's Z observable, following the transposed-quadrant
/// measurement algorithm:
/// find an anticommuting stabilizer generator, cancel the others against it
/// with start-of-time CNOTs, rotate it to act as Z on the target, then force
/// the collapse outcome with a start-of-time X when needed.
fn collapse_qubit_z(
    transposed: &mut TransposedTableau<'_>,
    target: usize,
    rng: &mut SimRng,
    sign_bias: i8,
) {
    let n = transposed.tableau.num_qubits;

    // Search for a stabilizer generator that anticommutes with the
    // measurement observable. (With the quadrants transposed, row-major
    // reads here scan the original's columns.)
    let mut pivot = 0;
    while pivot < n && !transposed.tableau.zs.xt.get(pivot, target) {
        pivot += 1;
    }
    if pivot == n {
        // Every generator commutes; the measurement is deterministic.
        return;
    }

    // Partial Gaussian elimination: cancel the anticommutation of every
    // later generator using no-effect-because-control-is-zero CNOTs at the
    // beginning of time.
    for k in pivot + 1..n {
        if transposed.tableau.zs.xt.get(k, target) {
            transposed.append_zcx(pivot, k);
        }
    }

    // Swap the isolated anticommuting generator for one that commutes.
    if transposed.tableau.zs.zt.get(pivot, target) {
        transposed.append_h_yz(pivot);
    } else {
        transposed.append_h_xz(pivot);
    }

    // Assign the measurement result.
    let result_if_measured = if sign_bias == 0 {
        rng.random::<bool>()
    } else {
        sign_bias < 0
    };
    if transposed.tableau.zs.signs.get(target) != result_if_measured {
        transposed.append_x(pivot);
    }
}
