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
use tangle_circuit::{Circuit, CircuitError, GateId, GateTarget, Operation};
use tangle_core::bits::word;
use tangle_core::{for_samples, sample_hit_indices, BitTable, BitVec, SimRng};

use crate::measurement_record::BatchMeasurementRecord;
use crate::pauli_string::PauliString;

/// A batched Pauli-frame simulator.
///
/// Tracks, for each of `batch_size` shots, the Pauli operator relating that
/// shot's noisy state to the reference (noiseless) state. Bit s of
/// `x_table` row q says shot s carries an X difference on qubit q. Because
/// the reference sample fixes every noiseless outcome, a shot's measurement
/// results are the reference bits XOR the recorded frame flips.
pub struct FrameSimulator {
    pub num_qubits: usize,
    pub batch_size: usize,
    pub x_table: BitTable,
    pub z_table: BitTable,
    pub m_record: BatchMeasurementRecord,
    rng_buffer: BitVec,
    last_correlated_error_occurred: BitVec,
    pub rng: SimRng,
}

impl FrameSimulator {
    #[must_use]
    pub fn new(num_qubits: usize, batch_size: usize, max_lookback: usize, rng: SimRng) -> Self {
        FrameSimulator {
            num_qubits,
            batch_size,
            x_table: BitTable::new(num_qubits, batch_size),
            z_table: BitTable::new(num_qubits, batch_size),
            m_record: BatchMeasurementRecord::new(batch_size, max_lookback, 64),
            rng_buffer: BitVec::zeros(batch_size),
            last_correlated_error_occurred: BitVec::zeros(batch_size),
            rng,
        }
    }

    /// Clears the frames back to a fresh all-|0> start. Z components are
    /// randomized since a Z difference on a freshly initialized qubit is
    /// unobservable.
    pub fn reset_all(&mut self) {
        self.x_table.clear();
        self.z_table.randomize_all(&mut self.rng);
        self.m_record.clear();
        self.last_correlated_error_occurred.clear();
    }

    /// The frame of one shot as a Pauli string.
    #[must_use]
    pub fn get_frame(&self, shot: usize) -> PauliString {
        debug_assert!(shot < self.batch_size);
        let mut result = PauliString::identity(self.num_qubits);
        for q in 0..self.num_qubits {
            result.set_pauli(q, self.x_table.get(q, shot), self.z_table.get(q, shot));
        }
        result
    }

    pub fn set_frame(&mut self, shot: usize, frame: &PauliString) {
        debug_assert_eq!(frame.num_qubits(), self.num_qubits);
        for q in 0..self.num_qubits {
            let (x, z) = frame.xz(q);
            self.x_table.set(q, shot, x);
            self.z_table.set(q, shot, z);
        }
    }

    /// Runs a whole circuit, expanding `REPEAT` blocks.
    ///
    /// # Errors
    /// Fails on invalid measurement-record lookbacks.
    pub fn run_circuit(&mut self, circuit: &Circuit) -> Result<(), CircuitError> {
        circuit.try_for_each_flat_op(&mut |c, op| self.apply_op(c, op))
    }

    /// Applies one (non-block) operation to all frames at once.
    ///
    /// # Errors
    /// Fails on invalid measurement-record lookbacks.
    pub fn apply_op(&mut self, circuit: &Circuit, op: &Operation) -> Result<(), CircuitError> {
        let targets = circuit.targets_of(op);
        let args = circuit.args_of(op);
        match op.gate {
            // Global Paulis are absorbed by the reference sample.
            GateId::I
            | GateId::X
            | GateId::Y
            | GateId::Z
            | GateId::Tick
            | GateId::QubitCoords
            | GateId::ShiftCoords
            | GateId::Detector
            | GateId::ObservableInclude => {}

            GateId::H | GateId::SqrtY | GateId::SqrtYDag => {
                for t in targets {
                    let q = t.qubit_value();
                    word::swap_slices(self.x_table.row_mut(q), self.z_table.row_mut(q));
                }
            }
            GateId::HXY | GateId::S | GateId::SDag => {
                for t in targets {
                    let q = t.qubit_value();
                    word::xor_into(self.z_table.row_mut(q), self.x_table.row(q));
                }
            }
            GateId::HYZ | GateId::SqrtX | GateId::SqrtXDag => {
                for t in targets {
                    let q = t.qubit_value();
                    word::xor_into(self.x_table.row_mut(q), self.z_table.row(q));
                }
            }
            GateId::CXYZ => {
                for t in targets {
                    let q = t.qubit_value();
                    word::xor_into(self.x_table.row_mut(q), self.z_table.row(q));
                    word::xor_into(self.z_table.row_mut(q), self.x_table.row(q));
                }
            }
            GateId::CZYX => {
                for t in targets {
                    let q = t.qubit_value();
                    word::xor_into(self.z_table.row_mut(q), self.x_table.row(q));
                    word::xor_into(self.x_table.row_mut(q), self.z_table.row(q));
                }
            }

            GateId::CX | GateId::CY | GateId::CZ => {
                self.controlled_pauli_pairs(op.gate, targets)?;
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
                for pair in targets.chunks_exact(2) {
                    self.pair_update(op.gate, pair[0].qubit_value(), pair[1].qubit_value());
                }
            }

            GateId::MZ => self.measure_z(targets, args),
            GateId::MX => self.measure_x(targets, args),
            GateId::MY => self.measure_y(targets, args),
            GateId::RZ => {
                for t in targets {
                    let q = t.qubit_value();
                    self.x_table.row_mut(q).fill(0);
                    self.z_table.randomize_row(q, self.batch_size, &mut self.rng);
                }
            }
            GateId::RX => {
                for t in targets {
                    let q = t.qubit_value();
                    self.z_table.row_mut(q).fill(0);
                    self.x_table.randomize_row(q, self.batch_size, &mut self.rng);
                }
            }
            GateId::RY => {
                for t in targets {
                    let q = t.qubit_value();
                    self.x_table.randomize_row(q, self.batch_size, &mut self.rng);
                    let (x_row, z_row) = (self.x_table.row(q), self.z_table.row_mut(q));
                    z_row.copy_from_slice(x_row);
                }
            }
            GateId::MRZ => {
                for t in targets {
                    let q = t.qubit_value();
                    self.record_row(q, RecordSource::X, args);
                    self.x_table.row_mut(q).fill(0);
                    self.z_table.randomize_row(q, self.batch_size, &mut self.rng);
                }
            }
            GateId::MRX => {
                for t in targets {
                    let q = t.qubit_value();
                    self.record_row(q, RecordSource::Z, args);
                    self.z_table.row_mut(q).fill(0);
                    self.x_table.randomize_row(q, self.batch_size, &mut self.rng);
                }
            }
            GateId::MRY => {
                for t in targets {
                    let q = t.qubit_value();
                    word::xor_into(self.x_table.row_mut(q), self.z_table.row(q));
                    self.record_row(q, RecordSource::X, args);
                    self.z_table.randomize_row(q, self.batch_size, &mut self.rng);
                    let (x_row, z_row) = (self.x_table.row_mut(q), self.z_table.row(q));
                    x_row.copy_from_slice(z_row);
                }
            }

            GateId::XError => self.single_pauli_error(targets, args[0], true, false),
            GateId::YError => self.single_pauli_error(targets, args[0], true, true),
            GateId::ZError => self.single_pauli_error(targets, args[0], false, true),
            GateId::Depolarize1 => {
                let n = targets.len() * self.batch_size;
                for s in sample_hit_indices(args[0], n, &mut self.rng) {
                    let p: u8 = self.rng.random_range(1..4);
                    let q = targets[s / self.batch_size].qubit_value();
                    let shot = s % self.batch_size;
                    if p & 1 != 0 {
                        self.x_table.toggle(q, shot);
                    }
                    if p & 2 != 0 {
                        self.z_table.toggle(q, shot);
                    }
                }
            }
            GateId::Depolarize2 => {
                let n = (targets.len() * self.batch_size) >> 1;
                for s in sample_hit_indices(args[0], n, &mut self.rng) {
                    let p: u8 = self.rng.random_range(1..16);
                    let pair = (s / self.batch_size) << 1;
                    let shot = s % self.batch_size;
                    let q1 = targets[pair].qubit_value();
                    let q2 = targets[pair + 1].qubit_value();
                    if p & 1 != 0 {
                        self.x_table.toggle(q1, shot);
                    }
                    if p & 2 != 0 {
                        self.z_table.toggle(q1, shot);
                    }
                    if p & 4 != 0 {
                        self.x_table.toggle(q2, shot);
                    }
                    if p & 8 != 0 {
                        self.z_table.toggle(q2, shot);
                    }
                }
            }
            GateId::PauliChannel1 => {
                let total: f64 = args.iter().sum();
                let n = targets.len() * self.batch_size;
                for s in sample_hit_indices(total, n, &mut self.rng) {
                    let case = pick_weighted(args, total, &mut self.rng);
                    let q = targets[s / self.batch_size].qubit_value();
                    let shot = s % self.batch_size;
                    self.toggle_pauli_code(q, shot, case as u8 + 1);
                }
            }
            GateId::PauliChannel2 => {
                let total: f64 = args.iter().sum();
                let n = (targets.len() * self.batch_size) >> 1;
                for s in sample_hit_indices(total, n, &mut self.rng) {
                    let w = pick_weighted(args, total, &mut self.rng) + 1;
                    let pair = (s / self.batch_size) << 1;
                    let shot = s % self.batch_size;
                    let q1 = targets[pair].qubit_value();
                    let q2 = targets[pair + 1].qubit_value();
                    self.toggle_pauli_code(q1, shot, (w >> 2) as u8);
                    self.toggle_pauli_code(q2, shot, (w & 3) as u8);
                }
            }
            GateId::CorrelatedError | GateId::ElseCorrelatedError => {
                self.correlated_error(op.gate, targets, args[0]);
            }

            GateId::Repeat => unreachable!("blocks are expanded by the caller"),
        }
        Ok(())
    }

    /// Pauli code: 0 = I, 1 = X, 2 = Y, 3 = Z.
    fn toggle_pauli_code(&mut self, q: usize, shot: usize, code: u8) {
        if code == 1 || code == 2 {
            self.x_table.toggle(q, shot);
        }
        if code == 2 || code == 3 {
            self.z_table.toggle(q, shot);
        }
    }

    fn single_pauli_error(&mut self, targets: &[GateTarget], p: f64, x: bool, z: bool) {
        let FrameSimulator {
            x_table,
            z_table,
            rng,
            batch_size,
            ..
        } = self;
        let n = targets.len() * *batch_size;
        for_samples(p, n, rng, |s| {
            let q = targets[s / *batch_size].qubit_value();
            let shot = s % *batch_size;
            if x {
                x_table.toggle(q, shot);
            }
            if z {
                z_table.toggle(q, shot);
            }
        });
    }

    fn pair_update(&mut self, gate: GateId, q1: usize, q2: usize) {
        let (x1, x2) = self.x_table.two_rows_mut(q1, q2);
        let (z1, z2) = self.z_table.two_rows_mut(q1, q2);
        for i in 0..x1.len() {
            let (x1, z1, x2, z2) = (&mut x1[i], &mut z1[i], &mut x2[i], &mut z2[i]);
            match gate {
                GateId::CX => {
                    *z1 ^= *z2;
                    *x2 ^= *x1;
                }
                GateId::CY => {
                    *z1 ^= *x2 ^ *z2;
                    *z2 ^= *x1;
                    *x2 ^= *x1;
                }
                GateId::CZ => {
                    *z1 ^= *x2;
                    *z2 ^= *x1;
                }
                GateId::XCX => {
                    *x1 ^= *z2;
                    *x2 ^= *z1;
                }
                GateId::XCY => {
                    *x1 ^= *x2 ^ *z2;
                    *x2 ^= *z1;
                    *z2 ^= *z1;
                }
                GateId::XCZ => {
                    *z2 ^= *z1;
                    *x1 ^= *x2;
                }
                GateId::YCX => {
                    *x2 ^= *x1 ^ *z1;
                    *x1 ^= *z2;
                    *z1 ^= *z2;
                }
                GateId::YCY => {
                    let y1 = *x1 ^ *z1;
                    let y2 = *x2 ^ *z2;
                    *x1 ^= y2;
                    *z1 ^= y2;
                    *x2 ^= y1;
                    *z2 ^= y1;
                }
                GateId::YCZ => {
                    *z2 ^= *x1 ^ *z1;
                    *z1 ^= *x2;
                    *x1 ^= *x2;
                }
                GateId::Swap => {
                    std::mem::swap(x1, x2);
                    std::mem::swap(z1, z2);
                }
                GateId::ISwap | GateId::ISwapDag => {
                    let dx = *x1 ^ *x2;
                    let t1 = *z1 ^ dx;
                    let t2 = *z2 ^ dx;
                    *z1 = t2;
                    *z2 = t1;
                    std::mem::swap(x1, x2);
                }
                GateId::SqrtXX | GateId::SqrtXXDag => {
                    let dz = *z1 ^ *z2;
                    *x1 ^= dz;
                    *x2 ^= dz;
                }
                GateId::SqrtYY | GateId::SqrtYYDag => {
                    *z1 ^= *x1;
                    *z2 ^= *x2;
                    *x1 ^= *z1;
                    *x1 ^= *z2;
                    *x2 ^= *z1;
                    *x2 ^= *z2;
                    *z1 ^= *x1;
                    *z2 ^= *x2;
                }
                GateId::SqrtZZ | GateId::SqrtZZDag => {
                    let dx = *x1 ^ *x2;
                    *z1 ^= dx;
                    *z2 ^= dx;
                }
                _ => unreachable!(),
            }
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
                (false, false) => self.pair_update(gate, c.qubit_value(), t.qubit_value()),
                (true, false) => {
                    // The classical control differs from the reference run
                    // exactly where the recorded flip bit is set.
                    let q = t.qubit_value();
                    let row = self.m_record.lookback(c.value() as usize)?;
                    match gate {
                        GateId::CX => word::xor_into(self.x_table.row_mut(q), row),
                        GateId::CY => {
                            word::xor_into(self.x_table.row_mut(q), row);
                            word::xor_into(self.z_table.row_mut(q), row);
                        }
                        GateId::CZ => word::xor_into(self.z_table.row_mut(q), row),
                        _ => unreachable!(),
                    }
                }
                (false, true) => {
                    debug_assert_eq!(gate, GateId::CZ);
                    let q = c.qubit_value();
                    let row = self.m_record.lookback(t.value() as usize)?;
                    word::xor_into(self.z_table.row_mut(q), row);
                }
                (true, true) => {}
            }
        }
        Ok(())
    }

    fn record_row(&mut self, q: usize, source: RecordSource, args: &[f64]) {
        match source {
            RecordSource::X => self.m_record.record_result(self.x_table.row(q)),
            RecordSource::Z => self.m_record.record_result(self.z_table.row(q)),
        }
        let noise = args.first().copied().unwrap_or(0.0);
        if noise > 0.0 {
            let hits = sample_hit_indices(noise, self.batch_size, &mut self.rng);
            let row = self.m_record.last_row_mut();
            for s in hits {
                row[s >> 6] ^= 1u64 << (s & 63);
            }
        }
    }

    fn measure_z(&mut self, targets: &[GateTarget], args: &[f64]) {
        // Inversion flags are ignored; the reference sample accounts for them.
        for t in targets {
            let q = t.qubit_value();
            self.z_table.randomize_row(q, self.batch_size, &mut self.rng);
            self.record_row(q, RecordSource::X, args);
        }
    }

    fn measure_x(&mut self, targets: &[GateTarget], args: &[f64]) {
        for t in targets {
            let q = t.qubit_value();
            self.x_table.randomize_row(q, self.batch_size, &mut self.rng);
            self.record_row(q, RecordSource::Z, args);
        }
    }

    fn measure_y(&mut self, targets: &[GateTarget], args: &[f64]) {
        for t in targets {
            let q = t.qubit_value();
            word::xor_into(self.x_table.row_mut(q), self.z_table.row(q));
            self.record_row(q, RecordSource::X, args);
            self.z_table.randomize_row(q, self.batch_size, &mut self.rng);
            word::xor_into(self.x_table.row_mut(q), self.z_table.row(q));
        }
    }

    fn correlated_error(&mut self, gate: GateId, targets: &[GateTarget], p: f64) {
        if gate == GateId::CorrelatedError {
            self.last_correlated_error_occurred.clear();
        }
        self.rng_buffer.clear();
        {
            let FrameSimulator {
                rng_buffer,
                rng,
                batch_size,
                ..
            } = self;
            for_samples(p, *batch_size, rng, |s| rng_buffer.set(s, true));
        }
        // Shots where an earlier error in the chain fired are excluded.
        for (buf, last) in self
            .rng_buffer
            .u64s_mut()
            .iter_mut()
            .zip(self.last_correlated_error_occurred.u64s())
        {
            *buf &= !*last;
        }
        for (last, buf) in self
            .last_correlated_error_occurred
            .u64s_mut()
            .iter_mut()
            .zip(self.rng_buffer.u64s())
        {
            *last |= *buf;
        }
        for t in targets {
            let q = t.qubit_value();
            if t.has_pauli_x() {
                word::xor_into(self.x_table.row_mut(q), self.rng_buffer.u64s());
            }
            if t.has_pauli_z() {
                word::xor_into(self.z_table.row_mut(q), self.rng_buffer.u64s());
            }
        }
    }

    /// Runs the circuit for a batch of shots and returns the per-measurement
    /// flip rows (relative to the reference sample). The caller's RNG is
    /// advanced so consecutive batches draw fresh noise.
    ///
    /// # Errors
    /// Propagates lookback failures.
    pub fn sample_flipped_measurements(
        circuit: &Circuit,
        num_shots: usize,
        rng: &mut SimRng,
    ) -> Result<BitTable, CircuitError> {
        let mut sim =
            FrameSimulator::new(circuit.count_qubits(), num_shots, usize::MAX, rng.clone());
        sim.reset_all();
        sim.run_circuit(circuit)?;
        *rng = sim.rng.clone();
        Ok(sim.m_record.storage().clone())
    }
}

enum RecordSource {
    X,
    Z,
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

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn flips(text: &str, shots: usize, seed: u64) -> BitTable {
        let circuit = Circuit::from_text(text).unwrap();
        let mut rng = SimRng::seed_from_u64(seed);
        FrameSimulator::sample_flipped_measurements(&circuit, shots, &mut rng).unwrap()
    }

    #[test]
    fn noiseless_circuits_never_flip() {
        let table = flips("H 0\nCX 0 1\nM 0 1", 64, 0);
        for m in 0..2 {
            assert!(tangle_core::bits::word::is_zero_slice(table.row(m)), "m={m}");
        }
    }

    #[test]
    fn remeasuring_in_a_conjugate_basis_randomizes_shots() {
        // The Z randomization of the first measurement decorrelates the
        // anticommuting follow-up measurement across shots.
        let table = flips("H 0\nM 0\nMX 0", 1024, 1);
        assert!(tangle_core::bits::word::is_zero_slice(table.row(0)));
        let mut count = 0;
        for s in 0..1024 {
            count += usize::from(table.get(1, s));
        }
        assert!((384..640).contains(&count), "count = {count}");
    }

    #[test]
    fn certain_x_error_flips_every_shot() {
        let table = flips("X_ERROR(1) 0\nM 0", 70, 0);
        for s in 0..70 {
            assert!(table.get(0, s));
        }
        // Z errors don't flip Z measurements.
        let table = flips("Z_ERROR(1) 0\nM 0", 70, 0);
        for s in 0..70 {
            assert!(!table.get(0, s));
        }
        // But they flip X measurements.
        let table = flips("Z_ERROR(1) 0\nMX 0", 70, 0);
        for s in 0..70 {
            assert!(table.get(0, s));
        }
    }

    #[test]
    fn errors_propagate_through_cx() {
        let table = flips("X_ERROR(1) 0\nCX 0 1\nM 1", 64, 0);
        for s in 0..64 {
            assert!(table.get(0, s));
        }
    }

    #[test]
    fn reset_clears_frames() {
        let table = flips("X_ERROR(1) 0\nR 0\nM 0", 64, 0);
        for s in 0..64 {
            assert!(!table.get(0, s));
        }
    }

    #[test]
    fn correlated_error_chain_applies_exactly_one_case() {
        // First error always fires, so the ELSE never does.
        let table = flips(
            "E(1) X0\nELSE_CORRELATED_ERROR(1) X1\nM 0 1",
            64,
            0,
        );
        for s in 0..64 {
            assert!(table.get(0, s));
            assert!(!table.get(1, s));
        }
        // First error never fires, so the ELSE always does.
        let table = flips(
            "E(0) X0\nELSE_CORRELATED_ERROR(1) X1\nM 0 1",
            64,
            0,
        );
        for s in 0..64 {
            assert!(!table.get(0, s));
            assert!(table.get(1, s));
        }
    }

    #[test]
    fn classical_control_tracks_record() {
        let table = flips("X_ERROR(1) 0\nM 0\nCX rec[-1] 1\nM 1", 64, 0);
        for s in 0..64 {
            assert!(table.get(0, s));
            assert!(table.get(1, s));
        }
    }

    #[test]
    fn error_rate_is_roughly_right() {
        let table = flips("X_ERROR(0.25) 0\nM 0", 1024, 3);
        let mut count = 0;
        for s in 0..1024 {
            count += usize::from(table.get(0, s));
        }
        // Mean 256, sigma ~13.9.
        assert!((180..340).contains(&count), "count = {count}");
    }

    #[test]
    fn measurement_noise_flips_recorded_bits() {
        let table = flips("M(1) 0", 64, 0);
        for s in 0..64 {
            assert!(table.get(0, s));
        }
    }

    #[test]
    fn get_set_frame_round_trip() {
        let mut sim = FrameSimulator::new(3, 8, usize::MAX, SimRng::seed_from_u64(0));
        let frame = PauliString::from_str("+XZY").unwrap();
        sim.set_frame(5, &frame);
        assert_eq!(sim.get_frame(5), frame);
        assert_eq!(sim.get_frame(4), PauliString::identity(3));
    }
}
